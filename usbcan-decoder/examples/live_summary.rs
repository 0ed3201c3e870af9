//! Live traffic summary
//!
//! Opens an adapter, decodes frames with an optional rule table and prints a
//! per-identifier / per-message summary once the limit is reached.
//!
//! Usage:
//!   live_summary <port> [--speed <kbps>] [--rules <file.toml>] [--limit <count>] [--verbose]
//!
//! Example:
//!   live_summary /dev/ttyUSB0 --speed 250 --rules rules.toml --limit 500

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use usbcan_decoder::{DecodedEvent, Decoder, DeviceConfig, DeviceInterface};

#[derive(Default)]
struct TrafficStats {
    total_frames: usize,
    raw_frames: usize,
    decoded_messages: usize,
    signals_decoded: usize,
    unique_ids: HashMap<u32, usize>,
    unique_messages: HashMap<String, usize>,
}

impl TrafficStats {
    fn record(&mut self, event: &DecodedEvent) {
        self.total_frames += 1;
        *self.unique_ids.entry(event.frame().identifier).or_insert(0) += 1;

        match event {
            DecodedEvent::Message { message, .. } => {
                self.decoded_messages += 1;
                self.signals_decoded += message.signals.len();
                *self.unique_messages.entry(message.name.clone()).or_insert(0) += 1;
            }
            DecodedEvent::RawFrame(_) => self.raw_frames += 1,
        }
    }

    fn print_summary(&self, framing_errors: u64) {
        println!("\n=== TRAFFIC SUMMARY ===");
        println!("Total frames: {}", self.total_frames);
        println!("Raw frames (no rule): {}", self.raw_frames);
        println!("Decoded messages: {}", self.decoded_messages);
        println!("Signals decoded: {}", self.signals_decoded);
        println!("Framing errors: {}", framing_errors);
        println!("Unique identifiers: {}", self.unique_ids.len());

        if !self.unique_ids.is_empty() {
            println!("\nTop 10 identifiers:");
            let mut sorted: Vec<_> = self.unique_ids.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1));
            for (id, count) in sorted.iter().take(10) {
                println!("  0x{:08X}: {} frames", id, count);
            }
        }

        if !self.unique_messages.is_empty() {
            println!("\nMessages:");
            for (name, count) in &self.unique_messages {
                println!("  {}: {} times", name, count);
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <port> [--speed <kbps>] [--rules <file.toml>] [--limit <count>] [--verbose]",
            args[0]
        );
        std::process::exit(1);
    }

    let mut config = DeviceConfig::new().with_port(args[1].clone());
    let mut rules: Option<PathBuf> = None;
    let mut limit = 100usize;
    let mut verbose = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--speed" => {
                i += 1;
                if i < args.len() {
                    config = config.with_speed_kbps(args[i].parse()?);
                }
            }
            "--rules" => {
                i += 1;
                if i < args.len() {
                    rules = Some(PathBuf::from(&args[i]));
                }
            }
            "--limit" => {
                i += 1;
                if i < args.len() {
                    limit = args[i].parse()?;
                }
            }
            "--verbose" | "-v" => verbose = true,
            other => eprintln!("Unknown argument: {}", other),
        }
        i += 1;
    }

    let mut decoder = Decoder::new();
    if let Some(path) = &rules {
        println!("Loading rules: {:?}", path);
        decoder.load_rules(path)?;
    }

    let db_stats = decoder.database_stats();
    println!("Message rules: {}", db_stats.num_messages);
    println!("Signal rules: {}", db_stats.num_signals);
    if db_stats.overlapping_rules > 0 {
        println!("Overlapping rule pairs: {}", db_stats.overlapping_rules);
    }

    let mut device = DeviceInterface::from_config(&config)?;
    device.open()?;
    println!("Listening on {} at {} kbps\n", config.port, config.can_speed_kbps);

    let mut stats = TrafficStats::default();
    while stats.total_frames < limit {
        for event in decoder.decode_frames(device.receive()?) {
            if verbose {
                match event.message() {
                    Some(message) => println!("{} {:?}", event.frame(), message.signals),
                    None => println!("{}", event.frame()),
                }
            }
            stats.record(&event);
        }
        thread::sleep(Duration::from_millis(config.poll_interval_ms));
    }

    let framing_errors = device.decoder().framing_errors();
    device.close()?;
    stats.print_summary(framing_errors);

    Ok(())
}
