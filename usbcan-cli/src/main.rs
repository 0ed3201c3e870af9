//! USB-CAN Analyzer CLI Application
//!
//! Command-line front end for the usbcan-decoder library:
//! - `monitor`: live frames and decoded signals from an adapter
//! - `send`: transmit one extended frame
//! - `replay`: decode a raw byte capture offline
//! - `check-rules`: validate a rule table and print statistics

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use usbcan_decoder::signals::rule_table::parse_int;
use usbcan_decoder::types::MAX_PAYLOAD_LEN;
use usbcan_decoder::{DecodedEvent, Decoder, DeviceInterface, FrameDecoder};

mod config;

use config::{AppConfig, DeviceOverrides};

/// USB-CAN Analyzer - Monitor, send and decode CAN traffic
#[derive(Parser, Debug)]
#[command(name = "usbcan")]
#[command(about = "Talk to V7 USB-CAN Analyzer adapters", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (usbcan.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print received frames and decoded signals
    Monitor {
        #[command(flatten)]
        device: DeviceArgs,

        /// Rule table (.toml, .json or .xml)
        #[arg(short, long, value_name = "FILE")]
        rules: Option<PathBuf>,

        /// Stop after this many frames
        #[arg(long, value_name = "COUNT")]
        max_frames: Option<usize>,
    },

    /// Transmit one extended frame
    Send {
        #[command(flatten)]
        device: DeviceArgs,

        /// 29-bit identifier (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_identifier)]
        id: u32,

        /// Payload as hex, most significant byte first (e.g. "0B3456")
        #[arg(long, default_value = "", value_parser = parse_payload)]
        data: Payload,
    },

    /// Decode a raw byte capture of adapter output
    Replay {
        /// Capture file
        #[arg(value_name = "FILE")]
        capture: PathBuf,

        /// Rule table (.toml, .json or .xml)
        #[arg(short, long, value_name = "FILE")]
        rules: Option<PathBuf>,
    },

    /// Validate a rule table
    CheckRules {
        /// Rule table (.toml, .json or .xml)
        #[arg(value_name = "FILE")]
        rules: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct DeviceArgs {
    /// Serial port (e.g. /dev/ttyUSB0, COM5)
    #[arg(short, long)]
    port: Option<String>,

    /// CAN bus speed in kbps
    #[arg(short, long, value_name = "KBPS")]
    speed: Option<u32>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,
}

impl From<&DeviceArgs> for DeviceOverrides {
    fn from(args: &DeviceArgs) -> Self {
        Self {
            port: args.port.clone(),
            speed_kbps: args.speed,
            baud: args.baud,
        }
    }
}

/// Payload bytes parsed from the command line
#[derive(Debug, Clone, PartialEq)]
struct Payload(Vec<u8>);

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("USB-CAN Analyzer CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using decoder library v{}", usbcan_decoder::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    match &args.command {
        Command::Monitor {
            device,
            rules,
            max_frames,
        } => {
            let app_config = app_config.with_overrides(&DeviceOverrides::from(device));
            let decoder = build_decoder(rules.as_deref(), &app_config)?;
            monitor(&app_config, &decoder, *max_frames)
        }
        Command::Send { device, id, data } => {
            let app_config = app_config.with_overrides(&DeviceOverrides::from(device));
            send(&app_config, *id, &data.0)
        }
        Command::Replay { capture, rules } => {
            let decoder = build_decoder(rules.as_deref(), &app_config)?;
            replay(capture, &app_config, &decoder)
        }
        Command::CheckRules { rules } => check_rules(rules.as_deref(), &app_config),
    }
}

/// Command-line rule table wins over the configured one
fn rules_path<'a>(cli: Option<&'a Path>, app_config: &'a AppConfig) -> Option<&'a Path> {
    cli.or(app_config.rules.path.as_deref())
}

fn build_decoder(cli_rules: Option<&Path>, app_config: &AppConfig) -> Result<Decoder> {
    let mut decoder = Decoder::new();

    match rules_path(cli_rules, app_config) {
        Some(path) => decoder
            .load_rules(path)
            .with_context(|| format!("Failed to load rule table: {:?}", path))?,
        None => log::info!("No rule table given; frames will be shown raw"),
    }

    Ok(decoder)
}

/// Poll the adapter and print everything that arrives
fn monitor(app_config: &AppConfig, decoder: &Decoder, max_frames: Option<usize>) -> Result<()> {
    let device_config = &app_config.device;
    let mut device = DeviceInterface::from_config(device_config)
        .context("Failed to set up the adapter")?;

    device
        .open()
        .with_context(|| format!("Failed to open adapter on {}", device_config.port))?;

    println!(
        "Monitoring {} at {} kbps{}",
        device_config.port,
        device_config.can_speed_kbps,
        decoder_summary(decoder)
    );

    let interval = Duration::from_millis(device_config.poll_interval_ms);
    let mut seen = 0usize;

    loop {
        let frames = device.receive().context("Receive failed")?;
        for event in decoder.decode_frames(frames) {
            print_event(&event);
            seen += 1;
            if max_frames.is_some_and(|max| seen >= max) {
                device.close()?;
                log::info!(
                    "Stopped after {} frames ({} framing errors)",
                    seen,
                    device.decoder().framing_errors()
                );
                return Ok(());
            }
        }
        thread::sleep(interval);
    }
}

fn send(app_config: &AppConfig, identifier: u32, payload: &[u8]) -> Result<()> {
    let device_config = &app_config.device;
    let mut device = DeviceInterface::from_config(device_config)
        .context("Failed to set up the adapter")?;

    device
        .open()
        .with_context(|| format!("Failed to open adapter on {}", device_config.port))?;
    device
        .send_extended(identifier, payload)
        .with_context(|| format!("Failed to send frame 0x{:08X}", identifier))?;
    device.close()?;

    println!("Sent 0x{:08X} [{}] {}", identifier, payload.len(), hex_string(payload));
    Ok(())
}

/// Feed a capture through a fresh frame decoder in poll-sized chunks
fn replay(capture: &Path, app_config: &AppConfig, decoder: &Decoder) -> Result<()> {
    let bytes = std::fs::read(capture)
        .with_context(|| format!("Failed to read capture file: {:?}", capture))?;

    let budget = app_config.device.poll_byte_budget.max(1);
    let mut frame_decoder = FrameDecoder::new();
    let mut frames = 0usize;
    let mut matched = 0usize;

    for chunk in bytes.chunks(budget) {
        for event in decoder.decode_frames(frame_decoder.poll(chunk)) {
            if event.message().is_some() {
                matched += 1;
            }
            print_event(&event);
            frames += 1;
        }
    }

    println!(
        "\n{} bytes, {} frames ({} decoded), {} framing errors",
        bytes.len(),
        frames,
        matched,
        frame_decoder.framing_errors()
    );
    Ok(())
}

fn check_rules(cli_rules: Option<&Path>, app_config: &AppConfig) -> Result<()> {
    let Some(path) = rules_path(cli_rules, app_config) else {
        bail!("No rule table given (pass a file or set [rules] path in the config)");
    };

    let mut decoder = Decoder::new();
    decoder
        .load_rules(path)
        .with_context(|| format!("Failed to load rule table: {:?}", path))?;

    let stats = decoder.database_stats();
    println!("Rule table: {:?}", path);
    println!("  Messages:    {}", stats.num_messages);
    println!("  Signals:     {}", stats.num_signals);
    println!("  Overlapping: {}", stats.overlapping_rules);

    for rule in decoder.signal_database().rules() {
        println!(
            "  {} (mask 0x{:08X}, compare 0x{:08X}, {} bytes)",
            rule.name, rule.id_mask, rule.id_compare, rule.expected_data_length
        );
        for signal in &rule.signals {
            println!("    - {}", signal.name);
        }
    }
    Ok(())
}

fn decoder_summary(decoder: &Decoder) -> String {
    let stats = decoder.database_stats();
    if stats.num_messages == 0 {
        String::new()
    } else {
        format!(" ({} message rules)", stats.num_messages)
    }
}

fn print_event(event: &DecodedEvent) {
    let frame = event.frame();
    println!(
        "{:>10.3}s {:>+9.3}ms  {}",
        frame.delta_since_start().num_microseconds().unwrap_or(0) as f64 / 1e6,
        frame.delta_since_previous().num_microseconds().unwrap_or(0) as f64 / 1e3,
        frame
    );

    if let Some(message) = event.message() {
        println!("    {}", message.name);
        for signal in &message.signals {
            println!("      {} = {} (raw {})", signal.name, signal.value, signal.raw_value);
        }
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_identifier(text: &str) -> std::result::Result<u32, String> {
    let value = parse_int(text)?;
    if value > 0x1FFF_FFFF {
        return Err(format!("0x{:X} does not fit in 29 bits", value));
    }
    Ok(value as u32)
}

fn parse_payload(text: &str) -> std::result::Result<Payload, String> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '_')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);

    if digits.len() % 2 != 0 {
        return Err(format!("'{}' has an odd number of hex digits", text));
    }

    let bytes = (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|e| format!("'{}' is not hex: {}", text, e))?;

    if bytes.len() > MAX_PAYLOAD_LEN {
        return Err(format!("payload has {} bytes, at most {} allowed", bytes.len(), MAX_PAYLOAD_LEN));
    }
    Ok(Payload(bytes))
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_identifier() {
        assert_eq!(parse_identifier("0x0C152A6F"), Ok(0x0C152A6F));
        assert_eq!(parse_identifier("256"), Ok(256));
        assert!(parse_identifier("0x20000000").is_err());
        assert!(parse_identifier("abc").is_err());
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(""), Ok(Payload(vec![])));
        assert_eq!(parse_payload("0B3456"), Ok(Payload(vec![0x0B, 0x34, 0x56])));
        assert_eq!(parse_payload("0x0b 34:56"), Ok(Payload(vec![0x0B, 0x34, 0x56])));
        assert!(parse_payload("ABC").is_err());
        assert!(parse_payload("zz").is_err());
        assert!(parse_payload("000102030405060708").is_err());
    }

    #[test]
    fn test_send_arguments() {
        let args = Args::try_parse_from([
            "usbcan", "send", "--port", "COM5", "--speed", "250", "--id", "0x0C152A6F", "--data", "0102",
        ])
        .unwrap();

        match args.command {
            Command::Send { device, id, data } => {
                assert_eq!(device.port.as_deref(), Some("COM5"));
                assert_eq!(device.speed, Some(250));
                assert_eq!(id, 0x0C152A6F);
                assert_eq!(data, Payload(vec![0x01, 0x02]));
            }
            other => panic!("expected send, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_rules_override_config() {
        let mut app_config = AppConfig::default();
        app_config.rules.path = Some(PathBuf::from("configured.toml"));

        assert_eq!(
            rules_path(Some(Path::new("cli.toml")), &app_config),
            Some(Path::new("cli.toml"))
        );
        assert_eq!(rules_path(None, &app_config), Some(Path::new("configured.toml")));
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[0x0B, 0x34, 0x56]), "0B 34 56");
        assert_eq!(hex_string(&[]), "");
    }
}
