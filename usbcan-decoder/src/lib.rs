//! USB-CAN Analyzer Decoder Library
//!
//! A library for talking to the "V7.00" USB-CAN Analyzer adapters (CH340
//! USB-serial bridge) and decoding the frames they report into named
//! engineering-unit signals.
//!
//! # Architecture
//!
//! - `protocol`: byte-exact wire protocol (incremental frame decoder, frame
//!   encoder, configuration command)
//! - `transport`: poll-driven byte transport over a serial port
//! - `device`: one adapter session (open, configure, receive, send)
//! - `signals`: rule tables and the first-match signal database
//! - `decoder`: front door pairing the database with streams of frames
//!
//! The library does NOT:
//! - Reconnect or retry after transport failures
//! - Reassemble multi-frame transport protocols (ISO-TP)
//! - Transmit standard (11-bit) frames
//!
//! # Example Usage
//!
//! ```no_run
//! use usbcan_decoder::{Decoder, DeviceConfig, DeviceInterface};
//! use std::path::Path;
//!
//! let mut decoder = Decoder::new();
//! decoder.load_rules(Path::new("rules.toml")).unwrap();
//!
//! let config = DeviceConfig::new().with_port("/dev/ttyUSB0").with_speed_kbps(250);
//! let mut device = DeviceInterface::from_config(&config).unwrap();
//! device.open().unwrap();
//!
//! loop {
//!     for event in decoder.decode_frames(device.receive().unwrap()) {
//!         match event.message() {
//!             Some(message) => println!("{}: {:?}", message.name, message.signals),
//!             None => println!("{}", event.frame()),
//!         }
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(config.poll_interval_ms));
//! }
//! ```

// Public modules
pub mod config;
pub mod decoder;
pub mod device;
pub mod protocol;
pub mod signals;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::{BusSpeed, DeviceConfig};
pub use decoder::{DatabaseStats, Decoder, DecodingIterator};
pub use device::DeviceInterface;
pub use protocol::{ConfigCommand, DecoderState, FrameDecoder, FrameEncoder, FramingError};
pub use signals::{MessageRule, RuleTable, SignalDatabase, SignalRule, SignalSource};
pub use transport::{ByteTransport, SerialTransport};
pub use types::{
    DecodedEvent, DecodedMessage, DecodedSignal, DecoderError, Frame, FrameKind, Result,
    RuleTableError, Timestamp, TransmitRejection,
};

// Internal modules (not exposed in public API)
mod message_decoder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
