//! Wire protocol of the USB-CAN Analyzer (V7) adapter
//!
//! The adapter speaks a reverse-engineered binary protocol over its USB-serial
//! bridge. There is no public specification; every constant here was taken
//! from captures of the vendor tool.
//!
//! ## Receive frame layout
//! ```text
//! AA  <mode>  <id: 2 or 4 bytes, LSB first>  <data: 0-8 bytes, LSB first>  55
//! ```
//! `mode` high nibble `0xC` = standard frame, `0xE` = extended frame; the low
//! nibble is the payload length.
//!
//! ## Transmit frame layout
//! ```text
//! AA  F0|len  <id: 4 bytes, LSB first>  <data, LSB first>  55
//! ```

pub mod config_command;
pub mod frame_decoder;
pub mod frame_encoder;

pub use config_command::ConfigCommand;
pub use frame_decoder::{parse_mode_byte, DecoderState, FrameDecoder, FramingError};
pub use frame_encoder::FrameEncoder;

/// Start-of-frame marker in both directions
pub const SYNC_BYTE: u8 = 0xAA;

/// Command byte that introduces the configuration packet
pub const CMD_CONFIGURE: u8 = 0x55;

/// High nibble of an inbound standard-frame mode byte
pub const MODE_STANDARD: u8 = 0xC0;

/// High nibble of an inbound extended-frame mode byte
pub const MODE_EXTENDED: u8 = 0xE0;

/// High nibble of an outbound extended-frame mode byte
pub const TX_MODE_EXTENDED: u8 = 0xF0;

/// Final byte of every transmitted frame
pub const TX_TRAILER: u8 = 0x55;
