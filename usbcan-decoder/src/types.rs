//! Core types for the USB-CAN decoder library
//!
//! This module defines the frames the wire decoder emits, the decoded signal
//! values produced by the signal database, and the error taxonomy shared by
//! the whole crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Maximum payload length of a classic CAN frame
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Identifier width of a CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// 11-bit identifier, 2 identifier bytes on the wire
    Standard,
    /// 29-bit identifier, 4 identifier bytes on the wire
    Extended,
}

impl FrameKind {
    /// Number of identifier bytes this kind occupies on the wire
    pub fn identifier_width(self) -> usize {
        match self {
            FrameKind::Standard => 2,
            FrameKind::Extended => 4,
        }
    }

    /// Largest identifier value representable by this kind
    pub fn max_identifier(self) -> u32 {
        match self {
            FrameKind::Standard => 0x7FF,
            FrameKind::Extended => 0x1FFF_FFFF,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Standard => write!(f, "Standard"),
            FrameKind::Extended => write!(f, "Extended"),
        }
    }
}

/// A complete CAN frame received from the adapter
///
/// Frames are assembled by exactly one `FrameDecoder` and are immutable once
/// emitted. The two session timestamps are copied in by value when the frame
/// starts, so every frame carries its own timing context.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// CAN identifier (11 or 29 significant bits, see `kind`)
    pub identifier: u32,
    /// Identifier width
    pub kind: FrameKind,
    /// Payload bytes, most significant byte first (0-8 bytes)
    pub payload: Vec<u8>,
    /// Time the last byte of the frame was received
    pub arrival: Timestamp,
    /// Time the capture session started
    pub session_start: Timestamp,
    /// Arrival time of the previous frame in the session
    pub previous: Timestamp,
}

impl Frame {
    /// Data length code - number of payload bytes
    pub fn dlc(&self) -> usize {
        self.payload.len()
    }

    /// Time elapsed between session start and this frame
    pub fn delta_since_start(&self) -> chrono::Duration {
        self.arrival - self.session_start
    }

    /// Time elapsed between the previous frame and this frame
    pub fn delta_since_previous(&self) -> chrono::Duration {
        self.arrival - self.previous
    }

    /// Payload interpreted as one big-endian unsigned integer
    ///
    /// An empty payload yields 0. A hand-built payload longer than
    /// `MAX_PAYLOAD_LEN` contributes only its last (lowest-order) 8 bytes.
    pub fn payload_value(&self) -> u64 {
        use byteorder::{BigEndian, ByteOrder};

        let low = &self.payload[self.payload.len().saturating_sub(MAX_PAYLOAD_LEN)..];
        if low.is_empty() {
            0
        } else {
            BigEndian::read_uint(low, low.len())
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FrameKind::Standard => write!(f, "0x{:03X}", self.identifier)?,
            FrameKind::Extended => write!(f, "0x{:08X}", self.identifier)?,
        }
        write!(f, " [{}]", self.dlc())?;
        for byte in &self.payload {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

/// A decoded signal with its physical value
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    /// Signal name from the rule table
    pub name: String,
    /// Physical value after mask, shift, scale and offset
    pub value: f64,
    /// Masked and shifted raw value before scaling (useful for debugging)
    pub raw_value: u64,
}

/// Result of matching a frame against the signal database
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// Name of the matching message rule
    pub name: String,
    /// Decoded signals in declaration order
    pub signals: Vec<DecodedSignal>,
}

impl DecodedMessage {
    /// Look up a signal value by name
    pub fn get(&self, signal_name: &str) -> Option<f64> {
        self.signals
            .iter()
            .find(|s| s.name == signal_name)
            .map(|s| s.value)
    }
}

/// Event emitted by the high-level `Decoder`
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    /// A frame matched a message rule
    Message {
        /// The received frame
        frame: Frame,
        /// Decoded message and signals
        message: DecodedMessage,
    },
    /// A frame that matched no rule
    RawFrame(Frame),
}

impl DecodedEvent {
    /// Get the underlying frame
    pub fn frame(&self) -> &Frame {
        match self {
            DecodedEvent::Message { frame, .. } => frame,
            DecodedEvent::RawFrame(frame) => frame,
        }
    }

    /// Get the arrival timestamp of this event
    pub fn timestamp(&self) -> Timestamp {
        self.frame().arrival
    }

    /// Get the decoded message, if the frame matched a rule
    pub fn message(&self) -> Option<&DecodedMessage> {
        match self {
            DecodedEvent::Message { message, .. } => Some(message),
            DecodedEvent::RawFrame(_) => None,
        }
    }
}

/// Why an outbound frame was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitRejection {
    /// Identifier was not exactly 4 bytes
    IdentifierLength(usize),
    /// Identifier does not fit in 29 bits
    IdentifierRange(u32),
    /// Payload longer than 8 bytes
    PayloadTooLong(usize),
}

impl fmt::Display for TransmitRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitRejection::IdentifierLength(len) => write!(
                f,
                "extended identifier must be 4 bytes (MSB first), got {}",
                len
            ),
            TransmitRejection::IdentifierRange(id) => {
                write!(f, "identifier 0x{:X} exceeds 29 bits", id)
            }
            TransmitRejection::PayloadTooLong(len) => write!(
                f,
                "payload must be at most {} bytes, got {}",
                MAX_PAYLOAD_LEN, len
            ),
        }
    }
}

/// Location and cause of a malformed rule in a rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTableError {
    /// Index of the offending message rule
    pub message_index: usize,
    /// Name of the offending message rule (if it has one)
    pub message_name: Option<String>,
    /// Index of the offending signal rule (None if the message itself is bad)
    pub signal_index: Option<usize>,
    /// Name of the offending signal rule (if known)
    pub signal_name: Option<String>,
    /// What is wrong with it
    pub reason: String,
}

impl fmt::Display for RuleTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message #{}", self.message_index)?;
        if let Some(name) = &self.message_name {
            write!(f, " '{}'", name)?;
        }
        if let Some(idx) = self.signal_index {
            write!(f, ", signal #{}", idx)?;
            if let Some(name) = &self.signal_name {
                write!(f, " '{}'", name)?;
            }
        }
        write!(f, ": {}", self.reason)
    }
}

/// Errors that can occur while configuring, receiving or transmitting
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Unsupported CAN bus speed: {0} kbps")]
    UnsupportedSpeed(u32),

    #[error("Standard (11-bit) frame transmission is not supported")]
    StandardFrameTransmit,

    #[error("Invalid rule table: {0}")]
    RuleTable(RuleTableError),

    #[error("Failed to parse rule table: {0}")]
    RuleTableParse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transmit rejected: {0}")]
    TransmitRejected(TransmitRejection),

    #[error("Transport is not open")]
    NotOpen,

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl DecoderError {
    /// True for errors raised before any transport activity (bad speed,
    /// unsupported frame kind, malformed rule table, bad settings)
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            DecoderError::UnsupportedSpeed(_)
                | DecoderError::StandardFrameTransmit
                | DecoderError::RuleTable(_)
                | DecoderError::RuleTableParse(_)
                | DecoderError::InvalidConfig(_)
        )
    }
}

impl From<RuleTableError> for DecoderError {
    fn from(err: RuleTableError) -> Self {
        DecoderError::RuleTable(err)
    }
}

impl From<TransmitRejection> for DecoderError {
    fn from(rejection: TransmitRejection) -> Self {
        DecoderError::TransmitRejected(rejection)
    }
}

impl From<serialport::Error> for DecoderError {
    fn from(err: serialport::Error) -> Self {
        DecoderError::Transport(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn frame_at(start_ms: i64, prev_ms: i64, arrival_ms: i64, payload: Vec<u8>) -> Frame {
        Frame {
            identifier: 0x123,
            kind: FrameKind::Standard,
            payload,
            arrival: Utc.timestamp_millis_opt(arrival_ms).unwrap(),
            session_start: Utc.timestamp_millis_opt(start_ms).unwrap(),
            previous: Utc.timestamp_millis_opt(prev_ms).unwrap(),
        }
    }

    #[test]
    fn test_frame_deltas() {
        let frame = frame_at(1_000, 1_400, 1_500, vec![]);
        assert_eq!(frame.delta_since_start(), Duration::milliseconds(500));
        assert_eq!(frame.delta_since_previous(), Duration::milliseconds(100));
    }

    #[test]
    fn test_payload_value_big_endian() {
        let frame = frame_at(0, 0, 0, vec![0x12, 0x34, 0x56]);
        assert_eq!(frame.payload_value(), 0x123456);

        let empty = frame_at(0, 0, 0, vec![]);
        assert_eq!(empty.payload_value(), 0);
    }

    #[test]
    fn test_payload_value_oversized_keeps_low_bytes() {
        let frame = frame_at(0, 0, 0, vec![0xFF, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]);
        assert_eq!(frame.payload_value(), 0x0203_0405_0607_0809);
    }

    #[test]
    fn test_frame_display() {
        let frame = frame_at(0, 0, 0, vec![0xAB, 0x01]);
        assert_eq!(format!("{}", frame), "0x123 [2] AB 01");
    }

    #[test]
    fn test_error_classification() {
        assert!(DecoderError::UnsupportedSpeed(42).is_configuration_error());
        assert!(DecoderError::StandardFrameTransmit.is_configuration_error());
        assert!(!DecoderError::NotOpen.is_configuration_error());
        assert!(!DecoderError::from(TransmitRejection::PayloadTooLong(9)).is_configuration_error());
    }

    #[test]
    fn test_rule_table_error_display() {
        let err = RuleTableError {
            message_index: 2,
            message_name: Some("Motor".to_string()),
            signal_index: Some(1),
            signal_name: Some("Speed".to_string()),
            reason: "shift must be below 64".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "message #2 'Motor', signal #1 'Speed': shift must be below 64"
        );
    }
}
