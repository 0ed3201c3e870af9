//! Incremental receive-side frame decoder
//!
//! The decoder is a byte-at-a-time state machine. It can be fed arbitrary
//! slices, including empty ones and slices that split a frame anywhere, and
//! returns the frames completed by each slice. Partial frames are kept until
//! the next call; there is no timeout on a stalled frame.
//!
//! ```text
//! AwaitingSync --0xAA--> AwaitingMode --mode--> ReceivingIdentifier(n)
//!      ^                      |                        |
//!      |                 violation                 id complete
//!      |                      |                        v
//!      +----------------------+--- frame emitted --- ReceivingData(n)
//! ```

use super::{MODE_EXTENDED, MODE_STANDARD, SYNC_BYTE, TX_MODE_EXTENDED};
use crate::types::{Frame, FrameKind, Timestamp, MAX_PAYLOAD_LEN};
use byteorder::{ByteOrder, LittleEndian};
use chrono::Utc;

/// A byte stream that does not follow the framing rules
///
/// Framing errors are always recovered inside the decoder; they are reported
/// through the log and the error counter, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("unexpected mode byte 0x{0:02X}")]
    UnexpectedMode(u8),

    #[error("payload length {len} in mode byte 0x{byte:02X} exceeds 8")]
    InvalidLength { byte: u8, len: u8 },
}

/// Observable position of the decoder within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Discarding bytes until a sync byte arrives
    AwaitingSync,
    /// Sync seen, next byte is the mode byte
    AwaitingMode,
    /// Receiving identifier bytes; `remaining` still to come
    ReceivingIdentifier { remaining: usize },
    /// Receiving payload bytes; `remaining` still to come
    ReceivingData { remaining: usize },
}

/// Decode a mode byte into frame kind and payload length
///
/// The transmit form `0xF_` is accepted as an extended frame so that encoder
/// output (and adapter echoes of it) decode like received frames.
pub fn parse_mode_byte(byte: u8) -> Result<(FrameKind, usize), FramingError> {
    let kind = match byte & 0xF0 {
        MODE_STANDARD => FrameKind::Standard,
        MODE_EXTENDED | TX_MODE_EXTENDED => FrameKind::Extended,
        _ => return Err(FramingError::UnexpectedMode(byte)),
    };

    let len = byte & 0x0F;
    if len as usize > MAX_PAYLOAD_LEN {
        return Err(FramingError::InvalidLength { byte, len });
    }

    Ok((kind, len as usize))
}

/// Frame under construction
///
/// Both fields are filled in wire order (least significant byte first) and
/// decoded as fixed-width little-endian windows when complete.
#[derive(Debug, Clone)]
struct FrameBuilder {
    kind: FrameKind,
    identifier: [u8; 4],
    id_received: usize,
    payload: [u8; MAX_PAYLOAD_LEN],
    data_len: usize,
    data_received: usize,
    session_start: Timestamp,
    previous: Timestamp,
}

impl FrameBuilder {
    fn new(kind: FrameKind, data_len: usize, session_start: Timestamp, previous: Timestamp) -> Self {
        Self {
            kind,
            identifier: [0; 4],
            id_received: 0,
            payload: [0; MAX_PAYLOAD_LEN],
            data_len,
            data_received: 0,
            session_start,
            previous,
        }
    }

    fn id_remaining(&self) -> usize {
        self.kind.identifier_width() - self.id_received
    }

    fn data_remaining(&self) -> usize {
        self.data_len - self.data_received
    }

    fn push_identifier(&mut self, byte: u8) {
        self.identifier[self.id_received] = byte;
        self.id_received += 1;
    }

    fn push_data(&mut self, byte: u8) {
        self.payload[self.data_received] = byte;
        self.data_received += 1;
    }

    fn finish(self, arrival: Timestamp) -> Frame {
        let width = self.kind.identifier_width();
        let identifier = LittleEndian::read_uint(&self.identifier[..width], width) as u32;

        // Wire order is LSB first; frames store the payload MSB first
        let payload = self.payload[..self.data_len].iter().rev().copied().collect();

        Frame {
            identifier,
            kind: self.kind,
            payload,
            arrival,
            session_start: self.session_start,
            previous: self.previous,
        }
    }
}

#[derive(Debug, Clone)]
enum Stage {
    AwaitingSync,
    AwaitingMode,
    Identifier(FrameBuilder),
    Data(FrameBuilder),
}

/// Receive-side decoder for one adapter session
pub struct FrameDecoder {
    stage: Stage,
    session_start: Timestamp,
    previous: Timestamp,
    clock: fn() -> Timestamp,
    framing_errors: u64,
    frames_decoded: u64,
}

impl FrameDecoder {
    /// Create a decoder whose session starts now
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Create a decoder with a custom time source
    pub fn with_clock(clock: fn() -> Timestamp) -> Self {
        let now = clock();
        Self {
            stage: Stage::AwaitingSync,
            session_start: now,
            previous: now,
            clock,
            framing_errors: 0,
            frames_decoded: 0,
        }
    }

    /// Consume a slice of received bytes and return every completed frame
    ///
    /// An empty slice returns no frames and leaves the state untouched.
    pub fn poll(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&byte| self.push_byte(byte)).collect()
    }

    /// Advance the state machine by one byte
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        let stage = std::mem::replace(&mut self.stage, Stage::AwaitingSync);

        match stage {
            Stage::AwaitingSync => {
                if byte == SYNC_BYTE {
                    self.stage = Stage::AwaitingMode;
                } else {
                    log::trace!("Discarding byte 0x{:02X} while awaiting sync", byte);
                }
                None
            }
            Stage::AwaitingMode => {
                match parse_mode_byte(byte) {
                    Ok((kind, data_len)) => {
                        let builder = FrameBuilder::new(kind, data_len, self.session_start, self.previous);
                        self.stage = Stage::Identifier(builder);
                    }
                    Err(e) => self.framing_violation(e),
                }
                None
            }
            Stage::Identifier(mut builder) => {
                builder.push_identifier(byte);
                if builder.id_remaining() > 0 {
                    self.stage = Stage::Identifier(builder);
                    None
                } else if builder.data_len == 0 {
                    Some(self.complete(builder))
                } else {
                    self.stage = Stage::Data(builder);
                    None
                }
            }
            Stage::Data(mut builder) => {
                builder.push_data(byte);
                if builder.data_remaining() > 0 {
                    self.stage = Stage::Data(builder);
                    None
                } else {
                    Some(self.complete(builder))
                }
            }
        }
    }

    fn complete(&mut self, builder: FrameBuilder) -> Frame {
        let arrival = (self.clock)();
        let frame = builder.finish(arrival);
        self.previous = arrival;
        self.frames_decoded += 1;
        log::debug!("Decoded frame {}", frame);
        frame
    }

    fn framing_violation(&mut self, error: FramingError) {
        self.framing_errors += 1;
        log::warn!("Framing error: {}, resynchronizing", error);
    }

    /// Current position within a frame
    pub fn state(&self) -> DecoderState {
        match &self.stage {
            Stage::AwaitingSync => DecoderState::AwaitingSync,
            Stage::AwaitingMode => DecoderState::AwaitingMode,
            Stage::Identifier(b) => DecoderState::ReceivingIdentifier { remaining: b.id_remaining() },
            Stage::Data(b) => DecoderState::ReceivingData { remaining: b.data_remaining() },
        }
    }

    /// Drop any partial frame and wait for the next sync byte
    pub fn reset(&mut self) {
        self.stage = Stage::AwaitingSync;
    }

    /// Reset all state and start a new session clock
    pub fn start_session(&mut self) {
        let now = (self.clock)();
        self.stage = Stage::AwaitingSync;
        self.session_start = now;
        self.previous = now;
        self.framing_errors = 0;
        self.frames_decoded = 0;
    }

    /// Start time of the current session
    pub fn session_start(&self) -> Timestamp {
        self.session_start
    }

    /// Number of framing violations seen this session
    pub fn framing_errors(&self) -> u64 {
        self.framing_errors
    }

    /// Number of frames emitted this session
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
