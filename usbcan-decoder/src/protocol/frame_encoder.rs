//! Transmit-side frame encoder
//!
//! Only extended (29-bit) frames can be transmitted. Asking for a standard
//! frame encoder fails at construction instead of silently sending an
//! extended frame.

use super::{SYNC_BYTE, TX_MODE_EXTENDED, TX_TRAILER};
use crate::types::{DecoderError, FrameKind, Result, TransmitRejection, MAX_PAYLOAD_LEN};

/// Serializes outbound frames into adapter wire bytes
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    kind: FrameKind,
}

impl FrameEncoder {
    /// Create an encoder for the given frame kind
    ///
    /// # Errors
    /// `DecoderError::StandardFrameTransmit` for `FrameKind::Standard`.
    pub fn new(kind: FrameKind) -> Result<Self> {
        match kind {
            FrameKind::Extended => Ok(Self { kind }),
            FrameKind::Standard => Err(DecoderError::StandardFrameTransmit),
        }
    }

    /// Frame kind this encoder produces
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Encode a frame from a 4-byte big-endian identifier and a payload
    ///
    /// Output layout: `AA, F0|len, id (LSB first), payload (LSB first), 55`.
    /// Nothing is produced when the frame is rejected.
    pub fn encode(&self, identifier: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        if identifier.len() != 4 {
            return Err(TransmitRejection::IdentifierLength(identifier.len()).into());
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(TransmitRejection::PayloadTooLong(payload.len()).into());
        }

        let mut wire = Vec::with_capacity(3 + identifier.len() + payload.len());
        wire.push(SYNC_BYTE);
        wire.push(TX_MODE_EXTENDED | payload.len() as u8);
        wire.extend(identifier.iter().rev());
        wire.extend(payload.iter().rev());
        wire.push(TX_TRAILER);
        Ok(wire)
    }

    /// Encode a frame from a numeric 29-bit identifier
    pub fn encode_extended(&self, identifier: u32, payload: &[u8]) -> Result<Vec<u8>> {
        if identifier > self.kind.max_identifier() {
            return Err(TransmitRejection::IdentifierRange(identifier).into());
        }
        self.encode(&identifier.to_be_bytes(), payload)
    }
}
