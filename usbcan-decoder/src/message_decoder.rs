//! Message Decoding Engine
//!
//! Extracts signal values from received frames using the mask/shift/scale/
//! offset rules of the signal database. Each signal is a pure function of one
//! frame; no state is carried between signals or frames.

use crate::signals::database::{MessageRule, SignalRule, SignalSource};
use crate::types::{DecodedMessage, DecodedSignal, Frame};

/// Message decoder - extracts signals from frames
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode every signal of a matching rule
    ///
    /// The caller is responsible for checking that the rule matches. Signals
    /// are returned in declaration order.
    pub fn decode_message(frame: &Frame, rule: &MessageRule) -> DecodedMessage {
        let signals = rule
            .signals
            .iter()
            .map(|signal| Self::decode_signal(frame, signal))
            .collect();

        DecodedMessage {
            name: rule.name.clone(),
            signals,
        }
    }

    /// Decode a single signal from a frame
    pub fn decode_signal(frame: &Frame, signal: &SignalRule) -> DecodedSignal {
        let raw_value = Self::extract_raw(frame, signal);

        DecodedSignal {
            name: signal.name.clone(),
            value: raw_value as f64 * signal.scale + signal.offset,
            raw_value,
        }
    }

    /// Select the source bits, mask them and shift them down
    fn extract_raw(frame: &Frame, signal: &SignalRule) -> u64 {
        let source = match signal.source {
            SignalSource::Identifier => frame.identifier as u64,
            SignalSource::Payload => frame.payload_value(),
        };

        (source & signal.mask).checked_shr(signal.shift).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameKind;
    use chrono::Utc;

    fn frame(identifier: u32, payload: Vec<u8>) -> Frame {
        let now = Utc::now();
        Frame {
            identifier,
            kind: FrameKind::Extended,
            payload,
            arrival: now,
            session_start: now,
            previous: now,
        }
    }

    fn signal(name: &str, source: SignalSource, mask: u64, shift: u32, scale: f64, offset: f64) -> SignalRule {
        SignalRule {
            name: name.to_string(),
            source,
            mask,
            shift,
            scale,
            offset,
        }
    }

    #[test]
    fn test_identifier_source() {
        let sig = signal("Addr", SignalSource::Identifier, 0xFF, 0, 1.0, 0.0);
        let decoded = MessageDecoder::decode_signal(&frame(0x12345678, vec![]), &sig);
        assert_eq!(decoded.raw_value, 0x78);
        assert_eq!(decoded.value, 120.0);
    }

    #[test]
    fn test_payload_is_big_endian() {
        // First payload byte is the most significant
        let sig = signal("Hi", SignalSource::Payload, 0xFF00, 8, 1.0, 0.0);
        let decoded = MessageDecoder::decode_signal(&frame(0, vec![0xAB, 0xCD]), &sig);
        assert_eq!(decoded.raw_value, 0xAB);
    }

    #[test]
    fn test_scale_and_offset() {
        let sig = signal("Temp", SignalSource::Payload, 0xFF, 0, 0.5, -40.0);
        let decoded = MessageDecoder::decode_signal(&frame(0, vec![0x64]), &sig);
        assert_eq!(decoded.value, 10.0);
    }

    #[test]
    fn test_full_width_mask() {
        let sig = signal("All", SignalSource::Payload, u64::MAX, 63, 1.0, 0.0);
        let decoded = MessageDecoder::decode_signal(&frame(0, vec![0x80, 0, 0, 0, 0, 0, 0, 0]), &sig);
        assert_eq!(decoded.raw_value, 1);
    }

    #[test]
    fn test_empty_payload_decodes_to_offset() {
        let sig = signal("Nothing", SignalSource::Payload, 0xFF, 0, 2.0, 7.5);
        let decoded = MessageDecoder::decode_signal(&frame(0, vec![]), &sig);
        assert_eq!(decoded.value, 7.5);
    }

    #[test]
    fn test_signal_order_preserved() {
        let rule = MessageRule {
            name: "M".to_string(),
            id_mask: 0,
            id_compare: 0,
            expected_data_length: 2,
            signals: vec![
                signal("Zeta", SignalSource::Payload, 0x00FF, 0, 1.0, 0.0),
                signal("Alpha", SignalSource::Payload, 0xFF00, 8, 1.0, 0.0),
                signal("Mid", SignalSource::Identifier, 0xF, 0, 1.0, 0.0),
            ],
        };
        let decoded = MessageDecoder::decode_message(&frame(0x5, vec![0x01, 0x02]), &rule);
        let names: Vec<&str> = decoded.signals.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(decoded.get("Zeta"), Some(2.0));
        assert_eq!(decoded.get("Alpha"), Some(1.0));
        assert_eq!(decoded.get("Mid"), Some(5.0));
    }
}
