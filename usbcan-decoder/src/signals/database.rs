//! Rule-driven signal database
//!
//! Holds the ordered message rules loaded from a rule table and matches
//! received frames against them. The table is replaced atomically: a load
//! either installs every rule or leaves the previous table untouched.

use crate::message_decoder::MessageDecoder;
use crate::signals::rule_table::RuleTable;
use crate::types::{DecodedMessage, Frame, Result};

/// Where a signal's raw bits come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    /// The frame identifier
    Identifier,
    /// The payload, read as one big-endian integer
    Payload,
}

/// A bit-field extraction rule
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRule {
    /// Signal name
    pub name: String,
    /// Identifier or payload
    pub source: SignalSource,
    /// Bits to keep from the source value
    pub mask: u64,
    /// Right shift applied after masking (below 64)
    pub shift: u32,
    /// Scale factor to convert raw value to physical value
    pub scale: f64,
    /// Offset to add after scaling
    pub offset: f64,
}

/// A message matching rule with its signals
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRule {
    /// Message name
    pub name: String,
    /// Identifier bits that take part in the comparison
    pub id_mask: u32,
    /// Required value of the masked identifier
    pub id_compare: u32,
    /// Required payload length
    pub expected_data_length: usize,
    /// Signals in declaration order
    pub signals: Vec<SignalRule>,
}

impl MessageRule {
    /// True when the frame's masked identifier and payload length match
    pub fn matches(&self, frame: &Frame) -> bool {
        (frame.identifier & self.id_mask) == self.id_compare
            && frame.payload.len() == self.expected_data_length
    }

    /// True when at least one frame could match both rules
    pub fn overlaps(&self, other: &MessageRule) -> bool {
        self.expected_data_length == other.expected_data_length
            && (self.id_compare ^ other.id_compare) & self.id_mask & other.id_mask == 0
    }
}

/// The active rule set
pub struct SignalDatabase {
    /// Message rules in declaration order; the first match wins
    rules: Vec<MessageRule>,
}

impl SignalDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Validate a rule table and install it in place of the current rules
    ///
    /// On error the previous rules stay active and the error names the
    /// offending message and signal rule.
    pub fn load(&mut self, table: &RuleTable) -> Result<()> {
        let rules = table.compile()?;

        for (later_idx, later) in rules.iter().enumerate() {
            for (earlier_idx, earlier) in rules[..later_idx].iter().enumerate() {
                if later.overlaps(earlier) {
                    log::warn!(
                        "Message rule '{}' (#{}) overlaps earlier rule '{}' (#{}); first match wins",
                        later.name,
                        later_idx,
                        earlier.name,
                        earlier_idx
                    );
                }
            }
        }

        self.rules = rules;

        let stats = self.stats();
        log::info!(
            "Loaded {} message rules with {} signals",
            stats.num_messages,
            stats.num_signals
        );
        Ok(())
    }

    /// First rule matching the frame, in declaration order
    pub fn find_match(&self, frame: &Frame) -> Option<&MessageRule> {
        self.rules.iter().find(|rule| rule.matches(frame))
    }

    /// Decode a frame with the first matching rule
    ///
    /// Returns `None` when no rule matches; that is not an error.
    pub fn decode(&self, frame: &Frame) -> Option<DecodedMessage> {
        let rule = self.find_match(frame)?;
        log::trace!("Frame 0x{:X} matched rule '{}'", frame.identifier, rule.name);
        Some(MessageDecoder::decode_message(frame, rule))
    }

    /// All rules in declaration order
    pub fn rules(&self) -> &[MessageRule] {
        &self.rules
    }

    /// True when no rules are loaded
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find all signal rules with a given name
    pub fn find_signal(&self, signal_name: &str) -> Vec<(&MessageRule, &SignalRule)> {
        self.rules
            .iter()
            .flat_map(|rule| {
                rule.signals
                    .iter()
                    .filter(move |s| s.name == signal_name)
                    .map(move |s| (rule, s))
            })
            .collect()
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        let num_signals = self.rules.iter().map(|r| r.signals.len()).sum();
        let overlapping_rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| self.rules[..i].iter().filter(|earlier| rule.overlaps(earlier)).count())
            .sum();

        DatabaseStats {
            num_messages: self.rules.len(),
            num_signals,
            overlapping_rules,
        }
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of message rules
    pub num_messages: usize,
    /// Total number of signal rules
    pub num_signals: usize,
    /// Pairs of rules that can match the same frame
    pub overlapping_rules: usize,
}

impl Default for SignalDatabase {
    fn default() -> Self {
        Self::new()
    }
}
