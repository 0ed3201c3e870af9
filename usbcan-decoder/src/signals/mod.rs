//! Signal database and rule table loading
//!
//! This module contains the rule table document format and the signal
//! database that matches frames against it.

pub mod database;
pub mod rule_table;

// Re-export key types for convenience
pub use database::{DatabaseStats, MessageRule, SignalDatabase, SignalRule, SignalSource};
pub use rule_table::{MessageRuleSpec, RuleFloat, RuleInt, RuleTable, SignalRuleSpec};
