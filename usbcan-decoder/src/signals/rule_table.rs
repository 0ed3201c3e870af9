//! Rule table documents
//!
//! A rule table is an ordered list of message rules, each with an ordered
//! list of signal rules. Tables are written in TOML or JSON:
//!
//! ```toml
//! [[messages]]
//! name = "MotorStatus"
//! id_mask = "0xFFFFFF00"
//! id_compare = "0x12345600"
//! data_len = 8
//!
//! [[messages.signals]]
//! name = "Speed"
//! source = "data"
//! mask = "0x00000000000AFF00"
//! shift = 8
//! scale = 0.125
//! offset = 0
//! ```
//!
//! The XML layout used by existing analyzer databases is read as well:
//!
//! ```xml
//! <CanDatabase>
//!   <Interpreter id_mask="0xFFFFFF00" id_compare="0x12345600" data_len="8">
//!     <DataElem Name="Speed" Source="data" Mask="0x00000000000AFF00"
//!               Downshift="8" Scale="0.125" Offset="0"/>
//!   </Interpreter>
//! </CanDatabase>
//! ```
//!
//! Integers may be native numbers or strings in any base (`0x`, `0o`, `0b`
//! or decimal, `_` separators allowed). Only the document's outer shape is
//! checked in one go; every message entry is then checked on its own so that
//! a bad, missing or unknown field is reported as a [`RuleTableError`]
//! naming the message and signal that hold it.

use crate::signals::database::{MessageRule, SignalRule, SignalSource};
use crate::types::{DecoderError, Result, RuleTableError, MAX_PAYLOAD_LEN};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// An integer field as written in the document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleInt {
    Unsigned(u64),
    Signed(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for RuleInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RuleIntVisitor;

        impl<'de> Visitor<'de> for RuleIntVisitor {
            type Value = RuleInt;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or an integer literal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<RuleInt, E> {
                Ok(RuleInt::Unsigned(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<RuleInt, E> {
                Ok(RuleInt::Signed(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<RuleInt, E> {
                Ok(RuleInt::Text(v.to_string()))
            }
        }

        deserializer.deserialize_any(RuleIntVisitor)
    }
}

impl RuleInt {
    /// Resolve to an unsigned value
    pub fn value(&self) -> std::result::Result<u64, String> {
        match self {
            RuleInt::Unsigned(v) => Ok(*v),
            RuleInt::Signed(v) => u64::try_from(*v).map_err(|_| format!("negative value {}", v)),
            RuleInt::Text(s) => parse_int(s),
        }
    }
}

impl From<u64> for RuleInt {
    fn from(v: u64) -> Self {
        RuleInt::Unsigned(v)
    }
}

impl From<&str> for RuleInt {
    fn from(s: &str) -> Self {
        RuleInt::Text(s.to_string())
    }
}

/// A floating-point field as written in the document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleFloat {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for RuleFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RuleFloatVisitor;

        impl<'de> Visitor<'de> for RuleFloatVisitor {
            type Value = RuleFloat;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or a numeric string")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<RuleFloat, E> {
                Ok(RuleFloat::Number(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<RuleFloat, E> {
                Ok(RuleFloat::Number(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<RuleFloat, E> {
                Ok(RuleFloat::Number(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<RuleFloat, E> {
                Ok(RuleFloat::Text(v.to_string()))
            }
        }

        deserializer.deserialize_any(RuleFloatVisitor)
    }
}

impl RuleFloat {
    /// Resolve to a finite value
    pub fn value(&self) -> std::result::Result<f64, String> {
        let v = match self {
            RuleFloat::Number(v) => *v,
            RuleFloat::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", s))?,
        };
        if v.is_finite() {
            Ok(v)
        } else {
            Err(format!("{} is not finite", v))
        }
    }
}

impl From<f64> for RuleFloat {
    fn from(v: f64) -> Self {
        RuleFloat::Number(v)
    }
}

/// Parse an unsigned integer literal in any base
///
/// Accepts `0x`/`0o`/`0b` prefixes (either case), plain decimal, and `_`
/// digit separators.
pub fn parse_int(text: &str) -> std::result::Result<u64, String> {
    let cleaned: String = text.trim().chars().filter(|&c| c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();

    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else {
        (lower.as_str(), 10)
    };

    if digits.is_empty() {
        return Err(format!("'{}' is not an integer", text));
    }

    u64::from_str_radix(digits, radix).map_err(|e| format!("'{}' is not a valid integer: {}", text, e))
}

/// One signal rule as written in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalRuleSpec {
    pub name: String,
    /// "id" or "data"
    pub source: String,
    pub mask: RuleInt,
    #[serde(alias = "downshift")]
    pub shift: RuleInt,
    pub scale: RuleFloat,
    pub offset: RuleFloat,
}

/// One message rule as written in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageRuleSpec {
    /// Defaults to `Message_<index>` when absent
    #[serde(default)]
    pub name: Option<String>,
    pub id_mask: RuleInt,
    pub id_compare: RuleInt,
    #[serde(alias = "data_len")]
    pub expected_data_length: RuleInt,
    #[serde(default)]
    pub signals: Vec<SignalRuleSpec>,
}

/// A complete rule table document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleTable {
    #[serde(default)]
    pub messages: Vec<MessageRuleSpec>,
}

impl RuleTable {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawTable = toml::from_str(content).map_err(|e| DecoderError::RuleTableParse(e.to_string()))?;
        raw.into_table()
    }

    /// Parse a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: RawTable =
            serde_json::from_str(content).map_err(|e| DecoderError::RuleTableParse(e.to_string()))?;
        raw.into_table()
    }

    /// Parse an XML `<CanDatabase>` document
    pub fn from_xml_str(content: &str) -> Result<Self> {
        let database: XmlDatabase =
            quick_xml::de::from_str(content).map_err(|e| DecoderError::RuleTableParse(e.to_string()))?;
        Ok(database.into_table()?)
    }

    /// Read a rule table file, choosing the format by extension
    ///
    /// `.json` is JSON, `.xml` is XML, anything else is TOML.
    pub fn from_path(path: &Path) -> Result<Self> {
        log::info!("Reading rule table: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| {
            DecoderError::RuleTableParse(format!("Failed to read {:?}: {}", path, e))
        })?;

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Self::from_json_str(&content),
            "xml" => Self::from_xml_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Validate every rule and build the runtime rule list
    ///
    /// Fails on the first malformed rule; nothing is returned for a partially
    /// valid table.
    pub fn compile(&self) -> std::result::Result<Vec<MessageRule>, RuleTableError> {
        self.messages
            .iter()
            .enumerate()
            .map(|(index, spec)| compile_message(index, spec))
            .collect()
    }
}

/// Outer document shape; entries stay untyped until checked one by one
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    #[serde(default)]
    messages: Vec<serde_json::Value>,
}

impl RawTable {
    fn into_table(self) -> Result<RuleTable> {
        let messages = self
            .messages
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                MessageRuleSpec::deserialize(entry).map_err(|e| entry_error(index, entry, e))
            })
            .collect::<std::result::Result<Vec<_>, RuleTableError>>()?;
        Ok(RuleTable { messages })
    }
}

/// Attribute the error to the first signal that fails on its own, if any
fn entry_error(index: usize, entry: &serde_json::Value, err: serde_json::Error) -> RuleTableError {
    let name_of = |value: &serde_json::Value| value.get("name").and_then(|n| n.as_str()).map(str::to_string);

    let bad_signal = entry
        .get("signals")
        .and_then(|signals| signals.as_array())
        .and_then(|signals| {
            signals.iter().enumerate().find_map(|(sig_index, signal)| {
                SignalRuleSpec::deserialize(signal)
                    .err()
                    .map(|e| (sig_index, name_of(signal), e))
            })
        });

    match bad_signal {
        Some((sig_index, signal_name, e)) => RuleTableError {
            message_index: index,
            message_name: name_of(entry),
            signal_index: Some(sig_index),
            signal_name,
            reason: e.to_string(),
        },
        None => RuleTableError {
            message_index: index,
            message_name: name_of(entry),
            signal_index: None,
            signal_name: None,
            reason: err.to_string(),
        },
    }
}

#[derive(Deserialize)]
struct XmlDatabase {
    #[serde(rename = "Interpreter", default)]
    interpreters: Vec<XmlInterpreter>,
}

#[derive(Deserialize)]
struct XmlInterpreter {
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@id_mask", default)]
    id_mask: Option<String>,
    #[serde(rename = "@id_compare", default)]
    id_compare: Option<String>,
    #[serde(rename = "@data_len", default)]
    data_len: Option<String>,
    #[serde(rename = "DataElem", default)]
    elements: Vec<XmlDataElem>,
}

#[derive(Deserialize)]
struct XmlDataElem {
    #[serde(rename = "@Name", default)]
    name: Option<String>,
    #[serde(rename = "@Source", default)]
    source: Option<String>,
    #[serde(rename = "@Mask", default)]
    mask: Option<String>,
    #[serde(rename = "@Downshift", default)]
    downshift: Option<String>,
    #[serde(rename = "@Scale", default)]
    scale: Option<String>,
    #[serde(rename = "@Offset", default)]
    offset: Option<String>,
}

impl XmlDatabase {
    fn into_table(self) -> std::result::Result<RuleTable, RuleTableError> {
        let messages = self
            .interpreters
            .into_iter()
            .enumerate()
            .map(|(index, interpreter)| interpreter.into_spec(index))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(RuleTable { messages })
    }
}

impl XmlInterpreter {
    fn into_spec(self, index: usize) -> std::result::Result<MessageRuleSpec, RuleTableError> {
        let name = self.name;
        let missing = |attribute: &str| RuleTableError {
            message_index: index,
            message_name: name.clone(),
            signal_index: None,
            signal_name: None,
            reason: format!("missing attribute '{}'", attribute),
        };

        let id_mask = self.id_mask.ok_or_else(|| missing("id_mask"))?;
        let id_compare = self.id_compare.ok_or_else(|| missing("id_compare"))?;
        let data_len = self.data_len.ok_or_else(|| missing("data_len"))?;

        let signals = self
            .elements
            .into_iter()
            .enumerate()
            .map(|(sig_index, element)| {
                let signal_name = element.name.clone();
                element.into_spec().map_err(|attribute| RuleTableError {
                    message_index: index,
                    message_name: name.clone(),
                    signal_index: Some(sig_index),
                    signal_name,
                    reason: format!("missing attribute '{}'", attribute),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(MessageRuleSpec {
            name,
            id_mask: RuleInt::Text(id_mask),
            id_compare: RuleInt::Text(id_compare),
            expected_data_length: RuleInt::Text(data_len),
            signals,
        })
    }
}

impl XmlDataElem {
    fn into_spec(self) -> std::result::Result<SignalRuleSpec, &'static str> {
        Ok(SignalRuleSpec {
            name: self.name.ok_or("Name")?,
            source: self.source.ok_or("Source")?,
            mask: RuleInt::Text(self.mask.ok_or("Mask")?),
            shift: RuleInt::Text(self.downshift.ok_or("Downshift")?),
            scale: RuleFloat::Text(self.scale.ok_or("Scale")?),
            offset: RuleFloat::Text(self.offset.ok_or("Offset")?),
        })
    }
}

fn compile_message(index: usize, spec: &MessageRuleSpec) -> std::result::Result<MessageRule, RuleTableError> {
    let fail = |reason: String| RuleTableError {
        message_index: index,
        message_name: spec.name.clone(),
        signal_index: None,
        signal_name: None,
        reason,
    };

    let name = match &spec.name {
        Some(name) if name.trim().is_empty() => return Err(fail("name is empty".to_string())),
        Some(name) => name.clone(),
        None => format!("Message_{}", index),
    };

    let id_mask = to_u32(&spec.id_mask).map_err(|e| fail(format!("id_mask: {}", e)))?;
    let id_compare = to_u32(&spec.id_compare).map_err(|e| fail(format!("id_compare: {}", e)))?;
    if id_compare & !id_mask != 0 {
        log::warn!(
            "Message rule '{}' (#{}): id_compare 0x{:08X} has bits outside id_mask 0x{:08X} and can never match",
            name,
            index,
            id_compare,
            id_mask
        );
    }

    let expected_data_length = spec
        .expected_data_length
        .value()
        .map_err(|e| fail(format!("expected_data_length: {}", e)))?;
    if expected_data_length > MAX_PAYLOAD_LEN as u64 {
        return Err(fail(format!(
            "expected_data_length {} exceeds {}",
            expected_data_length, MAX_PAYLOAD_LEN
        )));
    }

    let mut seen = HashSet::new();
    let mut signals = Vec::with_capacity(spec.signals.len());
    for (sig_index, sig_spec) in spec.signals.iter().enumerate() {
        let signal = compile_signal(sig_spec).map_err(|reason| RuleTableError {
            message_index: index,
            message_name: Some(name.clone()),
            signal_index: Some(sig_index),
            signal_name: Some(sig_spec.name.clone()),
            reason,
        })?;

        if !seen.insert(signal.name.clone()) {
            return Err(RuleTableError {
                message_index: index,
                message_name: Some(name.clone()),
                signal_index: Some(sig_index),
                signal_name: Some(signal.name),
                reason: "duplicate signal name".to_string(),
            });
        }
        signals.push(signal);
    }

    Ok(MessageRule {
        name,
        id_mask,
        id_compare,
        expected_data_length: expected_data_length as usize,
        signals,
    })
}

fn compile_signal(spec: &SignalRuleSpec) -> std::result::Result<SignalRule, String> {
    if spec.name.trim().is_empty() {
        return Err("name is empty".to_string());
    }

    let source = match spec.source.trim().to_ascii_lowercase().as_str() {
        "id" => SignalSource::Identifier,
        "data" => SignalSource::Payload,
        other => return Err(format!("source must be \"id\" or \"data\", got \"{}\"", other)),
    };

    let mask = spec.mask.value().map_err(|e| format!("mask: {}", e))?;
    let shift = spec.shift.value().map_err(|e| format!("shift: {}", e))?;
    if shift >= 64 {
        return Err(format!("shift {} must be below 64", shift));
    }
    let scale = spec.scale.value().map_err(|e| format!("scale: {}", e))?;
    let offset = spec.offset.value().map_err(|e| format!("offset: {}", e))?;

    Ok(SignalRule {
        name: spec.name.clone(),
        source,
        mask,
        shift: shift as u32,
        scale,
        offset,
    })
}

fn to_u32(value: &RuleInt) -> std::result::Result<u32, String> {
    let v = value.value()?;
    u32::try_from(v).map_err(|_| format!("0x{:X} does not fit in 32 bits", v))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_TOML: &str = r#"
        [[messages]]
        name = "MotorStatus"
        id_mask = "0xFFFFFF00"
        id_compare = "0x12345600"
        data_len = 8

        [[messages.signals]]
        name = "Addr"
        source = "id"
        mask = "0x000000FF"
        downshift = 0
        scale = 1
        offset = 0

        [[messages.signals]]
        name = "Speed"
        source = "data"
        mask = "0x00000000000AFF00"
        shift = 8
        scale = 0.125
        offset = 0

        [[messages]]
        id_mask = 0x7FF
        id_compare = 0x100
        expected_data_length = 2
    "#;

    #[test]
    fn test_parse_int_bases() {
        assert_eq!(parse_int("0xFF"), Ok(255));
        assert_eq!(parse_int("0XfF"), Ok(255));
        assert_eq!(parse_int("0o17"), Ok(15));
        assert_eq!(parse_int("0b1010"), Ok(10));
        assert_eq!(parse_int(" 42 "), Ok(42));
        assert_eq!(parse_int("0xFFFF_FF00"), Ok(0xFFFF_FF00));
        assert!(parse_int("0x").is_err());
        assert!(parse_int("").is_err());
        assert!(parse_int("12abc").is_err());
        assert!(parse_int("-1").is_err());
    }

    #[test]
    fn test_compile_toml_table() {
        let table = RuleTable::from_toml_str(EXAMPLE_TOML).unwrap();
        let rules = table.compile().unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "MotorStatus");
        assert_eq!(rules[0].id_mask, 0xFFFFFF00);
        assert_eq!(rules[0].id_compare, 0x12345600);
        assert_eq!(rules[0].expected_data_length, 8);
        assert_eq!(rules[0].signals[0].source, SignalSource::Identifier);
        assert_eq!(rules[0].signals[1].mask, 0xAFF00);
        assert_eq!(rules[0].signals[1].shift, 8);
        assert_eq!(rules[0].signals[1].scale, 0.125);

        assert_eq!(rules[1].name, "Message_1");
        assert!(rules[1].signals.is_empty());
    }

    #[test]
    fn test_compile_json_table() {
        let json = r#"{
            "messages": [{
                "name": "Battery",
                "id_mask": "0x1FFFFFFF",
                "id_compare": 419365632,
                "expected_data_length": "4",
                "signals": [
                    {"name": "Voltage", "source": "data", "mask": "0xFFFF0000",
                     "shift": 16, "scale": "0.01", "offset": "-5"}
                ]
            }]
        }"#;
        let rules = RuleTable::from_json_str(json).unwrap().compile().unwrap();
        assert_eq!(rules[0].id_compare, 419365632);
        assert_eq!(rules[0].expected_data_length, 4);
        assert_eq!(rules[0].signals[0].offset, -5.0);
    }

    fn single_signal_table(signal: &str) -> String {
        format!(
            r#"
            [[messages]]
            name = "M"
            id_mask = "0xFF"
            id_compare = "0x10"
            data_len = 8
            [[messages.signals]]
            {}
            "#,
            signal
        )
    }

    #[test]
    fn test_bad_source_names_offending_signal() {
        let toml = single_signal_table(
            r#"name = "S"
            source = "payload"
            mask = 1
            shift = 0
            scale = 1
            offset = 0"#,
        );
        let err = RuleTable::from_toml_str(&toml).unwrap().compile().unwrap_err();
        assert_eq!(err.message_index, 0);
        assert_eq!(err.signal_index, Some(0));
        assert_eq!(err.signal_name.as_deref(), Some("S"));
        assert!(err.reason.contains("source"));
    }

    #[test]
    fn test_shift_out_of_range() {
        let toml = single_signal_table(
            r#"name = "S"
            source = "data"
            mask = 1
            shift = 64
            scale = 1
            offset = 0"#,
        );
        let err = RuleTable::from_toml_str(&toml).unwrap().compile().unwrap_err();
        assert!(err.reason.contains("below 64"));
    }

    #[test]
    fn test_bad_mask_literal() {
        let toml = single_signal_table(
            r#"name = "S"
            source = "data"
            mask = "0xZZ"
            shift = 0
            scale = 1
            offset = 0"#,
        );
        let err = RuleTable::from_toml_str(&toml).unwrap().compile().unwrap_err();
        assert!(err.reason.starts_with("mask"));
    }

    #[test]
    fn test_compare_outside_mask_still_loads() {
        let toml = r#"
            [[messages]]
            id_mask = "0xFF00"
            id_compare = "0x1234"
            data_len = 2
        "#;
        let rules = RuleTable::from_toml_str(toml).unwrap().compile().unwrap();
        assert_eq!(rules[0].id_mask, 0xFF00);
        assert_eq!(rules[0].id_compare, 0x1234);
    }

    #[test]
    fn test_data_length_over_eight_rejected() {
        let toml = r#"
            [[messages]]
            id_mask = 0
            id_compare = 0
            data_len = 9
        "#;
        let err = RuleTable::from_toml_str(toml).unwrap().compile().unwrap_err();
        assert!(err.reason.contains("exceeds 8"));
    }

    #[test]
    fn test_id_mask_wider_than_32_bits_rejected() {
        let toml = r#"
            [[messages]]
            id_mask = "0x1_0000_0000"
            id_compare = 0
            data_len = 0
        "#;
        let err = RuleTable::from_toml_str(toml).unwrap().compile().unwrap_err();
        assert!(err.reason.starts_with("id_mask"));
    }

    #[test]
    fn test_duplicate_signal_rejected() {
        let toml = r#"
            [[messages]]
            id_mask = 0
            id_compare = 0
            data_len = 1
            [[messages.signals]]
            name = "A"
            source = "data"
            mask = 1
            shift = 0
            scale = 1
            offset = 0
            [[messages.signals]]
            name = "A"
            source = "id"
            mask = 1
            shift = 0
            scale = 1
            offset = 0
        "#;
        let err = RuleTable::from_toml_str(toml).unwrap().compile().unwrap_err();
        assert_eq!(err.signal_index, Some(1));
        assert_eq!(err.reason, "duplicate signal name");
    }

    #[test]
    fn test_unknown_field_names_offending_message() {
        let toml = r#"
            [[messages]]
            id_mask = 0
            id_compare = 0
            data_len = 1

            [[messages]]
            name = "Painted"
            id_mask = 0
            id_compare = 0
            data_len = 1
            colour = "red"
        "#;
        match RuleTable::from_toml_str(toml) {
            Err(DecoderError::RuleTable(err)) => {
                assert_eq!(err.message_index, 1);
                assert_eq!(err.message_name.as_deref(), Some("Painted"));
                assert_eq!(err.signal_index, None);
                assert!(err.reason.contains("colour"));
            }
            other => panic!("expected rule table error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_names_offending_message() {
        let toml = r#"
            [[messages]]
            id_mask = 0
            data_len = 1
        "#;
        match RuleTable::from_toml_str(toml) {
            Err(DecoderError::RuleTable(err)) => {
                assert_eq!(err.message_index, 0);
                assert_eq!(err.message_name, None);
                assert!(err.reason.contains("id_compare"));
            }
            other => panic!("expected rule table error, got {:?}", other),
        }
    }

    #[test]
    fn test_fractional_shift_names_offending_signal() {
        let toml = r#"
            [[messages]]
            name = "First"
            id_mask = 0
            id_compare = 0
            data_len = 0

            [[messages]]
            name = "Second"
            id_mask = "0xFF"
            id_compare = "0x10"
            data_len = 8

            [[messages.signals]]
            name = "Good"
            source = "data"
            mask = 1
            shift = 0
            scale = 1
            offset = 0

            [[messages.signals]]
            name = "Half"
            source = "data"
            mask = "0xFF"
            shift = 2.5
            scale = 1
            offset = 0
        "#;
        match RuleTable::from_toml_str(toml) {
            Err(DecoderError::RuleTable(err)) => {
                assert_eq!(err.message_index, 1);
                assert_eq!(err.message_name.as_deref(), Some("Second"));
                assert_eq!(err.signal_index, Some(1));
                assert_eq!(err.signal_name.as_deref(), Some("Half"));
                assert!(err.reason.contains("2.5"));
            }
            other => panic!("expected rule table error, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_type_in_json_names_offending_message() {
        let json = r#"{"messages": [{"name": "Listy", "id_mask": [1], "id_compare": 0, "data_len": 0}]}"#;
        match RuleTable::from_json_str(json) {
            Err(DecoderError::RuleTable(err)) => {
                assert_eq!(err.message_index, 0);
                assert_eq!(err.message_name.as_deref(), Some("Listy"));
            }
            other => panic!("expected rule table error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        assert!(matches!(
            RuleTable::from_toml_str("[[messages]\nid_mask = "),
            Err(DecoderError::RuleTableParse(_))
        ));
        assert!(matches!(
            RuleTable::from_toml_str("[settings]\nverbose = true"),
            Err(DecoderError::RuleTableParse(_))
        ));
    }

    const EXAMPLE_XML: &str = r#"
        <CanDatabase>
          <Interpreter id_mask="0xFFFFFF00" id_compare="0x12345600" data_len="8">
            <DataElem Name="Addr" Source="id" Mask="0x000000FF" Downshift="0" Scale="1" Offset="0"/>
            <DataElem Name="Speed" Source="data" Mask="0x00000000000AFF00" Downshift="8" Scale="0.125" Offset="0"/>
          </Interpreter>
          <Interpreter id_mask="0x7FF" id_compare="0x100" data_len="2">
          </Interpreter>
        </CanDatabase>
    "#;

    #[test]
    fn test_compile_xml_database() {
        let rules = RuleTable::from_xml_str(EXAMPLE_XML).unwrap().compile().unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "Message_0");
        assert_eq!(rules[0].id_mask, 0xFFFFFF00);
        assert_eq!(rules[0].id_compare, 0x12345600);
        assert_eq!(rules[0].expected_data_length, 8);
        assert_eq!(rules[0].signals.len(), 2);
        assert_eq!(rules[0].signals[0].name, "Addr");
        assert_eq!(rules[0].signals[0].source, SignalSource::Identifier);
        assert_eq!(rules[0].signals[1].mask, 0xAFF00);
        assert_eq!(rules[0].signals[1].shift, 8);
        assert_eq!(rules[0].signals[1].scale, 0.125);
        assert_eq!(rules[1].id_mask, 0x7FF);
        assert!(rules[1].signals.is_empty());
    }

    #[test]
    fn test_xml_missing_attribute_names_offending_signal() {
        let xml = r#"
            <CanDatabase>
              <Interpreter id_mask="0xFF" id_compare="0x10" data_len="1">
                <DataElem Name="NoScale" Source="data" Mask="0xFF" Downshift="0" Offset="0"/>
              </Interpreter>
            </CanDatabase>
        "#;
        match RuleTable::from_xml_str(xml) {
            Err(DecoderError::RuleTable(err)) => {
                assert_eq!(err.message_index, 0);
                assert_eq!(err.signal_index, Some(0));
                assert_eq!(err.signal_name.as_deref(), Some("NoScale"));
                assert!(err.reason.contains("Scale"));
            }
            other => panic!("expected rule table error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_path_picks_format_by_extension() {
        use std::io::Write;

        let mut toml_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        toml_file.write_all(EXAMPLE_TOML.as_bytes()).unwrap();
        let from_toml = RuleTable::from_path(toml_file.path()).unwrap();
        assert_eq!(from_toml.messages.len(), 2);

        let mut json_file = tempfile::Builder::new().suffix(".JSON").tempfile().unwrap();
        json_file
            .write_all(br#"{"messages": [{"id_mask": 255, "id_compare": "0x10", "data_len": 0}]}"#)
            .unwrap();
        let from_json = RuleTable::from_path(json_file.path()).unwrap();
        let rules = from_json.compile().unwrap();
        assert_eq!(rules[0].name, "Message_0");
        assert_eq!(rules[0].id_compare, 0x10);

        let mut xml_file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        xml_file.write_all(EXAMPLE_XML.as_bytes()).unwrap();
        let from_xml = RuleTable::from_path(xml_file.path()).unwrap();
        assert_eq!(from_xml.messages.len(), 2);
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            RuleTable::from_path(&missing),
            Err(DecoderError::RuleTableParse(_))
        ));
    }
}
