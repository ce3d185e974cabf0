//! Document payload fields.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single payload field value.
///
/// Payloads are a tagged union of scalars and binary attachments. Binary
/// attachments stay in native form inside the local store; they are only
/// rendered transport-safe at the gateway boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Absent/null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Binary attachment.
    Binary(Bytes),
}

impl FieldValue {
    /// Returns the boolean value, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an `Integer`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float value, if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the text value, if this is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the binary value, if this is a `Binary`.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns true if this is a binary attachment.
    pub fn is_binary(&self) -> bool {
        matches!(self, FieldValue::Binary(_))
    }

    /// Returns true if this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Binary(Bytes::from(value))
    }
}

impl From<Bytes> for FieldValue {
    fn from(value: Bytes) -> Self {
        FieldValue::Binary(value)
    }
}

/// A document payload: field name to value.
///
/// `BTreeMap` keeps iteration order stable, which keeps persisted
/// snapshots and wire bodies deterministic.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Extracts a payload's natural key.
///
/// The natural key is the text value of the configured key field with
/// surrounding whitespace trimmed. Non-text values and empty strings
/// yield no key.
pub fn natural_key(fields: &FieldMap, key_field: &str) -> Option<String> {
    fields.get(key_field).and_then(|v| v.as_text()).and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        assert_eq!(FieldValue::Bool(true).as_bool(), Some(true));
        assert_eq!(FieldValue::Integer(7).as_integer(), Some(7));
        assert_eq!(FieldValue::Text("hi".into()).as_text(), Some("hi"));
        assert_eq!(
            FieldValue::Binary(Bytes::from_static(b"abc")).as_binary(),
            Some(&b"abc"[..])
        );
        assert!(FieldValue::Null.is_null());
        assert!(!FieldValue::Null.is_binary());
        assert_eq!(FieldValue::Text("hi".into()).as_integer(), None);
    }

    #[test]
    fn from_conversions() {
        assert_eq!(FieldValue::from("milk"), FieldValue::Text("milk".into()));
        assert_eq!(FieldValue::from(3i64), FieldValue::Integer(3));
        assert_eq!(
            FieldValue::from(vec![1u8, 2]),
            FieldValue::Binary(Bytes::from_static(&[1, 2]))
        );
    }

    #[test]
    fn natural_key_trims_whitespace() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::from("  Milk \n"));

        assert_eq!(natural_key(&fields, "name"), Some("Milk".into()));
    }

    #[test]
    fn natural_key_missing_or_non_text() {
        let mut fields = FieldMap::new();
        fields.insert("count".into(), FieldValue::Integer(2));
        fields.insert("blank".into(), FieldValue::Text("   ".into()));

        assert_eq!(natural_key(&fields, "name"), None);
        assert_eq!(natural_key(&fields, "count"), None);
        assert_eq!(natural_key(&fields, "blank"), None);
    }
}
