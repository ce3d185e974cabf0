//! Outbox intents.

use crate::document::LocalKey;
use crate::fields::{natural_key, FieldMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// The kind of mutation an intent carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentAction {
    /// Create-or-update a document.
    Write,
    /// Delete a document.
    Delete,
    /// Clear an entire collection.
    Clear,
}

impl fmt::Display for IntentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentAction::Write => write!(f, "write"),
            IntentAction::Delete => write!(f, "delete"),
            IntentAction::Clear => write!(f, "clear"),
        }
    }
}

/// A pending mutation awaiting remote delivery.
///
/// The payload is a deep, by-value snapshot of the record's fields taken
/// at enqueue time; later mutation of the originating data never alters
/// an already-enqueued payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxIntent {
    /// Strictly increasing sequence, assigned at enqueue time; defines
    /// processing order.
    pub sequence: u64,
    /// The mutation kind.
    pub action: IntentAction,
    /// Target collection name.
    pub collection: String,
    /// Server id of the targeted document, when it has one. Absent for
    /// creates and for `Clear`.
    pub server_id: Option<String>,
    /// Local key of the originating record, for pending creates.
    pub local_key: Option<LocalKey>,
    /// Snapshot of the record's fields at enqueue time.
    pub payload: FieldMap,
    /// Enqueue time, milliseconds since the Unix epoch.
    pub enqueued_at_ms: u64,
}

impl OutboxIntent {
    /// Returns true if this intent would create a new remote document.
    pub fn is_create(&self) -> bool {
        self.action == IntentAction::Write && self.server_id.is_none()
    }

    /// Returns the payload's natural key under the given key field.
    pub fn natural_key(&self, key_field: &str) -> Option<String> {
        natural_key(&self.payload, key_field)
    }

    /// Returns the intent's age relative to `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.enqueued_at_ms)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;

    fn intent(action: IntentAction, server_id: Option<&str>) -> OutboxIntent {
        let mut payload = FieldMap::new();
        payload.insert("name".into(), FieldValue::from(" Eggs "));
        OutboxIntent {
            sequence: 1,
            action,
            collection: "groceries".into(),
            server_id: server_id.map(String::from),
            local_key: None,
            payload,
            enqueued_at_ms: 1_000,
        }
    }

    #[test]
    fn create_detection() {
        assert!(intent(IntentAction::Write, None).is_create());
        assert!(!intent(IntentAction::Write, Some("abc")).is_create());
        assert!(!intent(IntentAction::Delete, None).is_create());
    }

    #[test]
    fn natural_key_is_trimmed() {
        let i = intent(IntentAction::Write, None);
        assert_eq!(i.natural_key("name"), Some("Eggs".into()));
        assert_eq!(i.natural_key("missing"), None);
    }

    #[test]
    fn age() {
        let i = intent(IntentAction::Write, None);
        assert_eq!(i.age_ms(1_500), 500);
        // Clock going backwards saturates to zero.
        assert_eq!(i.age_ms(500), 0);
    }

    #[test]
    fn action_display() {
        assert_eq!(IntentAction::Write.to_string(), "write");
        assert_eq!(IntentAction::Delete.to_string(), "delete");
        assert_eq!(IntentAction::Clear.to_string(), "clear");
    }
}
