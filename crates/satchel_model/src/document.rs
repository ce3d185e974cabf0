//! Document records and identity.

use crate::fields::{natural_key, FieldMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A locally-assigned record identity.
///
/// Local keys are monotonically increasing per store, never transmitted,
/// and stable for the life of the local record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LocalKey(u64);

impl LocalKey {
    /// Creates a local key from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw key value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The deduplication identity of a record.
///
/// Server identity wins once it exists; until then the record is known
/// only by its local key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentIdentity {
    /// Server-assigned identifier.
    Server(String),
    /// Local fallback identity for pending-create records.
    Local(LocalKey),
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentIdentity::Server(id) => write!(f, "{id}"),
            DocumentIdentity::Local(key) => write!(f, "local:{key}"),
        }
    }
}

/// A document record held in the local store.
///
/// A record belongs to exactly one collection for its lifetime. It is
/// *pending-create* until a server id is attached by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Locally-assigned key; never transmitted.
    pub local_key: LocalKey,
    /// Server-assigned identifier, once the remote store accepted the
    /// record.
    pub server_id: Option<String>,
    /// The collection this record belongs to.
    pub collection: String,
    /// The domain payload.
    pub fields: FieldMap,
}

impl DocumentRecord {
    /// Returns the deduplication identity of this record.
    pub fn identity(&self) -> DocumentIdentity {
        match &self.server_id {
            Some(id) => DocumentIdentity::Server(id.clone()),
            None => DocumentIdentity::Local(self.local_key),
        }
    }

    /// Returns true if the record has not yet been accepted remotely.
    pub fn is_pending_create(&self) -> bool {
        self.server_id.is_none()
    }

    /// Returns the record's natural key under the given key field.
    pub fn natural_key(&self, key_field: &str) -> Option<String> {
        natural_key(&self.fields, key_field)
    }
}

/// Caller-facing input to a save.
///
/// A draft without identity creates a new pending record. A draft built
/// from an existing record carries that record's identity, so saving it
/// updates the same record rather than duplicating it.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDraft {
    identity: Option<DocumentIdentity>,
    fields: FieldMap,
}

impl DocumentDraft {
    /// Creates a draft for a brand new document.
    pub fn new(fields: FieldMap) -> Self {
        Self {
            identity: None,
            fields,
        }
    }

    /// Sets the identity this draft addresses.
    pub fn with_identity(mut self, identity: DocumentIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns the identity this draft addresses, if any.
    pub fn identity(&self) -> Option<&DocumentIdentity> {
        self.identity.as_ref()
    }

    /// Returns the draft's fields.
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Returns a mutable view of the draft's fields.
    pub fn fields_mut(&mut self) -> &mut FieldMap {
        &mut self.fields
    }

    /// Consumes the draft, returning identity and fields.
    pub fn into_parts(self) -> (Option<DocumentIdentity>, FieldMap) {
        (self.identity, self.fields)
    }
}

impl From<&DocumentRecord> for DocumentDraft {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            identity: Some(record.identity()),
            fields: record.fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;

    fn record(server_id: Option<&str>) -> DocumentRecord {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), FieldValue::from("Milk"));
        DocumentRecord {
            local_key: LocalKey::new(3),
            server_id: server_id.map(String::from),
            collection: "groceries".into(),
            fields,
        }
    }

    #[test]
    fn identity_prefers_server_id() {
        assert_eq!(
            record(Some("abc123")).identity(),
            DocumentIdentity::Server("abc123".into())
        );
        assert_eq!(
            record(None).identity(),
            DocumentIdentity::Local(LocalKey::new(3))
        );
    }

    #[test]
    fn identity_display() {
        assert_eq!(record(Some("abc123")).identity().to_string(), "abc123");
        assert_eq!(record(None).identity().to_string(), "local:3");
    }

    #[test]
    fn pending_create() {
        assert!(record(None).is_pending_create());
        assert!(!record(Some("abc123")).is_pending_create());
    }

    #[test]
    fn draft_from_record_keeps_identity() {
        let rec = record(Some("abc123"));
        let draft = DocumentDraft::from(&rec);
        assert_eq!(
            draft.identity(),
            Some(&DocumentIdentity::Server("abc123".into()))
        );
        assert_eq!(draft.fields(), &rec.fields);
    }

    #[test]
    fn draft_for_new_document_has_no_identity() {
        let draft = DocumentDraft::new(FieldMap::new());
        assert_eq!(draft.identity(), None);
    }
}
