//! Identity reconciliation.
//!
//! The remote store assigns identity only on successful creation, so a
//! locally created record and its eventual server document are the same
//! logical entity connected only by matching content at reconciliation
//! time. This module attaches the returned server id to the local
//! record that still lacks one.

use satchel_model::{natural_key, FieldMap, LocalKey};
use satchel_store::DocumentStore;

/// What reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The server id was attached to the record with this key.
    Attached(LocalKey),
    /// No matching pending record was found. Non-fatal: the local
    /// record (if any) stays pending and is protected from refresh
    /// eviction.
    Miss,
}

/// Attaches a server-assigned id to the pending record matching the
/// enqueued payload.
///
/// Matching uses the payload's natural key against pending-create
/// records of the same collection, both sides trimmed. All fields other
/// than the server id are left untouched.
pub fn attach_identity(
    store: &DocumentStore,
    collection: &str,
    key_field: &str,
    payload: &FieldMap,
    server_id: &str,
) -> ReconcileOutcome {
    let Some(key) = natural_key(payload, key_field) else {
        return ReconcileOutcome::Miss;
    };
    let Some(record) = store.find_pending_by_natural_key(collection, key_field, &key) else {
        return ReconcileOutcome::Miss;
    };
    if store.attach_server_id(record.local_key, server_id) {
        ReconcileOutcome::Attached(record.local_key)
    } else {
        ReconcileOutcome::Miss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_model::{DocumentIdentity, FieldValue};

    fn fields(name: &str) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("name".into(), FieldValue::from(name));
        map
    }

    #[test]
    fn attaches_to_matching_pending_record() {
        let store = DocumentStore::new();
        let rec = store.upsert("groceries", None, fields("Eggs"));

        let outcome = attach_identity(&store, "groceries", "name", &fields("Eggs"), "abc123");

        assert_eq!(outcome, ReconcileOutcome::Attached(rec.local_key));
        let got = store.get_by_local_key(rec.local_key).unwrap();
        assert_eq!(got.server_id.as_deref(), Some("abc123"));
        assert_eq!(got.fields, fields("Eggs"));
    }

    #[test]
    fn matching_trims_whitespace_on_both_sides() {
        let store = DocumentStore::new();
        let rec = store.upsert("groceries", None, fields("  Eggs"));

        let outcome = attach_identity(&store, "groceries", "name", &fields("Eggs \n"), "abc123");

        assert_eq!(outcome, ReconcileOutcome::Attached(rec.local_key));
    }

    #[test]
    fn miss_when_no_pending_record_matches() {
        let store = DocumentStore::new();
        store.upsert("groceries", None, fields("Milk"));

        let outcome = attach_identity(&store, "groceries", "name", &fields("Eggs"), "abc123");
        assert_eq!(outcome, ReconcileOutcome::Miss);

        // The unrelated pending record is untouched.
        let records = store.query("groceries");
        assert!(records[0].is_pending_create());
    }

    #[test]
    fn miss_when_payload_has_no_natural_key() {
        let store = DocumentStore::new();
        store.upsert("groceries", None, FieldMap::new());

        let outcome = attach_identity(&store, "groceries", "name", &FieldMap::new(), "abc123");
        assert_eq!(outcome, ReconcileOutcome::Miss);
    }

    #[test]
    fn already_synced_records_are_not_rematched() {
        let store = DocumentStore::new();
        store.upsert("groceries", Some("srv-1"), fields("Eggs"));

        let outcome = attach_identity(&store, "groceries", "name", &fields("Eggs"), "abc123");
        assert_eq!(outcome, ReconcileOutcome::Miss);

        // Identity is stable: the record keeps its original id.
        assert!(store
            .get("groceries", &DocumentIdentity::Server("srv-1".into()))
            .is_some());
    }
}
