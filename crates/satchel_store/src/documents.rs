//! The local document table.

use parking_lot::RwLock;
use satchel_model::{DocumentIdentity, DocumentRecord, FieldMap, LocalKey, OutboxIntent};
use std::collections::{BTreeMap, HashSet};

/// The client's working copy of every collection's documents.
///
/// Records are keyed by [`LocalKey`], independent of server identity.
/// The store performs no network access; it is a pure keyed container.
/// All mutations take the single write lock, which serializes them with
/// respect to the refresh merge.
pub struct DocumentStore {
    inner: RwLock<StoreInner>,
}

struct StoreInner {
    records: BTreeMap<u64, DocumentRecord>,
    next_key: u64,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                records: BTreeMap::new(),
                next_key: 1,
            }),
        }
    }

    /// Restores a store from persisted state.
    ///
    /// The key counter is advanced past every restored record so fresh
    /// keys stay monotonic.
    pub fn from_snapshot(records: Vec<DocumentRecord>, next_key: u64) -> Self {
        let max_key = records
            .iter()
            .map(|r| r.local_key.get())
            .max()
            .unwrap_or(0);
        Self {
            inner: RwLock::new(StoreInner {
                records: records
                    .into_iter()
                    .map(|r| (r.local_key.get(), r))
                    .collect(),
                next_key: next_key.max(max_key + 1),
            }),
        }
    }

    /// Returns all records plus the key counter, for persistence.
    pub fn snapshot(&self) -> (Vec<DocumentRecord>, u64) {
        let inner = self.inner.read();
        (inner.records.values().cloned().collect(), inner.next_key)
    }

    /// Creates or updates a record.
    ///
    /// When a record with the same `(collection, server_id)` exists it is
    /// updated in place; otherwise a new record is inserted with a fresh
    /// local key. Without a server id the insert is a pending create.
    pub fn upsert(
        &self,
        collection: &str,
        server_id: Option<&str>,
        fields: FieldMap,
    ) -> DocumentRecord {
        let mut inner = self.inner.write();

        if let Some(id) = server_id {
            if let Some(existing) = inner
                .records
                .values_mut()
                .find(|r| r.collection == collection && r.server_id.as_deref() == Some(id))
            {
                existing.fields = fields;
                return existing.clone();
            }
        }

        let key = inner.fresh_key();
        let record = DocumentRecord {
            local_key: key,
            server_id: server_id.map(String::from),
            collection: collection.to_string(),
            fields,
        };
        inner.records.insert(key.get(), record.clone());
        record
    }

    /// Replaces the fields of the record with the given local key.
    ///
    /// Returns the updated record, or `None` if the record is gone.
    pub fn update_fields(&self, local_key: LocalKey, fields: FieldMap) -> Option<DocumentRecord> {
        let mut inner = self.inner.write();
        let record = inner.records.get_mut(&local_key.get())?;
        record.fields = fields;
        Some(record.clone())
    }

    /// Attaches a server id to a still-pending record.
    ///
    /// This is the only mutation the sync path makes to a record; all
    /// other fields are left untouched. Returns false if the record is
    /// gone or already has a server id.
    pub fn attach_server_id(&self, local_key: LocalKey, server_id: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.records.get_mut(&local_key.get()) {
            Some(record) if record.server_id.is_none() => {
                record.server_id = Some(server_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Returns all records tagged with the collection. Order is not
    /// guaranteed; callers deduplicate by [`DocumentIdentity`].
    pub fn query(&self, collection: &str) -> Vec<DocumentRecord> {
        self.inner
            .read()
            .records
            .values()
            .filter(|r| r.collection == collection)
            .cloned()
            .collect()
    }

    /// Returns the record with the given identity in the collection.
    pub fn get(&self, collection: &str, identity: &DocumentIdentity) -> Option<DocumentRecord> {
        let inner = self.inner.read();
        match identity {
            DocumentIdentity::Local(key) => inner
                .records
                .get(&key.get())
                .filter(|r| r.collection == collection)
                .cloned(),
            DocumentIdentity::Server(id) => inner
                .records
                .values()
                .find(|r| r.collection == collection && r.server_id.as_deref() == Some(id.as_str()))
                .cloned(),
        }
    }

    /// Returns the record with the given local key.
    pub fn get_by_local_key(&self, local_key: LocalKey) -> Option<DocumentRecord> {
        self.inner.read().records.get(&local_key.get()).cloned()
    }

    /// Finds the first pending-create record in the collection whose
    /// natural key matches.
    pub fn find_pending_by_natural_key(
        &self,
        collection: &str,
        key_field: &str,
        key: &str,
    ) -> Option<DocumentRecord> {
        self.inner
            .read()
            .records
            .values()
            .find(|r| {
                r.collection == collection
                    && r.is_pending_create()
                    && r.natural_key(key_field).as_deref() == Some(key)
            })
            .cloned()
    }

    /// Removes the record with the given identity. Returns it if found.
    pub fn remove(&self, collection: &str, identity: &DocumentIdentity) -> Option<DocumentRecord> {
        let mut inner = self.inner.write();
        let key = match identity {
            DocumentIdentity::Local(key) => inner
                .records
                .get(&key.get())
                .filter(|r| r.collection == collection)
                .map(|r| r.local_key.get()),
            DocumentIdentity::Server(id) => inner
                .records
                .values()
                .find(|r| r.collection == collection && r.server_id.as_deref() == Some(id.as_str()))
                .map(|r| r.local_key.get()),
        }?;
        inner.records.remove(&key)
    }

    /// Removes every record in the collection. Returns how many.
    pub fn clear_collection(&self, collection: &str) -> usize {
        let mut inner = self.inner.write();
        let before = inner.records.len();
        inner.records.retain(|_, r| r.collection != collection);
        before - inner.records.len()
    }

    /// Returns the distinct collection names present in the store.
    pub fn collections(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner
            .records
            .values()
            .map(|r| r.collection.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        names
    }

    /// Returns the number of records in the collection.
    pub fn count(&self, collection: &str) -> usize {
        self.inner
            .read()
            .records
            .values()
            .filter(|r| r.collection == collection)
            .count()
    }

    /// Returns the total number of records.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Merges an authoritative collection snapshot into the store.
    ///
    /// Executed atomically under the write lock, in protect-then-replace
    /// order:
    /// 1. every record of the collection is evicted except those the
    ///    protection set marks as carrying unsent local intent;
    /// 2. the fetched snapshot is inserted/overwritten, skipping ids
    ///    that are protected (a stale server copy must not clobber an
    ///    optimistic local update) or pending deletion locally.
    pub fn apply_refresh(
        &self,
        collection: &str,
        fetched: Vec<(String, FieldMap)>,
        protection: &RefreshProtection,
    ) -> RefreshMerge {
        let mut inner = self.inner.write();
        let mut merge = RefreshMerge::default();

        let before = inner.records.len();
        inner.records.retain(|_, r| {
            if r.collection != collection {
                return true;
            }
            let keep = match &r.server_id {
                Some(id) => protection.keep_server_ids.contains(id),
                None => r
                    .natural_key(&protection.key_field)
                    .is_some_and(|k| protection.pending_create_keys.contains(&k)),
            };
            if keep {
                merge.kept += 1;
            }
            keep
        });
        merge.evicted = before - inner.records.len();

        for (id, fields) in fetched {
            if protection.deleted_server_ids.contains(&id)
                || protection.keep_server_ids.contains(&id)
            {
                merge.skipped += 1;
                continue;
            }
            let existing = inner
                .records
                .values()
                .find(|r| r.collection == collection && r.server_id.as_deref() == Some(id.as_str()))
                .map(|r| r.local_key.get());
            match existing {
                Some(key) => {
                    if let Some(record) = inner.records.get_mut(&key) {
                        record.fields = fields;
                    }
                    merge.updated += 1;
                }
                None => {
                    let key = inner.fresh_key();
                    inner.records.insert(
                        key.get(),
                        DocumentRecord {
                            local_key: key,
                            server_id: Some(id),
                            collection: collection.to_string(),
                            fields,
                        },
                    );
                    merge.inserted += 1;
                }
            }
        }

        merge
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl StoreInner {
    fn fresh_key(&mut self) -> LocalKey {
        let key = LocalKey::new(self.next_key);
        self.next_key += 1;
        key
    }
}

/// Records and ids a refresh must leave alone because they still carry
/// unsent local intent.
#[derive(Debug, Clone, Default)]
pub struct RefreshProtection {
    /// Server ids referenced by pending writes; their local records are
    /// kept and not overwritten by the fetched snapshot.
    pub keep_server_ids: HashSet<String>,
    /// Natural keys of pending creates; their pending-create records are
    /// kept.
    pub pending_create_keys: HashSet<String>,
    /// Server ids with pending deletes; the fetched snapshot must not
    /// resurrect them.
    pub deleted_server_ids: HashSet<String>,
    /// The natural-key field used to match pending creates.
    pub key_field: String,
}

impl RefreshProtection {
    /// Builds the protection set from a collection's outstanding intents.
    pub fn from_intents<'a>(
        intents: impl IntoIterator<Item = &'a OutboxIntent>,
        key_field: &str,
    ) -> Self {
        let mut protection = Self {
            key_field: key_field.to_string(),
            ..Self::default()
        };
        for intent in intents {
            match (intent.action, &intent.server_id) {
                (satchel_model::IntentAction::Write, Some(id)) => {
                    protection.keep_server_ids.insert(id.clone());
                }
                (satchel_model::IntentAction::Write, None) => {
                    if let Some(key) = intent.natural_key(key_field) {
                        protection.pending_create_keys.insert(key);
                    }
                }
                (satchel_model::IntentAction::Delete, Some(id)) => {
                    protection.deleted_server_ids.insert(id.clone());
                }
                _ => {}
            }
        }
        protection
    }
}

/// Counters describing what a refresh merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshMerge {
    /// Local records evicted.
    pub evicted: usize,
    /// Local records kept under protection.
    pub kept: usize,
    /// Fetched documents that updated an existing record.
    pub updated: usize,
    /// Fetched documents inserted as new records.
    pub inserted: usize,
    /// Fetched documents skipped (protected or pending deletion).
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_model::{FieldValue, IntentAction};

    fn fields(name: &str) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("name".into(), FieldValue::from(name));
        map
    }

    #[test]
    fn upsert_without_id_inserts_pending() {
        let store = DocumentStore::new();

        let a = store.upsert("groceries", None, fields("Milk"));
        let b = store.upsert("groceries", None, fields("Milk"));

        // Two upserts without a server id are two distinct records.
        assert_ne!(a.local_key, b.local_key);
        assert!(a.is_pending_create());
        assert_eq!(store.count("groceries"), 2);
    }

    #[test]
    fn upsert_with_id_updates_in_place() {
        let store = DocumentStore::new();

        let a = store.upsert("groceries", Some("srv-1"), fields("Milk"));
        let b = store.upsert("groceries", Some("srv-1"), fields("Oat milk"));

        assert_eq!(a.local_key, b.local_key);
        assert_eq!(store.count("groceries"), 1);
        assert_eq!(
            store
                .get(
                    "groceries",
                    &DocumentIdentity::Server("srv-1".into())
                )
                .unwrap()
                .fields,
            fields("Oat milk")
        );
    }

    #[test]
    fn same_id_different_collection_is_distinct() {
        let store = DocumentStore::new();

        store.upsert("groceries", Some("srv-1"), fields("Milk"));
        store.upsert("chores", Some("srv-1"), fields("Dishes"));

        assert_eq!(store.count("groceries"), 1);
        assert_eq!(store.count("chores"), 1);
    }

    #[test]
    fn attach_server_id_only_when_pending() {
        let store = DocumentStore::new();
        let rec = store.upsert("groceries", None, fields("Eggs"));

        assert!(store.attach_server_id(rec.local_key, "abc123"));
        // Second attach is refused; identity is stable once assigned.
        assert!(!store.attach_server_id(rec.local_key, "other"));

        let got = store.get_by_local_key(rec.local_key).unwrap();
        assert_eq!(got.server_id.as_deref(), Some("abc123"));
        assert_eq!(got.fields, fields("Eggs"));
    }

    #[test]
    fn find_pending_by_natural_key_ignores_synced() {
        let store = DocumentStore::new();
        store.upsert("groceries", Some("srv-1"), fields("Eggs"));
        let pending = store.upsert("groceries", None, fields("Eggs"));

        let found = store
            .find_pending_by_natural_key("groceries", "name", "Eggs")
            .unwrap();
        assert_eq!(found.local_key, pending.local_key);
    }

    #[test]
    fn remove_by_identity() {
        let store = DocumentStore::new();
        let pending = store.upsert("groceries", None, fields("Milk"));
        store.upsert("groceries", Some("srv-1"), fields("Eggs"));

        assert!(store
            .remove("groceries", &DocumentIdentity::Local(pending.local_key))
            .is_some());
        assert!(store
            .remove("groceries", &DocumentIdentity::Server("srv-1".into()))
            .is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_collection_leaves_others() {
        let store = DocumentStore::new();
        store.upsert("groceries", None, fields("Milk"));
        store.upsert("chores", None, fields("Dishes"));

        assert_eq!(store.clear_collection("groceries"), 1);
        assert_eq!(store.count("groceries"), 0);
        assert_eq!(store.count("chores"), 1);
    }

    #[test]
    fn refresh_replaces_unprotected_records() {
        let store = DocumentStore::new();
        store.upsert("groceries", Some("srv-1"), fields("Milk"));
        store.upsert("groceries", Some("srv-2"), fields("Eggs"));

        let protection = RefreshProtection::from_intents([], "name");
        let merge = store.apply_refresh(
            "groceries",
            vec![
                ("srv-1".into(), fields("Whole milk")),
                ("srv-3".into(), fields("Butter")),
            ],
            &protection,
        );

        // srv-2 vanished from the snapshot and had no pending intent.
        assert_eq!(merge.evicted, 2);
        assert_eq!(merge.inserted, 2);
        assert_eq!(store.count("groceries"), 2);
        assert!(store
            .get("groceries", &DocumentIdentity::Server("srv-2".into()))
            .is_none());
        assert_eq!(
            store
                .get("groceries", &DocumentIdentity::Server("srv-1".into()))
                .unwrap()
                .fields,
            fields("Whole milk")
        );
    }

    #[test]
    fn refresh_keeps_pending_create() {
        let store = DocumentStore::new();
        let pending = store.upsert("groceries", None, fields("Milk"));

        let intent = OutboxIntent {
            sequence: 1,
            action: IntentAction::Write,
            collection: "groceries".into(),
            server_id: None,
            local_key: Some(pending.local_key),
            payload: fields("Milk"),
            enqueued_at_ms: 0,
        };
        let protection = RefreshProtection::from_intents([&intent], "name");

        let merge = store.apply_refresh("groceries", vec![], &protection);

        assert_eq!(merge.kept, 1);
        assert_eq!(merge.evicted, 0);
        assert!(store.get_by_local_key(pending.local_key).is_some());
    }

    #[test]
    fn refresh_does_not_overwrite_pending_update() {
        let store = DocumentStore::new();
        store.upsert("groceries", Some("srv-1"), fields("Oat milk"));

        let intent = OutboxIntent {
            sequence: 1,
            action: IntentAction::Write,
            collection: "groceries".into(),
            server_id: Some("srv-1".into()),
            local_key: None,
            payload: fields("Oat milk"),
            enqueued_at_ms: 0,
        };
        let protection = RefreshProtection::from_intents([&intent], "name");

        store.apply_refresh(
            "groceries",
            vec![("srv-1".into(), fields("Milk"))],
            &protection,
        );

        // The stale server copy must not clobber the optimistic update.
        assert_eq!(
            store
                .get("groceries", &DocumentIdentity::Server("srv-1".into()))
                .unwrap()
                .fields,
            fields("Oat milk")
        );
    }

    #[test]
    fn refresh_does_not_resurrect_pending_delete() {
        let store = DocumentStore::new();

        let intent = OutboxIntent {
            sequence: 1,
            action: IntentAction::Delete,
            collection: "groceries".into(),
            server_id: Some("srv-1".into()),
            local_key: None,
            payload: FieldMap::new(),
            enqueued_at_ms: 0,
        };
        let protection = RefreshProtection::from_intents([&intent], "name");

        let merge = store.apply_refresh(
            "groceries",
            vec![("srv-1".into(), fields("Milk"))],
            &protection,
        );

        assert_eq!(merge.skipped, 1);
        assert_eq!(store.count("groceries"), 0);
    }

    #[test]
    fn snapshot_roundtrip_preserves_key_counter() {
        let store = DocumentStore::new();
        store.upsert("groceries", None, fields("Milk"));
        let (records, next_key) = store.snapshot();

        let restored = DocumentStore::from_snapshot(records, next_key);
        let fresh = restored.upsert("groceries", None, fields("Eggs"));

        assert_eq!(fresh.local_key, LocalKey::new(2));
    }
}
