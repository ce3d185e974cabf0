//! The engine: optimistic writes, outbox drain, reconciliation, refresh.

use crate::config::EngineConfig;
use crate::connectivity::ConnectivityProbe;
use crate::drain::{DrainOutcome, DrainReport};
use crate::error::{EngineError, EngineResult};
use crate::reconcile::{attach_identity, ReconcileOutcome};
use crate::refresh::RefreshOutcome;
use crate::status::{EngineStats, SyncStatus};
use parking_lot::{Mutex, RwLock};
use satchel_gateway::{Gateway, GatewayError, WireDocument};
use satchel_model::{
    now_millis, DocumentDraft, DocumentIdentity, DocumentRecord, FieldMap, IntentAction,
    OutboxIntent,
};
use satchel_store::{
    DocumentStore, Outbox, PersistedState, RefreshProtection, StatePersistence,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The local-first document engine.
///
/// `Satchel` is a cheap-to-clone handle over shared engine state.
/// Writes apply to the local store immediately and enqueue an outbox
/// intent; reads serve the local store and never wait on the network.
/// Delivery happens in [`Satchel::drain`], triggered in the background
/// after writes and manually on connectivity-restored signals.
#[derive(Clone)]
pub struct Satchel {
    inner: Arc<EngineInner>,
}

impl Satchel {
    /// Creates an ephemeral engine with no persistence.
    pub fn new(
        config: EngineConfig,
        gateway: impl Gateway + 'static,
        connectivity: impl ConnectivityProbe + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                store: DocumentStore::new(),
                outbox: Outbox::new(),
                gateway: Box::new(gateway),
                connectivity: Box::new(connectivity),
                persistence: None,
                drain_lock: Mutex::new(()),
                refreshing: Mutex::new(HashSet::new()),
                stats: RwLock::new(EngineStats::default()),
            }),
        }
    }

    /// Opens an engine over persisted state, restoring the namespace's
    /// documents and outbox.
    pub fn open(
        config: EngineConfig,
        gateway: impl Gateway + 'static,
        connectivity: impl ConnectivityProbe + 'static,
        persistence: Box<dyn StatePersistence>,
    ) -> EngineResult<Self> {
        let (store, outbox) = match persistence.load()? {
            Some(state) => state.restore(),
            None => (DocumentStore::new(), Outbox::new()),
        };
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                outbox,
                gateway: Box::new(gateway),
                connectivity: Box::new(connectivity),
                persistence: Some(persistence),
                drain_lock: Mutex::new(()),
                refreshing: Mutex::new(HashSet::new()),
                stats: RwLock::new(EngineStats::default()),
            }),
        })
    }

    /// Saves a document: optimistic local write plus an outbox intent.
    ///
    /// Returns the record as stored locally. Delivery failures are never
    /// surfaced here; they show up in [`Satchel::status`].
    pub fn save(&self, collection: &str, draft: DocumentDraft) -> EngineResult<DocumentRecord> {
        let record = self.inner.save_local(collection, draft)?;
        self.trigger_drain();
        Ok(record)
    }

    /// Returns the collection from the local store, deduplicated by
    /// identity, and triggers a background refresh when online.
    pub fn collection(&self, name: &str) -> Vec<DocumentRecord> {
        let records = dedup(self.inner.store.query(name));
        if self.inner.config.refresh_on_read {
            self.trigger_refresh(name);
        }
        records
    }

    /// Returns a single record from the local store and triggers a
    /// background refresh of its collection when online.
    pub fn document(
        &self,
        collection: &str,
        identity: &DocumentIdentity,
    ) -> Option<DocumentRecord> {
        let record = self.inner.store.get(collection, identity);
        if self.inner.config.refresh_on_read {
            self.trigger_refresh(collection);
        }
        record
    }

    /// Deletes a document locally and enqueues the matching intent.
    ///
    /// Deleting a never-synced record retracts its pending create
    /// instead; there is nothing remote to delete.
    pub fn delete(&self, collection: &str, identity: &DocumentIdentity) -> EngineResult<()> {
        self.inner.delete_local(collection, identity)?;
        self.trigger_drain();
        Ok(())
    }

    /// Clears a collection locally and enqueues a single `Clear` intent,
    /// superseding the collection's pending writes and deletes.
    pub fn clear(&self, collection: &str) -> EngineResult<()> {
        self.inner.clear_local(collection)?;
        self.trigger_drain();
        Ok(())
    }

    /// Drains the outbox against the gateway.
    ///
    /// Manual sync trigger, e.g. bound to a connectivity-restored
    /// signal. A no-op when offline or when a drain is already running.
    pub fn drain(&self) -> EngineResult<DrainOutcome> {
        self.inner.drain()
    }

    /// Fetches the authoritative snapshot of a collection and merges it
    /// into the local store without discarding unsynced work.
    pub fn refresh(&self, collection: &str) -> EngineResult<RefreshOutcome> {
        self.inner.refresh(collection)
    }

    /// Returns a point-in-time view of sync health.
    pub fn status(&self) -> SyncStatus {
        self.inner.status()
    }

    /// Returns the live intents awaiting delivery, in sequence order.
    pub fn pending_intents(&self) -> Vec<OutboxIntent> {
        self.inner
            .outbox
            .pending_snapshot()
            .into_iter()
            .map(|(intent, _)| intent)
            .collect()
    }

    /// Returns the intents dead-lettered after exhausting their retry
    /// budget.
    pub fn dead_letters(&self) -> Vec<OutboxIntent> {
        self.inner.outbox.dead_letters()
    }

    fn trigger_drain(&self) {
        if !self.inner.connectivity.is_online() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            if let Err(error) = inner.drain() {
                debug!(error = %error, "background drain failed");
            }
        });
    }

    fn trigger_refresh(&self, collection: &str) {
        if !self.inner.connectivity.is_online() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let collection = collection.to_string();
        thread::spawn(move || {
            if let Err(error) = inner.refresh(&collection) {
                debug!(collection, error = %error, "background refresh failed");
            }
        });
    }
}

impl std::fmt::Debug for Satchel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Satchel")
            .field("namespace", &self.inner.config.namespace)
            .field("pending_intents", &self.inner.outbox.pending_count())
            .finish_non_exhaustive()
    }
}

struct EngineInner {
    config: EngineConfig,
    store: DocumentStore,
    outbox: Outbox,
    gateway: Box<dyn Gateway>,
    connectivity: Box<dyn ConnectivityProbe>,
    persistence: Option<Box<dyn StatePersistence>>,
    /// Run-in-progress guard for the drain.
    drain_lock: Mutex<()>,
    /// Collections with a refresh in flight.
    refreshing: Mutex<HashSet<String>>,
    stats: RwLock<EngineStats>,
}

impl EngineInner {
    fn save_local(&self, collection: &str, draft: DocumentDraft) -> EngineResult<DocumentRecord> {
        let (identity, fields) = draft.into_parts();

        let record = match identity {
            None => {
                let record = self.store.upsert(collection, None, fields.clone());
                self.outbox.enqueue(
                    IntentAction::Write,
                    collection,
                    None,
                    Some(record.local_key),
                    fields,
                );
                record
            }
            Some(DocumentIdentity::Server(id)) => {
                let record = self.store.upsert(collection, Some(&id), fields.clone());
                self.outbox.enqueue(
                    IntentAction::Write,
                    collection,
                    Some(id),
                    Some(record.local_key),
                    fields,
                );
                record
            }
            Some(DocumentIdentity::Local(key)) => {
                let record = self.store.update_fields(key, fields.clone()).ok_or_else(|| {
                    EngineError::RecordNotFound {
                        collection: collection.to_string(),
                        identity: DocumentIdentity::Local(key).to_string(),
                    }
                })?;
                if let Some(id) = record.server_id.clone() {
                    // Reconciled while the caller held the draft: this
                    // save is now an update.
                    self.outbox.enqueue(
                        IntentAction::Write,
                        collection,
                        Some(id),
                        Some(key),
                        fields,
                    );
                } else if self.outbox.refresh_create_payload(key, fields.clone()).is_none() {
                    // No live create intent for this record (delivered
                    // but reconciliation missed, or dead-lettered).
                    self.outbox.enqueue(
                        IntentAction::Write,
                        collection,
                        None,
                        Some(key),
                        fields,
                    );
                }
                record
            }
        };

        self.persist()?;
        Ok(record)
    }

    fn delete_local(&self, collection: &str, identity: &DocumentIdentity) -> EngineResult<()> {
        let removed = self.store.remove(collection, identity);

        match removed {
            Some(record) => match record.server_id {
                Some(id) => {
                    self.outbox.enqueue(
                        IntentAction::Delete,
                        collection,
                        Some(id),
                        None,
                        FieldMap::new(),
                    );
                }
                None => {
                    self.outbox.retract_create(record.local_key);
                }
            },
            // Nothing local; the remote copy may still exist.
            None => {
                if let DocumentIdentity::Server(id) = identity {
                    self.outbox.enqueue(
                        IntentAction::Delete,
                        collection,
                        Some(id.clone()),
                        None,
                        FieldMap::new(),
                    );
                }
            }
        }

        self.persist()?;
        Ok(())
    }

    fn clear_local(&self, collection: &str) -> EngineResult<()> {
        let removed = self.store.clear_collection(collection);
        let result = self.outbox.enqueue_clear(collection);
        debug!(
            collection,
            removed,
            superseded = result.superseded,
            "collection cleared locally"
        );
        self.persist()?;
        Ok(())
    }

    fn drain(&self) -> EngineResult<DrainOutcome> {
        if !self.connectivity.is_online() {
            debug!("drain skipped: connectivity unavailable");
            return Ok(DrainOutcome::Offline);
        }
        let Some(_guard) = self.drain_lock.try_lock() else {
            debug!("drain skipped: another drain is in flight");
            return Ok(DrainOutcome::AlreadyRunning);
        };

        let pending = self.outbox.pending_snapshot();
        let mut report = DrainReport::default();
        let mut last_error = None;

        for (intent, revision) in pending {
            report.processed += 1;
            debug!(
                sequence = intent.sequence,
                action = %intent.action,
                collection = %intent.collection,
                "dispatching intent"
            );

            match self.dispatch(&intent) {
                Ok(reconciled) => {
                    match reconciled {
                        Some(ReconcileOutcome::Attached(key)) => {
                            report.reconciled += 1;
                            debug!(
                                sequence = intent.sequence,
                                local_key = %key,
                                "server identity attached"
                            );
                        }
                        Some(ReconcileOutcome::Miss) => {
                            report.reconciliation_misses += 1;
                            warn!(
                                sequence = intent.sequence,
                                collection = %intent.collection,
                                "reconciliation miss: no pending record matched"
                            );
                        }
                        None => {}
                    }

                    if self.outbox.remove_delivered(intent.sequence, revision) {
                        report.delivered += 1;
                    } else {
                        // A coalescing save replaced the payload while
                        // this snapshot was in flight; the entry stays
                        // queued and must redeliver as an update.
                        report.superseded_in_flight += 1;
                        if let Some(ReconcileOutcome::Attached(key)) = reconciled {
                            if let Some(id) = self
                                .store
                                .get_by_local_key(key)
                                .and_then(|r| r.server_id)
                            {
                                self.outbox.assign_server_id(intent.sequence, &id);
                            }
                        }
                    }
                }
                Err(error) if error.is_transient() => {
                    debug!(
                        sequence = intent.sequence,
                        error = %error,
                        "transient failure, intent stays queued"
                    );
                    report.transient_failures += 1;
                    last_error = Some(error.to_string());
                }
                Err(error) => {
                    let dead = self
                        .outbox
                        .record_rejection(intent.sequence, self.config.max_rejected_attempts);
                    if dead {
                        warn!(
                            sequence = intent.sequence,
                            error = %error,
                            "intent dead-lettered after exhausting retry budget"
                        );
                        report.dead_lettered += 1;
                    } else {
                        warn!(sequence = intent.sequence, error = %error, "intent rejected");
                        report.rejected += 1;
                    }
                    last_error = Some(error.to_string());
                }
            }
        }

        self.persist()?;

        {
            let mut stats = self.stats.write();
            stats.drains_completed += 1;
            stats.intents_delivered += report.delivered;
            stats.last_drain_at = Some(Instant::now());
            stats.last_error = last_error;
        }

        Ok(DrainOutcome::Completed(report))
    }

    /// Dispatches one intent to the gateway. On a successful create,
    /// returns the reconciliation outcome.
    fn dispatch(&self, intent: &OutboxIntent) -> Result<Option<ReconcileOutcome>, GatewayError> {
        match intent.action {
            IntentAction::Write => {
                // Binary attachments are rendered transport-safe here,
                // at send time; the store keeps the native form.
                let document = WireDocument::from_fields(intent.server_id.clone(), &intent.payload);
                let stored = self.gateway.save_document(&intent.collection, &document)?;

                if !intent.is_create() {
                    return Ok(None);
                }
                match stored.id {
                    Some(id) => Ok(Some(attach_identity(
                        &self.store,
                        &intent.collection,
                        &self.config.natural_key_field,
                        &intent.payload,
                        &id,
                    ))),
                    None => Ok(Some(ReconcileOutcome::Miss)),
                }
            }
            IntentAction::Delete => match &intent.server_id {
                Some(id) => match self.gateway.delete_document(&intent.collection, id) {
                    Ok(()) => Ok(None),
                    // Already gone remotely; the intended effect holds.
                    Err(GatewayError::NotFound { .. }) => Ok(None),
                    Err(e) => Err(e),
                },
                // Never synced; nothing remote to delete.
                None => Ok(None),
            },
            IntentAction::Clear => {
                self.gateway.clear_collection(&intent.collection)?;
                Ok(None)
            }
        }
    }

    fn refresh(&self, collection: &str) -> EngineResult<RefreshOutcome> {
        if self.outbox.has_pending_clear(collection) {
            debug!(collection, "refresh skipped: clear pending");
            return Ok(RefreshOutcome::SkippedPendingClear);
        }
        if !self.refreshing.lock().insert(collection.to_string()) {
            return Ok(RefreshOutcome::AlreadyInFlight);
        }
        let result = self.refresh_in_flight(collection);
        self.refreshing.lock().remove(collection);
        result
    }

    fn refresh_in_flight(&self, collection: &str) -> EngineResult<RefreshOutcome> {
        // Fetch and decode before touching the store: a refresh that
        // fails aborts before any deletion.
        let fetched = self.gateway.get_collection(collection)?;
        let mut decoded = Vec::with_capacity(fetched.len());
        for document in fetched {
            let id = document.id.clone().ok_or_else(|| {
                GatewayError::Protocol(format!(
                    "collection '{collection}' returned a document without id"
                ))
            })?;
            decoded.push((id, document.decode_fields()?));
        }

        let pending = self.outbox.pending_for_collection(collection);
        let protection =
            RefreshProtection::from_intents(&pending, &self.config.natural_key_field);
        let merge = self.store.apply_refresh(collection, decoded, &protection);
        self.persist()?;

        debug!(
            collection,
            evicted = merge.evicted,
            kept = merge.kept,
            updated = merge.updated,
            inserted = merge.inserted,
            skipped = merge.skipped,
            "refresh merged"
        );
        Ok(RefreshOutcome::Completed(merge))
    }

    fn status(&self) -> SyncStatus {
        let stats = self.stats.read().clone();
        let oldest_pending_age = self
            .outbox
            .oldest_pending_enqueued_at()
            .map(|at| Duration::from_millis(now_millis().saturating_sub(at)));

        SyncStatus {
            pending_intents: self.outbox.pending_count(),
            dead_letters: self.outbox.dead_count(),
            oldest_pending_age,
            last_drain_at: stats.last_drain_at,
            drains_completed: stats.drains_completed,
            intents_delivered: stats.intents_delivered,
            last_error: stats.last_error,
        }
    }

    fn persist(&self) -> EngineResult<()> {
        if let Some(persistence) = &self.persistence {
            persistence.save(&PersistedState::capture(&self.store, &self.outbox))?;
        }
        Ok(())
    }
}

/// Deduplicates records by identity, preserving first occurrence.
fn dedup(records: Vec<DocumentRecord>) -> Vec<DocumentRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.identity()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::SwitchableProbe;
    use satchel_gateway::{GatewayCall, MockGateway};
    use satchel_model::FieldValue;
    use std::sync::Arc;

    fn fields(name: &str) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("name".into(), FieldValue::from(name));
        map
    }

    fn offline_engine(gateway: Arc<MockGateway>) -> Satchel {
        Satchel::new(
            EngineConfig::default().with_refresh_on_read(false),
            gateway,
            SwitchableProbe::new(false),
        )
    }

    #[test]
    fn save_is_optimistic_while_offline() {
        let gateway = Arc::new(MockGateway::new());
        let engine = offline_engine(Arc::clone(&gateway));

        let record = engine
            .save("groceries", DocumentDraft::new(fields("Milk")))
            .unwrap();

        assert!(record.is_pending_create());
        assert_eq!(engine.collection("groceries").len(), 1);
        assert_eq!(engine.pending_intents().len(), 1);
        // Nothing reached the gateway.
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn drain_while_offline_is_a_noop() {
        let gateway = Arc::new(MockGateway::new());
        let engine = offline_engine(Arc::clone(&gateway));
        engine
            .save("groceries", DocumentDraft::new(fields("Milk")))
            .unwrap();

        assert_eq!(engine.drain().unwrap(), DrainOutcome::Offline);
        assert_eq!(engine.pending_intents().len(), 1);
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn second_save_on_pending_record_coalesces() {
        let gateway = Arc::new(MockGateway::new());
        let engine = offline_engine(gateway);

        let record = engine
            .save("groceries", DocumentDraft::new(fields("Milk")))
            .unwrap();
        let mut draft = DocumentDraft::from(&record);
        draft.fields_mut().insert("name".into(), FieldValue::from("Oat milk"));
        let updated = engine.save("groceries", draft).unwrap();

        // Same record, one outstanding create intent, newest payload.
        assert_eq!(updated.local_key, record.local_key);
        assert_eq!(engine.collection("groceries").len(), 1);
        let intents = engine.pending_intents();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].payload, fields("Oat milk"));
        assert!(intents[0].is_create());
    }

    #[test]
    fn save_addressing_missing_record_fails() {
        let gateway = Arc::new(MockGateway::new());
        let engine = offline_engine(gateway);

        let draft = DocumentDraft::new(fields("Milk"))
            .with_identity(DocumentIdentity::Local(satchel_model::LocalKey::new(42)));
        let result = engine.save("groceries", draft);
        assert!(matches!(result, Err(EngineError::RecordNotFound { .. })));
    }

    #[test]
    fn deleting_pending_record_retracts_create() {
        let gateway = Arc::new(MockGateway::new());
        let engine = offline_engine(Arc::clone(&gateway));

        let record = engine
            .save("groceries", DocumentDraft::new(fields("Milk")))
            .unwrap();
        engine.delete("groceries", &record.identity()).unwrap();

        assert!(engine.collection("groceries").is_empty());
        // No create, no delete: the intent never ships.
        assert!(engine.pending_intents().is_empty());
    }

    #[test]
    fn deleting_synced_record_enqueues_remote_delete() {
        let gateway = Arc::new(MockGateway::new());
        let engine = offline_engine(gateway);

        let record = engine
            .save(
                "groceries",
                DocumentDraft::new(fields("Milk"))
                    .with_identity(DocumentIdentity::Server("srv-1".into())),
            )
            .unwrap();
        engine.delete("groceries", &record.identity()).unwrap();

        let intents = engine.pending_intents();
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[1].action, IntentAction::Delete);
        assert_eq!(intents[1].server_id.as_deref(), Some("srv-1"));
    }

    #[test]
    fn clear_supersedes_and_enqueues_single_intent() {
        let gateway = Arc::new(MockGateway::new());
        let engine = offline_engine(gateway);

        engine
            .save("groceries", DocumentDraft::new(fields("Milk")))
            .unwrap();
        engine
            .save("groceries", DocumentDraft::new(fields("Eggs")))
            .unwrap();
        engine.clear("groceries").unwrap();

        assert!(engine.collection("groceries").is_empty());
        let intents = engine.pending_intents();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action, IntentAction::Clear);
    }

    #[test]
    fn drain_delivers_and_updates_status() {
        let gateway = Arc::new(MockGateway::new());
        let probe = Arc::new(SwitchableProbe::new(false));
        let engine = Satchel::new(
            EngineConfig::default().with_refresh_on_read(false),
            Arc::clone(&gateway),
            Arc::clone(&probe),
        );

        engine
            .save("groceries", DocumentDraft::new(fields("Milk")))
            .unwrap();
        probe.set_online(true);

        let outcome = engine.drain().unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.reconciled, 1);

        let status = engine.status();
        assert!(status.is_settled());
        assert_eq!(status.drains_completed, 1);
        assert_eq!(status.intents_delivered, 1);
        assert!(status.last_error.is_none());

        assert_eq!(gateway.mutation_calls().len(), 1);
        assert!(matches!(
            gateway.mutation_calls()[0],
            GatewayCall::Save { .. }
        ));
    }

    #[test]
    fn dedup_prefers_first_occurrence() {
        let store = DocumentStore::new();
        store.upsert("groceries", Some("srv-1"), fields("Milk"));
        store.upsert("groceries", None, fields("Eggs"));

        let mut records = store.query("groceries");
        // Duplicate the first record to simulate an identity collision.
        let dup = records[0].clone();
        records.push(dup);

        let deduped = dedup(records);
        assert_eq!(deduped.len(), 2);
    }
}
