//! The outbox: an ordered queue of pending mutation intents.

use parking_lot::RwLock;
use satchel_model::{now_millis, FieldMap, IntentAction, LocalKey, OutboxIntent};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An entry in the outbox.
///
/// Wraps the intent with delivery bookkeeping: a revision counter bumped
/// whenever a coalescing save replaces the payload, the number of times
/// the remote rejected the intent, and the dead-letter flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// The pending intent.
    pub intent: OutboxIntent,
    /// Bumped on payload coalescing; an in-flight drain acknowledges a
    /// delivery only if the revision it dispatched is still current.
    pub revision: u32,
    /// How many times the remote rejected this intent.
    pub rejected_attempts: u32,
    /// Set once the rejected-retry budget is exhausted; dead entries are
    /// skipped by drains.
    pub dead: bool,
}

impl OutboxEntry {
    /// Creates a live entry for a freshly enqueued intent.
    pub fn new(intent: OutboxIntent) -> Self {
        Self {
            intent,
            revision: 0,
            rejected_attempts: 0,
            dead: false,
        }
    }
}

/// Result of enqueueing a `Clear` intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearEnqueued {
    /// Sequence assigned to the clear intent.
    pub sequence: u64,
    /// Pending write/delete intents for the collection that the clear
    /// superseded.
    pub superseded: usize,
}

/// An append-only, order-preserving queue of pending mutation intents.
///
/// # Invariants
///
/// - Sequences are strictly increasing, assigned at enqueue time
/// - Entries are held in sequence order
/// - An entry is removed only by confirmed delivery or supersession
pub struct Outbox {
    inner: RwLock<OutboxInner>,
}

struct OutboxInner {
    entries: VecDeque<OutboxEntry>,
    next_sequence: u64,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(OutboxInner {
                entries: VecDeque::new(),
                next_sequence: 1,
            }),
        }
    }

    /// Restores an outbox from persisted state.
    pub fn from_snapshot(entries: Vec<OutboxEntry>, next_sequence: u64) -> Self {
        let max_seq = entries.iter().map(|e| e.intent.sequence).max().unwrap_or(0);
        Self {
            inner: RwLock::new(OutboxInner {
                entries: entries.into(),
                next_sequence: next_sequence.max(max_seq + 1),
            }),
        }
    }

    /// Returns all entries plus the sequence counter, for persistence.
    pub fn snapshot(&self) -> (Vec<OutboxEntry>, u64) {
        let inner = self.inner.read();
        (
            inner.entries.iter().cloned().collect(),
            inner.next_sequence,
        )
    }

    /// Appends an intent, assigning the next sequence.
    ///
    /// The payload parameter is taken by value: the queue owns a deep
    /// snapshot that later caller-side mutation cannot reach.
    pub fn enqueue(
        &self,
        action: IntentAction,
        collection: &str,
        server_id: Option<String>,
        local_key: Option<LocalKey>,
        payload: FieldMap,
    ) -> u64 {
        let mut inner = self.inner.write();
        let sequence = inner.fresh_sequence();
        inner.entries.push_back(OutboxEntry::new(OutboxIntent {
            sequence,
            action,
            collection: collection.to_string(),
            server_id,
            local_key,
            payload,
            enqueued_at_ms: now_millis(),
        }));
        sequence
    }

    /// Enqueues a `Clear` for the collection, superseding its pending
    /// write/delete intents in the same critical section.
    pub fn enqueue_clear(&self, collection: &str) -> ClearEnqueued {
        let mut inner = self.inner.write();

        let before = inner.entries.len();
        inner
            .entries
            .retain(|e| e.intent.collection != collection);
        let superseded = before - inner.entries.len();

        let sequence = inner.fresh_sequence();
        inner.entries.push_back(OutboxEntry::new(OutboxIntent {
            sequence,
            action: IntentAction::Clear,
            collection: collection.to_string(),
            server_id: None,
            local_key: None,
            payload: FieldMap::new(),
            enqueued_at_ms: now_millis(),
        }));

        ClearEnqueued {
            sequence,
            superseded,
        }
    }

    /// Replaces the payload of the pending create intent originating from
    /// the given local key.
    ///
    /// A second save on a still-unsynced record updates the one
    /// outstanding create intent rather than enqueueing a duplicate.
    /// Returns the intent's sequence, or `None` when no live pending
    /// create exists for the key.
    pub fn refresh_create_payload(&self, local_key: LocalKey, payload: FieldMap) -> Option<u64> {
        let mut inner = self.inner.write();
        let entry = inner.entries.iter_mut().find(|e| {
            !e.dead
                && e.intent.action == IntentAction::Write
                && e.intent.server_id.is_none()
                && e.intent.local_key == Some(local_key)
        })?;
        entry.intent.payload = payload;
        entry.revision += 1;
        Some(entry.intent.sequence)
    }

    /// Attaches a server id to a queued intent.
    ///
    /// Used when a create delivered but its entry was coalesced while in
    /// flight: the entry stays queued with the newer payload, and must
    /// redeliver as an update rather than a second create.
    pub fn assign_server_id(&self, sequence: u64, server_id: &str) -> bool {
        let mut inner = self.inner.write();
        match inner
            .entries
            .iter_mut()
            .find(|e| e.intent.sequence == sequence)
        {
            Some(entry) => {
                entry.intent.server_id = Some(server_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Retracts the live pending create intent originating from the
    /// given local key.
    ///
    /// Used when a never-synced record is deleted locally: there is
    /// nothing remote to delete, so the create simply never ships.
    /// Returns whether an intent was retracted.
    pub fn retract_create(&self, local_key: LocalKey) -> bool {
        let mut inner = self.inner.write();
        let index = inner.entries.iter().position(|e| {
            !e.dead
                && e.intent.action == IntentAction::Write
                && e.intent.server_id.is_none()
                && e.intent.local_key == Some(local_key)
        });
        match index {
            Some(i) => {
                inner.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Returns live intents with their revisions, in sequence order.
    pub fn pending_snapshot(&self) -> Vec<(OutboxIntent, u32)> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| !e.dead)
            .map(|e| (e.intent.clone(), e.revision))
            .collect()
    }

    /// Returns live intents for one collection, in sequence order.
    pub fn pending_for_collection(&self, collection: &str) -> Vec<OutboxIntent> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| !e.dead && e.intent.collection == collection)
            .map(|e| e.intent.clone())
            .collect()
    }

    /// Returns true if a live `Clear` is pending for the collection.
    pub fn has_pending_clear(&self, collection: &str) -> bool {
        self.inner.read().entries.iter().any(|e| {
            !e.dead
                && e.intent.action == IntentAction::Clear
                && e.intent.collection == collection
        })
    }

    /// Removes an entry after its remote effect was confirmed.
    ///
    /// The removal happens only if the entry's revision still matches
    /// the one that was dispatched; a coalesced-in-flight payload stays
    /// queued for redelivery. Returns whether the entry was removed.
    pub fn remove_delivered(&self, sequence: u64, revision: u32) -> bool {
        let mut inner = self.inner.write();
        let index = inner
            .entries
            .iter()
            .position(|e| e.intent.sequence == sequence);
        match index {
            Some(i) if inner.entries[i].revision == revision => {
                inner.entries.remove(i);
                true
            }
            _ => false,
        }
    }

    /// Records a rejected delivery attempt.
    ///
    /// Once `max_attempts` rejections accumulate the entry is
    /// dead-lettered. Returns true if the entry is now dead.
    pub fn record_rejection(&self, sequence: u64, max_attempts: u32) -> bool {
        let mut inner = self.inner.write();
        let Some(entry) = inner
            .entries
            .iter_mut()
            .find(|e| e.intent.sequence == sequence)
        else {
            return false;
        };
        entry.rejected_attempts += 1;
        if entry.rejected_attempts >= max_attempts {
            entry.dead = true;
        }
        entry.dead
    }

    /// Returns the dead-lettered intents.
    pub fn dead_letters(&self) -> Vec<OutboxIntent> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| e.dead)
            .map(|e| e.intent.clone())
            .collect()
    }

    /// Returns the number of live pending intents.
    pub fn pending_count(&self) -> usize {
        self.inner.read().entries.iter().filter(|e| !e.dead).count()
    }

    /// Returns the number of dead-lettered intents.
    pub fn dead_count(&self) -> usize {
        self.inner.read().entries.iter().filter(|e| e.dead).count()
    }

    /// Returns the enqueue time of the oldest live intent.
    pub fn oldest_pending_enqueued_at(&self) -> Option<u64> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| !e.dead)
            .map(|e| e.intent.enqueued_at_ms)
            .min()
    }

    /// Returns the total number of entries, dead included.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if the outbox holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("pending", &self.pending_count())
            .field("dead", &self.dead_count())
            .finish_non_exhaustive()
    }
}

impl OutboxInner {
    fn fresh_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_model::FieldValue;

    fn fields(name: &str) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("name".into(), FieldValue::from(name));
        map
    }

    #[test]
    fn enqueue_assigns_increasing_sequences() {
        let outbox = Outbox::new();

        let a = outbox.enqueue(IntentAction::Write, "groceries", None, None, fields("Milk"));
        let b = outbox.enqueue(IntentAction::Write, "groceries", None, None, fields("Eggs"));

        assert_eq!(a, 1);
        assert_eq!(b, 2);

        let pending = outbox.pending_snapshot();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].0.sequence, 1);
        assert_eq!(pending[1].0.sequence, 2);
    }

    #[test]
    fn snapshot_is_by_value() {
        let outbox = Outbox::new();
        let mut payload = fields("Milk");
        outbox.enqueue(IntentAction::Write, "groceries", None, None, payload.clone());

        // Mutating the caller's map must not reach the queue.
        payload.insert("name".into(), FieldValue::from("Beer"));

        let pending = outbox.pending_snapshot();
        assert_eq!(pending[0].0.payload, fields("Milk"));
    }

    #[test]
    fn remove_delivered_requires_matching_revision() {
        let outbox = Outbox::new();
        let key = LocalKey::new(1);
        let seq = outbox.enqueue(
            IntentAction::Write,
            "groceries",
            None,
            Some(key),
            fields("Milk"),
        );

        // A coalescing save lands while the old snapshot is in flight.
        outbox.refresh_create_payload(key, fields("Oat milk"));

        assert!(!outbox.remove_delivered(seq, 0));
        assert_eq!(outbox.pending_count(), 1);

        // Delivering the current revision removes the entry.
        assert!(outbox.remove_delivered(seq, 1));
        assert!(outbox.is_empty());
    }

    #[test]
    fn refresh_create_payload_ignores_synced_writes() {
        let outbox = Outbox::new();
        let key = LocalKey::new(1);
        outbox.enqueue(
            IntentAction::Write,
            "groceries",
            Some("srv-1".into()),
            Some(key),
            fields("Milk"),
        );

        assert_eq!(outbox.refresh_create_payload(key, fields("Eggs")), None);
    }

    #[test]
    fn assign_server_id_upgrades_queued_create() {
        let outbox = Outbox::new();
        let key = LocalKey::new(1);
        let seq = outbox.enqueue(
            IntentAction::Write,
            "groceries",
            None,
            Some(key),
            fields("Milk"),
        );

        assert!(outbox.assign_server_id(seq, "srv-9"));
        assert!(!outbox.assign_server_id(99, "srv-9"));

        let (intent, _) = outbox.pending_snapshot().remove(0);
        assert_eq!(intent.server_id.as_deref(), Some("srv-9"));
        assert!(!intent.is_create());
    }

    #[test]
    fn retract_create_removes_only_pending_creates() {
        let outbox = Outbox::new();
        let key = LocalKey::new(1);
        outbox.enqueue(
            IntentAction::Write,
            "groceries",
            None,
            Some(key),
            fields("Milk"),
        );
        outbox.enqueue(
            IntentAction::Write,
            "groceries",
            Some("srv-1".into()),
            Some(LocalKey::new(2)),
            fields("Eggs"),
        );

        assert!(outbox.retract_create(key));
        assert!(!outbox.retract_create(key));
        // The synced write is untouched.
        assert!(!outbox.retract_create(LocalKey::new(2)));
        assert_eq!(outbox.pending_count(), 1);
    }

    #[test]
    fn clear_supersedes_collection_intents() {
        let outbox = Outbox::new();
        outbox.enqueue(IntentAction::Write, "groceries", None, None, fields("Milk"));
        outbox.enqueue(
            IntentAction::Delete,
            "groceries",
            Some("srv-1".into()),
            None,
            FieldMap::new(),
        );
        outbox.enqueue(IntentAction::Write, "chores", None, None, fields("Dishes"));

        let result = outbox.enqueue_clear("groceries");

        assert_eq!(result.superseded, 2);
        assert!(outbox.has_pending_clear("groceries"));

        let pending = outbox.pending_snapshot();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].0.collection, "chores");
        assert_eq!(pending[1].0.action, IntentAction::Clear);
    }

    #[test]
    fn rejection_dead_letters_after_budget() {
        let outbox = Outbox::new();
        let seq = outbox.enqueue(IntentAction::Write, "groceries", None, None, fields("Milk"));

        assert!(!outbox.record_rejection(seq, 3));
        assert!(!outbox.record_rejection(seq, 3));
        assert!(outbox.record_rejection(seq, 3));

        assert_eq!(outbox.pending_count(), 0);
        assert_eq!(outbox.dead_count(), 1);
        assert_eq!(outbox.dead_letters()[0].sequence, seq);
        // Dead entries no longer appear in drain snapshots.
        assert!(outbox.pending_snapshot().is_empty());
    }

    #[test]
    fn oldest_pending_age_tracks_live_entries() {
        let outbox = Outbox::new();
        assert_eq!(outbox.oldest_pending_enqueued_at(), None);

        outbox.enqueue(IntentAction::Write, "groceries", None, None, fields("Milk"));
        assert!(outbox.oldest_pending_enqueued_at().is_some());
    }

    #[test]
    fn snapshot_roundtrip_preserves_sequence_counter() {
        let outbox = Outbox::new();
        outbox.enqueue(IntentAction::Write, "groceries", None, None, fields("Milk"));
        let (entries, next) = outbox.snapshot();

        let restored = Outbox::from_snapshot(entries, next);
        let seq = restored.enqueue(IntentAction::Write, "groceries", None, None, fields("Eggs"));

        assert_eq!(seq, 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Sequences stay strictly increasing and FIFO under any mix
            // of enqueues and deliveries.
            #[test]
            fn order_preserved(ops in proptest::collection::vec(0u8..3, 1..40)) {
                let outbox = Outbox::new();
                let mut last_seen = 0u64;

                for op in ops {
                    match op {
                        0 | 1 => {
                            outbox.enqueue(
                                IntentAction::Write,
                                "c",
                                None,
                                None,
                                FieldMap::new(),
                            );
                        }
                        _ => {
                            if let Some((intent, revision)) =
                                outbox.pending_snapshot().first().cloned()
                            {
                                prop_assert!(intent.sequence > last_seen);
                                last_seen = intent.sequence;
                                prop_assert!(outbox.remove_delivered(intent.sequence, revision));
                            }
                        }
                    }

                    let pending = outbox.pending_snapshot();
                    for pair in pending.windows(2) {
                        prop_assert!(pair[0].0.sequence < pair[1].0.sequence);
                    }
                }
            }
        }
    }
}
