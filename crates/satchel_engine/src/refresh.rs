//! Refresh outcomes.

use satchel_store::RefreshMerge;

/// Why a refresh did or did not run, and what it merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The authoritative snapshot was fetched and merged.
    Completed(RefreshMerge),
    /// A `Clear` intent is pending for the collection; the optimistic
    /// truth is the empty collection, so merging the snapshot would
    /// resurrect it.
    SkippedPendingClear,
    /// A refresh of the same collection was already in flight.
    AlreadyInFlight,
}

impl RefreshOutcome {
    /// Returns the merge counters when the refresh completed.
    pub fn merge(&self) -> Option<&RefreshMerge> {
        match self {
            RefreshOutcome::Completed(merge) => Some(merge),
            _ => None,
        }
    }

    /// Returns true if the refresh ran.
    pub fn is_completed(&self) -> bool {
        matches!(self, RefreshOutcome::Completed(_))
    }
}
