//! # Satchel Store
//!
//! Local state for the Satchel sync engine: the two logical tables the
//! engine operates on, plus their persistence.
//!
//! This crate provides:
//! - [`DocumentStore`] — the client's working copy of every collection's
//!   documents, keyed locally, independent of server identity
//! - [`Outbox`] — an append-only, order-preserving queue of pending
//!   mutation intents
//! - [`StatePersistence`] — snapshot persistence of both tables,
//!   namespaced per application instance and per end user
//!
//! ## Key invariants
//!
//! - No network access occurs in this crate; stores are pure keyed
//!   containers
//! - Outbox sequences are strictly increasing and define processing order
//! - An intent is removed only after its remote effect is confirmed
//! - The refresh merge is a single atomic store operation, so a
//!   concurrent save can never interleave with its delete-then-insert
//!   sequence

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod documents;
mod error;
mod outbox;
mod persist;

pub use documents::{DocumentStore, RefreshMerge, RefreshProtection};
pub use error::{StoreError, StoreResult};
pub use outbox::{ClearEnqueued, Outbox, OutboxEntry};
pub use persist::{
    DocumentsTable, FileStatePersistence, MemoryStatePersistence, OutboxTable, PersistedState,
    StatePersistence, STATE_VERSION,
};
