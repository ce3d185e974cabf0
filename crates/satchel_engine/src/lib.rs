//! # Satchel Engine
//!
//! The local-first synchronization engine.
//!
//! This crate provides:
//! - [`Satchel`] — the engine handle: optimistic writes, local-first
//!   reads, manual and background sync triggers
//! - The drain processor with its run-in-progress guard and
//!   transient/rejected failure policy
//! - Identity reconciliation for client-created placeholder records
//! - The protect-then-replace refresh reconciler
//! - [`ConnectivityProbe`] — connectivity as an explicit capability
//!
//! ## Architecture
//!
//! Every write lands in the local store immediately and appends an
//! intent to the outbox; the caller never waits on the network. The
//! drain delivers intents in sequence order, best-effort per intent:
//! transient failures leave the intent queued, rejections charge a
//! bounded retry budget and then dead-letter. Reads serve the local
//! store and trigger a background refresh that merges the authoritative
//! snapshot without evicting records that still carry unsent intent.
//!
//! ## Key invariants
//!
//! - An intent is removed only after its remote effect is confirmed
//! - At most one outstanding create intent exists per local record
//! - Enqueued payloads are by-value snapshots; caller-side mutation
//!   never reaches them
//! - A refresh never erases a record with outstanding intent, and never
//!   resurrects one with a pending delete

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod drain;
mod engine;
mod error;
mod reconcile;
mod refresh;
mod status;

pub use config::EngineConfig;
pub use connectivity::{AlwaysOnline, ConnectivityProbe, SwitchableProbe};
pub use drain::{DrainOutcome, DrainReport};
pub use engine::Satchel;
pub use error::{EngineError, EngineResult};
pub use reconcile::ReconcileOutcome;
pub use refresh::RefreshOutcome;
pub use status::SyncStatus;
