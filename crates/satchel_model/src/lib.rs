//! # Satchel Model
//!
//! Core data model for the Satchel local-first document layer.
//!
//! This crate provides:
//! - [`FieldValue`] and [`FieldMap`] for document payloads
//! - [`DocumentRecord`] and [`DocumentDraft`] for local records
//! - [`LocalKey`] and [`DocumentIdentity`] for identity
//! - [`OutboxIntent`] for pending mutations
//! - [`StateNamespace`] for per-app, per-user state isolation
//!
//! This is a pure data crate with no I/O operations.
//!
//! ## Identity model
//!
//! Every record carries a locally-assigned [`LocalKey`] that is never
//! transmitted. Once the remote store accepts a create, the record also
//! carries a server-assigned id. A record without a server id is
//! *pending-create*: it exists only locally until the outbox delivers
//! its create intent.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod fields;
mod intent;
mod namespace;

pub use document::{DocumentDraft, DocumentIdentity, DocumentRecord, LocalKey};
pub use fields::{natural_key, FieldMap, FieldValue};
pub use intent::{now_millis, IntentAction, OutboxIntent};
pub use namespace::StateNamespace;
