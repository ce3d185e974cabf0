//! # Satchel Gateway
//!
//! The remote access contract for the Satchel sync engine.
//!
//! This crate provides:
//! - The [`Gateway`] trait — document CRUD against the remote
//!   authoritative store
//! - [`GatewayError`] — the transient/rejected error taxonomy the sync
//!   processor's failure policy keys on
//! - The wire codec ([`WireDocument`], [`encode_fields`],
//!   [`decode_fields`]) — binary attachments rendered transport-safe as
//!   tagged base64, lazily at the boundary
//! - [`RestGateway`] — a REST transport over an abstracted
//!   [`HttpClient`]
//! - [`LoopbackRemote`] — an in-memory authoritative store for tests and
//!   demos
//! - [`MockGateway`] — scripted responses with a call log
//!
//! The engine never learns which transport it talks to; retry, auth,
//! and timeouts are the transport's concern.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod loopback;
mod mock;
mod rest;
mod wire;

pub use error::{GatewayError, GatewayResult};
pub use loopback::LoopbackRemote;
pub use mock::{GatewayCall, MockGateway, SaveScript};
pub use rest::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RestGateway};
pub use wire::{decode_fields, encode_fields, WireDocument};

/// Document CRUD against the remote authoritative store.
///
/// A successful create (a save whose document carries no id) returns the
/// stored document including its server-assigned identity — the seam
/// identity reconciliation hangs off.
pub trait Gateway: Send + Sync {
    /// Fetches the authoritative snapshot of a collection.
    fn get_collection(&self, collection: &str) -> GatewayResult<Vec<WireDocument>>;

    /// Fetches a single document.
    fn get_document(&self, collection: &str, id: &str) -> GatewayResult<WireDocument>;

    /// Creates (no id) or updates (with id) a document, returning the
    /// stored document including its server identity.
    fn save_document(
        &self,
        collection: &str,
        document: &WireDocument,
    ) -> GatewayResult<WireDocument>;

    /// Deletes a document.
    fn delete_document(&self, collection: &str, id: &str) -> GatewayResult<()>;

    /// Deletes every document in a collection.
    fn clear_collection(&self, collection: &str) -> GatewayResult<()>;
}

impl<G: Gateway + ?Sized> Gateway for std::sync::Arc<G> {
    fn get_collection(&self, collection: &str) -> GatewayResult<Vec<WireDocument>> {
        (**self).get_collection(collection)
    }

    fn get_document(&self, collection: &str, id: &str) -> GatewayResult<WireDocument> {
        (**self).get_document(collection, id)
    }

    fn save_document(
        &self,
        collection: &str,
        document: &WireDocument,
    ) -> GatewayResult<WireDocument> {
        (**self).save_document(collection, document)
    }

    fn delete_document(&self, collection: &str, id: &str) -> GatewayResult<()> {
        (**self).delete_document(collection, id)
    }

    fn clear_collection(&self, collection: &str) -> GatewayResult<()> {
        (**self).clear_collection(collection)
    }
}
