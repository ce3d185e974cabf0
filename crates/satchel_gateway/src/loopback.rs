//! An in-memory authoritative remote store.
//!
//! Useful for integration tests and demos without actual network
//! overhead: it behaves like the real remote (assigns server identities
//! on create, rejects updates of missing documents) and can simulate
//! connectivity loss.

use crate::error::{GatewayError, GatewayResult};
use crate::wire::WireDocument;
use crate::Gateway;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// An in-memory remote store implementing the gateway contract.
#[derive(Default)]
pub struct LoopbackRemote {
    collections: Mutex<HashMap<String, Vec<(String, Value)>>>,
    offline: AtomicBool,
}

impl LoopbackRemote {
    /// Creates an empty remote store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing or regaining connectivity to the remote.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Seeds a document with a known id, as another client would have
    /// created it.
    pub fn seed_document(&self, collection: &str, id: &str, fields: Value) {
        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        if let Some(existing) = docs.iter_mut().find(|(doc_id, _)| doc_id == id) {
            existing.1 = fields;
        } else {
            docs.push((id.to_string(), fields));
        }
    }

    /// Removes a document directly, bypassing the contract.
    pub fn evict_document(&self, collection: &str, id: &str) {
        if let Some(docs) = self.collections.lock().get_mut(collection) {
            docs.retain(|(doc_id, _)| doc_id != id);
        }
    }

    /// Returns the number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Returns true if the collection holds the given id.
    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.collections
            .lock()
            .get(collection)
            .is_some_and(|docs| docs.iter().any(|(doc_id, _)| doc_id == id))
    }

    fn check_online(&self) -> GatewayResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(GatewayError::unreachable("loopback remote is offline"))
        } else {
            Ok(())
        }
    }
}

impl Gateway for LoopbackRemote {
    fn get_collection(&self, collection: &str) -> GatewayResult<Vec<WireDocument>> {
        self.check_online()?;
        Ok(self
            .collections
            .lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| WireDocument {
                        id: Some(id.clone()),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_document(&self, collection: &str, id: &str) -> GatewayResult<WireDocument> {
        self.check_online()?;
        self.collections
            .lock()
            .get(collection)
            .and_then(|docs| docs.iter().find(|(doc_id, _)| doc_id == id))
            .map(|(id, fields)| WireDocument {
                id: Some(id.clone()),
                fields: fields.clone(),
            })
            .ok_or_else(|| GatewayError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    fn save_document(
        &self,
        collection: &str,
        document: &WireDocument,
    ) -> GatewayResult<WireDocument> {
        self.check_online()?;
        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();

        match &document.id {
            Some(id) => {
                let existing = docs
                    .iter_mut()
                    .find(|(doc_id, _)| doc_id == id)
                    .ok_or_else(|| GatewayError::NotFound {
                        collection: collection.to_string(),
                        id: id.clone(),
                    })?;
                existing.1 = document.fields.clone();
                Ok(document.clone())
            }
            None => {
                let id = Uuid::new_v4().to_string();
                docs.push((id.clone(), document.fields.clone()));
                Ok(WireDocument {
                    id: Some(id),
                    fields: document.fields.clone(),
                })
            }
        }
    }

    fn delete_document(&self, collection: &str, id: &str) -> GatewayResult<()> {
        self.check_online()?;
        let mut collections = self.collections.lock();
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| GatewayError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        let before = docs.len();
        docs.retain(|(doc_id, _)| doc_id != id);
        if docs.len() == before {
            return Err(GatewayError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn clear_collection(&self, collection: &str) -> GatewayResult<()> {
        self.check_online()?;
        self.collections.lock().remove(collection);
        Ok(())
    }
}
