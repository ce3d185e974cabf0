//! A scripted gateway for unit tests.

use crate::error::{GatewayError, GatewayResult};
use crate::wire::WireDocument;
use crate::Gateway;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// A recorded gateway invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    /// `get_collection` was invoked.
    GetCollection {
        /// Collection name.
        collection: String,
    },
    /// `get_document` was invoked.
    GetDocument {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },
    /// `save_document` was invoked.
    Save {
        /// Collection name.
        collection: String,
        /// The document as dispatched.
        document: WireDocument,
    },
    /// `delete_document` was invoked.
    Delete {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },
    /// `clear_collection` was invoked.
    Clear {
        /// Collection name.
        collection: String,
    },
}

/// Scripted reply to a `save_document` call.
pub type SaveScript = GatewayResult<Option<String>>;

/// A mock gateway with scripted responses and a call log.
///
/// Unscripted calls succeed: saves echo the document's id or assign a
/// sequential `srv-N` id, deletes and clears return `Ok`. Scripts are
/// consumed in FIFO order per method.
#[derive(Default)]
pub struct MockGateway {
    calls: Mutex<Vec<GatewayCall>>,
    save_scripts: Mutex<VecDeque<SaveScript>>,
    delete_scripts: Mutex<VecDeque<GatewayResult<()>>>,
    clear_scripts: Mutex<VecDeque<GatewayResult<()>>>,
    fetch_scripts: Mutex<VecDeque<GatewayResult<Vec<WireDocument>>>>,
    snapshots: Mutex<HashMap<String, Vec<WireDocument>>>,
    next_id: AtomicU64,
}

impl MockGateway {
    /// Creates a mock with no scripts.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Scripts the next `save_document` reply. `Ok(Some(id))` returns
    /// that server id, `Ok(None)` falls back to the default behavior.
    pub fn script_save(&self, reply: SaveScript) {
        self.save_scripts.lock().push_back(reply);
    }

    /// Scripts the next `delete_document` reply.
    pub fn script_delete(&self, reply: GatewayResult<()>) {
        self.delete_scripts.lock().push_back(reply);
    }

    /// Scripts the next `clear_collection` reply.
    pub fn script_clear(&self, reply: GatewayResult<()>) {
        self.clear_scripts.lock().push_back(reply);
    }

    /// Scripts the next `get_collection` reply.
    pub fn script_fetch(&self, reply: GatewayResult<Vec<WireDocument>>) {
        self.fetch_scripts.lock().push_back(reply);
    }

    /// Sets the snapshot unscripted `get_collection` calls return.
    pub fn set_snapshot(&self, collection: &str, documents: Vec<WireDocument>) {
        self.snapshots
            .lock()
            .insert(collection.to_string(), documents);
    }

    /// Returns the recorded calls, in invocation order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// Returns only the recorded mutation calls (save/delete/clear).
    pub fn mutation_calls(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    GatewayCall::Save { .. } | GatewayCall::Delete { .. } | GatewayCall::Clear { .. }
                )
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().push(call);
    }

    fn assign_id(&self) -> String {
        format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl Gateway for MockGateway {
    fn get_collection(&self, collection: &str) -> GatewayResult<Vec<WireDocument>> {
        self.record(GatewayCall::GetCollection {
            collection: collection.to_string(),
        });
        if let Some(scripted) = self.fetch_scripts.lock().pop_front() {
            return scripted;
        }
        Ok(self
            .snapshots
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn get_document(&self, collection: &str, id: &str) -> GatewayResult<WireDocument> {
        self.record(GatewayCall::GetDocument {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self.snapshots
            .lock()
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id.as_deref() == Some(id)))
            .cloned()
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
        self.record(GatewayCall::Save {
            collection: collection.to_string(),
            document: document.clone(),
        });

        let scripted = self.save_scripts.lock().pop_front();
        let assigned = match scripted {
            Some(Err(e)) => return Err(e),
            Some(Ok(Some(id))) => Some(id),
            Some(Ok(None)) | None => None,
        };

        let id = assigned
            .or_else(|| document.id.clone())
            .unwrap_or_else(|| self.assign_id());
        Ok(WireDocument {
            id: Some(id),
            fields: document.fields.clone(),
        })
    }

    fn delete_document(&self, collection: &str, id: &str) -> GatewayResult<()> {
        self.record(GatewayCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self.delete_scripts.lock().pop_front().unwrap_or(Ok(()))
    }

    fn clear_collection(&self, collection: &str) -> GatewayResult<()> {
        self.record(GatewayCall::Clear {
            collection: collection.to_string(),
        });
        self.clear_scripts.lock().pop_front().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unscripted_save_assigns_sequential_ids() {
        let mock = MockGateway::new();
        let doc = WireDocument {
            id: None,
            fields: json!({ "name": "Milk" }),
        };

        let first = mock.save_document("groceries", &doc).unwrap();
        let second = mock.save_document("groceries", &doc).unwrap();

        assert_eq!(first.id.as_deref(), Some("srv-1"));
        assert_eq!(second.id.as_deref(), Some("srv-2"));
    }

    #[test]
    fn scripted_save_results_are_fifo() {
        let mock = MockGateway::new();
        mock.script_save(Ok(Some("abc123".into())));
        mock.script_save(Err(GatewayError::unreachable("offline")));

        let doc = WireDocument {
            id: None,
            fields: json!({}),
        };
        assert_eq!(
            mock.save_document("groceries", &doc).unwrap().id.as_deref(),
            Some("abc123")
        );
        assert!(mock.save_document("groceries", &doc).is_err());
        // Queue drained; back to default behavior.
        assert!(mock.save_document("groceries", &doc).is_ok());
    }

    #[test]
    fn records_calls_in_order() {
        let mock = MockGateway::new();
        let doc = WireDocument {
            id: None,
            fields: json!({}),
        };

        mock.save_document("groceries", &doc).unwrap();
        mock.delete_document("groceries", "srv-1").unwrap();
        mock.clear_collection("groceries").unwrap();
        mock.get_collection("groceries").unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[0], GatewayCall::Save { .. }));
        assert!(matches!(calls[1], GatewayCall::Delete { .. }));
        assert!(matches!(calls[2], GatewayCall::Clear { .. }));
        assert_eq!(mock.mutation_calls().len(), 3);
    }

    #[test]
    fn snapshot_backs_unscripted_fetch() {
        let mock = MockGateway::new();
        mock.set_snapshot(
            "groceries",
            vec![WireDocument {
                id: Some("srv-1".into()),
                fields: json!({ "name": "Milk" }),
            }],
        );

        assert_eq!(mock.get_collection("groceries").unwrap().len(), 1);
        assert!(mock.get_collection("chores").unwrap().is_empty());
        assert!(mock.get_document("groceries", "srv-1").is_ok());
        assert!(matches!(
            mock.get_document("groceries", "missing"),
            Err(GatewayError::NotFound { .. })
        ));
    }
}
