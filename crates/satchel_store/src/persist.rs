//! Snapshot persistence for the two local state tables.
//!
//! State is persisted as CBOR snapshots of the `documents` and `outbox`
//! tables under a directory derived from the [`StateNamespace`], so
//! concurrent users or applications on one device never share state. An
//! exclusive file lock keeps a namespace single-process.

use crate::documents::DocumentStore;
use crate::error::{StoreError, StoreResult};
use crate::outbox::{Outbox, OutboxEntry};
use fs2::FileExt;
use parking_lot::Mutex;
use satchel_model::{DocumentRecord, StateNamespace};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Current schema version of the persisted tables.
///
/// The tag is monotonically increasing; state written by a newer schema
/// refuses to load.
pub const STATE_VERSION: u32 = 1;

const DOCUMENTS_FILE: &str = "documents.cbor";
const OUTBOX_FILE: &str = "outbox.cbor";
const LOCK_FILE: &str = "satchel.lock";

/// Persisted form of the document table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentsTable {
    /// Schema version the table was written with.
    pub schema_version: u32,
    /// Key counter at snapshot time.
    pub next_local_key: u64,
    /// All document records.
    pub records: Vec<DocumentRecord>,
}

impl Default for DocumentsTable {
    fn default() -> Self {
        Self {
            schema_version: STATE_VERSION,
            next_local_key: 1,
            records: Vec::new(),
        }
    }
}

/// Persisted form of the outbox table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxTable {
    /// Schema version the table was written with.
    pub schema_version: u32,
    /// Sequence counter at snapshot time.
    pub next_sequence: u64,
    /// All outbox entries, dead letters included.
    pub entries: Vec<OutboxEntry>,
}

impl Default for OutboxTable {
    fn default() -> Self {
        Self {
            schema_version: STATE_VERSION,
            next_sequence: 1,
            entries: Vec::new(),
        }
    }
}

/// A full snapshot of local state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// The document table.
    pub documents: DocumentsTable,
    /// The outbox table.
    pub outbox: OutboxTable,
}

impl PersistedState {
    /// Captures the current state of both tables.
    pub fn capture(store: &DocumentStore, outbox: &Outbox) -> Self {
        let (records, next_local_key) = store.snapshot();
        let (entries, next_sequence) = outbox.snapshot();
        Self {
            documents: DocumentsTable {
                schema_version: STATE_VERSION,
                next_local_key,
                records,
            },
            outbox: OutboxTable {
                schema_version: STATE_VERSION,
                next_sequence,
                entries,
            },
        }
    }

    /// Rebuilds both tables from this snapshot.
    pub fn restore(self) -> (DocumentStore, Outbox) {
        (
            DocumentStore::from_snapshot(self.documents.records, self.documents.next_local_key),
            Outbox::from_snapshot(self.outbox.entries, self.outbox.next_sequence),
        )
    }
}

/// Persistence of local state snapshots.
///
/// Implementors must be safe to call from the engine's background
/// threads. The engine treats persistence as an optional capability:
/// without one, state is ephemeral.
pub trait StatePersistence: Send + Sync {
    /// Loads the persisted state, or `None` when no state exists yet.
    fn load(&self) -> StoreResult<Option<PersistedState>>;

    /// Persists a state snapshot.
    fn save(&self, state: &PersistedState) -> StoreResult<()>;
}

/// File-backed persistence under a namespaced directory.
///
/// Layout: `<root>/<app_id>/<user_id>/{documents.cbor,outbox.cbor}` plus
/// a lock file held for the lifetime of this value. Table writes go to a
/// temp file first and are renamed into place.
pub struct FileStatePersistence {
    dir: PathBuf,
    // Held for the process lifetime of this persistence; dropping the
    // file releases the namespace lock.
    _lock: File,
}

impl FileStatePersistence {
    /// Opens (creating if needed) the namespace directory under `root`
    /// and takes its exclusive lock.
    pub fn open(root: &Path, namespace: &StateNamespace) -> StoreResult<Self> {
        let dir = root.join(namespace.relative_dir());
        fs::create_dir_all(&dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive().map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                StoreError::NamespaceLocked
            } else {
                StoreError::Io(e)
            }
        })?;

        Ok(Self { dir, _lock: lock })
    }

    /// Returns the namespace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_table<T: Serialize>(&self, file_name: &str, table: &T) -> StoreResult<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(table, &mut buf).map_err(|e| StoreError::Encode {
            message: e.to_string(),
        })?;

        let tmp = self.dir.join(format!("{file_name}.tmp"));
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, self.dir.join(file_name))?;
        Ok(())
    }

    fn read_table<T>(&self, file_name: &str) -> StoreResult<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let path = self.dir.join(file_name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let table = ciborium::from_reader(bytes.as_slice()).map_err(|e| StoreError::Decode {
            message: e.to_string(),
        })?;
        Ok(Some(table))
    }
}

impl StatePersistence for FileStatePersistence {
    fn load(&self) -> StoreResult<Option<PersistedState>> {
        let documents: Option<DocumentsTable> = self.read_table(DOCUMENTS_FILE)?;
        let outbox: Option<OutboxTable> = self.read_table(OUTBOX_FILE)?;

        if documents.is_none() && outbox.is_none() {
            return Ok(None);
        }

        // A table missing after a crash between the two renames loads as
        // empty rather than failing the whole namespace.
        let documents = documents.unwrap_or_default();
        let outbox = outbox.unwrap_or_default();

        for version in [documents.schema_version, outbox.schema_version] {
            if version > STATE_VERSION {
                return Err(StoreError::VersionAhead {
                    found: version,
                    supported: STATE_VERSION,
                });
            }
        }

        Ok(Some(PersistedState { documents, outbox }))
    }

    fn save(&self, state: &PersistedState) -> StoreResult<()> {
        self.write_table(DOCUMENTS_FILE, &state.documents)?;
        self.write_table(OUTBOX_FILE, &state.outbox)?;
        Ok(())
    }
}

/// In-memory persistence for tests and ephemeral engines.
#[derive(Default)]
pub struct MemoryStatePersistence {
    state: Mutex<Option<PersistedState>>,
}

impl MemoryStatePersistence {
    /// Creates an empty in-memory persistence.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatePersistence for MemoryStatePersistence {
    fn load(&self) -> StoreResult<Option<PersistedState>> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &PersistedState) -> StoreResult<()> {
        *self.state.lock() = Some(state.clone());
        Ok(())
    }
}
