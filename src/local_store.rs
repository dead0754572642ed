//! Durable client-side state cache.
//!
//! The whole state object lives under one fixed key. Every write is merged in
//! memory first and then persisted in a single swap, so the medium only ever
//! holds a complete previous state or a complete new one.

use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StorageError;
use crate::state::LocalState;

/// Key the client state is stored under.
pub const LOCAL_STATE_KEY: &str = "sheet-sync-state";

/// A synchronous key-value medium for the local cache.
pub trait StorageBackend {
    /// `Ok(None)` when nothing has been stored under `key` yet.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value under `key`. Must be all-or-nothing.
    fn store(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileBackend { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl StorageBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        write_synced(&tmp_path, value.as_bytes())?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// In-memory medium. Clones share contents, which lets a test "reload" a
/// store from the same backend. Writes can be made to fail on demand.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
    reject_writes: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail like a full quota would.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn put_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    fn store(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected("quota exceeded".to_string()));
        }
        self.put_raw(key, value);
        Ok(())
    }
}

pub struct LocalStateStore<B: StorageBackend> {
    backend: B,
    state: LocalState,
}

impl<B: StorageBackend> LocalStateStore<B> {
    /// Load the last persisted state, falling back to defaults when there is
    /// none or it cannot be read.
    pub fn open(backend: B) -> Self {
        let state = match backend.load(LOCAL_STATE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<LocalState>(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Discarding corrupt local state: {}", e);
                    LocalState::default()
                }
            },
            Ok(None) => LocalState::default(),
            Err(e) => {
                warn!("Could not read local state, using defaults: {}", e);
                LocalState::default()
            }
        };
        LocalStateStore { backend, state }
    }

    pub fn read(&self) -> &LocalState {
        &self.state
    }

    /// Merge `partial` one level deep and persist the result.
    ///
    /// The in-memory state is updated even when persisting fails; the error is
    /// returned so the caller can decide what to tell the user.
    pub fn write(&mut self, partial: &Map<String, Value>) -> Result<LocalState, StorageError> {
        self.state = self.state.merged(partial);
        self.persist()?;
        Ok(self.state.clone())
    }

    /// Swap in a whole new state (adopting a server record, reset).
    pub fn replace(&mut self, state: LocalState) -> Result<(), StorageError> {
        self.state = state;
        self.persist()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn persist(&self) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&self.state)?;
        self.backend.store(LOCAL_STATE_KEY, &payload)?;
        debug!("Persisted local state ({} bytes)", payload.len());
        Ok(())
    }
}
