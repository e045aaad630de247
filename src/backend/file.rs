use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use super::{blob, Backend, BackendError, RunId};

/// Embedded single-file backend.
///
/// Records live in a HashMap guarded by an `RwLock` and are written to the
/// blob file only on `persist()`. The lock serializes access from handles in
/// this process; it does not coordinate between processes, so two runs sharing
/// one file will overwrite each other on persist. Clone-friendly via Arc.
#[derive(Clone)]
pub struct FileBackend {
    run_id: RunId,
    path: PathBuf,
    storage: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl FileBackend {
    /// Open a file backend persisting to `path`. Nothing is read until `load()`.
    pub fn open(run_id: RunId, path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();
        if path.is_dir() {
            return Err(BackendError::Initialization(format!(
                "{} is a directory",
                path.display()
            )));
        }
        Ok(FileBackend {
            run_id,
            path,
            storage: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}

impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<usize, BackendError> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "no existing database, starting empty");
            return Ok(0);
        }

        let records = blob::read(&self.path)?;
        let loaded = records.len();
        let mut storage = self
            .storage
            .write()
            .map_err(|_| BackendError::LockPoisoned("load"))?;
        storage.extend(records);
        info!(count = loaded, path = %self.path.display(), "loaded data from an existing database");
        Ok(loaded)
    }

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| BackendError::LockPoisoned("read"))?;
        Ok(storage.get(key).cloned())
    }

    fn get_raw_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, BackendError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| BackendError::LockPoisoned("read"))?;
        Ok(keys.iter().map(|key| storage.get(key).cloned()).collect())
    }

    fn put_raw(&self, key: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| BackendError::LockPoisoned("write"))?;
        storage.insert(key.to_string(), bytes);
        Ok(())
    }

    fn put_raw_many(&self, pairs: Vec<(String, Vec<u8>)>) -> Result<usize, BackendError> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| BackendError::LockPoisoned("write"))?;
        let written = pairs.len();
        storage.extend(pairs);
        Ok(written)
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| BackendError::LockPoisoned("read"))?;
        Ok(storage.keys().cloned().collect())
    }

    fn count(&self) -> Result<usize, BackendError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| BackendError::LockPoisoned("read"))?;
        Ok(storage.len())
    }

    fn persist(&self) -> Result<(), BackendError> {
        let storage = self
            .storage
            .read()
            .map_err(|_| BackendError::LockPoisoned("persist"))?;
        blob::write(&self.path, storage.iter())?;
        info!(count = storage.len(), path = %self.path.display(), "persisted database");
        Ok(())
    }
}
