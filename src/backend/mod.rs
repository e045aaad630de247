//! Backend adapters - pluggable persistence underneath the result store.
//!
//! Every backend stores opaque record bytes by string key and agrees on a
//! single persisted blob format (see [`blob`]) so that `persist()` output of
//! one run is valid `load()` input for the next run of the same variant.
//!
//! ## Example
//!
//! ```ignore
//! use design_explorer::backend::{FileBackend, Backend, RunId};
//!
//! let backend = FileBackend::open(RunId::new("gemm"), "result.db")?;
//! backend.load()?;
//! backend.commit("tile-16", &result)?;
//! backend.persist()?;
//! ```

pub mod blob;
mod file;
#[cfg(feature = "redis")]
mod redis_store;
mod run_id;

use std::path::Path;

use thiserror::Error;
use tracing::error;

use crate::config::{BackendKind, DatabaseConfig};
use crate::result::{self, EvalResult};

pub use file::FileBackend;
#[cfg(feature = "redis")]
pub use redis_store::RedisBackend;
pub use run_id::RunId;

/// Error type for backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The persisted blob could not be read back. Fatal at startup.
    #[error("failed to initialize the database: {0}")]
    Initialization(String),
    /// The networked backend is unreachable.
    #[error("backend connection failed: {0}")]
    Connection(String),
    /// A write was rejected by the underlying storage.
    #[error("failed to commit to the database: {0}")]
    Commit(String),
    /// A read failed at the storage level (not a corrupt record).
    #[error("failed to query the database: {0}")]
    Query(String),
    /// Flushing to durable storage failed.
    #[error("failed to persist the database: {0}")]
    Persist(String),
    /// The in-process lock guarding the storage was poisoned.
    #[error("backend lock poisoned during {0}")]
    LockPoisoned(&'static str),
    /// Deleting the run's live data failed.
    #[error("failed to clean up run data: {0}")]
    Cleanup(String),
    /// The selected backend is not compiled into this build.
    #[error("backend {0} is not available in this build")]
    Unavailable(&'static str),
}

/// Uniform commit/query/persist contract implemented by each storage engine.
///
/// Implementors provide the byte-level primitives; the typed operations are
/// provided on top of them and handle record encoding. Corrupt records are
/// reported as absent by `query`/`batch_query` and logged, never raised.
pub trait Backend: Send + Sync {
    /// Short name for logs ("redis", "file").
    fn name(&self) -> &'static str;

    /// The run this backend instance is scoped to.
    fn run_id(&self) -> &RunId;

    /// Path of the persisted blob.
    fn path(&self) -> &Path;

    /// Read previously persisted data into live storage. Returns the number of records loaded.
    fn load(&self) -> Result<usize, BackendError>;

    /// Fetch the raw record bytes stored under `key`.
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Fetch raw record bytes for many keys, one slot per key in input order.
    fn get_raw_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, BackendError>;

    /// Store raw record bytes under `key`, overwriting silently.
    fn put_raw(&self, key: &str, bytes: Vec<u8>) -> Result<(), BackendError>;

    /// Store many raw records. Returns the number of pairs written.
    fn put_raw_many(&self, pairs: Vec<(String, Vec<u8>)>) -> Result<usize, BackendError>;

    /// All known keys.
    fn keys(&self) -> Result<Vec<String>, BackendError>;

    /// Total number of stored entries.
    fn count(&self) -> Result<usize, BackendError>;

    /// Flush current state to the blob file in the format consumed by `load()`.
    fn persist(&self) -> Result<(), BackendError>;

    /// Release the run's live storage once the run is over. Persisted blobs
    /// are untouched. Idempotent.
    fn cleanup(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Commit one result. Last write wins.
    fn commit(&self, key: &str, result: &EvalResult) -> Result<(), BackendError> {
        let bytes = result::encode(result).map_err(|e| BackendError::Commit(e.to_string()))?;
        self.put_raw(key, bytes)
    }

    /// Commit many results, reporting how many were written.
    fn batch_commit(&self, pairs: &[(String, EvalResult)]) -> Result<usize, BackendError> {
        let mut encoded = Vec::with_capacity(pairs.len());
        for (key, result) in pairs {
            let bytes =
                result::encode(result).map_err(|e| BackendError::Commit(e.to_string()))?;
            encoded.push((key.clone(), bytes));
        }
        self.put_raw_many(encoded)
    }

    /// Query one result. Missing and corrupt records are both absent.
    fn query(&self, key: &str) -> Result<Option<EvalResult>, BackendError> {
        Ok(self
            .get_raw(key)?
            .and_then(|bytes| decode_logged(self.name(), key, &bytes)))
    }

    /// Query many results, preserving input order.
    fn batch_query(&self, keys: &[String]) -> Result<Vec<Option<EvalResult>>, BackendError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.get_raw_many(keys)?;
        Ok(keys
            .iter()
            .zip(raw)
            .map(|(key, bytes)| bytes.and_then(|bytes| decode_logged(self.name(), key, &bytes)))
            .collect())
    }

    /// All known keys, sorted.
    fn query_keys(&self) -> Result<Vec<String>, BackendError> {
        let mut keys = self.keys()?;
        keys.sort();
        Ok(keys)
    }
}

fn decode_logged(backend: &str, key: &str, bytes: &[u8]) -> Option<EvalResult> {
    match result::decode(bytes) {
        Ok(result) => Some(result),
        Err(err) => {
            error!(backend, key, error = %err, "failed to deserialize stored result");
            None
        }
    }
}

/// Construct the backend selected by configuration.
pub fn open(config: &DatabaseConfig, run_id: RunId) -> Result<Box<dyn Backend>, BackendError> {
    match config.backend {
        BackendKind::File => Ok(Box::new(FileBackend::open(run_id, &config.path)?)),
        #[cfg(feature = "redis")]
        BackendKind::Redis => Ok(Box::new(RedisBackend::connect(
            &config.url,
            run_id,
            &config.path,
        )?)),
        #[cfg(not(feature = "redis"))]
        BackendKind::Redis => Err(BackendError::Unavailable("redis")),
    }
}
