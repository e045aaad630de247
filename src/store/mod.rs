//! Result store - the facade shared by the orchestrator and every worker.
//!
//! Owns exactly one [`Backend`], the bounded [`BestCache`] and the
//! [`CodeHashSet`]. Commits go to the backend first; only results the backend
//! accepted are ranked. Backend failures are returned as errors for the
//! caller to escalate, because exploration cannot continue against a store
//! that silently drops results.
//!
//! ## Example
//!
//! ```ignore
//! use design_explorer::{ResultStore, QualityPolicy};
//! use design_explorer::backend::{FileBackend, RunId};
//!
//! let backend = FileBackend::open(RunId::new("gemm"), "result.db")?;
//! let store = ResultStore::new(Box::new(backend), 4, QualityPolicy::HigherIsBetter);
//! store.load()?;
//! store.commit(&point.key(), &result)?;
//! store.trim_best_cache()?;
//! store.persist()?;
//! ```

mod best_cache;
mod code_hash;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::backend::{Backend, BackendError};
use crate::result::{EvalResult, RetCode};

pub use best_cache::{BestCache, CacheEntry, QualityPolicy};
pub use code_hash::CodeHashSet;

/// Error type for result store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The backend wrote a different number of records than requested.
    #[error("batch commit wrote {actual} of {expected} results")]
    BatchMismatch { expected: usize, actual: usize },
    #[error("result store lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

pub struct ResultStore {
    backend: Box<dyn Backend>,
    best: BestCache,
    code_hashes: CodeHashSet,
}

impl ResultStore {
    pub fn new(backend: Box<dyn Backend>, best_cache_size: usize, policy: QualityPolicy) -> Self {
        ResultStore {
            backend,
            best: BestCache::new(best_cache_size, policy),
            code_hashes: CodeHashSet::new(),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn best_cache(&self) -> &BestCache {
        &self.best
    }

    pub fn policy(&self) -> QualityPolicy {
        self.best.policy()
    }

    /// Load persisted data, then rebuild the best-cache and dedup set from it.
    pub fn load(&self) -> Result<usize, StoreError> {
        let loaded = self.backend.load()?;
        self.init_best_cache()?;
        self.init_dedup_set()?;
        Ok(loaded)
    }

    /// Rank every valid stored result.
    pub fn init_best_cache(&self) -> Result<usize, StoreError> {
        let mut ranked = 0;
        for result in self.query_all()? {
            if self.best.insert(result)? {
                ranked += 1;
            }
        }
        if ranked > 0 {
            info!(ranked, "best cache initialized from stored results");
        }
        Ok(ranked)
    }

    /// Record the code hash of every stored toolchain-stage result.
    pub fn init_dedup_set(&self) -> Result<usize, StoreError> {
        let mut added = 0;
        for result in self.query_all()? {
            if let Some(hash) = result.code_hash() {
                if self.code_hashes.insert(hash)? {
                    added += 1;
                }
            }
        }
        if added > 0 {
            info!(added, "code hash set initialized from stored results");
        }
        Ok(added)
    }

    /// Commit one result and rank it if it carries a usable quality.
    pub fn commit(&self, key: &str, result: &EvalResult) -> Result<(), StoreError> {
        if let Err(err) = self.backend.commit(key, result) {
            error!(key, error = %err, "failed to commit result to the database");
            return Err(err.into());
        }
        self.best.insert(result.clone())?;
        debug!(key, quality = ?result.quality, ret_code = %result.ret_code, "committed result");
        Ok(())
    }

    /// Commit many results. A short write is fatal; the batch is never partially retried.
    pub fn batch_commit(&self, pairs: &[(String, EvalResult)]) -> Result<usize, StoreError> {
        let written = match self.backend.batch_commit(pairs) {
            Ok(written) => written,
            Err(err) => {
                error!(count = pairs.len(), error = %err, "failed to commit results to the database");
                return Err(err.into());
            }
        };
        if written != pairs.len() {
            error!(
                expected = pairs.len(),
                actual = written,
                "failed to commit results to the database"
            );
            return Err(StoreError::BatchMismatch {
                expected: pairs.len(),
                actual: written,
            });
        }
        for (_, result) in pairs {
            self.best.insert(result.clone())?;
        }
        Ok(written)
    }

    pub fn query(&self, key: &str) -> Result<Option<EvalResult>, StoreError> {
        Ok(self.backend.query(key)?)
    }

    pub fn batch_query(&self, keys: &[String]) -> Result<Vec<Option<EvalResult>>, StoreError> {
        Ok(self.backend.batch_query(keys)?)
    }

    pub fn query_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.backend.query_keys()?)
    }

    /// Every readable result in the store. Corrupt records are skipped.
    pub fn query_all(&self) -> Result<Vec<EvalResult>, StoreError> {
        let keys = self.backend.query_keys()?;
        Ok(self
            .backend
            .batch_query(&keys)?
            .into_iter()
            .flatten()
            .collect())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.backend.count()?)
    }

    /// Number of stored results with the given outcome. Scans the whole store.
    pub fn count_by_outcome(&self, ret_code: RetCode) -> Result<usize, StoreError> {
        Ok(self
            .query_all()?
            .iter()
            .filter(|r| r.ret_code == ret_code)
            .count())
    }

    /// Admit a generated-code hash. False means an identical artifact was already seen.
    pub fn add_code_hash(&self, hash: &str) -> Result<bool, StoreError> {
        self.code_hashes.insert(hash)
    }

    pub fn code_hash_count(&self) -> Result<usize, StoreError> {
        self.code_hashes.len()
    }

    /// Evict the lowest-ranked best-cache entries beyond the configured size.
    pub fn trim_best_cache(&self) -> Result<usize, StoreError> {
        self.best.trim_to_bound()
    }

    pub fn best_cache_len(&self) -> Result<usize, StoreError> {
        self.best.len()
    }

    pub fn peek_best(&self) -> Result<Option<CacheEntry>, StoreError> {
        self.best.peek_best()
    }

    pub fn pop_best(&self) -> Result<Option<CacheEntry>, StoreError> {
        self.best.pop_best()
    }

    /// Release the backend's live storage. Safe to call while other handles
    /// to the store are still alive.
    pub fn cleanup(&self) -> Result<(), StoreError> {
        if let Err(err) = self.backend.cleanup() {
            error!(backend = self.backend.name(), error = %err, "failed to clean up the database");
            return Err(err.into());
        }
        Ok(())
    }

    /// Take the final output set: at most `bound` entries, best first.
    pub fn drain_best(&self) -> Result<Vec<CacheEntry>, StoreError> {
        self.best.drain_bounded()
    }

    /// Flush to durable storage. Call once, after every worker has stopped.
    pub fn persist(&self) -> Result<(), StoreError> {
        if let Err(err) = self.backend.persist() {
            error!(path = %self.backend.path().display(), error = %err, "failed to persist the database");
            return Err(err.into());
        }
        Ok(())
    }
}
