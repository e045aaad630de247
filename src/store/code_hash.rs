use std::collections::HashSet;
use std::sync::Mutex;

use super::StoreError;

/// Set of generated-code hashes seen so far. Grows monotonically.
#[derive(Default)]
pub struct CodeHashSet {
    hashes: Mutex<HashSet<String>>,
}

impl CodeHashSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-and-insert under one lock. Returns true only for the first caller per hash.
    pub fn insert(&self, hash: &str) -> Result<bool, StoreError> {
        let mut hashes = self
            .hashes
            .lock()
            .map_err(|_| StoreError::LockPoisoned("code hash insert"))?;
        if hashes.contains(hash) {
            return Ok(false);
        }
        Ok(hashes.insert(hash.to_string()))
    }

    pub fn contains(&self, hash: &str) -> Result<bool, StoreError> {
        let hashes = self
            .hashes
            .lock()
            .map_err(|_| StoreError::LockPoisoned("code hash read"))?;
        Ok(hashes.contains(hash))
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let hashes = self
            .hashes
            .lock()
            .map_err(|_| StoreError::LockPoisoned("code hash read"))?;
        Ok(hashes.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
