//! Backend wrapper that injects write failures.

use std::path::Path;

use design_explorer::backend::{Backend, BackendError, FileBackend, RunId};

/// Delegates to a [`FileBackend`], except that keys starting with `reject` fail
/// to commit and batch writes silently drop their last pair.
pub struct FaultyBackend {
    inner: FileBackend,
}

impl FaultyBackend {
    pub fn new(path: &Path) -> Self {
        FaultyBackend {
            inner: FileBackend::open(RunId::with_parts("faulty", 1, 1), path).unwrap(),
        }
    }
}

impl Backend for FaultyBackend {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn run_id(&self) -> &RunId {
        self.inner.run_id()
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn load(&self) -> Result<usize, BackendError> {
        self.inner.load()
    }

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.get_raw(key)
    }

    fn get_raw_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, BackendError> {
        self.inner.get_raw_many(keys)
    }

    fn put_raw(&self, key: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        if key.starts_with("reject") {
            return Err(BackendError::Commit(format!("{} rejected", key)));
        }
        self.inner.put_raw(key, bytes)
    }

    fn put_raw_many(&self, mut pairs: Vec<(String, Vec<u8>)>) -> Result<usize, BackendError> {
        pairs.pop();
        self.inner.put_raw_many(pairs)
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        self.inner.keys()
    }

    fn count(&self) -> Result<usize, BackendError> {
        self.inner.count()
    }

    fn persist(&self) -> Result<(), BackendError> {
        self.inner.persist()
    }
}
