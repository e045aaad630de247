use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use redis::{Client, Connection};
use tracing::{debug, error, info, warn};

use super::{blob, Backend, BackendError, RunId};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Networked backend on a Redis server.
///
/// All records of a run live in one hash named after the [`RunId`], so a
/// shared server can host many concurrent runs. Dropping the backend deletes
/// that hash and nothing else; call `persist()` first to keep the data.
/// `cleanup()` does the same explicitly for processes that exit while other
/// threads still hold the backend, and `Drop` then has nothing left to do.
pub struct RedisBackend {
    run_id: RunId,
    namespace: String,
    path: PathBuf,
    conn: Mutex<Connection>,
    cleaned: AtomicBool,
}

impl RedisBackend {
    /// Connect to `url` and ping the server. Fails fast when it is unreachable.
    pub fn connect(url: &str, run_id: RunId, path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let client = Client::open(url).map_err(|e| BackendError::Connection(e.to_string()))?;
        let mut conn = client
            .get_connection_with_timeout(CONNECT_TIMEOUT)
            .map_err(|e| BackendError::Connection(format!("{}: {}", url, e)))?;

        redis::cmd("PING")
            .query::<String>(&mut conn)
            .map_err(|e| BackendError::Connection(format!("{}: {}", url, e)))?;

        let namespace = run_id.namespace();
        debug!(url, namespace = %namespace, "connected to redis");
        Ok(RedisBackend {
            run_id,
            namespace,
            path: path.as_ref().to_path_buf(),
            conn: Mutex::new(conn),
            cleaned: AtomicBool::new(false),
        })
    }

    /// The hash key holding this run's records.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn with_conn<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
        wrap: fn(String) -> BackendError,
    ) -> Result<T, BackendError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| BackendError::LockPoisoned(op))?;
        f(&mut *conn).map_err(|e| wrap(format!("{}: {}", op, e)))
    }

    fn hset_many(&self, pairs: &[(String, Vec<u8>)]) -> Result<(), BackendError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(&self.namespace);
        for (key, bytes) in pairs {
            cmd.arg(key).arg(&bytes[..]);
        }
        self.with_conn("HSET", |conn| cmd.query::<i64>(conn), BackendError::Commit)?;
        Ok(())
    }
}

impl Backend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
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

        let records: Vec<(String, Vec<u8>)> = blob::read(&self.path)?.into_iter().collect();
        self.hset_many(&records)
            .map_err(|e| BackendError::Initialization(e.to_string()))?;
        info!(count = records.len(), path = %self.path.display(), "loaded data from an existing database");
        Ok(records.len())
    }

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.with_conn(
            "HGET",
            |conn| {
                redis::cmd("HGET")
                    .arg(&self.namespace)
                    .arg(key)
                    .query::<Option<Vec<u8>>>(conn)
            },
            BackendError::Query,
        )
    }

    fn get_raw_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, BackendError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(&self.namespace);
        for key in keys {
            cmd.arg(key);
        }
        self.with_conn(
            "HMGET",
            |conn| cmd.query::<Vec<Option<Vec<u8>>>>(conn),
            BackendError::Query,
        )
    }

    fn put_raw(&self, key: &str, bytes: Vec<u8>) -> Result<(), BackendError> {
        self.with_conn(
            "HSET",
            |conn| {
                redis::cmd("HSET")
                    .arg(&self.namespace)
                    .arg(key)
                    .arg(&bytes[..])
                    .query::<i64>(conn)
            },
            BackendError::Commit,
        )?;
        Ok(())
    }

    fn put_raw_many(&self, pairs: Vec<(String, Vec<u8>)>) -> Result<usize, BackendError> {
        self.hset_many(&pairs)?;
        Ok(pairs.len())
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        self.with_conn(
            "HKEYS",
            |conn| {
                redis::cmd("HKEYS")
                    .arg(&self.namespace)
                    .query::<Vec<String>>(conn)
            },
            BackendError::Query,
        )
    }

    fn count(&self) -> Result<usize, BackendError> {
        self.with_conn(
            "HLEN",
            |conn| redis::cmd("HLEN").arg(&self.namespace).query::<usize>(conn),
            BackendError::Query,
        )
    }

    fn persist(&self) -> Result<(), BackendError> {
        let records = self.with_conn(
            "HGETALL",
            |conn| {
                redis::cmd("HGETALL")
                    .arg(&self.namespace)
                    .query::<HashMap<String, Vec<u8>>>(conn)
            },
            BackendError::Persist,
        )?;
        blob::write(&self.path, records.iter())?;
        info!(count = records.len(), path = %self.path.display(), "persisted database");
        Ok(())
    }

    fn cleanup(&self) -> Result<(), BackendError> {
        self.with_conn(
            "DEL",
            |conn| redis::cmd("DEL").arg(&self.namespace).query::<i64>(conn),
            BackendError::Cleanup,
        )?;
        self.cleaned.store(true, Ordering::Release);
        debug!(namespace = %self.namespace, "run data deleted");
        Ok(())
    }
}

impl Drop for RedisBackend {
    fn drop(&mut self) {
        if *self.cleaned.get_mut() {
            return;
        }
        let Ok(conn) = self.conn.get_mut() else {
            return;
        };
        if let Err(err) = redis::cmd("DEL").arg(&self.namespace).query::<i64>(conn) {
            error!(namespace = %self.namespace, error = %err, "failed to clean up run data");
        }
    }
}
