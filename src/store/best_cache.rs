use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::SystemTime;

use serde::Deserialize;

use super::StoreError;
use crate::result::EvalResult;

/// Which direction of the quality metric counts as better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityPolicy {
    #[default]
    HigherIsBetter,
    LowerIsBetter,
}

impl QualityPolicy {
    /// Order two qualities so that the better one compares as `Less`.
    pub fn rank(self, a: f64, b: f64) -> Ordering {
        match self {
            QualityPolicy::HigherIsBetter => b.total_cmp(&a),
            QualityPolicy::LowerIsBetter => a.total_cmp(&b),
        }
    }

    /// True when `a` is strictly better than `b`.
    pub fn is_better(self, a: f64, b: f64) -> bool {
        self.rank(a, b) == Ordering::Less
    }
}

/// Position of an entry in the cache: best first, then earliest commit.
#[derive(Debug, Clone, Copy)]
struct RankKey {
    policy: QualityPolicy,
    quality: f64,
    committed_at: SystemTime,
    seq: u64,
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.policy
            .rank(self.quality, other.quality)
            .then_with(|| self.committed_at.cmp(&other.committed_at))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// One retained result with the quality and commit time it was ranked by.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub quality: f64,
    pub committed_at: SystemTime,
    pub result: EvalResult,
}

/// Bounded collection of the best results seen so far.
///
/// Any number of threads may insert. Trimming and draining happen from the
/// supervising thread only. `trim_to_bound` evicts under the same lock that
/// guards insertion, so a concurrent insert can never land between the size
/// check and the eviction. The bound is still soft while workers run: the
/// cache may exceed it between two trims.
pub struct BestCache {
    policy: QualityPolicy,
    bound: usize,
    seq: AtomicU64,
    entries: Mutex<BTreeMap<RankKey, EvalResult>>,
}

impl BestCache {
    pub fn new(bound: usize, policy: QualityPolicy) -> Self {
        BestCache {
            policy,
            bound,
            seq: AtomicU64::new(0),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn policy(&self) -> QualityPolicy {
        self.policy
    }

    /// Rank a result committed now. Results without a usable quality are ignored.
    pub fn insert(&self, result: EvalResult) -> Result<bool, StoreError> {
        self.insert_at(result, SystemTime::now())
    }

    /// Rank a result as if it had been committed at `committed_at`.
    pub fn insert_at(
        &self,
        result: EvalResult,
        committed_at: SystemTime,
    ) -> Result<bool, StoreError> {
        let quality = match result.quality {
            Some(quality) if result.has_quality() => quality,
            _ => return Ok(false),
        };
        let key = RankKey {
            policy: self.policy,
            quality,
            committed_at,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
        };
        self.lock("insert")?.insert(key, result);
        Ok(true)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock("len")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock("len")?.is_empty())
    }

    /// Evict the worst entries until at most `bound` remain. Returns the number evicted.
    pub fn trim_to_bound(&self) -> Result<usize, StoreError> {
        let mut entries = self.lock("trim")?;
        let mut evicted = 0;
        while entries.len() > self.bound {
            entries.pop_last();
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Trim to the bound and drain what remains, best first, under one lock.
    /// Inserts racing with the call land in the emptied cache afterwards.
    pub fn drain_bounded(&self) -> Result<Vec<CacheEntry>, StoreError> {
        let entries = std::mem::take(&mut *self.lock("drain")?);
        Ok(entries
            .into_iter()
            .take(self.bound)
            .map(|(key, result)| entry(&key, result))
            .collect())
    }

    /// A copy of the current best entry.
    pub fn peek_best(&self) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self
            .lock("peek")?
            .first_key_value()
            .map(|(key, result)| entry(key, result.clone())))
    }

    /// Remove and return the current best entry.
    pub fn pop_best(&self) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self
            .lock("pop")?
            .pop_first()
            .map(|(key, result)| entry(&key, result)))
    }

    /// Remove every entry, best first.
    pub fn drain_best(&self) -> Result<Vec<CacheEntry>, StoreError> {
        let entries = std::mem::take(&mut *self.lock("drain")?);
        Ok(entries
            .into_iter()
            .map(|(key, result)| entry(&key, result))
            .collect())
    }

    /// Copy of every entry, best first.
    pub fn snapshot(&self) -> Result<Vec<CacheEntry>, StoreError> {
        Ok(self
            .lock("snapshot")?
            .iter()
            .map(|(key, result)| entry(key, result.clone()))
            .collect())
    }

    fn lock(
        &self,
        op: &'static str,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<RankKey, EvalResult>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned(op))
    }
}

fn entry(key: &RankKey, result: EvalResult) -> CacheEntry {
    CacheEntry {
        quality: key.quality,
        committed_at: key.committed_at,
        result,
    }
}
