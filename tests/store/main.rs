mod faulty;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use design_explorer::backend::{FileBackend, RunId};
use design_explorer::{
    DesignPoint, EvalResult, EvalStage, ParamValue, QualityPolicy, ResultStore, RetCode,
    StoreError,
};
use faulty::FaultyBackend;
use proptest::prelude::*;

fn file_store(path: &std::path::Path, size: usize) -> ResultStore {
    let backend = FileBackend::open(RunId::with_parts("gemm", 1, 1), path).unwrap();
    ResultStore::new(Box::new(backend), size, QualityPolicy::HigherIsBetter)
}

fn point(tag: i64) -> DesignPoint {
    DesignPoint::new().with("tag", tag)
}

fn tag_of(result: &EvalResult) -> i64 {
    match result.point.as_ref().and_then(|p| p.get("tag")) {
        Some(ParamValue::Int(tag)) => *tag,
        other => panic!("unexpected tag {:?}", other),
    }
}

#[test]
fn persisted_store_reloads_into_fresh_process() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("result.db");

    let store = file_store(&db, 2);
    let pairs = vec![
        (point(0).key(), EvalResult::toolchain(point(0), 5.0, Some("h0".into()))),
        (point(1).key(), EvalResult::toolchain(point(1), 9.0, Some("h1".into()))),
        (
            point(2).key(),
            EvalResult::failed(Some(point(2)), RetCode::Timeout, EvalStage::Estimate),
        ),
        (point(3).key(), EvalResult::estimate(point(3), 7.0)),
    ];
    assert_eq!(store.batch_commit(&pairs).unwrap(), 4);
    store.persist().unwrap();
    drop(store);

    let reloaded = file_store(&db, 2);
    assert_eq!(reloaded.load().unwrap(), 4);
    assert_eq!(reloaded.count().unwrap(), 4);
    assert_eq!(
        reloaded.query_keys().unwrap(),
        vec!["tag-0", "tag-1", "tag-2", "tag-3"]
    );
    assert_eq!(
        reloaded.query(&point(1).key()).unwrap(),
        Some(pairs[1].1.clone())
    );

    reloaded.trim_best_cache().unwrap();
    let best: Vec<f64> = reloaded
        .best_cache()
        .snapshot()
        .unwrap()
        .iter()
        .map(|e| e.quality)
        .collect();
    assert_eq!(best, vec![9.0, 7.0]);
    assert!(!reloaded.add_code_hash("h0").unwrap());
    assert!(reloaded.add_code_hash("h9").unwrap());
}

#[test]
fn missing_database_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("absent.db"), 1);
    assert_eq!(store.load().unwrap(), 0);
    assert_eq!(store.count().unwrap(), 0);
    assert!(store.peek_best().unwrap().is_none());
}

#[test]
fn corrupt_record_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("result.db"), 4);
    store
        .commit("good", &EvalResult::estimate(point(1), 1.0))
        .unwrap();
    store.backend().put_raw("bad", Vec::new()).unwrap();

    assert_eq!(store.query("bad").unwrap(), None);
    assert_eq!(store.count().unwrap(), 2);

    let keys = vec!["bad".to_string(), "good".to_string(), "none".to_string()];
    let results = store.batch_query(&keys).unwrap();
    assert!(results[0].is_none());
    assert_eq!(results[1].as_ref().map(tag_of), Some(1));
    assert!(results[2].is_none());
    assert_eq!(store.query_all().unwrap().len(), 1);
}

#[test]
fn cleanup_leaves_file_database_intact() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("result.db");
    let store = Arc::new(file_store(&db, 2));
    store
        .commit("k", &EvalResult::estimate(point(1), 1.0))
        .unwrap();
    store.persist().unwrap();

    let worker_handle = Arc::clone(&store);
    store.cleanup().unwrap();
    store.cleanup().unwrap();

    assert_eq!(worker_handle.count().unwrap(), 1);
    let reloaded = file_store(&db, 2);
    assert_eq!(reloaded.load().unwrap(), 1);
}

#[test]
fn commit_overwrites_silently() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("result.db"), 4);
    store.commit("k", &EvalResult::estimate(point(1), 1.0)).unwrap();
    store.commit("k", &EvalResult::estimate(point(2), 2.0)).unwrap();

    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(store.query("k").unwrap().as_ref().map(tag_of), Some(2));
}

#[test]
fn equal_quality_keeps_earliest_commit() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("result.db"), 2);
    let cache = store.best_cache();
    let t0 = SystemTime::now();

    for (tag, quality, offset) in [(0, 10.0, 0), (1, 30.0, 1), (2, 20.0, 2), (3, 30.0, 3)] {
        cache
            .insert_at(
                EvalResult::estimate(point(tag), quality),
                t0 + Duration::from_millis(offset),
            )
            .unwrap();
    }
    store.trim_best_cache().unwrap();

    let first = store.pop_best().unwrap().unwrap();
    let second = store.pop_best().unwrap().unwrap();
    assert_eq!((first.quality, tag_of(&first.result)), (30.0, 1));
    assert_eq!((second.quality, tag_of(&second.result)), (30.0, 3));
    assert!(store.pop_best().unwrap().is_none());
}

#[test]
fn short_batch_write_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FaultyBackend::new(&dir.path().join("result.db"));
    let store = ResultStore::new(Box::new(backend), 4, QualityPolicy::HigherIsBetter);

    let pairs: Vec<_> = (0..3)
        .map(|i| (point(i).key(), EvalResult::estimate(point(i), i as f64)))
        .collect();
    let err = store.batch_commit(&pairs).unwrap_err();
    assert!(matches!(
        err,
        StoreError::BatchMismatch {
            expected: 3,
            actual: 2
        }
    ));
    assert_eq!(store.best_cache_len().unwrap(), 0);
}

#[test]
fn rejected_commit_is_not_ranked() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FaultyBackend::new(&dir.path().join("result.db"));
    let store = ResultStore::new(Box::new(backend), 4, QualityPolicy::HigherIsBetter);

    let err = store
        .commit("reject-me", &EvalResult::estimate(point(1), 3.0))
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)));
    assert_eq!(store.best_cache_len().unwrap(), 0);
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn concurrent_code_hash_is_admitted_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(file_store(&dir.path().join("result.db"), 1));
    let admitted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                if store.add_code_hash("same-code").unwrap() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    assert_eq!(store.code_hash_count().unwrap(), 1);
}

#[test]
fn concurrent_commits_respect_bound_after_trim() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(file_store(&dir.path().join("result.db"), 3));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    let tag = worker * 100 + i;
                    store
                        .commit(&point(tag).key(), &EvalResult::estimate(point(tag), tag as f64))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    store.trim_best_cache().unwrap();

    assert_eq!(store.count().unwrap(), 100);
    let kept: Vec<f64> = store
        .best_cache()
        .drain_best()
        .unwrap()
        .iter()
        .map(|e| e.quality)
        .collect();
    assert_eq!(kept, vec![324.0, 323.0, 322.0]);
}

proptest! {
    #[test]
    fn trim_keeps_top_k_with_earliest_ties(
        qualities in prop::collection::vec(0u8..12, 0..40),
        bound in 1usize..6,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir.path().join("result.db"), bound);
        let t0 = SystemTime::now();
        for (i, q) in qualities.iter().enumerate() {
            store
                .best_cache()
                .insert_at(
                    EvalResult::estimate(point(i as i64), *q as f64),
                    t0 + Duration::from_millis(i as u64),
                )
                .unwrap();
        }
        store.trim_best_cache().unwrap();

        let mut expected: Vec<(usize, u8)> = qualities.iter().copied().enumerate().collect();
        expected.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        expected.truncate(bound);

        let kept: Vec<(usize, u8)> = store
            .best_cache()
            .drain_best()
            .unwrap()
            .iter()
            .map(|e| (tag_of(&e.result) as usize, e.quality as u8))
            .collect();
        prop_assert_eq!(kept, expected);
    }
}
