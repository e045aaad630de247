mod support;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use design_explorer::{ExploreError, Interrupt, RunOutcome, RunState, SpaceError};
use serde_json::json;
use support::{int_param, Fixture, RelentlessExplorer, ScriptedEvaluator};

#[test]
fn full_run_materializes_best_results() {
    let fx = Fixture::new();
    let store = fx.store(3);
    let evaluator = Arc::new(ScriptedEvaluator::new(&fx.jobs_dir(), |p| {
        Some((int_param(p, "x") * 10 + int_param(p, "y")) as f64)
    }));
    let mut orchestrator = fx.orchestrator(
        json!({ "x": [0, 1, 2, 3, 4], "y": [1, 2] }),
        Arc::clone(&store),
        Arc::clone(&evaluator),
        Interrupt::new(),
    );
    assert_eq!(orchestrator.state(), RunState::Idle);

    let report = orchestrator.run().unwrap();

    assert_eq!(orchestrator.state(), RunState::Done);
    assert_eq!(report.outcome, RunOutcome::Materialized(3));
    assert!(!report.interrupted);
    assert_eq!(evaluator.evaluations.load(Ordering::SeqCst), 10);
    assert_eq!(store.count().unwrap(), 10);

    let qualities: Vec<f64> = report.outputs.iter().filter_map(|r| r.quality).collect();
    assert_eq!(qualities, vec![42.0, 41.0, 32.0]);
    for (slot, result) in report.outputs.iter().enumerate() {
        assert_eq!(result.path.as_deref(), Some(slot.to_string().as_str()));
        let applied = fs::read_to_string(fx.output_dir().join(slot.to_string()).join("point.txt"))
            .unwrap();
        assert_eq!(applied, result.point.as_ref().unwrap().key());
    }

    assert!(report.summary_report.is_file());
    let summary = fs::read_to_string(&report.summary_report).unwrap();
    assert!(summary.contains("explored points  : 10"));
    let output_report = fs::read_to_string(report.output_report.unwrap()).unwrap();
    assert!(output_report.contains("x-4.y-2"));
    assert!(fx.db_path().is_file());
    assert_eq!(store.best_cache_len().unwrap(), 0);
}

#[test]
fn run_without_valid_results_reports_no_results() {
    let fx = Fixture::new();
    let store = fx.store(2);
    let evaluator = Arc::new(ScriptedEvaluator::new(&fx.jobs_dir(), |_| None));
    let mut orchestrator = fx.orchestrator(
        json!({ "x": [0, 1, 2] }),
        Arc::clone(&store),
        evaluator,
        Interrupt::new(),
    );

    let report = orchestrator.run().unwrap();

    assert_eq!(report.outcome, RunOutcome::NoResults);
    assert!(report.outputs.is_empty());
    assert!(report.output_report.is_none());
    assert!(report.summary_report.is_file());
    assert!(fx.output_dir().is_dir());
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn interrupt_drains_committed_results() {
    let fx = Fixture::new().serial();
    let store = fx.store(2);
    let interrupt = Interrupt::new();
    let evaluator = Arc::new(
        ScriptedEvaluator::new(&fx.jobs_dir(), |p| Some(int_param(p, "x") as f64 + 1.0))
            .gated_by(interrupt.clone()),
    );
    let mut orchestrator = fx.orchestrator(
        json!({ "x": [0, 1, 2, 3] }),
        Arc::clone(&store),
        evaluator,
        interrupt.clone(),
    );

    let watcher = {
        let store = Arc::clone(&store);
        let interrupt = interrupt.clone();
        thread::spawn(move || {
            let give_up = Instant::now() + Duration::from_secs(10);
            while store.count().unwrap() == 0 && Instant::now() < give_up {
                thread::sleep(Duration::from_millis(5));
            }
            interrupt.trigger();
        })
    };

    let report = orchestrator.run().unwrap();
    watcher.join().unwrap();

    assert!(report.interrupted);
    assert_eq!(report.outcome, RunOutcome::Materialized(1));
    assert_eq!(report.outputs[0].quality, Some(1.0));
    let output_report = fs::read_to_string(report.output_report.unwrap()).unwrap();
    assert!(!output_report.is_empty());
}

#[test]
fn commits_after_interrupt_do_not_add_outputs() {
    let fx = Fixture::new();
    let store = fx.store(1);
    let interrupt = Interrupt::new();
    let evaluator = Arc::new(
        ScriptedEvaluator::new(&fx.jobs_dir(), |_| Some(1.0))
            .with_job_delay(Duration::from_millis(50)),
    );
    let mut orchestrator = fx.orchestrator_with(
        json!({ "x": [0, 1] }),
        Arc::clone(&store),
        evaluator,
        Arc::new(RelentlessExplorer {
            running_for: Duration::from_millis(1500),
        }),
        interrupt.clone(),
    );

    let watcher = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let give_up = Instant::now() + Duration::from_secs(10);
            while store.count().unwrap() == 0 && Instant::now() < give_up {
                thread::sleep(Duration::from_millis(5));
            }
            interrupt.trigger();
        })
    };

    let report = orchestrator.run().unwrap();
    watcher.join().unwrap();

    assert!(report.interrupted);
    assert_eq!(report.outcome, RunOutcome::Materialized(1));
    assert_eq!(report.outputs.len(), 1);
    let slots: Vec<_> = fs::read_dir(fx.output_dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .filter(|name| name != "output.rpt")
        .collect();
    assert_eq!(slots, vec!["0"]);
}

#[test]
fn interrupt_before_any_commit_yields_no_results() {
    let fx = Fixture::new();
    let store = fx.store(2);
    let interrupt = Interrupt::new();
    interrupt.trigger();
    let evaluator = Arc::new(ScriptedEvaluator::new(&fx.jobs_dir(), |_| Some(1.0)));
    let mut orchestrator = fx.orchestrator(
        json!({ "x": [0, 1, 2, 3] }),
        Arc::clone(&store),
        Arc::clone(&evaluator),
        interrupt,
    );

    let report = orchestrator.run().unwrap();

    assert!(report.interrupted);
    assert_eq!(report.outcome, RunOutcome::NoResults);
    assert!(report.output_report.is_none());
    assert_eq!(evaluator.evaluations.load(Ordering::SeqCst), 0);
}

#[test]
fn job_allocation_failure_fails_the_run() {
    let fx = Fixture::new();
    let store = fx.store(1);
    let evaluator = Arc::new(
        ScriptedEvaluator::new(&fx.jobs_dir(), |p| Some(int_param(p, "x") as f64)).with_budget(2),
    );
    let mut orchestrator = fx.orchestrator(
        json!({ "x": [0, 1] }),
        Arc::clone(&store),
        evaluator,
        Interrupt::new(),
    );

    let err = orchestrator.run().unwrap_err();

    assert!(matches!(err, ExploreError::JobAllocation));
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn invalid_design_space_fails_before_running() {
    let fx = Fixture::new();
    let store = fx.store(1);
    let evaluator = Arc::new(ScriptedEvaluator::new(&fx.jobs_dir(), |_| Some(1.0)));
    let mut orchestrator = fx.orchestrator(
        json!({ "x": [] }),
        store,
        Arc::clone(&evaluator),
        Interrupt::new(),
    );

    let err = orchestrator.run().unwrap_err();

    assert!(matches!(err, ExploreError::Space(SpaceError::Compile(_))));
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert_eq!(evaluator.evaluations.load(Ordering::SeqCst), 0);
}

#[test]
fn second_run_resumes_from_persisted_results() {
    let fx = Fixture::new();
    let definition = json!({ "x": [0, 1, 2, 3] });

    let first = Arc::new(ScriptedEvaluator::new(&fx.jobs_dir(), |p| {
        Some(int_param(p, "x") as f64)
    }));
    fx.orchestrator(definition.clone(), fx.store(2), Arc::clone(&first), Interrupt::new())
        .run()
        .unwrap();
    assert_eq!(first.evaluations.load(Ordering::SeqCst), 4);

    let second = Arc::new(ScriptedEvaluator::new(&fx.jobs_dir(), |_| Some(100.0)));
    let report = fx
        .orchestrator(definition, fx.store(2), Arc::clone(&second), Interrupt::new())
        .run()
        .unwrap();

    assert_eq!(second.evaluations.load(Ordering::SeqCst), 0);
    assert_eq!(report.outcome, RunOutcome::Materialized(2));
    let qualities: Vec<f64> = report.outputs.iter().filter_map(|r| r.quality).collect();
    assert_eq!(qualities, vec![3.0, 2.0]);
}
