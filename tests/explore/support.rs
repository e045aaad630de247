//! Scripted collaborators for orchestrator tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use design_explorer::backend::{FileBackend, RunId};
use design_explorer::{
    Config, DesignPoint, EvalError, EvalResult, EvalStage, Evaluator, ExhaustiveExplorer,
    ExploreError, Explorer, GridCompiler, GridSpace, Interrupt, Job, Orchestrator, ParamValue,
    QualityPolicy, ResultStore, RetCode, RunOptions, TextReporter, WorkerContext, WorkerStats,
};

type QualityFn = Box<dyn Fn(&DesignPoint) -> Option<f64> + Send + Sync>;

/// Evaluator with real job directories and a scripted quality per point.
pub struct ScriptedEvaluator {
    root: PathBuf,
    next: AtomicU64,
    budget: Option<u64>,
    job_delay: Duration,
    quality: QualityFn,
    /// When set, every point except `x = 0` waits for this interrupt, then times out.
    gate: Option<Interrupt>,
    pub evaluations: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new(
        root: &Path,
        quality: impl Fn(&DesignPoint) -> Option<f64> + Send + Sync + 'static,
    ) -> Self {
        ScriptedEvaluator {
            root: root.to_path_buf(),
            next: AtomicU64::new(0),
            budget: None,
            job_delay: Duration::ZERO,
            quality: Box::new(quality),
            gate: None,
            evaluations: AtomicUsize::new(0),
        }
    }

    pub fn with_budget(mut self, jobs: u64) -> Self {
        self.budget = Some(jobs);
        self
    }

    /// Make every job allocation take `delay`.
    pub fn with_job_delay(mut self, delay: Duration) -> Self {
        self.job_delay = delay;
        self
    }

    pub fn gated_by(mut self, interrupt: Interrupt) -> Self {
        self.gate = Some(interrupt);
        self
    }
}

pub fn int_param(point: &DesignPoint, name: &str) -> i64 {
    match point.get(name) {
        Some(ParamValue::Int(v)) => *v,
        other => panic!("unexpected {} value {:?}", name, other),
    }
}

impl Evaluator for ScriptedEvaluator {
    fn create_job(&self) -> Option<Job> {
        thread::sleep(self.job_delay);
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        if self.budget.is_some_and(|budget| id >= budget) {
            return None;
        }
        let path = self.root.join(format!("job{}", id));
        fs::create_dir_all(&path).ok()?;
        Some(Job { id, path })
    }

    fn apply_design_point(&self, job: &Job, point: &DesignPoint) -> Result<(), EvalError> {
        let path = job.path.join("point.txt");
        fs::write(&path, point.key()).map_err(|source| EvalError::Io { path, source })
    }

    fn code_hash(&self, _job: &Job) -> Result<Option<String>, EvalError> {
        Ok(None)
    }

    fn evaluate(&self, _job: &Job, point: &DesignPoint) -> EvalResult {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if int_param(point, "x") != 0 {
                let give_up = Instant::now() + Duration::from_secs(10);
                while !gate.is_triggered() && Instant::now() < give_up {
                    thread::sleep(Duration::from_millis(5));
                }
                return EvalResult::failed(
                    Some(point.clone()),
                    RetCode::Timeout,
                    EvalStage::Toolchain { code_hash: None },
                );
            }
        }
        match (self.quality)(point) {
            Some(quality) => EvalResult::toolchain(point.clone(), quality, None),
            None => EvalResult::failed(
                Some(point.clone()),
                RetCode::EvaluatorError,
                EvalStage::Toolchain { code_hash: None },
            ),
        }
    }

    fn release_job(&self, job: Job) {
        let _ = fs::remove_dir_all(job.path);
    }
}

/// Explorer that ignores the interrupt and commits ever better results
/// until `running_for` has passed.
pub struct RelentlessExplorer {
    pub running_for: Duration,
}

impl Explorer<GridSpace> for RelentlessExplorer {
    fn explore(
        &self,
        _partition: GridSpace,
        ctx: &WorkerContext,
    ) -> Result<WorkerStats, ExploreError> {
        let mut stats = WorkerStats::default();
        let until = Instant::now() + self.running_for;
        let mut n: i64 = 0;
        while Instant::now() < until {
            let point = DesignPoint::new().with("n", n);
            let key = format!("{}.{}", ctx.tag, point.key());
            let result = EvalResult::toolchain(point, n as f64, None);
            ctx.store.commit(&key, &result)?;
            stats.evaluated += 1;
            n += 1;
            thread::sleep(Duration::from_millis(1));
        }
        Ok(stats)
    }
}

/// Directory layout of one test run.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    max_parts: usize,
    workers_per_part: usize,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("work")).unwrap();
        Fixture {
            dir,
            max_parts: 2,
            workers_per_part: 2,
        }
    }

    /// One partition, one point at a time.
    pub fn serial(mut self) -> Self {
        self.max_parts = 1;
        self.workers_per_part = 1;
        self
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.work_dir().join("output")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.work_dir().join("evaluate")
    }

    pub fn db_path(&self) -> PathBuf {
        self.work_dir().join("result.db")
    }

    /// A store over this fixture's database, loaded from disk.
    pub fn store(&self, output_num: usize) -> Arc<ResultStore> {
        let backend = FileBackend::open(RunId::with_parts("gemm", 1, 1), self.db_path()).unwrap();
        let store = ResultStore::new(Box::new(backend), output_num, QualityPolicy::HigherIsBetter);
        store.load().unwrap();
        Arc::new(store)
    }

    pub fn orchestrator(
        &self,
        definition: serde_json::Value,
        store: Arc<ResultStore>,
        evaluator: Arc<ScriptedEvaluator>,
        interrupt: Interrupt,
    ) -> Orchestrator<GridCompiler> {
        self.orchestrator_with(
            definition,
            store,
            evaluator,
            Arc::new(ExhaustiveExplorer),
            interrupt,
        )
    }

    pub fn orchestrator_with(
        &self,
        definition: serde_json::Value,
        store: Arc<ResultStore>,
        evaluator: Arc<ScriptedEvaluator>,
        explorer: Arc<dyn Explorer<GridSpace>>,
        interrupt: Interrupt,
    ) -> Orchestrator<GridCompiler> {
        let config = Config::from_json(&format!(
            r#"{{
                "project": {{ "name": "gemm", "output-num": {} }},
                "design-space": {{ "definition": {}, "max-part-num": {} }},
                "search": {{ "poll-interval-ms": 10 }},
                "evaluate": {{ "command": "true", "worker-per-part": {} }}
            }}"#,
            store.best_cache().bound(),
            definition,
            self.max_parts,
            self.workers_per_part
        ))
        .unwrap();
        let reporter = Arc::new(TextReporter::new(Arc::clone(&store), config.clone()));

        Orchestrator::new(
            GridCompiler,
            definition,
            store,
            explorer,
            evaluator,
            reporter,
            RunOptions::from_config(&config, self.work_dir()),
            interrupt,
        )
    }
}
