use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::interrupt::SupervisorEvent;
use super::{ExploreError, Explorer, Interrupt, WorkerContext, WorkerStats};
use crate::config::Config;
use crate::evaluator::Evaluator;
use crate::report::Reporter;
use crate::result::EvalResult;
use crate::space::{DesignSpaceCompiler, SpaceError};
use crate::store::ResultStore;

pub const SUMMARY_REPORT: &str = "summary.rpt";
pub const OUTPUT_REPORT: &str = "output.rpt";

/// Lifecycle of one exploration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Partitioning,
    Running,
    Draining,
    Materializing,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_parts: usize,
    /// Supervisor tick: best-cache trim and status report.
    pub poll_interval: Duration,
    pub exploration_timeout: Duration,
    /// Points each worker evaluates concurrently.
    pub parallelism: usize,
}

impl RunOptions {
    pub fn from_config(config: &Config, work_dir: impl AsRef<Path>) -> Self {
        let work_dir = work_dir.as_ref().to_path_buf();
        RunOptions {
            output_dir: work_dir.join("output"),
            work_dir,
            max_parts: config.design_space.max_part_num,
            poll_interval: config.poll_interval(),
            exploration_timeout: config.timeout.exploration(),
            parallelism: config.evaluate.worker_per_part,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Number of best results written to the output directory.
    Materialized(usize),
    /// No valid result was committed.
    NoResults,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// The operator interrupted the run.
    pub interrupted: bool,
    /// Materialized results, best first, each with its output slot in `path`.
    pub outputs: Vec<EvalResult>,
    pub summary_report: PathBuf,
    pub output_report: Option<PathBuf>,
}

/// Sends `WorkerFinished` when the worker thread ends, panics included.
struct FinishGuard {
    tag: String,
    tx: Sender<SupervisorEvent>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let _ = self
            .tx
            .send(SupervisorEvent::WorkerFinished(std::mem::take(&mut self.tag)));
    }
}

type WorkerHandle = JoinHandle<Result<WorkerStats, ExploreError>>;

/// Drives one exploration run from partitioning to the final output directory.
pub struct Orchestrator<C: DesignSpaceCompiler> {
    compiler: C,
    definition: serde_json::Value,
    store: Arc<ResultStore>,
    explorer: Arc<dyn Explorer<C::Partition>>,
    evaluator: Arc<dyn Evaluator>,
    reporter: Arc<dyn Reporter>,
    options: RunOptions,
    interrupt: Interrupt,
    state: RunState,
}

impl<C: DesignSpaceCompiler> Orchestrator<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        compiler: C,
        definition: serde_json::Value,
        store: Arc<ResultStore>,
        explorer: Arc<dyn Explorer<C::Partition>>,
        evaluator: Arc<dyn Evaluator>,
        reporter: Arc<dyn Reporter>,
        options: RunOptions,
        interrupt: Interrupt,
    ) -> Self {
        Orchestrator {
            compiler,
            definition,
            store,
            explorer,
            evaluator,
            reporter,
            options,
            interrupt,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Run to completion. Any error leaves the orchestrator in `Failed`.
    pub fn run(&mut self) -> Result<RunReport, ExploreError> {
        match self.run_stages() {
            Ok(report) => {
                self.set_state(RunState::Done);
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, state = ?self.state, "exploration failed");
                self.set_state(RunState::Failed);
                Err(err)
            }
        }
    }

    fn set_state(&mut self, state: RunState) {
        info!(from = ?self.state, to = ?state, "run state changed");
        self.state = state;
    }

    fn run_stages(&mut self) -> Result<RunReport, ExploreError> {
        self.set_state(RunState::Partitioning);
        let space = self.compiler.compile(&self.definition)?;
        info!(max_parts = self.options.max_parts, "partitioning the design space");
        let parts = self.compiler.partition(&space, self.options.max_parts)?;
        if parts.is_empty() {
            return Err(SpaceError::NoPartition.into());
        }
        info!(count = parts.len(), "design space partitioned");

        self.set_state(RunState::Running);
        let interrupted = self.supervise(parts)? || self.interrupt.is_triggered();

        self.set_state(RunState::Draining);
        self.store.persist()?;
        let summary = self.reporter.report_summary();
        info!("exploration summary\n{}", summary);
        let summary_report = self.options.work_dir.join(SUMMARY_REPORT);
        fs::write(&summary_report, &summary).map_err(ExploreError::io(&summary_report))?;

        self.set_state(RunState::Materializing);
        let outputs = self.materialize()?;
        let report = self.reporter.report_output(&outputs);
        let output_report = if report.is_empty() {
            warn!("no valid result was found, no output to report");
            None
        } else {
            let path = self.options.output_dir.join(OUTPUT_REPORT);
            fs::write(&path, &report).map_err(ExploreError::io(&path))?;
            info!(outputs = outputs.len(), dir = %self.options.output_dir.display(), "outputs written");
            Some(path)
        };

        Ok(RunReport {
            outcome: if outputs.is_empty() {
                RunOutcome::NoResults
            } else {
                RunOutcome::Materialized(outputs.len())
            },
            interrupted,
            outputs,
            summary_report,
            output_report,
        })
    }

    /// Launch one worker per partition and wait for them. Returns whether the
    /// wait ended by interruption.
    fn supervise(&self, parts: Vec<C::Partition>) -> Result<bool, ExploreError> {
        let (tx, rx) = mpsc::channel();
        self.interrupt.attach(tx.clone());
        let deadline = Instant::now() + self.options.exploration_timeout;

        let mut handles: HashMap<String, WorkerHandle> = HashMap::new();
        for (index, partition) in parts.into_iter().enumerate() {
            let tag = format!("part{}", index);
            let ctx = WorkerContext {
                tag: tag.clone(),
                store: Arc::clone(&self.store),
                evaluator: Arc::clone(&self.evaluator),
                interrupt: self.interrupt.clone(),
                deadline,
                parallelism: self.options.parallelism,
            };
            let explorer = Arc::clone(&self.explorer);
            let guard = FinishGuard {
                tag: tag.clone(),
                tx: tx.clone(),
            };
            let handle = thread::Builder::new()
                .name(tag.clone())
                .spawn(move || {
                    let _guard = guard;
                    explorer.explore(partition, &ctx)
                })
                .map_err(|err| {
                    self.interrupt.detach();
                    ExploreError::Spawn(err)
                })?;
            handles.insert(tag, handle);
        }
        drop(tx);
        info!(workers = handles.len(), "explorers launched");

        let outcome = self.wait(&rx, &mut handles);
        self.interrupt.detach();
        if !handles.is_empty() {
            warn!(running = handles.len(), "draining while explorers are still running");
        }
        outcome
    }

    fn wait(
        &self,
        rx: &mpsc::Receiver<SupervisorEvent>,
        handles: &mut HashMap<String, WorkerHandle>,
    ) -> Result<bool, ExploreError> {
        let started = Instant::now();
        while !handles.is_empty() {
            match rx.recv_timeout(self.options.poll_interval) {
                Ok(SupervisorEvent::WorkerFinished(tag)) => {
                    if let Some(handle) = handles.remove(&tag) {
                        collect(&tag, handle)?;
                    }
                }
                Ok(SupervisorEvent::Interrupted) => {
                    warn!("exploration interrupted");
                    return Ok(true);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            self.store.trim_best_cache()?;
            self.reporter.log_best();
            self.reporter
                .print_status(started.elapsed().as_secs_f64() / 60.0);
        }
        Ok(false)
    }

    /// Drain the best-cache into numbered output slots, best first. The set is
    /// fixed before any job is created, so workers still committing after an
    /// interrupt cannot add slots.
    fn materialize(&self) -> Result<Vec<EvalResult>, ExploreError> {
        let best = self.store.drain_best()?;

        let out = &self.options.output_dir;
        if out.exists() {
            fs::remove_dir_all(out).map_err(ExploreError::io(out))?;
        }
        fs::create_dir_all(out).map_err(ExploreError::io(out))?;

        let mut outputs = Vec::new();
        for entry in best {
            let mut result = entry.result;
            let Some(point) = result.point.clone() else {
                warn!(quality = entry.quality, "best result has no design point, skipped");
                continue;
            };
            let job = self
                .evaluator
                .create_job()
                .ok_or(ExploreError::JobAllocation)?;
            self.evaluator.apply_design_point(&job, &point)?;

            let slot = outputs.len().to_string();
            let target = out.join(&slot);
            fs::rename(&job.path, &target).map_err(ExploreError::io(&job.path))?;
            info!(slot = %slot, quality = entry.quality, point = %point.key(), "output materialized");
            result.path = Some(slot);
            outputs.push(result);
        }
        Ok(outputs)
    }
}

fn collect(tag: &str, handle: WorkerHandle) -> Result<(), ExploreError> {
    match handle.join() {
        Ok(Ok(stats)) => {
            info!(tag, ?stats, "explorer finished");
            Ok(())
        }
        Ok(Err(err)) => {
            error!(tag, error = %err, "explorer failed");
            Err(err)
        }
        Err(_) => {
            error!(tag, "explorer panicked");
            Ok(())
        }
    }
}
