use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::{ExploreError, Interrupt};
use crate::evaluator::{Evaluator, Job};
use crate::result::{DesignPoint, EvalResult, EvalStage, RetCode};
use crate::space::GridSpace;
use crate::store::ResultStore;

/// Everything one worker needs besides its partition.
#[derive(Clone)]
pub struct WorkerContext {
    /// Partition tag, `part{index}`.
    pub tag: String,
    pub store: Arc<ResultStore>,
    pub evaluator: Arc<dyn Evaluator>,
    pub interrupt: Interrupt,
    pub deadline: Instant,
    /// Points evaluated concurrently within the partition.
    pub parallelism: usize,
}

impl WorkerContext {
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_triggered()
    }

    /// True once the run was interrupted or the exploration deadline passed.
    pub fn should_stop(&self) -> bool {
        self.is_interrupted() || Instant::now() >= self.deadline
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub evaluated: usize,
    /// Points already present in the store.
    pub skipped: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub stopped_early: bool,
}

/// A search algorithm over one partition of the design space.
///
/// Implementations commit every result they produce through `ctx.store` and
/// return once the partition is exhausted or `ctx.should_stop()` turns true.
/// A returned error is fatal for the whole run.
pub trait Explorer<P>: Send + Sync {
    fn explore(&self, partition: P, ctx: &WorkerContext) -> Result<WorkerStats, ExploreError>;
}

/// Visits every point of a grid partition, `ctx.parallelism` points at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustiveExplorer;

impl Explorer<GridSpace> for ExhaustiveExplorer {
    fn explore(&self, partition: GridSpace, ctx: &WorkerContext) -> Result<WorkerStats, ExploreError> {
        let mut stats = WorkerStats::default();
        let mut points = partition.points();
        let batch_size = ctx.parallelism.max(1);
        info!(tag = %ctx.tag, size = partition.size(), "explorer started");

        loop {
            if ctx.should_stop() {
                stats.stopped_early = true;
                break;
            }

            let mut batch = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                let Some(point) = points.next() else {
                    break;
                };
                if ctx.store.query(&point.key())?.is_some() {
                    stats.skipped += 1;
                } else {
                    batch.push(point);
                }
            }
            if batch.is_empty() {
                break;
            }

            let outcomes: Vec<Result<Option<EvalResult>, ExploreError>> = thread::scope(|s| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|point| s.spawn(move || evaluate_point(ctx, point)))
                    .collect();
                handles
                    .into_iter()
                    .zip(&batch)
                    .map(|(h, point)| {
                        h.join().unwrap_or_else(|_| {
                            error!(
                                tag = %ctx.tag,
                                point = %point.key(),
                                "evaluation panicked, point not committed"
                            );
                            Ok(None)
                        })
                    })
                    .collect()
            });

            let mut pairs = Vec::with_capacity(batch.len());
            for (point, outcome) in batch.iter().zip(outcomes) {
                let Some(result) = outcome? else {
                    stats.failed += 1;
                    continue;
                };
                match result.ret_code {
                    RetCode::Pass => stats.evaluated += 1,
                    RetCode::Duplicate => stats.duplicates += 1,
                    _ => stats.failed += 1,
                }
                pairs.push((point.key(), result));
            }
            if !pairs.is_empty() {
                ctx.store.batch_commit(&pairs)?;
            }
        }

        info!(tag = %ctx.tag, ?stats, "explorer stopped");
        Ok(stats)
    }
}

/// Run one point through the evaluator. `None` means no job could be allocated
/// and nothing should be committed, so a later run retries the point.
fn evaluate_point(ctx: &WorkerContext, point: &DesignPoint) -> Result<Option<EvalResult>, ExploreError> {
    let Some(job) = ctx.evaluator.create_job() else {
        warn!(tag = %ctx.tag, point = %point.key(), "no job available, point skipped");
        return Ok(None);
    };
    let outcome = evaluate_in_job(ctx, &job, point);
    ctx.evaluator.release_job(job);
    outcome.map(Some)
}

fn evaluate_in_job(
    ctx: &WorkerContext,
    job: &Job,
    point: &DesignPoint,
) -> Result<EvalResult, ExploreError> {
    if let Err(err) = ctx.evaluator.apply_design_point(job, point) {
        warn!(tag = %ctx.tag, point = %point.key(), error = %err, "failed to apply design point");
        return Ok(EvalResult::failed(
            Some(point.clone()),
            RetCode::InvalidPoint,
            EvalStage::Estimate,
        ));
    }

    let code_hash = match ctx.evaluator.code_hash(job) {
        Ok(hash) => hash,
        Err(err) => {
            warn!(tag = %ctx.tag, point = %point.key(), error = %err, "failed to generate code");
            return Ok(EvalResult::failed(
                Some(point.clone()),
                RetCode::EvaluatorError,
                EvalStage::Toolchain { code_hash: None },
            ));
        }
    };

    if let Some(hash) = &code_hash {
        if !ctx.store.add_code_hash(hash)? {
            debug!(tag = %ctx.tag, point = %point.key(), hash = %hash, "generated code already evaluated");
            return Ok(EvalResult::failed(
                Some(point.clone()),
                RetCode::Duplicate,
                EvalStage::Toolchain { code_hash },
            ));
        }
    }

    let mut result = ctx.evaluator.evaluate(job, point);
    if let EvalStage::Toolchain { code_hash: slot } = &mut result.stage {
        *slot = code_hash;
    }
    Ok(result)
}
