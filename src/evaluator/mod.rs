//! Evaluator - the boundary to the external, expensive evaluation toolchain.
//!
//! An evaluator hands out isolated job directories, applies a design point to
//! a job, and produces an [`EvalResult`] for it. The orchestrator only uses
//! `create_job` and `apply_design_point` (to materialize the final outputs);
//! workers use the whole trait.

mod command;

use std::path::PathBuf;

use thiserror::Error;

use crate::result::{DesignPoint, EvalResult};

pub use command::{CommandEvaluator, DESIGN_POINT_FILE};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("evaluator io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to apply design point: {0}")]
    Apply(String),
    #[error("transform command failed: {0}")]
    Transform(String),
}

/// An isolated working copy of the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: u64,
    pub path: PathBuf,
}

pub trait Evaluator: Send + Sync {
    /// Allocate a fresh job, or `None` when no job can be created.
    fn create_job(&self) -> Option<Job>;

    /// Write the design point into the job's working copy.
    fn apply_design_point(&self, job: &Job, point: &DesignPoint) -> Result<(), EvalError>;

    /// Content hash of the intermediate artifact generated for the applied point,
    /// if this evaluator produces one.
    fn code_hash(&self, job: &Job) -> Result<Option<String>, EvalError>;

    /// Evaluate the applied point. Failures are reported through the result's `ret_code`.
    fn evaluate(&self, job: &Job, point: &DesignPoint) -> EvalResult;

    /// Discard a job's working copy.
    fn release_job(&self, job: Job);
}
