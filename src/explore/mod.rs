//! Exploration - partitioning, supervised search workers and final materialization.
//!
//! ## Separation of Concerns
//!
//! 1. **Workers** (see [`Explorer`]) - walk one partition each, evaluate points
//!    and commit results into the shared [`ResultStore`](crate::ResultStore).
//! 2. **Orchestrator** - launches one worker per partition, keeps the best-cache
//!    trimmed while they run, then persists the store and materializes the
//!    best results as numbered output directories.
//!
//! ## Example
//!
//! ```ignore
//! use design_explorer::explore::{ExhaustiveExplorer, Interrupt, Orchestrator, RunOptions};
//! use design_explorer::space::GridCompiler;
//!
//! let mut orchestrator = Orchestrator::new(
//!     GridCompiler,
//!     config.design_space.definition.clone(),
//!     store,
//!     Arc::new(ExhaustiveExplorer),
//!     evaluator,
//!     reporter,
//!     RunOptions::from_config(&config, &work_dir),
//!     Interrupt::new(),
//! );
//! let report = orchestrator.run()?;
//! ```

mod interrupt;
mod orchestrator;
mod worker;
mod workspace;

use std::path::PathBuf;

use thiserror::Error;

use crate::evaluator::EvalError;
use crate::space::SpaceError;
use crate::store::StoreError;

pub use interrupt::Interrupt;
pub use orchestrator::{
    Orchestrator, RunOptions, RunOutcome, RunReport, RunState, OUTPUT_REPORT, SUMMARY_REPORT,
};
pub use worker::{ExhaustiveExplorer, Explorer, WorkerContext, WorkerStats};
pub use workspace::prepare_workspace;

/// Error type for an exploration run. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum ExploreError {
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Evaluator(#[from] EvalError),
    #[error("failed to allocate an evaluation job")]
    JobAllocation,
    #[error("workspace error: {0}")]
    Workspace(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn explorer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ExploreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> ExploreError {
        let path = path.into();
        move |source| ExploreError::Io { path, source }
    }
}
