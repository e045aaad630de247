pub mod backend;
pub mod config;
pub mod evaluator;
pub mod explore;
pub mod report;
pub mod result;
pub mod space;
pub mod store;

pub use backend::{Backend, BackendError, FileBackend, RunId};
#[cfg(feature = "redis")]
pub use backend::RedisBackend;
pub use config::{BackendKind, Config, ConfigError};
pub use evaluator::{CommandEvaluator, EvalError, Evaluator, Job};
pub use explore::{
    prepare_workspace, ExhaustiveExplorer, ExploreError, Explorer, Interrupt, Orchestrator,
    RunOptions, RunOutcome, RunReport, RunState, WorkerContext, WorkerStats,
};
pub use report::{Reporter, TextReporter};
pub use result::{DesignPoint, EvalResult, EvalStage, ParamValue, RetCode};
pub use space::{DesignSpaceCompiler, GridCompiler, GridSpace, SpaceError};
pub use store::{BestCache, CacheEntry, CodeHashSet, QualityPolicy, ResultStore, StoreError};
