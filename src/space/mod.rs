//! Design-space compilation and partitioning.
//!
//! The orchestrator only needs a [`DesignSpaceCompiler`] that turns the
//! configured definition into a space and splits that space into disjoint
//! partitions. Partitions are opaque to the store and the orchestrator; only
//! the worker that receives one looks inside.

mod grid;

use thiserror::Error;

pub use grid::GridSpace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpaceError {
    #[error("failed to compile design space: {0}")]
    Compile(String),
    #[error("no design space partition is available for exploration")]
    NoPartition,
}

pub trait DesignSpaceCompiler: Send + Sync {
    type Space;
    type Partition: Send + 'static;

    fn compile(&self, definition: &serde_json::Value) -> Result<Self::Space, SpaceError>;

    /// Split `space` into at most `max_parts` disjoint partitions.
    fn partition(
        &self,
        space: &Self::Space,
        max_parts: usize,
    ) -> Result<Vec<Self::Partition>, SpaceError>;
}

/// Compiler for grid definitions: `{ "param": [option, ...], ... }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridCompiler;

impl DesignSpaceCompiler for GridCompiler {
    type Space = GridSpace;
    type Partition = GridSpace;

    fn compile(&self, definition: &serde_json::Value) -> Result<GridSpace, SpaceError> {
        GridSpace::compile(definition)
    }

    fn partition(&self, space: &GridSpace, max_parts: usize) -> Result<Vec<GridSpace>, SpaceError> {
        space.partition(max_parts)
    }
}
