//! Stage graph execution runtime
//!
//! This crate turns validated stage descriptors into an executable graph,
//! holds the stage registry, and runs graphs concurrently with AND-join
//! semantics on the tokio worker pool.

mod advisory;
mod builder;
mod executor;
mod graph;
mod registry;
mod runtime;

pub use advisory::ParallelismAdvisory;
pub use builder::GraphBuilder;
pub use executor::{
    ExecutorConfig, GraphExecutor, RunOutcome, SkippedStage, StageFailure, StageStatus,
};
pub use graph::Graph;
pub use registry::{StageFactory, StageMetadata, StageRegistry};
pub use runtime::{Pipeline, RuntimeConfig};
