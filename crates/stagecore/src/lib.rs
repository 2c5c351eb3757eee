//! Core abstractions for the stage graph engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the stage contract, the shared data product store,
//! pipeline descriptors and the error taxonomy. It has no scheduling logic.

mod error;
pub mod events;
mod input;
mod pipeline;
mod stage;
mod store;
mod value;

pub use error::{BuildError, PipelineError, RegistryError, RunError, StageError};
pub use events::*;
pub use input::InputBundle;
pub use pipeline::{
    ErrorHandling, LoggerConfig, PipelineConfig, PipelineSettings, StageDescriptor, StageId,
};
pub use stage::{parse_parameters, InputSink, Stage, StageContext};
pub use store::{DataProduct, DataProductStore};
pub use value::Value;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
