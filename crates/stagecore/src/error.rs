use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Pipeline has not been built")]
    NotBuilt,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised by a single stage while initializing or processing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("Missing data product: {0}")]
    MissingProduct(String),

    #[error("Invalid data product type for '{key}': expected {expected}")]
    InvalidProductType { key: String, expected: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Stage initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Input rejected: {0}")]
    InputRejected(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Stage panicked: {0}")]
    Panicked(String),

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown stage type: {0}")]
    UnknownType(String),

    #[error("Factory for '{stage_type}' failed: {source}")]
    Factory {
        stage_type: String,
        #[source]
        source: StageError,
    },
}

/// Errors that abort a graph build. No partial graph is ever returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Pipeline declares no stages")]
    EmptyPipeline,

    #[error("Stage at position {position} has an empty id")]
    EmptyId { position: usize },

    #[error("Duplicate stage id: {0}")]
    DuplicateId(String),

    #[error("Stage '{from}' references unknown successor '{to}'")]
    DanglingEdge { from: String, to: String },

    #[error("Cyclic dependency detected at stage '{0}'")]
    CyclicGraph(String),

    #[error("Stage '{id}' has unknown type '{stage_type}'")]
    UnknownType { id: String, stage_type: String },

    #[error("Failed to create stage '{id}' of type '{stage_type}': {source}")]
    StageCreationFailed {
        id: String,
        stage_type: String,
        #[source]
        source: StageError,
    },
}

impl BuildError {
    /// Topology or id problems in the declared configuration.
    pub fn is_config_validation(&self) -> bool {
        matches!(
            self,
            BuildError::EmptyPipeline
                | BuildError::EmptyId { .. }
                | BuildError::DuplicateId(_)
                | BuildError::DanglingEdge { .. }
                | BuildError::CyclicGraph(_)
        )
    }

    /// Unknown type, factory failure or initialize failure.
    pub fn is_stage_creation(&self) -> bool {
        matches!(
            self,
            BuildError::UnknownType { .. } | BuildError::StageCreationFailed { .. }
        )
    }
}

/// Errors that prevent a run from starting at all. Per-stage failures are
/// reported through `RunOutcome` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("Stage '{id}' rejected input: {source}")]
    InputRejected {
        id: String,
        #[source]
        source: StageError,
    },
}
