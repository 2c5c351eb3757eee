use crate::{events::EventEmitter, DataProductStore, InputBundle, StageError, StageId, Value};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

/// Core trait that all pipeline stages implement
///
/// A stage is created by a registered factory, initialized exactly once when
/// the graph is built, and then processed at most once per run. The same
/// instance is reused across runs, so state kept in `self` accumulates.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Human readable name, used in diagnostics.
    fn name(&self) -> &str;

    /// Receive the descriptor's `parameters` blob. Called once, at build time.
    async fn initialize(&mut self, _parameters: &serde_json::Value) -> Result<(), StageError> {
        Ok(())
    }

    /// Do the stage's work for one run. Data is exchanged only through
    /// `ctx.store`.
    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError>;

    /// Optional input capability. Stages that consume an `InputBundle`
    /// return themselves here.
    fn as_input_sink(&mut self) -> Option<&mut dyn InputSink> {
        None
    }
}

/// Capability of stages that accept externally supplied input before a run.
pub trait InputSink: Send {
    fn accept_input(&mut self, bundle: &InputBundle) -> Result<(), StageError>;
}

/// Execution context passed to each stage's `process`
#[derive(Clone)]
pub struct StageContext {
    /// Id of the stage instance in the graph
    pub stage_id: StageId,

    /// Identifier of the current run
    pub run_id: Uuid,

    /// Shared data product store
    pub store: Arc<DataProductStore>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancelled when the caller abandons the run
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl StageContext {
    /// Store a value tagged with this stage as producer.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.store.put_from(&self.stage_id, key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key)
    }

    /// Get required product or return error
    pub fn require(&self, key: &str) -> Result<Value, StageError> {
        self.store.require(key)
    }

    pub fn require_typed<T: DeserializeOwned>(&self, key: &str) -> Result<T, StageError> {
        self.store.get_typed(key)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Deserialize a stage's `parameters` blob into a typed struct.
pub fn parse_parameters<T: DeserializeOwned>(parameters: &serde_json::Value) -> Result<T, StageError> {
    serde_json::from_value(parameters.clone())
        .map_err(|e| StageError::Configuration(format!("Invalid parameters: {}", e)))
}
