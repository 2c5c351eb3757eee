use crate::{
    advisory::ParallelismAdvisory, builder::GraphBuilder, executor::ExecutorConfig,
    registry::StageRegistry, Graph, GraphExecutor, RunOutcome,
};
use stagecore::{
    BuildError, DataProductStore, EventBus, InputBundle, PipelineConfig, PipelineError,
    PipelineSettings, StageDescriptor,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Owns the registry, the data product store and the current graph.
///
/// Building and running share one lock on the graph slot, so a rebuild can
/// never interleave with a run that is still in flight.
pub struct Pipeline {
    registry: Arc<StageRegistry>,
    store: Arc<DataProductStore>,
    event_bus: Arc<EventBus>,
    graph: Mutex<Option<Graph>>,
    settings: PipelineSettings,
    advisory: &'static ParallelismAdvisory,
}

impl Pipeline {
    /// Create a pipeline with a pre-populated registry
    pub fn new(registry: Arc<StageRegistry>, settings: PipelineSettings) -> Self {
        Self::with_config(registry, settings, RuntimeConfig::default())
    }

    pub fn with_config(
        registry: Arc<StageRegistry>,
        settings: PipelineSettings,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            store: Arc::new(DataProductStore::new()),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            graph: Mutex::new(None),
            settings,
            advisory: ParallelismAdvisory::global(),
        }
    }

    /// Report branching to `advisory` instead of the process-wide one.
    pub fn with_advisory(mut self, advisory: &'static ParallelismAdvisory) -> Self {
        self.advisory = advisory;
        self
    }

    pub fn registry(&self) -> &Arc<StageRegistry> {
        &self.registry
    }

    /// Shared data product store; persists across runs until cleared.
    pub fn store(&self) -> &Arc<DataProductStore> {
        &self.store
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: PipelineSettings) {
        self.settings = settings;
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<stagecore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Build from a full configuration, adopting its settings.
    pub async fn build_from_config(&mut self, config: &PipelineConfig) -> Result<(), BuildError> {
        if !config.plugin_libraries.is_empty() {
            tracing::warn!(
                "Ignoring {} plugin librar(ies); stages must be registered statically",
                config.plugin_libraries.len()
            );
        }
        self.settings = config.settings.clone();
        self.build(&config.pipeline).await
    }

    /// Replace the current graph. Waits for an in-flight run to finish; on
    /// failure the previous graph is dropped and nothing can run.
    pub async fn build(&self, descriptors: &[StageDescriptor]) -> Result<(), BuildError> {
        let mut slot = self.graph.lock().await;
        *slot = None;

        let builder = GraphBuilder::new(&self.registry);
        let builder = if self.settings.parallelism_advisory {
            builder.with_advisory(self.advisory)
        } else {
            builder.without_advisory()
        };

        let graph = builder.build(descriptors).await?;
        tracing::info!(
            "Pipeline built: {} stage(s), {} start node(s)",
            graph.len(),
            graph.start_nodes().len()
        );
        *slot = Some(graph);
        Ok(())
    }

    pub async fn is_built(&self) -> bool {
        self.graph.lock().await.is_some()
    }

    /// Run the current graph once.
    pub async fn run(&self, input: Option<&InputBundle>) -> Result<RunOutcome, PipelineError> {
        self.run_until_cancelled(input, CancellationToken::new()).await
    }

    pub async fn run_until_cancelled(
        &self,
        input: Option<&InputBundle>,
        cancellation: CancellationToken,
    ) -> Result<RunOutcome, PipelineError> {
        let slot = self.graph.lock().await;
        let graph = slot.as_ref().ok_or(PipelineError::NotBuilt)?;
        let executor = GraphExecutor::new(ExecutorConfig::from(&self.settings));

        let outcome = executor
            .run_until_cancelled(graph, &self.store, &self.event_bus, input, cancellation)
            .await?;
        Ok(outcome)
    }

    /// Inspect the current graph without running it.
    pub async fn inspect<R>(&self, f: impl FnOnce(&Graph) -> R) -> Result<R, PipelineError> {
        let slot = self.graph.lock().await;
        let graph = slot.as_ref().ok_or(PipelineError::NotBuilt)?;
        Ok(f(graph))
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}
