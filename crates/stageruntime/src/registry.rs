use stagecore::{RegistryError, Stage, StageError};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating stage instances
pub trait StageFactory: Send + Sync {
    /// Create a new, uninitialized instance. `parameters` is the descriptor's
    /// blob; `Stage::initialize` still receives it afterwards.
    fn create(&self, parameters: &serde_json::Value) -> Result<Box<dyn Stage>, StageError>;

    /// Get stage type identifier
    fn stage_type(&self) -> &str;

    /// Optional: Get stage metadata
    fn metadata(&self) -> StageMetadata {
        StageMetadata::default()
    }
}

/// Metadata about a stage type
#[derive(Debug, Clone)]
pub struct StageMetadata {
    pub description: String,
    pub category: String,
    pub input_capable: bool,
}

impl Default for StageMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            input_capable: false,
        }
    }
}

struct FnFactory<F> {
    stage_type: String,
    create: F,
}

impl<F> StageFactory for FnFactory<F>
where
    F: Fn(&serde_json::Value) -> Result<Box<dyn Stage>, StageError> + Send + Sync,
{
    fn create(&self, parameters: &serde_json::Value) -> Result<Box<dyn Stage>, StageError> {
        (self.create)(parameters)
    }

    fn stage_type(&self) -> &str {
        &self.stage_type
    }
}

/// Explicit table of stage types, populated before any graph is built
pub struct StageRegistry {
    factories: HashMap<String, Arc<dyn StageFactory>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a stage factory. A later registration for the same type
    /// replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn StageFactory>) {
        let stage_type = factory.stage_type().to_string();
        tracing::debug!("Registering stage type: {}", stage_type);
        if self.factories.insert(stage_type.clone(), factory).is_some() {
            tracing::warn!("Stage type '{}' registered twice; keeping the latest", stage_type);
        }
    }

    /// Register a closure as the factory for `stage_type`.
    pub fn register_fn<F>(&mut self, stage_type: impl Into<String>, create: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Stage>, StageError> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnFactory {
            stage_type: stage_type.into(),
            create,
        }));
    }

    /// Create a stage instance from a type name and parameters
    pub fn create(
        &self,
        stage_type: &str,
        parameters: &serde_json::Value,
    ) -> Result<Box<dyn Stage>, RegistryError> {
        let factory = self
            .factories
            .get(stage_type)
            .ok_or_else(|| RegistryError::UnknownType(stage_type.to_string()))?;

        factory.create(parameters).map_err(|source| RegistryError::Factory {
            stage_type: stage_type.to_string(),
            source,
        })
    }

    pub fn contains(&self, stage_type: &str) -> bool {
        self.factories.contains_key(stage_type)
    }

    /// Get all registered stage types, sorted
    pub fn list_stage_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a stage type
    pub fn get_metadata(&self, stage_type: &str) -> Option<StageMetadata> {
        self.factories.get(stage_type).map(|f| f.metadata())
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
