use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type StageId = String;

/// Complete pipeline declaration, as handed over by the configuration loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipeline: Vec<StageDescriptor>,
    #[serde(default)]
    pub settings: PipelineSettings,
    #[serde(default)]
    pub logger: Option<LoggerConfig>,
    #[serde(default)]
    pub plugin_libraries: Vec<String>,
}

impl PipelineConfig {
    pub fn new(pipeline: Vec<StageDescriptor>) -> Self {
        Self {
            pipeline,
            settings: PipelineSettings::default(),
            logger: None,
            plugin_libraries: Vec::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }
}

/// One entry of the `pipeline` array. All four fields are required; `next`
/// may be empty. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub id: StageId,
    #[serde(rename = "type")]
    pub stage_type: String,
    pub parameters: serde_json::Value,
    pub next: Vec<StageId>,
}

impl StageDescriptor {
    pub fn new(id: impl Into<StageId>, stage_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage_type: stage_type.into(),
            parameters: serde_json::Value::Object(serde_json::Map::new()),
            next: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        if !self.parameters.is_object() {
            self.parameters = serde_json::Value::Object(serde_json::Map::new());
        }
        if let serde_json::Value::Object(map) = &mut self.parameters {
            map.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn then(mut self, next: impl Into<StageId>) -> Self {
        self.next.push(next.into());
        self
    }
}

/// Global pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_parallel_stages: usize,
    pub stage_timeout_ms: Option<u64>,
    pub on_error: ErrorHandling,
    pub parallelism_advisory: bool,
}

impl PipelineSettings {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_parallel_stages: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            stage_timeout_ms: None,
            on_error: ErrorHandling::ContinueOnError,
            parallelism_advisory: true,
        }
    }
}

/// What the engine does once a stage fails mid-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorHandling {
    /// Keep scheduling branches that do not depend on the failed stage.
    #[default]
    ContinueOnError,
    /// Trigger nothing new; stages already in flight still finish.
    StopRun,
}

/// Optional `logger` section; only consumed by the binary that sets up sinks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub level: Option<String>,
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pipeline_and_ignores_unknown_fields() {
        let config = PipelineConfig::from_json(json!({
            "pipeline": [
                {"id": "a", "type": "debug.log", "parameters": {}, "next": ["b"], "comment": "x"},
                {"id": "b", "type": "debug.log", "parameters": {"message": "hi"}, "next": []}
            ]
        }))
        .unwrap();

        assert_eq!(config.pipeline.len(), 2);
        assert_eq!(config.pipeline[0].next, vec!["b".to_string()]);
        assert_eq!(config.settings.on_error, ErrorHandling::ContinueOnError);
        assert!(config.settings.parallelism_advisory);
    }

    #[test]
    fn missing_next_is_rejected() {
        let result = PipelineConfig::from_json(json!({
            "pipeline": [{"id": "a", "type": "debug.log", "parameters": {}}]
        }));
        assert!(result.is_err());
    }
}
