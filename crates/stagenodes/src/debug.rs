use async_trait::async_trait;
use stagecore::{parse_parameters, Stage, StageContext, StageError};
use stageruntime::{StageFactory, StageMetadata};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DebugParameters {
    message: Option<String>,
    /// Products to print; all products when empty.
    keys: Vec<String>,
}

/// Simple debug stage that logs a message and the current data products
#[derive(Default)]
pub struct DebugStage {
    params: DebugParameters,
    runs: u64,
}

#[async_trait]
impl Stage for DebugStage {
    fn name(&self) -> &str {
        "DebugStage"
    }

    async fn initialize(&mut self, parameters: &serde_json::Value) -> Result<(), StageError> {
        self.params = parse_parameters(parameters)?;
        Ok(())
    }

    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        self.runs += 1;
        let message = self.params.message.as_deref().unwrap_or("(no message)");
        tracing::info!("[{}] run {}: {}", ctx.stage_id, self.runs, message);
        ctx.events.info(format!("DEBUG: {}", message));

        let keys = if self.params.keys.is_empty() {
            ctx.store.keys()
        } else {
            self.params.keys.clone()
        };
        for key in keys {
            match ctx.get(&key) {
                Some(value) => ctx.events.info(format!("  {}: {}", key, value.to_json())),
                None => ctx.events.warn(format!("  {}: <missing>", key)),
            }
        }
        Ok(())
    }
}

pub struct DebugStageFactory;

impl StageFactory for DebugStageFactory {
    fn create(&self, _parameters: &serde_json::Value) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(DebugStage::default()))
    }

    fn stage_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Logs a message and data products for debugging".to_string(),
            category: "debug".to_string(),
            input_capable: false,
        }
    }
}
