use async_trait::async_trait;
use stagecore::{Stage, StageContext, StageError};
use stageruntime::{StageFactory, StageMetadata};
use tokio::time::{sleep, Duration};

/// Delay for a configured duration; returns early when the run is cancelled
pub struct DelayStage {
    delay: Duration,
}

#[async_trait]
impl Stage for DelayStage {
    fn name(&self) -> &str {
        "DelayStage"
    }

    async fn initialize(&mut self, parameters: &serde_json::Value) -> Result<(), StageError> {
        let delay_ms = match parameters.get("delay_ms") {
            None => 1000, // Default to 1 second if not specified
            Some(v) => v.as_u64().ok_or_else(|| {
                StageError::Configuration("delay_ms must be a non-negative integer".to_string())
            })?,
        };
        self.delay = Duration::from_millis(delay_ms);
        Ok(())
    }

    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        ctx.events.info(format!("Delaying for {}ms", self.delay.as_millis()));

        tokio::select! {
            _ = sleep(self.delay) => Ok(()),
            _ = ctx.cancellation.cancelled() => Err(StageError::Cancelled),
        }
    }
}

pub struct DelayStageFactory;

impl StageFactory for DelayStageFactory {
    fn create(&self, _parameters: &serde_json::Value) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(DelayStage {
            delay: Duration::from_millis(1000),
        }))
    }

    fn stage_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            input_capable: false,
        }
    }
}
