use async_trait::async_trait;
use serde::Deserialize;
use stagecore::{parse_parameters, Stage, StageContext, StageError, Value};
use stageruntime::{StageFactory, StageMetadata};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct ConstantParameters {
    key: String,
    value: serde_json::Value,
}

/// Publish a fixed value from the stage parameters on every run
pub struct ConstantStage {
    key: String,
    value: Value,
}

#[async_trait]
impl Stage for ConstantStage {
    fn name(&self) -> &str {
        "ConstantStage"
    }

    async fn initialize(&mut self, parameters: &serde_json::Value) -> Result<(), StageError> {
        let params: ConstantParameters = parse_parameters(parameters)?;
        if params.key.is_empty() {
            return Err(StageError::Configuration("key must not be empty".to_string()));
        }
        self.key = params.key;
        self.value = Value::from_json(params.value);
        Ok(())
    }

    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        ctx.put(self.key.clone(), self.value.clone());
        Ok(())
    }
}

pub struct ConstantStageFactory;

impl StageFactory for ConstantStageFactory {
    fn create(&self, _parameters: &serde_json::Value) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(ConstantStage {
            key: String::new(),
            value: Value::Null,
        }))
    }

    fn stage_type(&self) -> &str {
        "product.constant"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Write a constant value to a data product".to_string(),
            category: "product".to_string(),
            input_capable: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct MergeParameters {
    inputs: Vec<String>,
    output: String,
    #[serde(default = "default_true")]
    require_all: bool,
}

/// Collect several data products into one object product. Typically placed
/// at a fan-in point, after every producer of `inputs`.
pub struct MergeStage {
    inputs: Vec<String>,
    output: String,
    require_all: bool,
}

#[async_trait]
impl Stage for MergeStage {
    fn name(&self) -> &str {
        "MergeStage"
    }

    async fn initialize(&mut self, parameters: &serde_json::Value) -> Result<(), StageError> {
        let params: MergeParameters = parse_parameters(parameters)?;
        self.inputs = params.inputs;
        self.output = params.output;
        self.require_all = params.require_all;
        Ok(())
    }

    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        let mut merged = HashMap::with_capacity(self.inputs.len());
        for key in &self.inputs {
            match ctx.get(key) {
                Some(value) => {
                    merged.insert(key.clone(), value);
                }
                None if self.require_all => {
                    return Err(StageError::MissingProduct(key.clone()));
                }
                None => ctx.events.warn(format!("Skipping missing product '{}'", key)),
            }
        }
        ctx.put(self.output.clone(), Value::Object(merged));
        Ok(())
    }
}

pub struct MergeStageFactory;

impl StageFactory for MergeStageFactory {
    fn create(&self, _parameters: &serde_json::Value) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(MergeStage {
            inputs: Vec::new(),
            output: String::new(),
            require_all: true,
        }))
    }

    fn stage_type(&self) -> &str {
        "product.merge"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Merge several data products into one object".to_string(),
            category: "product".to_string(),
            input_capable: false,
        }
    }
}
