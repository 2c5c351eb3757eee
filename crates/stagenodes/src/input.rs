use async_trait::async_trait;
use serde::Deserialize;
use stagecore::{parse_parameters, InputBundle, InputSink, Stage, StageContext, StageError};
use stageruntime::{StageFactory, StageMetadata};

fn default_prefix() -> String {
    "input.".to_string()
}

#[derive(Debug, Deserialize)]
struct InputParameters {
    #[serde(default = "default_prefix")]
    prefix: String,
    #[serde(default)]
    required: Vec<String>,
}

/// Publish every value of the injected input bundle as a data product named
/// `<prefix><name>`
pub struct InputBundleStage {
    prefix: String,
    required: Vec<String>,
    bundle: InputBundle,
}

impl InputSink for InputBundleStage {
    fn accept_input(&mut self, bundle: &InputBundle) -> Result<(), StageError> {
        if let Some(missing) = self.required.iter().find(|name| bundle.get(name).is_none()) {
            return Err(StageError::InputRejected(format!(
                "required input '{}' is missing",
                missing
            )));
        }
        self.bundle = bundle.clone();
        Ok(())
    }
}

#[async_trait]
impl Stage for InputBundleStage {
    fn name(&self) -> &str {
        "InputBundleStage"
    }

    async fn initialize(&mut self, parameters: &serde_json::Value) -> Result<(), StageError> {
        let params: InputParameters = parse_parameters(parameters)?;
        self.prefix = params.prefix;
        self.required = params.required;
        Ok(())
    }

    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        for (name, value) in self.bundle.iter() {
            ctx.put(format!("{}{}", self.prefix, name), value.clone());
        }
        Ok(())
    }

    fn as_input_sink(&mut self) -> Option<&mut dyn InputSink> {
        Some(self)
    }
}

pub struct InputBundleStageFactory;

impl StageFactory for InputBundleStageFactory {
    fn create(&self, _parameters: &serde_json::Value) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(InputBundleStage {
            prefix: default_prefix(),
            required: Vec::new(),
            bundle: InputBundle::new(),
        }))
    }

    fn stage_type(&self) -> &str {
        "input.bundle"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            description: "Publish injected input values as data products".to_string(),
            category: "input".to_string(),
            input_capable: true,
        }
    }
}
