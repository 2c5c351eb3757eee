// crates/stagecli/src/config.rs

use anyhow::{bail, Context, Result};
use stagecore::PipelineConfig;
use std::path::{Path, PathBuf};

/// Load and shallow-merge configuration files in order. Top-level keys from
/// later files replace those from earlier ones, so a `pipeline.json` and a
/// `logger.json` can be kept apart.
pub fn load_config(files: &[PathBuf]) -> Result<PipelineConfig> {
    if files.is_empty() {
        bail!("At least one configuration file is required");
    }

    let mut merged = serde_json::Map::new();
    for file in files {
        let json = read_json(file)?;
        merge_into(&mut merged, json)
            .with_context(|| format!("Failed to merge config from {}", file.display()))?;
    }

    if !merged.contains_key("pipeline") {
        bail!("Missing 'pipeline' key in config");
    }

    PipelineConfig::from_json(serde_json::Value::Object(merged))
        .context("Failed to parse pipeline stages")
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not open config file: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON: {}", path.display()))
}

fn merge_into(
    merged: &mut serde_json::Map<String, serde_json::Value>,
    json: serde_json::Value,
) -> Result<()> {
    let serde_json::Value::Object(obj) = json else {
        bail!("Config root must be a JSON object");
    };
    for (key, value) in obj {
        merged.insert(key, value);
    }
    Ok(())
}
