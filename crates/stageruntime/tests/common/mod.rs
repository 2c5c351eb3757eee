// crates/stageruntime/tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use serde::Deserialize;
use stagecore::{
    parse_parameters, InputBundle, InputSink, Stage, StageContext, StageDescriptor, StageError,
    Value,
};
use stageruntime::StageRegistry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared, ordered record of what the test stages did
#[derive(Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecordParameters {
    requires: Vec<String>,
    delay_ms: u64,
    fail: bool,
    panic: bool,
}

/// Writes its run count under its own id, after checking `requires`.
/// Products it read are published as `<id>.saw`.
pub struct RecordStage {
    log: ExecutionLog,
    params: RecordParameters,
    runs: u64,
}

#[async_trait]
impl Stage for RecordStage {
    fn name(&self) -> &str {
        "RecordStage"
    }

    async fn initialize(&mut self, parameters: &serde_json::Value) -> Result<(), StageError> {
        self.params = parse_parameters(parameters)?;
        Ok(())
    }

    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        if self.params.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.params.delay_ms)).await;
        }
        if self.params.panic {
            panic!("stage {} exploded", ctx.stage_id);
        }
        if self.params.fail {
            self.log.push(format!("fail:{}", ctx.stage_id));
            return Err(StageError::ExecutionFailed(format!("{} failed", ctx.stage_id)));
        }

        let mut saw = HashMap::new();
        for key in &self.params.requires {
            saw.insert(key.clone(), ctx.require(key)?);
        }

        self.runs += 1;
        self.log.push(ctx.stage_id.clone());
        if !saw.is_empty() {
            ctx.put(format!("{}.saw", ctx.stage_id), Value::Object(saw));
        }
        ctx.put(ctx.stage_id.clone(), self.runs as f64);
        Ok(())
    }
}

/// Input-capable stage publishing the bundle's `x` value as `captured`
pub struct CaptureStage {
    log: ExecutionLog,
    bundle: Option<InputBundle>,
    reject: bool,
}

impl InputSink for CaptureStage {
    fn accept_input(&mut self, bundle: &InputBundle) -> Result<(), StageError> {
        if self.reject {
            return Err(StageError::InputRejected("not today".to_string()));
        }
        self.log.push("accept");
        self.bundle = Some(bundle.clone());
        Ok(())
    }
}

#[async_trait]
impl Stage for CaptureStage {
    fn name(&self) -> &str {
        "CaptureStage"
    }

    async fn initialize(&mut self, parameters: &serde_json::Value) -> Result<(), StageError> {
        self.reject = parameters
            .get("reject")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(())
    }

    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        self.log.push(format!("process:{}", ctx.stage_id));
        let value = self
            .bundle
            .as_ref()
            .and_then(|b| b.get("x"))
            .cloned()
            .ok_or_else(|| StageError::MissingProduct("x".to_string()))?;
        ctx.put("captured", value);
        Ok(())
    }

    fn as_input_sink(&mut self) -> Option<&mut dyn InputSink> {
        Some(self)
    }
}

/// Completes only once every rendezvous stage of the run is in flight.
pub struct RendezvousStage {
    barrier: Arc<tokio::sync::Barrier>,
}

#[async_trait]
impl Stage for RendezvousStage {
    fn name(&self) -> &str {
        "RendezvousStage"
    }

    async fn process(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        tokio::time::timeout(Duration::from_secs(5), self.barrier.wait())
            .await
            .map_err(|_| StageError::ExecutionFailed("peers never arrived".to_string()))?;
        ctx.put(ctx.stage_id.clone(), true);
        Ok(())
    }
}

/// Fails `initialize` unconditionally
pub struct BrokenStage;

#[async_trait]
impl Stage for BrokenStage {
    fn name(&self) -> &str {
        "BrokenStage"
    }

    async fn initialize(&mut self, _parameters: &serde_json::Value) -> Result<(), StageError> {
        Err(StageError::InitializationFailed("bad parameters".to_string()))
    }

    async fn process(&mut self, _ctx: &StageContext) -> Result<(), StageError> {
        Ok(())
    }
}

/// Registry with every test stage. `created` counts factory invocations.
pub fn test_registry(log: &ExecutionLog, created: &Arc<AtomicUsize>, peers: usize) -> StageRegistry {
    let mut registry = StageRegistry::new();

    let record_log = log.clone();
    let record_count = created.clone();
    registry.register_fn("test.record", move |_params| {
        record_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordStage {
            log: record_log.clone(),
            params: RecordParameters::default(),
            runs: 0,
        }) as Box<dyn Stage>)
    });

    let capture_log = log.clone();
    registry.register_fn("test.capture", move |_params| {
        Ok(Box::new(CaptureStage {
            log: capture_log.clone(),
            bundle: None,
            reject: false,
        }) as Box<dyn Stage>)
    });

    let barrier = Arc::new(tokio::sync::Barrier::new(peers.max(1)));
    registry.register_fn("test.rendezvous", move |_params| {
        Ok(Box::new(RendezvousStage {
            barrier: barrier.clone(),
        }) as Box<dyn Stage>)
    });

    registry.register_fn("test.broken", |_params| Ok(Box::new(BrokenStage) as Box<dyn Stage>));

    registry.register_fn("test.unbuildable", |_params| {
        Err(StageError::Configuration("factory refused".to_string()))
    });

    registry
}

pub fn record(id: &str) -> StageDescriptor {
    StageDescriptor::new(id, "test.record")
}

/// A→B, A→C, B→D, C→D
pub fn diamond() -> Vec<StageDescriptor> {
    vec![
        record("a").then("b").then("c"),
        record("b").with_parameter("requires", serde_json::json!(["a"])).then("d"),
        record("c").with_parameter("requires", serde_json::json!(["a"])).then("d"),
        record("d").with_parameter("requires", serde_json::json!(["b", "c"])),
    ]
}

pub fn chain(ids: &[&str]) -> Vec<StageDescriptor> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let desc = record(id);
            match ids.get(i + 1) {
                Some(next) => desc.then(*next),
                None => desc,
            }
        })
        .collect()
}
