// crates/stagecore/src/events/mod.rs

mod base;

pub use base::{EventBus, EventEmitter, ExecutionEvent, RunId, SkipReason, StageEvent};
