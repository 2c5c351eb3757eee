//! Standard stage library
//!
//! Collection of general-purpose stages for wiring and inspecting pipelines

mod debug;
mod input;
mod product;
mod time;

pub use debug::DebugStage;
pub use input::InputBundleStage;
pub use product::{ConstantStage, MergeStage};
pub use time::DelayStage;
use stageruntime::StageRegistry;

use std::sync::Arc;

/// Register all standard stages with a registry
pub fn register_all(registry: &mut StageRegistry) {
    registry.register(Arc::new(debug::DebugStageFactory));
    registry.register(Arc::new(input::InputBundleStageFactory));
    registry.register(Arc::new(product::ConstantStageFactory));
    registry.register(Arc::new(product::MergeStageFactory));
    registry.register(Arc::new(time::DelayStageFactory));
}
