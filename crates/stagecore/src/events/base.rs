use crate::StageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

/// Events emitted while a pipeline run is in progress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: RunId,
        stage_count: usize,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        run_id: RunId,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StageStarted {
        run_id: RunId,
        stage_id: StageId,
        stage_type: String,
        timestamp: DateTime<Utc>,
    },
    StageCompleted {
        run_id: RunId,
        stage_id: StageId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StageFailed {
        run_id: RunId,
        stage_id: StageId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    StageSkipped {
        run_id: RunId,
        stage_id: StageId,
        reason: SkipReason,
        timestamp: DateTime<Utc>,
    },
    StageEvent {
        run_id: RunId,
        stage_id: StageId,
        event: StageEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Why a stage was never triggered during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason")]
pub enum SkipReason {
    /// At least one predecessor failed or was itself skipped.
    UpstreamFailed { upstream: StageId },
    /// `StopRun` policy halted scheduling after a failure.
    Halted,
    /// The caller cancelled the run.
    Cancelled,
}

/// Events reported by a stage from inside `process`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StageEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Event emitter handed to stages through their context
#[derive(Clone)]
pub struct EventEmitter {
    run_id: RunId,
    stage_id: StageId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(run_id: RunId, stage_id: StageId, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        Self {
            run_id,
            stage_id,
            sender,
        }
    }

    /// Emit a stage-specific event
    pub fn emit(&self, event: StageEvent) {
        let _ = self.sender.send(ExecutionEvent::StageEvent {
            run_id: self.run_id,
            stage_id: self.stage_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(StageEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(StageEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(StageEvent::Progress { percent, message });
    }
}

/// Process-local event bus. Sends never block; events are dropped when
/// nobody is subscribed.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, run_id: RunId, stage_id: StageId) -> EventEmitter {
        EventEmitter::new(run_id, stage_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
