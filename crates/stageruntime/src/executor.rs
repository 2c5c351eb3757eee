use crate::graph::{Graph, StageCell};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use stagecore::{
    DataProductStore, ErrorHandling, EventBus, ExecutionEvent, InputBundle, PipelineSettings,
    RunError, RunId, SkipReason, StageContext, StageError, StageId,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Knobs for a single executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on stages in flight at once.
    pub max_parallel: usize,
    /// Per-stage limit on `process`; `None` waits forever.
    pub stage_timeout: Option<Duration>,
    pub on_error: ErrorHandling,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for ExecutorConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            max_parallel: settings.max_parallel_stages.max(1),
            stage_timeout: settings.stage_timeout(),
            on_error: settings.on_error,
        }
    }
}

/// Runs a built `Graph` to quiescence with AND-join semantics
///
/// Every run starts from fresh countdowns equal to each stage's in-degree.
/// Start nodes are triggered in declaration order; a stage becomes ready once
/// all of its predecessors have signalled, and it runs at most once per run.
/// Stage failures never abort the call: they are recorded against the stage
/// and every stage downstream of it is reported as skipped.
pub struct GraphExecutor {
    config: ExecutorConfig,
}

impl GraphExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one run and wait until no stage is running or ready.
    pub async fn run(
        &self,
        graph: &Graph,
        store: &Arc<DataProductStore>,
        events: &EventBus,
        input: Option<&InputBundle>,
    ) -> Result<RunOutcome, RunError> {
        self.run_until_cancelled(graph, store, events, input, CancellationToken::new())
            .await
    }

    /// Same as `run`, but stops triggering new stages once `cancellation`
    /// fires. Stages already in flight finish; the rest are skipped.
    pub async fn run_until_cancelled(
        &self,
        graph: &Graph,
        store: &Arc<DataProductStore>,
        events: &EventBus,
        input: Option<&InputBundle>,
        cancellation: CancellationToken,
    ) -> Result<RunOutcome, RunError> {
        let run_id = Uuid::new_v4();
        let start_time = Instant::now();

        if let Some(bundle) = input {
            graph.inject_input(bundle).await?;
        }

        events.emit(ExecutionEvent::RunStarted {
            run_id,
            stage_count: graph.len(),
            timestamp: Utc::now(),
        });
        tracing::debug!(
            "Executing pipeline with {} start node(s)",
            graph.start_nodes.len()
        );

        let mut state = RunState::new(graph, run_id, events);
        let mut running = FuturesUnordered::new();

        loop {
            while running.len() < self.config.max_parallel {
                let Some(idx) = state.ready.pop_front() else {
                    break;
                };

                let stop = if cancellation.is_cancelled() {
                    Some(SkipReason::Cancelled)
                } else if state.halted {
                    Some(SkipReason::Halted)
                } else {
                    None
                };
                if let Some(reason) = stop {
                    state.skip(idx, reason.clone());
                    state.release_successors(idx, Some(reason));
                    continue;
                }

                let node = &graph.nodes[idx];
                tracing::debug!("Executing stage: {} ({})", node.id, node.name);
                events.emit(ExecutionEvent::StageStarted {
                    run_id,
                    stage_id: node.id.clone(),
                    stage_type: node.stage_type.clone(),
                    timestamp: Utc::now(),
                });

                let ctx = StageContext {
                    stage_id: node.id.clone(),
                    run_id,
                    store: store.clone(),
                    events: events.create_emitter(run_id, node.id.clone()),
                    cancellation: cancellation.clone(),
                };
                running.push(self.spawn_stage(idx, node.stage.clone(), ctx));
            }

            // Nothing in flight means nothing is ready either: quiescence.
            let Some((idx, result, duration_ms)) = running.next().await else {
                break;
            };

            match result {
                Ok(()) => {
                    state.succeed(idx, duration_ms);
                    state.release_successors(idx, None);
                }
                Err(error) => {
                    let stage_id = graph.nodes[idx].id.clone();
                    state.fail(idx, error);
                    if self.config.on_error == ErrorHandling::StopRun && !state.halted {
                        tracing::warn!("Halting run after failure of stage '{}'", stage_id);
                        state.halted = true;
                    }
                    state.release_successors(
                        idx,
                        Some(SkipReason::UpstreamFailed { upstream: stage_id }),
                    );
                }
            }
        }

        let mut outcome = state.outcome;
        outcome.duration_ms = start_time.elapsed().as_millis() as u64;
        debug_assert_eq!(outcome.total(), graph.len(), "run ended before quiescence");

        tracing::info!(
            "Run {} finished in {}ms: {} succeeded, {} failed, {} skipped",
            run_id,
            outcome.duration_ms,
            outcome.succeeded.len(),
            outcome.failed.len(),
            outcome.skipped.len()
        );
        events.emit(ExecutionEvent::RunCompleted {
            run_id,
            succeeded: outcome.succeeded.len(),
            failed: outcome.failed.len(),
            skipped: outcome.skipped.len(),
            duration_ms: outcome.duration_ms,
            timestamp: Utc::now(),
        });

        Ok(outcome)
    }

    /// Run one stage on the worker pool. Errors, timeouts and panics all come
    /// back as a `StageError` tagged with the stage's index.
    fn spawn_stage(
        &self,
        idx: usize,
        stage: StageCell,
        ctx: StageContext,
    ) -> impl Future<Output = (usize, Result<(), StageError>, u64)> {
        let limit = self.config.stage_timeout;
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let mut stage = stage.lock().await;
            let result = match limit {
                Some(limit) => match tokio::time::timeout(limit, stage.process(&ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(StageError::Timeout {
                        millis: limit.as_millis() as u64,
                    }),
                },
                None => stage.process(&ctx).await,
            };
            (result, start.elapsed().as_millis() as u64)
        });

        async move {
            match handle.await {
                Ok((result, duration_ms)) => (idx, result, duration_ms),
                Err(join_error) => {
                    let message = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "task cancelled".to_string()
                    };
                    (idx, Err(StageError::Panicked(message)), 0)
                }
            }
        }
    }
}

impl Default for GraphExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Per-run bookkeeping, owned by the coordinating task
struct RunState<'g> {
    graph: &'g Graph,
    run_id: RunId,
    events: &'g EventBus,
    /// Unsatisfied predecessor signals per stage.
    remaining: Vec<usize>,
    /// Set once any predecessor failed or was skipped.
    blocked: Vec<Option<SkipReason>>,
    ready: VecDeque<usize>,
    halted: bool,
    outcome: RunOutcome,
}

impl<'g> RunState<'g> {
    fn new(graph: &'g Graph, run_id: RunId, events: &'g EventBus) -> Self {
        Self {
            graph,
            run_id,
            events,
            remaining: graph.nodes.iter().map(|n| n.in_degree).collect(),
            blocked: vec![None; graph.len()],
            ready: graph.start_nodes.iter().copied().collect(),
            halted: false,
            outcome: RunOutcome::new(run_id),
        }
    }

    fn succeed(&mut self, idx: usize, duration_ms: u64) {
        let stage_id = self.graph.nodes[idx].id.clone();
        tracing::debug!("Stage {} completed in {}ms", stage_id, duration_ms);
        self.events.emit(ExecutionEvent::StageCompleted {
            run_id: self.run_id,
            stage_id: stage_id.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        self.outcome.succeeded.push(stage_id);
    }

    fn fail(&mut self, idx: usize, error: StageError) {
        let stage_id = self.graph.nodes[idx].id.clone();
        tracing::error!("Stage {} failed: {}", stage_id, error);
        self.events.emit(ExecutionEvent::StageFailed {
            run_id: self.run_id,
            stage_id: stage_id.clone(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        self.outcome.failed.push(StageFailure { stage_id, error });
    }

    fn skip(&mut self, idx: usize, reason: SkipReason) {
        let stage_id = self.graph.nodes[idx].id.clone();
        tracing::debug!("Skipping stage {}: {:?}", stage_id, reason);
        self.events.emit(ExecutionEvent::StageSkipped {
            run_id: self.run_id,
            stage_id: stage_id.clone(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        self.outcome.skipped.push(SkippedStage { stage_id, reason });
    }

    /// Deliver the completion signal of `idx` along every outgoing edge.
    /// `blocked` carries the reason when `idx` did not succeed; successors
    /// that reach zero while blocked are skipped and signal in turn.
    fn release_successors(&mut self, idx: usize, blocked: Option<SkipReason>) {
        let graph = self.graph;
        let mut pending = vec![(idx, blocked)];

        while let Some((from, reason)) = pending.pop() {
            for &to in &graph.nodes[from].successors {
                if let Some(reason) = &reason {
                    if self.blocked[to].is_none() {
                        self.blocked[to] = Some(reason.clone());
                    }
                }

                self.remaining[to] -= 1;
                if self.remaining[to] > 0 {
                    continue;
                }

                match self.blocked[to].clone() {
                    Some(reason) => {
                        self.skip(to, reason.clone());
                        pending.push((to, Some(reason)));
                    }
                    None => self.ready.push_back(to),
                }
            }
        }
    }
}

/// Structured result of one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// Stage ids in completion order.
    pub succeeded: Vec<StageId>,
    pub failed: Vec<StageFailure>,
    pub skipped: Vec<SkippedStage>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage_id: StageId,
    pub error: StageError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedStage {
    pub stage_id: StageId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl RunOutcome {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            duration_ms: 0,
        }
    }

    /// True when every stage ran and none failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    pub fn status(&self, stage_id: &str) -> Option<StageStatus> {
        if self.succeeded.iter().any(|id| id == stage_id) {
            Some(StageStatus::Succeeded)
        } else if self.failed.iter().any(|f| f.stage_id == stage_id) {
            Some(StageStatus::Failed)
        } else if self.skipped.iter().any(|s| s.stage_id == stage_id) {
            Some(StageStatus::Skipped)
        } else {
            None
        }
    }

    pub fn failure(&self, stage_id: &str) -> Option<&StageError> {
        self.failed
            .iter()
            .find(|f| f.stage_id == stage_id)
            .map(|f| &f.error)
    }

    pub fn skip_reason(&self, stage_id: &str) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|s| s.stage_id == stage_id)
            .map(|s| &s.reason)
    }
}
