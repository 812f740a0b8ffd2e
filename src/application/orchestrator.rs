//! Plan execution engine.
//!
//! Drives a chunk plan against the remote text service with every call
//! admitted through the resource governor. Chunk failures never crash the
//! loop; they terminate only the failed chunk's downstream subgraph, and a
//! run always ends in a report covering every chunk's terminal state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ChunkPlan, ChunkReport, ChunkStatus, ExecutionReport, ExecutionSettings, ExecutionStatus,
    FallbackAction, ProgressSummary, RunCheckpoint, TaskCategory,
};
use crate::domain::ports::{
    CheckpointStore, HistoryStore, RecordedOutcome, TaskRecord, TextRequest, TextService,
};
use crate::services::{detect_cycle, ResourceGovernor};

/// Progress signal emitted while a plan runs.
///
/// Delivery is best effort: send failures are ignored so a slow or absent
/// consumer can never stall execution.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PlanStarted { plan_id: Uuid, chunk_count: usize },
    ChunkStarted { chunk_id: Uuid, ordinal: u32, goal: String },
    ChunkCompleted { chunk_id: Uuid, ordinal: u32 },
    ChunkFailed { chunk_id: Uuid, ordinal: u32, error: String },
    ChunkSkipped { chunk_id: Uuid, ordinal: u32 },
    /// Admission was deferred; the chunk waited this long for capacity
    AdmissionWaited { chunk_id: Uuid, waited: Duration },
    /// The service reported overload and the governor applied a backoff
    BackoffApplied { chunk_id: Uuid, delay: Duration },
    CheckpointSaved { plan_id: Uuid, marker: String },
    /// A running chunk has consumed this much of its deadline budget
    DeadlineWarning { chunk_id: Uuid, percent: u8 },
    PlanFinished { plan_id: Uuid, status: ExecutionStatus },
}

/// Drives one plan at a time to completion.
///
/// Each in-flight plan gets its own orchestrator; concurrent plans share the
/// governor so their combined consumption stays within the caller's limits.
pub struct Orchestrator {
    service: Arc<dyn TextService>,
    governor: Arc<ResourceGovernor>,
    checkpoints: Arc<dyn CheckpointStore>,
    history: Arc<dyn HistoryStore>,
    settings: ExecutionSettings,
    event_sender: Option<mpsc::Sender<ExecutionEvent>>,
    cancelled: Arc<AtomicBool>,
    progress: Arc<RwLock<ProgressSummary>>,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn TextService>,
        governor: Arc<ResourceGovernor>,
        checkpoints: Arc<dyn CheckpointStore>,
        history: Arc<dyn HistoryStore>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            service,
            governor,
            checkpoints,
            history,
            settings,
            event_sender: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(RwLock::new(ProgressSummary {
                percent_complete: 0.0,
                estimated_minutes_remaining: 0,
                next_ready_chunk: None,
            })),
        }
    }

    /// Attach an event channel for live progress reporting.
    pub fn with_event_sender(mut self, sender: mpsc::Sender<ExecutionEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Shared flag a signal handler can set to cancel the run.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Request cancellation. Takes effect before the next chunk starts;
    /// a chunk already talking to the service is never cut off mid-call.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Point-in-time progress for the current run.
    pub async fn progress(&self) -> ProgressSummary {
        *self.progress.read().await
    }

    /// Drive a plan from the start.
    #[instrument(skip(self, plan), fields(plan_id = %plan.id, chunks = plan.chunks.len()))]
    pub async fn run(&self, plan: ChunkPlan) -> DomainResult<ExecutionReport> {
        self.preflight(&plan)?;
        self.execute(plan).await
    }

    /// Resume a previously checkpointed plan.
    ///
    /// Chunks the checkpoint covers are restored to `completed` without
    /// re-running them, and the capacity ledger picks up where the snapshot
    /// left it so already-consumed capacity is not spent a second time.
    #[instrument(skip(self, plan, checkpoint), fields(plan_id = %plan.id, marker = %checkpoint.marker))]
    pub async fn resume(
        &self,
        mut plan: ChunkPlan,
        checkpoint: RunCheckpoint,
    ) -> DomainResult<ExecutionReport> {
        if checkpoint.plan_id != plan.id {
            return Err(DomainError::CheckpointMismatch {
                plan_id: plan.id,
                checkpoint_plan_id: checkpoint.plan_id,
            });
        }
        self.preflight(&plan)?;

        let mut restored = 0usize;
        for chunk in &mut plan.chunks {
            if chunk.status == ChunkStatus::Pending && checkpoint.covers(chunk.id) {
                chunk.transition_to(ChunkStatus::Completed).map_err(|reason| {
                    DomainError::InvalidStateTransition {
                        from: "pending".to_string(),
                        to: "completed".to_string(),
                        reason,
                    }
                })?;
                restored += 1;
            }
        }
        self.governor.restore(&checkpoint.ledger).await;
        info!(restored, "resumed from checkpoint");
        self.execute(plan).await
    }

    /// Structural checks before any capacity is spent.
    fn preflight(&self, plan: &ChunkPlan) -> DomainResult<()> {
        plan.validate().map_err(DomainError::ValidationFailed)?;
        if let Some(cycle) = detect_cycle(&plan.chunks) {
            return Err(DomainError::DependencyCycle(cycle));
        }
        Ok(())
    }

    async fn execute(&self, mut plan: ChunkPlan) -> DomainResult<ExecutionReport> {
        let started_at = Utc::now();
        info!(goal = %plan.goal, approach = plan.approach.as_str(), "plan execution started");
        self.emit(ExecutionEvent::PlanStarted { plan_id: plan.id, chunk_count: plan.chunks.len() });
        self.publish_progress(&plan).await;

        let mut total_tokens: u64 = 0;
        let mut cancelled = false;

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                warn!("cancellation requested, skipping remaining chunks");
                cancelled = true;
                self.skip_all_pending(&mut plan, "plan cancelled by caller");
                break;
            }

            let Some(chunk_id) = plan.next_ready_chunk() else {
                if plan.is_fully_terminal() {
                    break;
                }
                let pending = plan.chunks.iter().filter(|c| !c.is_terminal()).count();
                error!(pending, "no chunk can become ready; plan is deadlocked");
                return Err(DomainError::PlanDeadlocked { plan_id: plan.id, pending });
            };

            total_tokens += self.execute_chunk(&mut plan, chunk_id).await?;

            match plan.chunk(chunk_id).map(|c| c.status) {
                Some(ChunkStatus::Failed) => self.skip_descendants(&mut plan, chunk_id),
                Some(ChunkStatus::Completed) => {
                    let marker = plan
                        .checkpoints
                        .iter()
                        .find(|m| m.chunk_id == chunk_id)
                        .map(|m| m.name.clone());
                    if let Some(name) = marker {
                        self.save_checkpoint(&plan, &name).await;
                    }
                }
                _ => {}
            }
            self.publish_progress(&plan).await;
        }

        let finished_at = Utc::now();
        let chunks: Vec<ChunkReport> = plan.chunks.iter().map(ChunkReport::from_chunk).collect();
        let status = if cancelled {
            ExecutionStatus::Cancelled
        } else {
            ExecutionReport::rollup_status(&chunks)
        };
        let total_actual_minutes = chunks.iter().filter_map(|c| c.actual_minutes).sum();

        let report = ExecutionReport {
            plan_id: plan.id,
            goal: plan.goal.clone(),
            caller_id: plan.caller_id.clone(),
            approach: plan.approach,
            status,
            chunks,
            started_at,
            finished_at,
            total_actual_minutes,
            total_tokens,
        };

        if status == ExecutionStatus::Completed {
            if let Err(err) = self.checkpoints.delete(plan.id).await {
                warn!(error = %err, "failed to remove checkpoint after clean finish");
            }
        }
        self.record_outcome(&report, plan.understanding.category).await;

        info!(
            status = status.as_str(),
            completed = report.completed_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            total_tokens,
            "plan execution finished"
        );
        self.emit(ExecutionEvent::PlanFinished { plan_id: plan.id, status });
        Ok(report)
    }

    /// Run one chunk through its full retry ladder.
    ///
    /// Always leaves the chunk terminal. Overload retries are bounded by
    /// `max_overload_retries` and do not consume the single degraded or
    /// adjusted retry; the attempt ceiling bounds everything combined.
    /// Returns the tokens the service reported consuming for this chunk.
    #[instrument(skip(self, plan), fields(chunk_id = %chunk_id))]
    async fn execute_chunk(&self, plan: &mut ChunkPlan, chunk_id: Uuid) -> DomainResult<u64> {
        let (ordinal, goal, estimated_minutes, fallback, deadline) = {
            let chunk = plan.chunk(chunk_id).ok_or(DomainError::ChunkNotFound(chunk_id))?;
            (
                chunk.ordinal,
                chunk.goal.clone(),
                chunk.estimated_minutes,
                chunk.fallback,
                chunk.deadline(self.settings.deadline_multiplier),
            )
        };
        let token_cost = estimated_minutes.saturating_mul(self.settings.tokens_per_minute_cost);

        {
            let chunk = plan.chunk_mut(chunk_id).ok_or(DomainError::ChunkNotFound(chunk_id))?;
            chunk.transition_to(ChunkStatus::Running).map_err(|reason| {
                DomainError::InvalidStateTransition {
                    from: "pending".to_string(),
                    to: "running".to_string(),
                    reason,
                }
            })?;
        }
        info!(ordinal, estimated_minutes, token_cost, "chunk started");
        self.emit(ExecutionEvent::ChunkStarted { chunk_id, ordinal, goal: goal.clone() });

        let mut request = TextRequest::new(chunk_id, plan.caller_id.clone(), goal, token_cost);
        let mut overload_retries: u32 = 0;
        let mut degraded_used = false;
        let mut adjusted_used = false;
        let mut tokens_used: u64 = 0;

        loop {
            let attempts = plan
                .chunk(chunk_id)
                .ok_or(DomainError::ChunkNotFound(chunk_id))?
                .attempts;
            if attempts >= self.settings.max_total_attempts {
                warn!(ordinal, attempts, "attempt ceiling reached");
                self.fail_chunk(
                    plan,
                    chunk_id,
                    format!("attempt ceiling of {} reached", self.settings.max_total_attempts),
                    true,
                )?;
                break;
            }

            let waited = self.governor.await_admission(1, token_cost).await;
            if waited > Duration::ZERO {
                debug!(ordinal, waited_ms = waited.as_millis() as u64, "admission deferred");
                self.emit(ExecutionEvent::AdmissionWaited { chunk_id, waited });
            }

            if let Some(chunk) = plan.chunk_mut(chunk_id) {
                chunk.attempts += 1;
            }

            let watchdog = self.spawn_deadline_watchdog(chunk_id, deadline);
            let outcome = tokio::time::timeout(deadline, self.service.generate(&request)).await;
            if let Some(handle) = watchdog {
                handle.abort();
            }

            match outcome {
                Err(_) => {
                    warn!(
                        ordinal,
                        deadline_ms = deadline.as_millis() as u64,
                        "chunk exceeded its wall-clock deadline"
                    );
                    match fallback.on_time_overrun {
                        FallbackAction::RetryDegraded | FallbackAction::RetryAdjusted
                            if !degraded_used =>
                        {
                            degraded_used = true;
                            request = request.reduced();
                        }
                        FallbackAction::Escalate => {
                            self.fail_chunk(
                                plan,
                                chunk_id,
                                format!("exceeded its {}s deadline", deadline.as_secs()),
                                true,
                            )?;
                            break;
                        }
                        _ => {
                            self.fail_chunk(
                                plan,
                                chunk_id,
                                format!(
                                    "exceeded its {}s deadline; remaining scope abandoned",
                                    deadline.as_secs()
                                ),
                                false,
                            )?;
                            break;
                        }
                    }
                }
                Ok(Err(err)) if err.is_overload() => {
                    overload_retries += 1;
                    let delay = self.governor.on_overload(err.retry_after()).await;
                    warn!(
                        ordinal,
                        overload_retries,
                        delay_ms = delay.as_millis() as u64,
                        "service overloaded, backing off"
                    );
                    self.emit(ExecutionEvent::BackoffApplied { chunk_id, delay });
                    if overload_retries <= self.settings.max_overload_retries {
                        continue;
                    }
                    // Overload budget spent: the service-failure fallback decides.
                    match fallback.on_service_failure {
                        FallbackAction::RetryDegraded | FallbackAction::RetryAdjusted
                            if !degraded_used =>
                        {
                            degraded_used = true;
                            request = request.reduced();
                        }
                        FallbackAction::Escalate => {
                            self.fail_chunk(
                                plan,
                                chunk_id,
                                format!("service still overloaded after {overload_retries} backoff retries"),
                                true,
                            )?;
                            break;
                        }
                        _ => {
                            self.fail_chunk(
                                plan,
                                chunk_id,
                                format!("service still overloaded after {overload_retries} backoff retries"),
                                false,
                            )?;
                            break;
                        }
                    }
                }
                Ok(Err(err)) => {
                    warn!(ordinal, error = %err, "service call failed");
                    match fallback.on_service_failure {
                        FallbackAction::RetryDegraded | FallbackAction::RetryAdjusted
                            if !degraded_used =>
                        {
                            degraded_used = true;
                            request = request.reduced();
                            debug!(ordinal, "retrying once with reduced scope");
                        }
                        FallbackAction::Escalate => {
                            self.fail_chunk(plan, chunk_id, format!("service failure: {err}"), true)?;
                            break;
                        }
                        _ => {
                            self.fail_chunk(plan, chunk_id, format!("service failure: {err}"), false)?;
                            break;
                        }
                    }
                }
                Ok(Ok(response)) => {
                    tokens_used += response.usage.total();
                    self.governor.on_success().await;

                    let failing: Vec<String> = {
                        let chunk =
                            plan.chunk(chunk_id).ok_or(DomainError::ChunkNotFound(chunk_id))?;
                        chunk.failed_gates(&response.text).iter().map(|g| g.describe()).collect()
                    };
                    if failing.is_empty() {
                        self.complete_chunk(plan, chunk_id, &response.text)?;
                        break;
                    }

                    warn!(ordinal, gates = ?failing, "quality gates failed");
                    match fallback.on_gate_failure {
                        FallbackAction::RetryAdjusted | FallbackAction::RetryDegraded
                            if !adjusted_used =>
                        {
                            adjusted_used = true;
                            request = request.with_revision_note(failing.join("; "));
                            debug!(ordinal, "retrying once with gate feedback");
                        }
                        _ => {
                            // The adjusted retry is spent; escalate for human review.
                            self.fail_chunk(
                                plan,
                                chunk_id,
                                format!("quality gates failed: {}", failing.join("; ")),
                                true,
                            )?;
                            break;
                        }
                    }
                }
            }
        }

        Ok(tokens_used)
    }

    /// Emit advisory warnings as a running chunk consumes its deadline budget.
    fn spawn_deadline_watchdog(
        &self,
        chunk_id: Uuid,
        deadline: Duration,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if self.settings.warn_at_percent.is_empty() {
            return None;
        }
        let sender = self.event_sender.clone();
        let thresholds = self.settings.warn_at_percent.clone();
        Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for percent in thresholds {
                let mark = deadline.mul_f64(f64::from(percent) / 100.0);
                let elapsed = start.elapsed();
                if mark > elapsed {
                    tokio::time::sleep(mark - elapsed).await;
                }
                warn!(chunk_id = %chunk_id, percent, "chunk nearing its wall-clock deadline");
                if let Some(sender) = &sender {
                    let _ = sender.try_send(ExecutionEvent::DeadlineWarning { chunk_id, percent });
                }
            }
        }))
    }

    fn complete_chunk(&self, plan: &mut ChunkPlan, chunk_id: Uuid, text: &str) -> DomainResult<()> {
        let chunk = plan.chunk_mut(chunk_id).ok_or(DomainError::ChunkNotFound(chunk_id))?;
        chunk.result_summary = Some(summarize(text));
        chunk.transition_to(ChunkStatus::Completed).map_err(|reason| {
            DomainError::InvalidStateTransition {
                from: "running".to_string(),
                to: "completed".to_string(),
                reason,
            }
        })?;
        let ordinal = chunk.ordinal;
        info!(ordinal, attempts = chunk.attempts, "chunk completed");
        self.emit(ExecutionEvent::ChunkCompleted { chunk_id, ordinal });
        Ok(())
    }

    fn fail_chunk(
        &self,
        plan: &mut ChunkPlan,
        chunk_id: Uuid,
        error: String,
        escalate: bool,
    ) -> DomainResult<()> {
        let chunk = plan.chunk_mut(chunk_id).ok_or(DomainError::ChunkNotFound(chunk_id))?;
        chunk.error = Some(error.clone());
        chunk.escalated = escalate;
        chunk.transition_to(ChunkStatus::Failed).map_err(|reason| {
            DomainError::InvalidStateTransition {
                from: "running".to_string(),
                to: "failed".to_string(),
                reason,
            }
        })?;
        let ordinal = chunk.ordinal;
        error!(ordinal, error = %error, escalated = escalate, "chunk failed");
        self.emit(ExecutionEvent::ChunkFailed { chunk_id, ordinal, error });
        Ok(())
    }

    /// Skip every pending chunk downstream of a failed one.
    fn skip_descendants(&self, plan: &mut ChunkPlan, failed_id: Uuid) {
        let mut frontier: Vec<Uuid> = plan.dependents_of(failed_id).to_vec();
        let mut seen: HashSet<Uuid> = HashSet::new();
        while let Some(id) = frontier.pop() {
            if !seen.insert(id) {
                continue;
            }
            frontier.extend_from_slice(plan.dependents_of(id));
            self.skip_chunk(plan, id, "an upstream chunk failed");
        }
    }

    fn skip_all_pending(&self, plan: &mut ChunkPlan, reason: &str) {
        let pending: Vec<Uuid> = plan
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Pending)
            .map(|c| c.id)
            .collect();
        for id in pending {
            self.skip_chunk(plan, id, reason);
        }
    }

    fn skip_chunk(&self, plan: &mut ChunkPlan, chunk_id: Uuid, reason: &str) {
        let Some(chunk) = plan.chunk_mut(chunk_id) else { return };
        if chunk.status != ChunkStatus::Pending {
            return;
        }
        chunk.error = Some(reason.to_string());
        if chunk.transition_to(ChunkStatus::Skipped).is_ok() {
            let ordinal = chunk.ordinal;
            info!(ordinal, reason, "chunk skipped");
            self.emit(ExecutionEvent::ChunkSkipped { chunk_id, ordinal });
        }
    }

    /// Persist a resume point. Persistence failures are logged, not fatal;
    /// the run must not die because the checkpoint store is down.
    async fn save_checkpoint(&self, plan: &ChunkPlan, marker: &str) {
        let ledger = self.governor.snapshot().await;
        let mut completed: Vec<Uuid> = plan.completed_ids().into_iter().collect();
        completed.sort();
        let checkpoint = RunCheckpoint::new(plan.id, marker, completed, ledger);
        match self.checkpoints.save(&checkpoint).await {
            Ok(()) => {
                info!(marker, completed = checkpoint.completed_chunk_ids.len(), "checkpoint saved");
                self.emit(ExecutionEvent::CheckpointSaved {
                    plan_id: plan.id,
                    marker: marker.to_string(),
                });
            }
            Err(err) => warn!(marker, error = %err, "failed to persist checkpoint"),
        }
    }

    /// Write the finished run back so future analyses learn from it.
    async fn record_outcome(&self, report: &ExecutionReport, category: TaskCategory) {
        let outcome = match report.status {
            ExecutionStatus::Completed => RecordedOutcome::Completed,
            ExecutionStatus::PartialFailure => RecordedOutcome::Partial,
            ExecutionStatus::Failed => RecordedOutcome::Failed,
            ExecutionStatus::Cancelled => {
                if report.completed_count() > 0 {
                    RecordedOutcome::Partial
                } else {
                    RecordedOutcome::Failed
                }
            }
        };
        let wall_minutes = (report.finished_at - report.started_at).num_minutes().max(0);
        let minutes =
            u32::try_from(wall_minutes).unwrap_or(u32::MAX).max(report.total_actual_minutes);
        let record =
            TaskRecord::new(&report.caller_id, &report.goal, category, outcome, minutes);
        if let Err(err) = self.history.record(&record).await {
            warn!(error = %err, "failed to record run outcome");
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.try_send(event);
        }
    }

    async fn publish_progress(&self, plan: &ChunkPlan) {
        let summary = ProgressSummary {
            percent_complete: plan.percent_complete(),
            estimated_minutes_remaining: plan.estimated_minutes_remaining(),
            next_ready_chunk: plan.next_ready_chunk(),
        };
        *self.progress.write().await = summary;
    }
}

/// Bounded single-line form of a result for the report.
fn summarize(text: &str) -> String {
    const MAX_CHARS: usize = 240;
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(MAX_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}
