//! Chunk domain model.
//!
//! Chunks are the time-boxed units a goal is decomposed into. They form a
//! DAG through declared dependencies; the planner creates them and only the
//! orchestrator mutates their run state afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Status of a chunk during plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Defined but not yet started
    Pending,
    /// A remote request for this chunk is in flight (or retrying)
    Running,
    /// Finished and passed its quality gates
    Completed,
    /// Exhausted its retry budgets or hit a non-recoverable error
    Failed,
    /// Will never run: an ancestor failed, or the plan was cancelled
    Skipped,
}

impl Default for ChunkStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<ChunkStatus> {
        match self {
            Self::Pending => vec![Self::Running, Self::Skipped, Self::Completed],
            Self::Running => vec![Self::Completed, Self::Failed],
            Self::Completed | Self::Failed | Self::Skipped => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Priority level for chunks. Higher values are selected first among ready
/// chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Default for ChunkPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl ChunkPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Priorities that trigger a checkpoint after the chunk completes.
    pub fn warrants_checkpoint(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

/// Post-condition a chunk's result must satisfy before the chunk is marked
/// completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityGate {
    /// Result must contain non-whitespace text
    NonEmpty,
    /// Result must contain at least this many words
    MinWords { count: u32 },
    /// Result must mention every listed term (case-insensitive)
    MentionsAll { terms: Vec<String> },
}

impl QualityGate {
    /// Evaluate the gate against a result text.
    pub fn evaluate(&self, text: &str) -> bool {
        match self {
            Self::NonEmpty => !text.trim().is_empty(),
            Self::MinWords { count } => text.split_whitespace().count() >= *count as usize,
            Self::MentionsAll { terms } => {
                let lower = text.to_lowercase();
                terms.iter().all(|t| lower.contains(&t.to_lowercase()))
            }
        }
    }

    /// Short description used in error records and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::NonEmpty => "non-empty result".to_string(),
            Self::MinWords { count } => format!("at least {count} words"),
            Self::MentionsAll { terms } => format!("mentions all of: {}", terms.join(", ")),
        }
    }
}

/// Recovery action declared for one failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    /// Retry once with a reduced-scope request
    RetryDegraded,
    /// Abandon the remaining scope of this chunk and let the plan proceed
    AbandonScope,
    /// Retry once with an adjusted request, escalating if it fails again
    RetryAdjusted,
    /// Mark failed and flag the chunk for human review
    Escalate,
}

/// Declared recovery actions for the three chunk failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackStrategy {
    /// Applied when the remote service fails hard (non-overload)
    pub on_service_failure: FallbackAction,
    /// Applied when the chunk exceeds its wall-clock deadline
    pub on_time_overrun: FallbackAction,
    /// Applied when the result fails a quality gate
    pub on_gate_failure: FallbackAction,
}

impl Default for FallbackStrategy {
    fn default() -> Self {
        Self {
            on_service_failure: FallbackAction::RetryDegraded,
            on_time_overrun: FallbackAction::AbandonScope,
            on_gate_failure: FallbackAction::RetryAdjusted,
        }
    }
}

/// A time-boxed unit of orchestrated work with declared dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier
    pub id: Uuid,
    /// 1-based position within the plan
    pub ordinal: u32,
    /// Total chunk count of the plan this chunk belongs to
    pub of_total: u32,
    /// Sub-goal text this chunk covers
    pub goal: String,
    /// Estimated minutes of work (never below five)
    pub estimated_minutes: u32,
    /// Selection priority among ready chunks
    pub priority: ChunkPriority,
    /// Chunk ids that must reach `completed` before this one may start
    pub depends_on: Vec<Uuid>,
    /// Capability tags the executing service is expected to cover
    pub capabilities: Vec<String>,
    /// Post-conditions on the result
    pub quality_gates: Vec<QualityGate>,
    /// Declared recovery actions per failure class
    pub fallback: FallbackStrategy,
    /// Current run status
    pub status: ChunkStatus,
    /// Remote invocations made for this chunk so far
    pub attempts: u32,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock minutes actually spent
    pub actual_minutes: Option<u32>,
    /// Result summary when completed
    pub result_summary: Option<String>,
    /// Error record when failed
    pub error: Option<String>,
    /// Whether the chunk was flagged for human review
    pub escalated: bool,
    /// When last mutated
    pub updated_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a pending chunk at the given position.
    pub fn new(ordinal: u32, of_total: u32, goal: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ordinal,
            of_total,
            goal: goal.into(),
            estimated_minutes: 5,
            priority: ChunkPriority::default(),
            depends_on: Vec::new(),
            capabilities: Vec::new(),
            quality_gates: Vec::new(),
            fallback: FallbackStrategy::default(),
            status: ChunkStatus::default(),
            attempts: 0,
            started_at: None,
            completed_at: None,
            actual_minutes: None,
            result_summary: None,
            error: None,
            escalated: false,
            updated_at: Utc::now(),
        }
    }

    /// Set the estimated minutes, clamped to the five-minute floor.
    pub fn with_estimated_minutes(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes.max(5);
        self
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: ChunkPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, chunk_id: Uuid) -> Self {
        if !self.depends_on.contains(&chunk_id) && chunk_id != self.id {
            self.depends_on.push(chunk_id);
        }
        self
    }

    /// Add a capability tag.
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.push(tag.into());
        self
    }

    /// Add a quality gate.
    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.quality_gates.push(gate);
        self
    }

    /// Set the fallback strategy.
    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Whether every dependency is in the completed set.
    pub fn is_ready(&self, completed: &HashSet<Uuid>) -> bool {
        self.status == ChunkStatus::Pending && self.depends_on.iter().all(|d| completed.contains(d))
    }

    pub fn can_transition_to(&self, new_status: ChunkStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, updating run-state timestamps.
    pub fn transition_to(&mut self, new_status: ChunkStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        self.updated_at = Utc::now();

        match new_status {
            ChunkStatus::Running => self.started_at = Some(Utc::now()),
            ChunkStatus::Completed | ChunkStatus::Failed | ChunkStatus::Skipped => {
                let now = Utc::now();
                self.completed_at = Some(now);
                if let Some(started) = self.started_at {
                    let minutes = (now - started).num_minutes().max(0);
                    self.actual_minutes = Some(u32::try_from(minutes).unwrap_or(u32::MAX));
                }
            }
            ChunkStatus::Pending => {}
        }

        Ok(())
    }

    /// Gates the given result text fails, in declaration order.
    pub fn failed_gates(&self, text: &str) -> Vec<&QualityGate> {
        self.quality_gates.iter().filter(|g| !g.evaluate(text)).collect()
    }

    /// Check if chunk is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock deadline for one execution pass, derived from the
    /// estimate and a configurable multiplier.
    pub fn deadline(&self, multiplier: f64) -> std::time::Duration {
        let secs = f64::from(self.estimated_minutes) * 60.0 * multiplier;
        std::time::Duration::from_millis((secs * 1000.0).max(1.0) as u64)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.goal.trim().is_empty() {
            return Err("Chunk goal cannot be empty".to_string());
        }
        if self.estimated_minutes < 5 {
            return Err(format!(
                "Chunk {} estimate below the five-minute floor",
                self.ordinal
            ));
        }
        if self.depends_on.contains(&self.id) {
            return Err("Chunk cannot depend on itself".to_string());
        }
        if self.ordinal == 0 || self.ordinal > self.of_total {
            return Err(format!(
                "Chunk ordinal {} out of range 1..={}",
                self.ordinal, self.of_total
            ));
        }
        Ok(())
    }
}
