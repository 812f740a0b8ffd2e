//! Execution report domain models.
//!
//! A run always produces a report enumerating every chunk's terminal state,
//! even on partial failure. Partial results are never discarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunk::{Chunk, ChunkStatus};
use super::plan::ExecutionApproach;

/// Overall outcome of a plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every chunk completed
    Completed,
    /// Some chunks completed, some failed or were skipped
    PartialFailure,
    /// No chunk completed
    Failed,
    /// The caller cancelled between chunks
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Terminal record for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReport {
    pub chunk_id: Uuid,
    pub ordinal: u32,
    pub status: ChunkStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_minutes: Option<u32>,
    /// Result summary when the chunk completed
    pub result_summary: Option<String>,
    /// Error record when it failed
    pub error_detail: Option<String>,
    /// Whether the chunk was flagged for human review
    pub escalated: bool,
}

impl ChunkReport {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id,
            ordinal: chunk.ordinal,
            status: chunk.status,
            started_at: chunk.started_at,
            completed_at: chunk.completed_at,
            actual_minutes: chunk.actual_minutes,
            result_summary: chunk.result_summary.clone(),
            error_detail: chunk.error.clone(),
            escalated: chunk.escalated,
        }
    }
}

/// Full report for one plan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub plan_id: Uuid,
    pub goal: String,
    pub caller_id: String,
    pub approach: ExecutionApproach,
    pub status: ExecutionStatus,
    pub chunks: Vec<ChunkReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sum of actual minutes over chunks that ran
    pub total_actual_minutes: u32,
    /// Tokens reported consumed by the remote service
    pub total_tokens: u64,
}

impl ExecutionReport {
    /// Roll chunk terminal states up into an overall status. Cancellation is
    /// decided by the orchestrator and overrides the rollup.
    pub fn rollup_status(chunks: &[ChunkReport]) -> ExecutionStatus {
        let completed = chunks.iter().filter(|c| c.status == ChunkStatus::Completed).count();
        if completed == chunks.len() {
            ExecutionStatus::Completed
        } else if completed > 0 {
            ExecutionStatus::PartialFailure
        } else {
            ExecutionStatus::Failed
        }
    }

    pub fn completed_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.status == ChunkStatus::Completed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.status == ChunkStatus::Failed).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.status == ChunkStatus::Skipped).count()
    }
}

/// Point-in-time progress view, queryable at any time during execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    /// Completed chunks as a fraction of the total, in percent
    pub percent_complete: f64,
    /// Sum of estimates over non-terminal chunks
    pub estimated_minutes_remaining: u32,
    /// Chunk the selection rule would pick next, if any is ready
    pub next_ready_chunk: Option<Uuid>,
}
