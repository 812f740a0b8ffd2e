//! Historical task store port.
//!
//! Prior tasks feed the analyzer's similarity scoring and duration
//! reconciliation; finished runs are written back so future analyses learn
//! from them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskCategory;

/// Terminal outcome recorded for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedOutcome {
    Completed,
    Partial,
    Failed,
}

impl RecordedOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "completed" | "complete" => Some(Self::Completed),
            "partial" | "partial_failure" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One prior task for a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub caller_id: String,
    /// Goal text as originally submitted
    pub goal: String,
    pub category: TaskCategory,
    pub outcome: RecordedOutcome,
    /// Wall-clock minutes the task actually took
    pub actual_minutes: u32,
    pub recorded_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        caller_id: impl Into<String>,
        goal: impl Into<String>,
        category: TaskCategory,
        outcome: RecordedOutcome,
        actual_minutes: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            caller_id: caller_id.into(),
            goal: goal.into(),
            category,
            outcome,
            actual_minutes,
            recorded_at: Utc::now(),
        }
    }
}

/// Read prior tasks per caller; write a record when a run finishes.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent records for a caller, newest first.
    async fn recent_for_caller(&self, caller_id: &str, limit: u32) -> DomainResult<Vec<TaskRecord>>;

    /// Persist a finished run.
    async fn record(&self, record: &TaskRecord) -> DomainResult<()>;
}
