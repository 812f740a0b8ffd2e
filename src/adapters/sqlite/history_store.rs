//! SQLite implementation of the history store.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TaskCategory;
use crate::domain::ports::{HistoryStore, RecordedOutcome, TaskRecord};

use super::{parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn recent_for_caller(
        &self,
        caller_id: &str,
        limit: u32,
    ) -> DomainResult<Vec<TaskRecord>> {
        let rows: Vec<TaskRecordRow> = sqlx::query_as(
            "SELECT id, caller_id, goal, category, outcome, actual_minutes, recorded_at
             FROM task_history WHERE caller_id = ? ORDER BY recorded_at DESC LIMIT ?",
        )
        .bind(caller_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record(&self, record: &TaskRecord) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO task_history (id, caller_id, goal, category, outcome, actual_minutes, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.caller_id)
        .bind(&record.goal)
        .bind(record.category.as_str())
        .bind(record.outcome.as_str())
        .bind(i64::from(record.actual_minutes))
        .bind(record.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRecordRow {
    id: String,
    caller_id: String,
    goal: String,
    category: String,
    outcome: String,
    actual_minutes: i64,
    recorded_at: String,
}

impl TryFrom<TaskRecordRow> for TaskRecord {
    type Error = DomainError;

    fn try_from(row: TaskRecordRow) -> Result<Self, Self::Error> {
        let category = TaskCategory::from_str(&row.category).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid category: {}", row.category))
        })?;
        let outcome = RecordedOutcome::from_str(&row.outcome).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid outcome: {}", row.outcome))
        })?;

        Ok(TaskRecord {
            id: parse_uuid(&row.id)?,
            caller_id: row.caller_id,
            goal: row.goal,
            category,
            outcome,
            actual_minutes: u32::try_from(row.actual_minutes.max(0)).unwrap_or(u32::MAX),
            recorded_at: parse_datetime(&row.recorded_at)?,
        })
    }
}
