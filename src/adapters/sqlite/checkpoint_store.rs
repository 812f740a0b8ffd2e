//! SQLite implementation of the checkpoint store.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{LedgerSnapshot, RunCheckpoint};
use crate::domain::ports::CheckpointStore;

use super::{parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &RunCheckpoint) -> DomainResult<()> {
        let completed_json = serde_json::to_string(&checkpoint.completed_chunk_ids)?;
        let ledger_json = serde_json::to_string(&checkpoint.ledger)?;

        // One row per plan; a newer save supersedes the old one.
        sqlx::query(
            "INSERT INTO run_checkpoints (plan_id, marker, completed_chunk_ids, ledger, saved_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(plan_id) DO UPDATE SET
                 marker = excluded.marker,
                 completed_chunk_ids = excluded.completed_chunk_ids,
                 ledger = excluded.ledger,
                 saved_at = excluded.saved_at",
        )
        .bind(checkpoint.plan_id.to_string())
        .bind(&checkpoint.marker)
        .bind(&completed_json)
        .bind(&ledger_json)
        .bind(checkpoint.saved_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, plan_id: Uuid) -> DomainResult<Option<RunCheckpoint>> {
        let row: Option<CheckpointRow> = sqlx::query_as(
            "SELECT plan_id, marker, completed_chunk_ids, ledger, saved_at
             FROM run_checkpoints WHERE plan_id = ?",
        )
        .bind(plan_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn delete(&self, plan_id: Uuid) -> DomainResult<()> {
        // Idempotent: a clean finish deletes whether or not a save happened.
        sqlx::query("DELETE FROM run_checkpoints WHERE plan_id = ?")
            .bind(plan_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<RunCheckpoint>> {
        let rows: Vec<CheckpointRow> = sqlx::query_as(
            "SELECT plan_id, marker, completed_chunk_ids, ledger, saved_at
             FROM run_checkpoints ORDER BY saved_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    plan_id: String,
    marker: String,
    completed_chunk_ids: String,
    ledger: String,
    saved_at: String,
}

impl TryFrom<CheckpointRow> for RunCheckpoint {
    type Error = DomainError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        let completed_chunk_ids: Vec<Uuid> = serde_json::from_str(&row.completed_chunk_ids)?;
        let ledger: LedgerSnapshot = serde_json::from_str(&row.ledger)?;

        Ok(RunCheckpoint {
            plan_id: parse_uuid(&row.plan_id)?,
            marker: row.marker,
            completed_chunk_ids,
            ledger,
            saved_at: parse_datetime(&row.saved_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{CapacityLedger, GovernorSettings};
    use chrono::{Duration, Utc};

    async fn store() -> SqliteCheckpointStore {
        SqliteCheckpointStore::new(create_migrated_test_pool().await.unwrap())
    }

    fn checkpoint(plan_id: Uuid, marker: &str, completed: Vec<Uuid>) -> RunCheckpoint {
        let ledger = CapacityLedger::new(&GovernorSettings::default(), Utc::now());
        RunCheckpoint::new(plan_id, marker, completed, ledger.snapshot(Utc::now()))
    }

    #[tokio::test]
    async fn test_save_and_load_round_trips() {
        let store = store().await;
        let plan_id = Uuid::new_v4();
        let done = Uuid::new_v4();
        let saved = checkpoint(plan_id, "post-critical-1", vec![done]);

        store.save(&saved).await.unwrap();
        let loaded = store.load(plan_id).await.unwrap().unwrap();

        assert_eq!(loaded.plan_id, plan_id);
        assert_eq!(loaded.marker, "post-critical-1");
        assert!(loaded.covers(done));
        assert_eq!(loaded.ledger.daily_used, saved.ledger.daily_used);
    }

    #[tokio::test]
    async fn test_newer_save_supersedes() {
        let store = store().await;
        let plan_id = Uuid::new_v4();
        let first_done = Uuid::new_v4();
        let second_done = Uuid::new_v4();

        store.save(&checkpoint(plan_id, "quarter-mark", vec![first_done])).await.unwrap();
        store
            .save(&checkpoint(plan_id, "half-mark", vec![first_done, second_done]))
            .await
            .unwrap();

        let loaded = store.load(plan_id).await.unwrap().unwrap();
        assert_eq!(loaded.marker, "half-mark");
        assert_eq!(loaded.completed_chunk_ids.len(), 2);

        // Still one row for the plan.
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store().await;
        let plan_id = Uuid::new_v4();

        store.delete(plan_id).await.unwrap();
        store.save(&checkpoint(plan_id, "half-mark", vec![])).await.unwrap();
        store.delete(plan_id).await.unwrap();

        assert!(store.load(plan_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let store = store().await;
        let older_plan = Uuid::new_v4();
        let newer_plan = Uuid::new_v4();

        let mut older = checkpoint(older_plan, "half-mark", vec![]);
        older.saved_at = Utc::now() - Duration::minutes(10);
        store.save(&older).await.unwrap();
        store.save(&checkpoint(newer_plan, "quarter-mark", vec![])).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].plan_id, newer_plan);
        assert_eq!(listed[1].plan_id, older_plan);
    }
}
