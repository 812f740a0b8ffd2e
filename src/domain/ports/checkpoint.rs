//! Checkpoint store port.
//!
//! Checkpoints must survive process restart; stores are keyed by plan id and
//! hold one row per plan (the latest checkpoint supersedes earlier ones).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::RunCheckpoint;

/// Durable storage for run checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint, replacing any prior one for the same plan.
    async fn save(&self, checkpoint: &RunCheckpoint) -> DomainResult<()>;

    /// Latest checkpoint for a plan, if any.
    async fn load(&self, plan_id: Uuid) -> DomainResult<Option<RunCheckpoint>>;

    /// Remove a plan's checkpoint (after a clean finish).
    async fn delete(&self, plan_id: Uuid) -> DomainResult<()>;

    /// All stored checkpoints, newest first.
    async fn list(&self) -> DomainResult<Vec<RunCheckpoint>>;
}
