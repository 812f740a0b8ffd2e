//! Domain errors for the Cadence orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `A -> B -> C -> A`.
fn format_cycle_path(path: &[Uuid]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors that can occur while analyzing, planning, or driving a goal.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Chunk dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<Uuid>),

    #[error("Plan deadlocked: {pending} chunk(s) can never become ready")]
    PlanDeadlocked { plan_id: Uuid, pending: usize },

    #[error("Checkpoint does not belong to plan {plan_id}: found {checkpoint_plan_id}")]
    CheckpointMismatch { plan_id: Uuid, checkpoint_plan_id: Uuid },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
