//! Run checkpoint domain model.
//!
//! A checkpoint is the durable record that lets a crashed or interrupted run
//! resume without re-running completed chunks or double-spending capacity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::LedgerSnapshot;

/// Durable resume record, keyed by plan id. Saved after every critical/high
/// chunk completes and at the plan's quarter marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// Plan this checkpoint belongs to
    pub plan_id: Uuid,
    /// Marker name that triggered this save
    pub marker: String,
    /// Chunks completed at save time
    pub completed_chunk_ids: Vec<Uuid>,
    /// Capacity ledger state at save time
    pub ledger: LedgerSnapshot,
    /// When the checkpoint was persisted
    pub saved_at: DateTime<Utc>,
}

impl RunCheckpoint {
    pub fn new(
        plan_id: Uuid,
        marker: impl Into<String>,
        completed_chunk_ids: Vec<Uuid>,
        ledger: LedgerSnapshot,
    ) -> Self {
        Self {
            plan_id,
            marker: marker.into(),
            completed_chunk_ids,
            ledger,
            saved_at: Utc::now(),
        }
    }

    pub fn covers(&self, chunk_id: Uuid) -> bool {
        self.completed_chunk_ids.contains(&chunk_id)
    }
}
