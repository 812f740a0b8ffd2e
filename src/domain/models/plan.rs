//! Chunk plan domain model.
//!
//! A plan is the planner's output: the full chunk set, a derived dependents
//! index for O(1) ready-set updates, checkpoint markers, and the originating
//! understanding for traceability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::chunk::{Chunk, ChunkStatus};
use super::understanding::TaskUnderstanding;

/// Chunk-generation template family. Selection is by fixed priority over the
/// understanding's signals; the set is closed so handling stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionApproach {
    /// Critical deadline present: deadline material first
    DeadlineDriven,
    /// High-complexity document work: privileged/high-risk material first
    RiskFirst,
    /// Research: breadth scan phase, then depth phase
    BreadthThenDepth,
    /// Analysis: establish the framework, then apply it
    FrameworkFirst,
    /// Plain sequential chain
    Sequential,
}

impl Default for ExecutionApproach {
    fn default() -> Self {
        Self::Sequential
    }
}

impl ExecutionApproach {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineDriven => "deadline_driven",
            Self::RiskFirst => "risk_first",
            Self::BreadthThenDepth => "breadth_then_depth",
            Self::FrameworkFirst => "framework_first",
            Self::Sequential => "sequential",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deadline_driven" | "deadline-driven" => Some(Self::DeadlineDriven),
            "risk_first" | "risk-first" => Some(Self::RiskFirst),
            "breadth_then_depth" | "breadth-then-depth" => Some(Self::BreadthThenDepth),
            "framework_first" | "framework-first" => Some(Self::FrameworkFirst),
            "sequential" => Some(Self::Sequential),
            _ => None,
        }
    }
}

/// Named safe-resume position bound to a chunk. The orchestrator persists a
/// checkpoint when the bound chunk completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMarker {
    /// Marker name, e.g. `post-critical-1` or `half-mark`
    pub name: String,
    /// Chunk whose completion triggers persistence
    pub chunk_id: Uuid,
}

/// The planner's full output for one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// Unique plan identifier (checkpoints are keyed by it)
    pub id: Uuid,
    /// The overall goal this plan decomposes
    pub goal: String,
    /// Caller the plan belongs to
    pub caller_id: String,
    /// Selected chunk-generation approach
    pub approach: ExecutionApproach,
    /// The chunks, in ordinal order
    pub chunks: Vec<Chunk>,
    /// Derived index: chunk id -> ids of chunks that depend on it
    pub dependents: HashMap<Uuid, Vec<Uuid>>,
    /// Safe-resume markers
    pub checkpoints: Vec<CheckpointMarker>,
    /// The understanding this plan was derived from
    pub understanding: TaskUnderstanding,
    /// When the plan was created
    pub created_at: DateTime<Utc>,
}

impl ChunkPlan {
    /// Assemble a plan and derive its dependents index.
    pub fn new(understanding: TaskUnderstanding, approach: ExecutionApproach, chunks: Vec<Chunk>) -> Self {
        let mut plan = Self {
            id: Uuid::new_v4(),
            goal: understanding.goal.clone(),
            caller_id: understanding.caller_id.clone(),
            approach,
            chunks,
            dependents: HashMap::new(),
            checkpoints: Vec::new(),
            understanding,
            created_at: Utc::now(),
        };
        plan.rebuild_dependents();
        plan
    }

    /// Recompute the dependents index from the chunks' dependency sets.
    pub fn rebuild_dependents(&mut self) {
        let mut index: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for chunk in &self.chunks {
            index.entry(chunk.id).or_default();
            for dep in &chunk.depends_on {
                index.entry(*dep).or_default().push(chunk.id);
            }
        }
        for dependents in index.values_mut() {
            dependents.sort();
        }
        self.dependents = index;
    }

    pub fn chunk(&self, id: Uuid) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    pub fn chunk_mut(&mut self, id: Uuid) -> Option<&mut Chunk> {
        self.chunks.iter_mut().find(|c| c.id == id)
    }

    /// Ids of chunks that directly depend on the given chunk.
    pub fn dependents_of(&self, id: Uuid) -> &[Uuid] {
        self.dependents.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Ids of all completed chunks.
    pub fn completed_ids(&self) -> HashSet<Uuid> {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Completed)
            .map(|c| c.id)
            .collect()
    }

    /// Pending chunks whose full dependency set is completed, ordered by
    /// descending priority then ascending ordinal.
    pub fn ready_chunks(&self) -> Vec<&Chunk> {
        let completed = self.completed_ids();
        let mut ready: Vec<&Chunk> = self.chunks.iter().filter(|c| c.is_ready(&completed)).collect();
        ready.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.ordinal.cmp(&b.ordinal)));
        ready
    }

    /// Id of the chunk the selection rule would pick next, if any.
    pub fn next_ready_chunk(&self) -> Option<Uuid> {
        self.ready_chunks().first().map(|c| c.id)
    }

    pub fn has_running(&self) -> bool {
        self.chunks.iter().any(|c| c.status == ChunkStatus::Running)
    }

    pub fn is_fully_terminal(&self) -> bool {
        self.chunks.iter().all(Chunk::is_terminal)
    }

    /// Completed chunks as a fraction of the total, in percent.
    pub fn percent_complete(&self) -> f64 {
        if self.chunks.is_empty() {
            return 100.0;
        }
        let completed = self.chunks.iter().filter(|c| c.status == ChunkStatus::Completed).count();
        #[allow(clippy::cast_precision_loss)]
        {
            completed as f64 / self.chunks.len() as f64 * 100.0
        }
    }

    /// Sum of estimates over chunks that have not reached a terminal state.
    pub fn estimated_minutes_remaining(&self) -> u32 {
        self.chunks
            .iter()
            .filter(|c| !c.is_terminal())
            .map(|c| c.estimated_minutes)
            .sum()
    }

    /// Total estimate across all chunks.
    pub fn estimated_minutes_total(&self) -> u32 {
        self.chunks.iter().map(|c| c.estimated_minutes).sum()
    }

    /// Structural validation: chunk invariants hold, dependencies resolve,
    /// ordinals are consistent. Cycle detection is the planner's job and is
    /// re-checked by the orchestrator before a run.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunks.is_empty() {
            return Err("Plan has no chunks".to_string());
        }
        let ids: HashSet<Uuid> = self.chunks.iter().map(|c| c.id).collect();
        if ids.len() != self.chunks.len() {
            return Err("Plan contains duplicate chunk ids".to_string());
        }
        let total = u32::try_from(self.chunks.len()).unwrap_or(u32::MAX);
        for chunk in &self.chunks {
            chunk.validate()?;
            if chunk.of_total != total {
                return Err(format!(
                    "Chunk {} declares total {} but the plan has {}",
                    chunk.ordinal, chunk.of_total, total
                ));
            }
            for dep in &chunk.depends_on {
                if !ids.contains(dep) {
                    return Err(format!(
                        "Chunk {} depends on unknown chunk {dep}",
                        chunk.ordinal
                    ));
                }
            }
        }
        for marker in &self.checkpoints {
            if !ids.contains(&marker.chunk_id) {
                return Err(format!("Checkpoint {} bound to unknown chunk", marker.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::chunk::ChunkPriority;

    fn plan_with_chain(n: u32) -> ChunkPlan {
        let understanding = TaskUnderstanding::new("Prepare the quarterly filing", "caller-1");
        let mut chunks = Vec::new();
        let mut prev: Option<Uuid> = None;
        for i in 1..=n {
            let mut chunk = Chunk::new(i, n, format!("Part {i}")).with_estimated_minutes(20);
            if let Some(p) = prev {
                chunk = chunk.with_dependency(p);
            }
            prev = Some(chunk.id);
            chunks.push(chunk);
        }
        ChunkPlan::new(understanding, ExecutionApproach::Sequential, chunks)
    }

    #[test]
    fn test_dependents_index() {
        let plan = plan_with_chain(3);
        let first = plan.chunks[0].id;
        let second = plan.chunks[1].id;
        assert_eq!(plan.dependents_of(first), &[second]);
        assert!(plan.dependents_of(plan.chunks[2].id).is_empty());
    }

    #[test]
    fn test_ready_ordering_prefers_priority_then_ordinal() {
        let understanding = TaskUnderstanding::new("Independent work", "caller-1");
        let a = Chunk::new(1, 3, "a").with_priority(ChunkPriority::Medium);
        let b = Chunk::new(2, 3, "b").with_priority(ChunkPriority::Critical);
        let c = Chunk::new(3, 3, "c").with_priority(ChunkPriority::Critical);
        let (b_id, c_id) = (b.id, c.id);
        let plan = ChunkPlan::new(understanding, ExecutionApproach::Sequential, vec![a, b, c]);

        let ready: Vec<Uuid> = plan.ready_chunks().iter().map(|c| c.id).collect();
        assert_eq!(ready[0], b_id);
        assert_eq!(ready[1], c_id);
        assert_eq!(plan.next_ready_chunk(), Some(b_id));
    }

    #[test]
    fn test_chain_exposes_one_ready_chunk() {
        let plan = plan_with_chain(3);
        let ready = plan.ready_chunks();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].ordinal, 1);
    }

    #[test]
    fn test_progress_accounting() {
        let mut plan = plan_with_chain(4);
        assert_eq!(plan.percent_complete(), 0.0);
        assert_eq!(plan.estimated_minutes_remaining(), 80);

        let first = plan.chunks[0].id;
        let chunk = plan.chunk_mut(first).unwrap();
        chunk.transition_to(ChunkStatus::Running).unwrap();
        chunk.transition_to(ChunkStatus::Completed).unwrap();

        assert_eq!(plan.percent_complete(), 25.0);
        assert_eq!(plan.estimated_minutes_remaining(), 60);
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let mut plan = plan_with_chain(2);
        plan.chunks[1].depends_on.push(Uuid::new_v4());
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_total() {
        let mut plan = plan_with_chain(2);
        plan.chunks[0].of_total = 7;
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_approach_round_trip() {
        for approach in [
            ExecutionApproach::DeadlineDriven,
            ExecutionApproach::RiskFirst,
            ExecutionApproach::BreadthThenDepth,
            ExecutionApproach::FrameworkFirst,
            ExecutionApproach::Sequential,
        ] {
            assert_eq!(ExecutionApproach::from_str(approach.as_str()), Some(approach));
        }
    }
}
