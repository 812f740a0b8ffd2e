//! Chunk planning service.
//!
//! Turns a [`TaskUnderstanding`] into a [`ChunkPlan`]: an execution approach
//! picked from the understanding's signals, chunks generated from the
//! approach's template, a verified-acyclic dependency graph, and checkpoint
//! markers at safe resume positions. Planning is pure and deterministic
//! given the same understanding (chunk ids aside).

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::models::config::PlannerSettings;
use crate::domain::models::{
    CheckpointMarker, Chunk, ChunkPlan, ChunkPriority, ComplexityTier, ExecutionApproach,
    QualityGate, TaskCategory, TaskUnderstanding,
};

/// Produces a [`ChunkPlan`] from an analyzed goal.
pub struct ChunkPlanner {
    settings: PlannerSettings,
}

impl ChunkPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// Build the plan for an understanding.
    ///
    /// Goals at or under the single-chunk ceiling with low complexity, or
    /// whose estimate fits inside one chunk, stay a single chunk. Everything
    /// else goes through the approach templates.
    pub fn plan(&self, understanding: TaskUnderstanding) -> ChunkPlan {
        let chunk_size = self.chunk_size_for(understanding.complexity).max(1);
        let count = (understanding.estimated_minutes + chunk_size - 1) / chunk_size;

        if (understanding.estimated_minutes <= self.settings.single_chunk_max_minutes
            && understanding.complexity == ComplexityTier::Low)
            || count <= 1
        {
            return self.single_chunk_plan(understanding);
        }

        let approach = select_approach(&understanding);
        let minutes = split_minutes(
            understanding.estimated_minutes,
            count,
            chunk_size,
            self.settings.min_chunk_minutes,
        );

        let mut chunks = match approach {
            ExecutionApproach::DeadlineDriven => self.deadline_driven_chunks(&understanding, &minutes),
            ExecutionApproach::RiskFirst => self.risk_first_chunks(&understanding, &minutes),
            ExecutionApproach::BreadthThenDepth => {
                self.breadth_then_depth_chunks(&understanding, &minutes)
            }
            ExecutionApproach::FrameworkFirst => self.framework_first_chunks(&understanding, &minutes),
            ExecutionApproach::Sequential => self.sequential_chunks(&understanding, &minutes),
        };

        // The templates are acyclic by construction; this is the safety net
        // for any future template bug, not an expected path.
        if let Some(cycle) = detect_cycle(&chunks) {
            warn!(
                chunk_count = chunks.len(),
                cycle_len = cycle.len(),
                "chunk template produced a dependency cycle, regenerating as a sequential chain"
            );
            rechain_sequential(&mut chunks);
        }

        let mut plan = ChunkPlan::new(understanding, approach, chunks);
        plan.checkpoints = checkpoint_markers(&plan.chunks);

        debug!(
            plan_id = %plan.id,
            approach = approach.as_str(),
            chunks = plan.chunks.len(),
            checkpoints = plan.checkpoints.len(),
            "chunk plan assembled"
        );
        plan
    }

    fn chunk_size_for(&self, complexity: ComplexityTier) -> u32 {
        match complexity {
            ComplexityTier::Low => self.settings.chunk_minutes_low,
            ComplexityTier::Medium => self.settings.chunk_minutes_medium,
            ComplexityTier::High => self.settings.chunk_minutes_high,
        }
    }

    fn single_chunk_plan(&self, understanding: TaskUnderstanding) -> ChunkPlan {
        let minutes = understanding
            .estimated_minutes
            .max(self.settings.min_chunk_minutes);
        let chunk = Chunk::new(1, 1, understanding.goal.clone())
            .with_estimated_minutes(minutes)
            .with_capability(understanding.category.as_str())
            .with_gate(QualityGate::NonEmpty);

        let plan = ChunkPlan::new(understanding, ExecutionApproach::Sequential, vec![chunk]);
        debug!(plan_id = %plan.id, "goal fits a single chunk");
        plan
    }

    /// Shared scaffold every template builds chunks from.
    fn base_chunk(
        &self,
        ordinal: u32,
        count: u32,
        goal: String,
        minutes: u32,
        understanding: &TaskUnderstanding,
    ) -> Chunk {
        Chunk::new(ordinal, count, goal)
            .with_estimated_minutes(minutes.max(self.settings.min_chunk_minutes))
            .with_capability(understanding.category.as_str())
            .with_gate(QualityGate::NonEmpty)
    }

    /// Plain chain: every chunk depends on the previous one.
    fn sequential_chunks(&self, u: &TaskUnderstanding, minutes: &[u32]) -> Vec<Chunk> {
        let count = minutes.len() as u32;
        let mut chunks: Vec<Chunk> = Vec::with_capacity(minutes.len());
        for (i, &m) in minutes.iter().enumerate() {
            let ordinal = i as u32 + 1;
            let mut chunk = self
                .base_chunk(
                    ordinal,
                    count,
                    format!("Stage {ordinal} of {count}: {}", u.goal),
                    m,
                    u,
                )
                .with_priority(ChunkPriority::Medium);
            if let Some(prev) = chunks.last() {
                chunk = chunk.with_dependency(prev.id);
            }
            chunks.push(chunk);
        }
        chunks
    }

    /// Front-load the deadline material as a critical first chunk; the rest
    /// stays high priority and chains behind it.
    fn deadline_driven_chunks(&self, u: &TaskUnderstanding, minutes: &[u32]) -> Vec<Chunk> {
        let count = minutes.len() as u32;
        let mut chunks: Vec<Chunk> = Vec::with_capacity(minutes.len());
        for (i, &m) in minutes.iter().enumerate() {
            let ordinal = i as u32 + 1;
            let mut chunk = if ordinal == 1 {
                self.base_chunk(
                    ordinal,
                    count,
                    format!("Deliver the deadline-critical material first: {}", u.goal),
                    m,
                    u,
                )
                .with_priority(ChunkPriority::Critical)
                .with_capability("deadline-response")
                .with_gate(QualityGate::MinWords { count: 10 })
            } else {
                self.base_chunk(
                    ordinal,
                    count,
                    format!("Advance the remaining work ({ordinal} of {count}): {}", u.goal),
                    m,
                    u,
                )
                .with_priority(ChunkPriority::High)
            };
            if let Some(prev) = chunks.last() {
                chunk = chunk.with_dependency(prev.id);
            }
            chunks.push(chunk);
        }
        chunks
    }

    /// Privileged/high-risk material first (critical, no dependencies), a
    /// medium-risk pass behind it, then the remainder as a medium chain.
    fn risk_first_chunks(&self, u: &TaskUnderstanding, minutes: &[u32]) -> Vec<Chunk> {
        let count = minutes.len() as u32;
        let mut chunks: Vec<Chunk> = Vec::with_capacity(minutes.len());
        for (i, &m) in minutes.iter().enumerate() {
            let ordinal = i as u32 + 1;
            let mut chunk = match ordinal {
                1 => self
                    .base_chunk(
                        ordinal,
                        count,
                        format!("Review privileged and high-risk material: {}", u.goal),
                        m,
                        u,
                    )
                    .with_priority(ChunkPriority::Critical)
                    .with_capability("privileged-review")
                    .with_gate(QualityGate::MinWords { count: 10 }),
                2 => self
                    .base_chunk(
                        ordinal,
                        count,
                        format!("Work through the medium-risk material: {}", u.goal),
                        m,
                        u,
                    )
                    .with_priority(ChunkPriority::High),
                _ => self
                    .base_chunk(
                        ordinal,
                        count,
                        format!("Cover the remaining material ({ordinal} of {count}): {}", u.goal),
                        m,
                        u,
                    )
                    .with_priority(ChunkPriority::Medium),
            };
            if let Some(prev) = chunks.last() {
                chunk = chunk.with_dependency(prev.id);
            }
            chunks.push(chunk);
        }
        chunks
    }

    /// A breadth scan phase (strict sequence, at least one chunk), then a
    /// depth phase whose chunks all hang off the last breadth chunk and may
    /// run as independent branches.
    fn breadth_then_depth_chunks(&self, u: &TaskUnderstanding, minutes: &[u32]) -> Vec<Chunk> {
        let count = minutes.len() as u32;
        let breadth = ((f64::from(count) * self.settings.breadth_fraction).ceil() as u32)
            .clamp(1, count.saturating_sub(1).max(1));

        let mut chunks: Vec<Chunk> = Vec::with_capacity(minutes.len());
        let mut last_breadth: Option<Uuid> = None;
        for (i, &m) in minutes.iter().enumerate() {
            let ordinal = i as u32 + 1;
            let chunk = if ordinal <= breadth {
                let mut chunk = self
                    .base_chunk(
                        ordinal,
                        count,
                        format!("Survey the sources broadly ({ordinal} of {breadth}): {}", u.goal),
                        m,
                        u,
                    )
                    .with_priority(ChunkPriority::High)
                    .with_capability("survey");
                if let Some(prev) = last_breadth {
                    chunk = chunk.with_dependency(prev);
                }
                last_breadth = Some(chunk.id);
                chunk
            } else {
                let mut chunk = self
                    .base_chunk(
                        ordinal,
                        count,
                        format!("Deep dive ({ordinal} of {count}): {}", u.goal),
                        m,
                        u,
                    )
                    .with_priority(ChunkPriority::Medium)
                    .with_capability("synthesis");
                if let Some(anchor) = last_breadth {
                    chunk = chunk.with_dependency(anchor);
                }
                chunk
            };
            chunks.push(chunk);
        }
        chunks
    }

    /// Establish the analytical framework first; every later chunk applies
    /// it to the next portion and also chains on its predecessor.
    fn framework_first_chunks(&self, u: &TaskUnderstanding, minutes: &[u32]) -> Vec<Chunk> {
        let count = minutes.len() as u32;
        let mut chunks: Vec<Chunk> = Vec::with_capacity(minutes.len());
        let mut framework: Option<Uuid> = None;
        for (i, &m) in minutes.iter().enumerate() {
            let ordinal = i as u32 + 1;
            let chunk = if ordinal == 1 {
                let chunk = self
                    .base_chunk(
                        ordinal,
                        count,
                        format!("Establish the analytical framework: {}", u.goal),
                        m,
                        u,
                    )
                    .with_priority(ChunkPriority::High)
                    .with_capability("framework")
                    .with_gate(QualityGate::MinWords { count: 10 });
                framework = Some(chunk.id);
                chunk
            } else {
                let mut chunk = self
                    .base_chunk(
                        ordinal,
                        count,
                        format!("Apply the framework ({ordinal} of {count}): {}", u.goal),
                        m,
                        u,
                    )
                    .with_priority(ChunkPriority::Medium);
                if let Some(prev) = chunks.last() {
                    chunk = chunk.with_dependency(prev.id);
                }
                if let Some(first) = framework {
                    chunk = chunk.with_dependency(first);
                }
                chunk
            };
            chunks.push(chunk);
        }
        chunks
    }
}

/// Pick the approach from the understanding's signals, in fixed priority
/// order.
fn select_approach(u: &TaskUnderstanding) -> ExecutionApproach {
    if u.critical_deadlines > 0 {
        ExecutionApproach::DeadlineDriven
    } else if u.complexity == ComplexityTier::High && u.category == TaskCategory::Document {
        ExecutionApproach::RiskFirst
    } else if u.category == TaskCategory::Research {
        ExecutionApproach::BreadthThenDepth
    } else if u.category == TaskCategory::Analysis {
        ExecutionApproach::FrameworkFirst
    } else {
        ExecutionApproach::Sequential
    }
}

/// Nominal chunk size everywhere except the last chunk, which takes the
/// remainder, floored.
fn split_minutes(total: u32, count: u32, size: u32, floor: u32) -> Vec<u32> {
    let mut minutes = vec![size; count as usize];
    if let Some(last) = minutes.last_mut() {
        let consumed = size.saturating_mul(count.saturating_sub(1));
        *last = total.saturating_sub(consumed).max(floor);
    }
    minutes
}

/// Replace the dependency graph with a plain ordinal chain.
fn rechain_sequential(chunks: &mut [Chunk]) {
    let mut prev: Option<Uuid> = None;
    for chunk in chunks.iter_mut() {
        chunk.depends_on.clear();
        if let Some(p) = prev {
            chunk.depends_on.push(p);
        }
        prev = Some(chunk.id);
    }
}

/// Depth-first cycle search over the dependency edges. Returns the cycle
/// path (first node repeated at the end) when one exists.
pub fn detect_cycle(chunks: &[Chunk]) -> Option<Vec<Uuid>> {
    let adjacency: HashMap<Uuid, &[Uuid]> = chunks
        .iter()
        .map(|c| (c.id, c.depends_on.as_slice()))
        .collect();

    fn visit(
        node: Uuid,
        adjacency: &HashMap<Uuid, &[Uuid]>,
        visited: &mut HashSet<Uuid>,
        rec_stack: &mut HashSet<Uuid>,
        path: &mut Vec<Uuid>,
    ) -> Option<Vec<Uuid>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(deps) = adjacency.get(&node) {
            for &dep in deps.iter() {
                if rec_stack.contains(&dep) {
                    // Back edge: slice the cycle out of the current path.
                    let start = path.iter().position(|&p| p == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                if !visited.contains(&dep) {
                    if let Some(cycle) = visit(dep, adjacency, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        rec_stack.remove(&node);
        path.pop();
        None
    }

    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut rec_stack: HashSet<Uuid> = HashSet::new();
    let mut path: Vec<Uuid> = Vec::new();
    for chunk in chunks {
        if !visited.contains(&chunk.id) {
            if let Some(cycle) = visit(chunk.id, &adjacency, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(cycle);
            }
        }
    }
    None
}

/// One marker after every critical/high chunk, plus the quarter, half, and
/// three-quarter completion marks. A chunk carries at most one marker.
fn checkpoint_markers(chunks: &[Chunk]) -> Vec<CheckpointMarker> {
    let mut markers = Vec::new();
    let mut bound: HashSet<Uuid> = HashSet::new();

    for chunk in chunks {
        if chunk.priority.warrants_checkpoint() && bound.insert(chunk.id) {
            markers.push(CheckpointMarker {
                name: format!("post-{}-{}", chunk.priority.as_str(), chunk.ordinal),
                chunk_id: chunk.id,
            });
        }
    }

    let total = u32::try_from(chunks.len()).unwrap_or(u32::MAX);
    for (name, quarters) in [("quarter-mark", 1u32), ("half-mark", 2), ("three-quarter-mark", 3)] {
        let ordinal = (total.saturating_mul(quarters) + 3) / 4;
        if let Some(chunk) = chunks.iter().find(|c| c.ordinal == ordinal) {
            if bound.insert(chunk.id) {
                markers.push(CheckpointMarker {
                    name: name.to_string(),
                    chunk_id: chunk.id,
                });
            }
        }
    }

    markers
}
