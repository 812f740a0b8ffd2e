//! Common test utilities for integration tests
//!
//! Provides shared fixtures and builders used across multiple integration
//! test files. Each test binary compiles this module separately, so some
//! helpers are dead code in some binaries.

use cadence::domain::models::{
    Chunk, ChunkPlan, ExecutionApproach, ExecutionSettings, GovernorSettings, TaskUnderstanding,
};

/// Governor settings generous enough that admission never throttles a test.
#[allow(dead_code)]
pub fn generous_governor() -> GovernorSettings {
    GovernorSettings {
        requests_per_minute: 10_000,
        tokens_per_minute: 10_000_000,
        daily_request_cap: 100_000,
        refill_interval_ms: 100,
        backoff_base_ms: 1,
        backoff_max_ms: 10,
        utc_offset_minutes: 0,
    }
}

/// Execution settings with a small retry budget so failure tests run fast.
#[allow(dead_code)]
pub fn fast_execution() -> ExecutionSettings {
    ExecutionSettings {
        deadline_multiplier: 10.0,
        max_overload_retries: 1,
        max_total_attempts: 5,
        tokens_per_minute_cost: 10,
        warn_at_percent: vec![],
        event_buffer: 64,
    }
}

/// A plan wrapping the given chunks, with dependents rebuilt.
#[allow(dead_code)]
pub fn plan_of(goal: &str, chunks: Vec<Chunk>) -> ChunkPlan {
    let understanding = TaskUnderstanding::new(goal, "test-caller");
    ChunkPlan::new(understanding, ExecutionApproach::Sequential, chunks)
}

/// `n` chunks where each depends on the previous one.
#[allow(dead_code)]
pub fn sequential_chunks(n: u32) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    for ordinal in 1..=n {
        let mut chunk = Chunk::new(ordinal, n, format!("Step {ordinal} of the work"));
        if let Some(previous) = chunks.last() {
            chunk = chunk.with_dependency(previous.id);
        }
        chunks.push(chunk);
    }
    chunks
}
