//! Core services: goal analysis, chunk planning, and admission control.

pub mod analyzer;
pub mod governor;
pub mod planner;

pub use analyzer::TaskAnalyzer;
pub use governor::{GovernorStatus, ResourceGovernor};
pub use planner::{detect_cycle, ChunkPlanner};
