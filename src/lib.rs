//! Cadence - Adaptive Rate-Limited Task Orchestrator
//!
//! Cadence turns a high-level work goal into a dependency-ordered plan of
//! chunks and executes them against a rate-limited generative text service,
//! pacing every request through a capacity ledger so the caller's quotas are
//! never overdrawn.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Plans, chunks, ledgers, and the ports they
//!   cross
//! - **Service Layer** (`services`): Task analysis, chunk planning, and the
//!   resource governor
//! - **Application Layer** (`application`): The run orchestrator
//! - **Adapters** (`adapters`): SQLite persistence and the text service
//!   client
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use cadence::application::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Analyze a goal, plan chunks, and run them
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{ExecutionEvent, Orchestrator};
pub use domain::models::{
    CadenceConfig, Chunk, ChunkPlan, ChunkPriority, ChunkStatus, ExecutionApproach,
    ExecutionReport, ExecutionStatus, LedgerSnapshot, RunCheckpoint, TaskUnderstanding,
};
pub use domain::ports::{
    CheckpointStore, HistoryStore, TextRequest, TextResponse, TextService, TextServiceError,
    WorkloadProvider,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ChunkPlanner, ResourceGovernor, TaskAnalyzer};
