//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - TextService: Generative-text service operations
//! - HistoryStore: Persistence for completed task records
//! - CheckpointStore: Persistence for run checkpoints
//! - WorkloadProvider: Caller workload context (documents, deadlines)
//!
//! These traits define the contracts that allow the domain to be independent
//! of specific infrastructure implementations.

pub mod checkpoint;
pub mod history;
pub mod static_workload;
pub mod text_service;
pub mod workload;

pub use checkpoint::CheckpointStore;
pub use history::{HistoryStore, RecordedOutcome, TaskRecord};
pub use static_workload::StaticWorkload;
pub use text_service::{
    TextRequest, TextResponse, TextService, TextServiceError, TokenUsage,
};
pub use workload::{DeadlineSignal, WorkloadProvider, WorkloadSnapshot};
