//! Domain models for the Cadence orchestrator.

pub mod checkpoint;
pub mod chunk;
pub mod config;
pub mod ledger;
pub mod plan;
pub mod report;
pub mod understanding;

pub use checkpoint::RunCheckpoint;
pub use chunk::{Chunk, ChunkPriority, ChunkStatus, FallbackAction, FallbackStrategy, QualityGate};
pub use config::{
    AnalyzerSettings, CadenceConfig, ExecutionSettings, GovernorSettings, LoggingSettings,
    PlannerSettings, ServiceSettings, StorageSettings,
};
pub use ledger::{AdmissionDecision, CapacityLedger, DenialReason, LedgerSnapshot};
pub use plan::{CheckpointMarker, ChunkPlan, ExecutionApproach};
pub use report::{ChunkReport, ExecutionReport, ExecutionStatus, ProgressSummary};
pub use understanding::{ComplexityTier, RiskFlag, SimilarTask, TaskCategory, TaskUnderstanding};
