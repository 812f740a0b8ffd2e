//! End-to-end orchestrator runs over in-memory stores and the mock text
//! service: clean completion, failure cascades, checkpoint resume, and
//! cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cadence::adapters::sqlite::{
    create_migrated_test_pool, SqliteCheckpointStore, SqliteHistoryStore,
};
use cadence::adapters::text_service::{MockReply, MockTextService};
use cadence::application::{ExecutionEvent, Orchestrator};
use cadence::domain::errors::DomainError;
use cadence::domain::models::{CheckpointMarker, ChunkStatus, ExecutionStatus};
use cadence::domain::ports::{CheckpointStore, HistoryStore, RecordedOutcome};
use cadence::services::ResourceGovernor;
use tokio::sync::mpsc;

use common::{fast_execution, generous_governor, plan_of, sequential_chunks};

struct Harness {
    service: Arc<MockTextService>,
    governor: Arc<ResourceGovernor>,
    checkpoints: Arc<SqliteCheckpointStore>,
    history: Arc<SqliteHistoryStore>,
}

impl Harness {
    async fn new() -> Self {
        let pool = create_migrated_test_pool()
            .await
            .expect("failed to create test database");
        Self {
            service: Arc::new(MockTextService::new()),
            governor: Arc::new(ResourceGovernor::new(generous_governor())),
            checkpoints: Arc::new(SqliteCheckpointStore::new(pool.clone())),
            history: Arc::new(SqliteHistoryStore::new(pool)),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.service) as _,
            Arc::clone(&self.governor),
            Arc::clone(&self.checkpoints) as _,
            Arc::clone(&self.history) as _,
            fast_execution(),
        )
    }
}

#[tokio::test]
async fn test_sequential_plan_runs_to_completion() {
    let harness = Harness::new().await;
    let chunks = sequential_chunks(3);
    let ordered_ids: Vec<_> = chunks.iter().map(|c| c.id).collect();
    let plan = plan_of("Draft the quarterly review", chunks);
    let plan_id = plan.id;

    let (sender, mut receiver) = mpsc::channel(64);
    let orchestrator = harness.orchestrator().with_event_sender(sender);

    let report = orchestrator.run(plan).await.expect("run failed");

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.completed_count(), 3);
    assert!(report.chunks.iter().all(|c| c.result_summary.is_some()));
    assert!(report.total_tokens > 0);

    // Requests went out in dependency order
    let requests = harness.service.received_requests().await;
    let request_ids: Vec<_> = requests.iter().map(|r| r.chunk_id).collect();
    assert_eq!(request_ids, ordered_ids);

    // A clean finish leaves no checkpoint behind
    assert!(harness
        .checkpoints
        .load(plan_id)
        .await
        .expect("load failed")
        .is_none());

    // The run was written back to history
    let records = harness
        .history
        .recent_for_caller("test-caller", 10)
        .await
        .expect("history read failed");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, RecordedOutcome::Completed);

    // The event stream brackets the run
    drop(orchestrator);
    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(ExecutionEvent::PlanStarted { chunk_count: 3, .. })));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::PlanFinished { status: ExecutionStatus::Completed, .. })
    ));
    let completions = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::ChunkCompleted { .. }))
        .count();
    assert_eq!(completions, 3);
}

#[tokio::test]
async fn test_failure_skips_descendants_but_keeps_independent_work() {
    let harness = Harness::new().await;

    let mut chunks = sequential_chunks(3);
    // A fourth chunk with no dependencies keeps running after the cascade
    chunks.push(cadence::domain::models::Chunk::new(4, 4, "Independent side task"));
    let failing_id = chunks[1].id;
    let skipped_id = chunks[2].id;
    let plan = plan_of("Prepare the filing", chunks);

    harness
        .service
        .set_reply_for_chunk(failing_id, MockReply::failure("schema rejected"))
        .await;

    let report = harness.orchestrator().run(plan).await.expect("run failed");

    assert_eq!(report.status, ExecutionStatus::PartialFailure);
    assert_eq!(report.completed_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.skipped_count(), 1);

    let failed = report.chunks.iter().find(|c| c.chunk_id == failing_id).unwrap();
    assert_eq!(failed.status, ChunkStatus::Failed);
    assert!(failed.error_detail.as_deref().unwrap().contains("schema rejected"));

    let skipped = report.chunks.iter().find(|c| c.chunk_id == skipped_id).unwrap();
    assert_eq!(skipped.status, ChunkStatus::Skipped);
    assert!(skipped.error_detail.as_deref().unwrap().contains("upstream"));

    let records = harness
        .history
        .recent_for_caller("test-caller", 10)
        .await
        .expect("history read failed");
    assert_eq!(records[0].outcome, RecordedOutcome::Partial);
}

#[tokio::test]
async fn test_checkpoint_resume_skips_completed_work_and_keeps_spend() {
    let harness = Harness::new().await;

    let chunks = sequential_chunks(2);
    let first_id = chunks[0].id;
    let second_id = chunks[1].id;
    let mut plan = plan_of("Write the migration guide", chunks);
    plan.checkpoints.push(CheckpointMarker {
        name: "post-1".to_string(),
        chunk_id: first_id,
    });
    let plan_id = plan.id;
    let resume_plan = plan.clone();

    // First run: chunk 2 fails hard, so the post-1 checkpoint survives
    harness
        .service
        .set_reply_for_chunk(second_id, MockReply::failure("service rejected the call"))
        .await;
    let report = harness.orchestrator().run(plan).await.expect("run failed");
    assert_eq!(report.status, ExecutionStatus::PartialFailure);

    let checkpoint = harness
        .checkpoints
        .load(plan_id)
        .await
        .expect("load failed")
        .expect("checkpoint missing after partial run");
    assert_eq!(checkpoint.marker, "post-1");
    assert_eq!(checkpoint.completed_chunk_ids, vec![first_id]);
    assert_eq!(checkpoint.ledger.daily_used, 1);

    // Second process: fresh governor and service, resume from the checkpoint
    let resumed = Harness {
        service: Arc::new(MockTextService::new()),
        governor: Arc::new(ResourceGovernor::new(generous_governor())),
        checkpoints: Arc::clone(&harness.checkpoints),
        history: Arc::clone(&harness.history),
    };
    let report = resumed
        .orchestrator()
        .resume(resume_plan, checkpoint)
        .await
        .expect("resume failed");

    assert_eq!(report.status, ExecutionStatus::Completed);

    // Only the unfinished chunk hit the service again
    let requests = resumed.service.received_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].chunk_id, second_id);

    // The restored ledger kept the prior spend: one restored plus one new
    let status = resumed.governor.status().await;
    assert_eq!(status.daily_used, 2);

    // The clean finish removed the checkpoint
    assert!(resumed
        .checkpoints
        .load(plan_id)
        .await
        .expect("load failed")
        .is_none());
}

#[tokio::test]
async fn test_resume_rejects_checkpoint_from_another_plan() {
    let harness = Harness::new().await;

    let plan = plan_of("Original goal", sequential_chunks(1));
    let other = plan_of("Different goal", sequential_chunks(1));
    let checkpoint = cadence::domain::models::RunCheckpoint::new(
        other.id,
        "post-1",
        vec![],
        harness.governor.snapshot().await,
    );

    let err = harness
        .orchestrator()
        .resume(plan, checkpoint)
        .await
        .expect_err("mismatched checkpoint accepted");
    assert!(matches!(err, DomainError::CheckpointMismatch { .. }));
    assert!(harness.service.received_requests().await.is_empty());
}

#[tokio::test]
async fn test_cancellation_skips_all_pending_chunks() {
    let harness = Harness::new().await;
    let plan = plan_of("Long-running job", sequential_chunks(3));

    let orchestrator = harness.orchestrator();
    orchestrator.cancel();
    let report = orchestrator.run(plan).await.expect("run failed");

    assert_eq!(report.status, ExecutionStatus::Cancelled);
    assert_eq!(report.skipped_count(), 3);
    assert!(harness.service.received_requests().await.is_empty());

    let records = harness
        .history
        .recent_for_caller("test-caller", 10)
        .await
        .expect("history read failed");
    assert_eq!(records[0].outcome, RecordedOutcome::Failed);
}

#[tokio::test]
async fn test_overload_exhaustion_fails_chunk_after_degraded_retry() {
    let harness = Harness::new().await;
    let service = Arc::new(MockTextService::with_default_reply(MockReply::overload(Some(
        Duration::from_millis(1),
    ))));
    let harness = Harness { service, ..harness };

    let plan = plan_of("Summarize the backlog", sequential_chunks(1));
    let report = harness.orchestrator().run(plan).await.expect("run failed");

    assert_eq!(report.status, ExecutionStatus::Failed);
    let chunk = &report.chunks[0];
    assert_eq!(chunk.status, ChunkStatus::Failed);
    assert!(chunk.error_detail.as_deref().unwrap().contains("overloaded"));
    assert!(!chunk.escalated);

    // One initial call, one allowed overload retry, one degraded retry
    let requests = harness.service.received_requests().await;
    assert_eq!(requests.len(), 3);
    assert!(!requests[0].reduced_scope);
    assert!(requests[2].reduced_scope);
}

#[tokio::test]
async fn test_dependency_cycle_rejected_before_any_service_call() {
    let harness = Harness::new().await;

    let mut chunks = sequential_chunks(2);
    let second_id = chunks[1].id;
    chunks[0].depends_on.push(second_id);
    let plan = plan_of("Cyclic plan", chunks);

    let err = harness
        .orchestrator()
        .run(plan)
        .await
        .expect_err("cyclic plan accepted");
    assert!(matches!(err, DomainError::DependencyCycle(_)));
    assert!(harness.service.received_requests().await.is_empty());
}
