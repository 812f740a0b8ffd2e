//! Governor pacing observed through full orchestrator runs, plus the
//! cross-instance snapshot semantics a process restart relies on.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cadence::adapters::sqlite::{
    create_migrated_test_pool, SqliteCheckpointStore, SqliteHistoryStore,
};
use cadence::adapters::text_service::MockTextService;
use cadence::application::{ExecutionEvent, Orchestrator};
use cadence::domain::models::{Chunk, DenialReason, ExecutionStatus, GovernorSettings};
use cadence::services::ResourceGovernor;
use tokio::sync::mpsc;

use common::{fast_execution, generous_governor, plan_of};

async fn orchestrator_with(
    governor: Arc<ResourceGovernor>,
    service: Arc<MockTextService>,
) -> Orchestrator {
    let pool = create_migrated_test_pool()
        .await
        .expect("failed to create test database");
    Orchestrator::new(
        service as _,
        governor,
        Arc::new(SqliteCheckpointStore::new(pool.clone())) as _,
        Arc::new(SqliteHistoryStore::new(pool)) as _,
        fast_execution(),
    )
}

#[tokio::test]
async fn test_run_is_paced_by_the_request_budget() {
    // Two requests per minute: chunks three and four each wait thirty
    // virtual seconds for the bucket to refill.
    let governor = Arc::new(ResourceGovernor::new(GovernorSettings {
        requests_per_minute: 2,
        tokens_per_minute: 10_000_000,
        daily_request_cap: 100_000,
        refill_interval_ms: 100,
        backoff_base_ms: 1,
        backoff_max_ms: 10,
        utc_offset_minutes: 0,
    }));
    let service = Arc::new(MockTextService::new());
    let chunks: Vec<Chunk> = (1..=4)
        .map(|ordinal| Chunk::new(ordinal, 4, format!("Independent step {ordinal}")))
        .collect();
    let plan = plan_of("Paced batch", chunks);

    let (sender, mut receiver) = mpsc::channel(64);
    let orchestrator = orchestrator_with(governor, service).await.with_event_sender(sender);

    // The pool must be built in real time: SQLite connections open on a plain
    // std thread the paused clock cannot see, so the acquire timeout would
    // auto-advance and fire first. Pause only for the measured run.
    tokio::time::pause();
    let started = tokio::time::Instant::now();
    let report = orchestrator.run(plan).await.expect("run failed");
    let elapsed = started.elapsed();

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert!(
        elapsed >= Duration::from_secs(59) && elapsed <= Duration::from_secs(62),
        "four requests at two per minute should take about a minute, took {elapsed:?}"
    );

    drop(orchestrator);
    let mut waits = Vec::new();
    while let Some(event) = receiver.recv().await {
        if let ExecutionEvent::AdmissionWaited { waited, .. } = event {
            waits.push(waited);
        }
    }
    assert_eq!(waits.len(), 2, "only the third and fourth chunks wait");
    for waited in waits {
        assert!(waited >= Duration::from_secs(29) && waited <= Duration::from_secs(31));
    }
}

#[tokio::test]
async fn test_daily_cap_denial_waits_for_local_midnight() {
    let governor = ResourceGovernor::new(GovernorSettings {
        daily_request_cap: 1,
        ..generous_governor()
    });

    assert!(governor.try_admit(1, 1).await.is_admitted());
    let decision = governor.try_admit(1, 1).await;
    assert_eq!(decision.reason(), Some(DenialReason::DailyCapReached));

    let wait = decision.wait().expect("denial carries a wait");
    assert!(wait > Duration::ZERO && wait <= Duration::from_secs(24 * 60 * 60));
}

#[tokio::test]
async fn test_restored_governor_carries_spend_and_failures() {
    let first = ResourceGovernor::new(generous_governor());
    for _ in 0..5 {
        assert!(first.try_admit(1, 100).await.is_admitted());
    }
    first.on_overload(Some(Duration::from_secs(60))).await;
    let snapshot = first.snapshot().await;
    assert!(snapshot.request_balance < 10_000.0, "snapshot captures the spend");

    let second = ResourceGovernor::new(generous_governor());
    second.restore(&snapshot).await;

    // Balances refill over time, but the daily count, failure streak, and
    // backoff deadline carry over exactly.
    let status = second.status().await;
    assert_eq!(status.daily_used, 5);
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.backoff_until.is_some());

    // Restoring the same snapshot again must not relax anything
    second.restore(&snapshot).await;
    let again = second.status().await;
    assert_eq!(again.daily_used, 5);
}

#[tokio::test]
async fn test_overload_streak_doubles_backoff_until_success() {
    let governor = ResourceGovernor::new(GovernorSettings {
        backoff_base_ms: 100,
        backoff_max_ms: 10_000,
        ..generous_governor()
    });

    let first = governor.on_overload(None).await;
    let second = governor.on_overload(None).await;
    let third = governor.on_overload(None).await;
    assert!(second >= first);
    assert!(third >= second);
    assert!(third >= Duration::from_millis(300), "third delay {third:?}");

    let status = governor.status().await;
    assert_eq!(status.consecutive_failures, 3);

    governor.on_success().await;
    let cleared = governor.status().await;
    assert_eq!(cleared.consecutive_failures, 0);
    assert!(cleared.backoff_until.is_none());
}
