//! Admission control against the capacity ledger.
//!
//! The governor serializes all ledger access behind a single async mutex and
//! samples the clocks on every call: monotonic elapsed time drives bucket
//! refill, wall-clock time drives the daily window and backoff deadlines.
//! Callers that cannot proceed without capacity use
//! [`await_admission`](ResourceGovernor::await_admission), which sleeps
//! exactly the wait the ledger reports and re-checks; capacity exhaustion is
//! never surfaced as an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::models::config::GovernorSettings;
use crate::domain::models::{AdmissionDecision, CapacityLedger, LedgerSnapshot};

/// Read-only view of the governor for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStatus {
    pub request_balance: f64,
    pub request_capacity: f64,
    pub token_balance: f64,
    pub token_capacity: f64,
    pub daily_used: u32,
    pub daily_cap: u32,
    pub consecutive_failures: u32,
    pub backoff_until: Option<DateTime<Utc>>,
}

struct GovernorState {
    ledger: CapacityLedger,
    last_refill: Instant,
}

/// Shared admission gate for all remote calls.
///
/// One instance is created at startup and handed to every component that
/// talks to the text service; constructing a second governor would split the
/// ledger and overdraw the real quota.
pub struct ResourceGovernor {
    settings: GovernorSettings,
    state: Mutex<GovernorState>,
}

impl ResourceGovernor {
    /// Create a governor with full buckets and a fresh daily window.
    pub fn new(settings: GovernorSettings) -> Self {
        let ledger = CapacityLedger::new(&settings, Utc::now());
        Self {
            settings,
            state: Mutex::new(GovernorState {
                ledger,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Single admission check. Debits the ledger when admitted; otherwise
    /// reports the denial reason and the wait after which a re-check can
    /// succeed. Never blocks beyond the internal lock.
    pub async fn try_admit(&self, request_cost: u32, token_cost: u32) -> AdmissionDecision {
        let (request_cost, token_cost) = self.clamp_costs(request_cost, token_cost);
        let mut state = self.state.lock().await;
        let now = Self::advance(&mut state);
        state
            .ledger
            .try_admit(request_cost, token_cost, Duration::ZERO, now)
    }

    /// Block until the request is admitted. Sleeps exactly the wait reported
    /// by each denial, then re-checks; returns the total time spent waiting.
    pub async fn await_admission(&self, request_cost: u32, token_cost: u32) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            match self.try_admit(request_cost, token_cost).await {
                AdmissionDecision::Admitted => return waited,
                AdmissionDecision::Denied { reason, wait } => {
                    debug!(
                        reason = reason.as_str(),
                        wait_ms = wait.as_millis() as u64,
                        "admission denied, sleeping until re-check"
                    );
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }

    /// Clear backoff state after a successful remote call.
    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;
        state.ledger.record_success();
    }

    /// Apply an overload signal and return the delay until requests may flow
    /// again. A `retry_after` hint from the service wins over the computed
    /// exponential backoff.
    pub async fn on_overload(&self, retry_after: Option<Duration>) -> Duration {
        let mut state = self.state.lock().await;
        let now = Self::advance(&mut state);
        state.ledger.record_overload(retry_after, now);
        match state.ledger.backoff_until() {
            Some(deadline) if deadline > now => {
                let delay_ms = (deadline - now).num_milliseconds().max(0) as u64;
                Duration::from_millis(delay_ms)
            }
            _ => Duration::ZERO,
        }
    }

    /// Current ledger state for embedding in a checkpoint.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        let mut state = self.state.lock().await;
        let now = Self::advance(&mut state);
        state.ledger.snapshot(now)
    }

    /// Merge a persisted snapshot into the live ledger. The merge is
    /// conservative: it never grants more capacity than either side held.
    pub async fn restore(&self, snapshot: &LedgerSnapshot) {
        let mut state = self.state.lock().await;
        let now = Self::advance(&mut state);
        state.ledger.restore(snapshot, now);
        debug!(
            daily_used = state.ledger.daily_used(),
            consecutive_failures = state.ledger.consecutive_failures(),
            "ledger restored from checkpoint"
        );
    }

    /// Point-in-time view for status displays.
    pub async fn status(&self) -> GovernorStatus {
        let mut state = self.state.lock().await;
        Self::advance(&mut state);
        GovernorStatus {
            request_balance: state.ledger.available_requests(),
            request_capacity: state.ledger.request_capacity(),
            token_balance: state.ledger.available_tokens(),
            token_capacity: state.ledger.token_capacity(),
            daily_used: state.ledger.daily_used(),
            daily_cap: state.ledger.daily_cap(),
            consecutive_failures: state.ledger.consecutive_failures(),
            backoff_until: state.ledger.backoff_until(),
        }
    }

    /// Bring the ledger up to the current instant under the lock. Returns the
    /// wall-clock time sampled alongside the monotonic reading so both feed
    /// the same decision.
    fn advance(state: &mut GovernorState) -> DateTime<Utc> {
        let instant = Instant::now();
        let elapsed = instant.duration_since(state.last_refill);
        state.last_refill = instant;
        let now = Utc::now();
        state.ledger.refill(elapsed);
        state.ledger.roll_daily_window(now);
        now
    }

    /// A cost above bucket capacity could never be admitted and would park
    /// the caller forever. Charge the full bucket instead and log it.
    fn clamp_costs(&self, request_cost: u32, token_cost: u32) -> (u32, u32) {
        let mut request_cost = request_cost;
        let mut token_cost = token_cost;
        if request_cost > self.settings.requests_per_minute && self.settings.requests_per_minute > 0
        {
            warn!(
                request_cost,
                capacity = self.settings.requests_per_minute,
                "request cost exceeds bucket capacity, clamping"
            );
            request_cost = self.settings.requests_per_minute;
        }
        if token_cost > self.settings.tokens_per_minute && self.settings.tokens_per_minute > 0 {
            warn!(
                token_cost,
                capacity = self.settings.tokens_per_minute,
                "token cost exceeds bucket capacity, clamping"
            );
            token_cost = self.settings.tokens_per_minute;
        }
        (request_cost, token_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DenialReason;
    use std::sync::Arc;

    fn fast_settings() -> GovernorSettings {
        GovernorSettings {
            requests_per_minute: 6_000,
            tokens_per_minute: 600_000,
            daily_request_cap: 100_000,
            refill_interval_ms: 10,
            backoff_base_ms: 20,
            backoff_max_ms: 200,
            utc_offset_minutes: 0,
        }
    }

    #[tokio::test]
    async fn test_admits_until_bucket_is_spent() {
        let governor = ResourceGovernor::new(GovernorSettings {
            requests_per_minute: 10,
            ..fast_settings()
        });

        for _ in 0..10 {
            assert!(governor.try_admit(1, 1).await.is_admitted());
        }
        let decision = governor.try_admit(1, 1).await;
        assert_eq!(decision.reason(), Some(DenialReason::RequestBucketEmpty));
    }

    #[tokio::test]
    async fn test_await_admission_unblocks_after_refill() {
        let governor = ResourceGovernor::new(fast_settings());
        // Drain the request bucket in one shot; one request refills in 10ms.
        assert!(governor.try_admit(6_000, 1).await.is_admitted());

        let waited = tokio::time::timeout(
            Duration::from_secs(2),
            governor.await_admission(1, 1),
        )
        .await
        .expect("admission should unblock within the refill window");
        assert!(waited > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_concurrent_callers_never_overdraw() {
        let governor = Arc::new(ResourceGovernor::new(GovernorSettings {
            requests_per_minute: 10,
            ..fast_settings()
        }));

        let mut handles = Vec::new();
        for _ in 0..25 {
            let governor = Arc::clone(&governor);
            handles.push(tokio::spawn(
                async move { governor.try_admit(1, 1).await },
            ));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_admitted() {
                admitted += 1;
            }
        }
        // Refill is 1 request per 6s here, far slower than the spawn burst.
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn test_overload_blocks_then_success_clears() {
        let governor = ResourceGovernor::new(fast_settings());

        let delay = governor.on_overload(Some(Duration::from_millis(80))).await;
        assert!(delay >= Duration::from_millis(70));
        let decision = governor.try_admit(1, 1).await;
        assert_eq!(decision.reason(), Some(DenialReason::BackoffActive));

        governor.on_success().await;
        assert!(governor.try_admit(1, 1).await.is_admitted());
    }

    #[tokio::test]
    async fn test_await_admission_rides_out_backoff() {
        let governor = ResourceGovernor::new(fast_settings());
        governor.on_overload(Some(Duration::from_millis(50))).await;

        let waited = tokio::time::timeout(
            Duration::from_secs(2),
            governor.await_admission(1, 1),
        )
        .await
        .expect("backoff expires well within the timeout");
        assert!(waited >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_oversized_token_cost_is_clamped_not_stuck() {
        let governor = ResourceGovernor::new(fast_settings());
        // Twice the bucket capacity would otherwise never be admitted.
        assert!(governor.try_admit(1, 1_200_000).await.is_admitted());
        let status = governor.status().await;
        assert!(status.token_balance < 1.0);
    }

    #[tokio::test]
    async fn test_snapshot_restore_round_trip() {
        let governor = ResourceGovernor::new(GovernorSettings {
            requests_per_minute: 60,
            refill_interval_ms: 1_000,
            ..fast_settings()
        });
        for _ in 0..5 {
            assert!(governor.try_admit(1, 100).await.is_admitted());
        }
        let snapshot = governor.snapshot().await;
        assert_eq!(snapshot.daily_used, 5);

        let fresh = ResourceGovernor::new(GovernorSettings {
            requests_per_minute: 60,
            refill_interval_ms: 1_000,
            ..fast_settings()
        });
        fresh.restore(&snapshot).await;
        let status = fresh.status().await;
        assert_eq!(status.daily_used, 5);
        assert!(status.request_balance <= 55.1);
    }
}
