//! Capacity ledger domain model.
//!
//! The ledger is the governor's complete rate/quota state: two lazily
//! refilled token buckets (requests and tokens per rolling minute), a daily
//! request counter reset at the caller-local midnight, and a backoff deadline
//! set after remote overload. All methods take explicit time inputs, so the
//! state machine is pure and deterministic; the governor service samples the
//! clocks and serializes access.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::GovernorSettings;

/// Why an admission was denied. Variants are listed in reporting precedence:
/// when several constraints are violated at once, the earliest listed wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The daily request cap is exhausted until the next local midnight
    DailyCapReached,
    /// A backoff deadline from a prior overload has not passed yet
    BackoffActive,
    /// The request bucket cannot cover the request cost yet
    RequestBucketEmpty,
    /// The token bucket cannot cover the token cost yet
    TokenBucketEmpty,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyCapReached => "daily_cap_reached",
            Self::BackoffActive => "backoff_active",
            Self::RequestBucketEmpty => "request_bucket_empty",
            Self::TokenBucketEmpty => "token_bucket_empty",
        }
    }
}

/// Outcome of an admission check. An admitted request has already been
/// debited; a denied one carries the wait after which a re-check can succeed
/// (the maximum over all violated constraints, not the sum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmissionDecision {
    Admitted,
    Denied {
        reason: DenialReason,
        wait: Duration,
    },
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    /// Wait before a re-check can succeed, when denied.
    pub fn wait(&self) -> Option<Duration> {
        match self {
            Self::Admitted => None,
            Self::Denied { wait, .. } => Some(*wait),
        }
    }

    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            Self::Admitted => None,
            Self::Denied { reason, .. } => Some(*reason),
        }
    }
}

/// Serializable view of the ledger, embedded in checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Request bucket balance at that moment
    pub request_balance: f64,
    /// Token bucket balance at that moment
    pub token_balance: f64,
    /// Requests spent in the current daily window
    pub daily_used: u32,
    /// Caller-local date of the daily window
    pub daily_window: NaiveDate,
    /// Consecutive overloads since the last success
    pub consecutive_failures: u32,
    /// Active backoff deadline, if any
    pub backoff_until: Option<DateTime<Utc>>,
}

/// The governor's complete rate/quota state. Pure: callers supply elapsed
/// monotonic time for refill and wall-clock time for the daily window and
/// backoff deadline.
#[derive(Debug, Clone)]
pub struct CapacityLedger {
    request_capacity: f64,
    token_capacity: f64,
    daily_cap: u32,
    refill_interval_ms: u64,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
    utc_offset_minutes: i32,

    request_balance: f64,
    token_balance: f64,
    daily_used: u32,
    daily_window: NaiveDate,
    consecutive_failures: u32,
    backoff_until: Option<DateTime<Utc>>,
}

impl CapacityLedger {
    /// Create a ledger with full buckets and a fresh daily window.
    pub fn new(settings: &GovernorSettings, now: DateTime<Utc>) -> Self {
        let request_capacity = f64::from(settings.requests_per_minute);
        let token_capacity = f64::from(settings.tokens_per_minute);
        Self {
            request_capacity,
            token_capacity,
            daily_cap: settings.daily_request_cap,
            refill_interval_ms: settings.refill_interval_ms.max(1),
            backoff_base_ms: settings.backoff_base_ms,
            backoff_max_ms: settings.backoff_max_ms,
            utc_offset_minutes: settings.utc_offset_minutes,
            request_balance: request_capacity,
            token_balance: token_capacity,
            daily_used: 0,
            daily_window: Self::local_date(settings.utc_offset_minutes, now),
            consecutive_failures: 0,
            backoff_until: None,
        }
    }

    fn local_date(utc_offset_minutes: i32, now: DateTime<Utc>) -> NaiveDate {
        (now + ChronoDuration::minutes(i64::from(utc_offset_minutes))).date_naive()
    }

    /// Advance both buckets by the elapsed monotonic time. Refill is
    /// `min(capacity, balance + elapsed / interval * per_interval)` with the
    /// per-interval amount sized so a full bucket refills in one minute.
    pub fn refill(&mut self, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as f64;
        let interval_ms = self.refill_interval_ms as f64;
        let intervals = elapsed_ms / interval_ms;

        let request_per_interval = self.request_capacity * interval_ms / 60_000.0;
        let token_per_interval = self.token_capacity * interval_ms / 60_000.0;

        self.request_balance =
            (self.request_balance + intervals * request_per_interval).min(self.request_capacity);
        self.token_balance =
            (self.token_balance + intervals * token_per_interval).min(self.token_capacity);
    }

    /// Reset the daily counter when the caller-local date has advanced.
    pub fn roll_daily_window(&mut self, now: DateTime<Utc>) {
        let today = Self::local_date(self.utc_offset_minutes, now);
        if today != self.daily_window {
            self.daily_window = today;
            self.daily_used = 0;
        }
    }

    /// Check admission without debiting. Assumes `refill` and
    /// `roll_daily_window` have been applied for the current instant.
    pub fn check(&self, request_cost: u32, token_cost: u32, now: DateTime<Utc>) -> AdmissionDecision {
        let mut violated: Vec<(DenialReason, Duration)> = Vec::new();

        if self.daily_used.saturating_add(request_cost) > self.daily_cap {
            violated.push((DenialReason::DailyCapReached, self.until_daily_reset(now)));
        }

        if let Some(deadline) = self.backoff_until {
            if now < deadline {
                let wait_ms = (deadline - now).num_milliseconds().max(0) as u64;
                violated.push((DenialReason::BackoffActive, Duration::from_millis(wait_ms)));
            }
        }

        if f64::from(request_cost) > self.request_balance {
            violated.push((
                DenialReason::RequestBucketEmpty,
                self.bucket_wait(f64::from(request_cost), self.request_balance, self.request_capacity),
            ));
        }

        if f64::from(token_cost) > self.token_balance {
            violated.push((
                DenialReason::TokenBucketEmpty,
                self.bucket_wait(f64::from(token_cost), self.token_balance, self.token_capacity),
            ));
        }

        match violated.first() {
            None => AdmissionDecision::Admitted,
            Some(&(reason, _)) => {
                let wait = violated
                    .iter()
                    .map(|(_, w)| *w)
                    .max()
                    .unwrap_or(Duration::ZERO);
                AdmissionDecision::Denied { reason, wait }
            }
        }
    }

    /// Refill, roll the daily window, and either atomically debit (admit) or
    /// report the denial reason and wait.
    pub fn try_admit(
        &mut self,
        request_cost: u32,
        token_cost: u32,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) -> AdmissionDecision {
        self.refill(elapsed);
        self.roll_daily_window(now);

        let decision = self.check(request_cost, token_cost, now);
        if decision.is_admitted() {
            self.request_balance -= f64::from(request_cost);
            self.token_balance -= f64::from(token_cost);
            self.daily_used = self.daily_used.saturating_add(request_cost);
        }
        decision
    }

    /// Time until a bucket can cover the cost at its refill rate. A zero
    /// capacity can never admit; report one full refill period and let the
    /// caller re-check.
    fn bucket_wait(&self, cost: f64, balance: f64, capacity: f64) -> Duration {
        if capacity <= 0.0 {
            return Duration::from_secs(60);
        }
        let deficit = (cost - balance).max(0.0);
        let wait_ms = (deficit * 60_000.0 / capacity).ceil();
        Duration::from_millis(wait_ms as u64)
    }

    /// Time until the next caller-local midnight.
    fn until_daily_reset(&self, now: DateTime<Utc>) -> Duration {
        let shifted = now + ChronoDuration::minutes(i64::from(self.utc_offset_minutes));
        let next_midnight = shifted
            .date_naive()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        match next_midnight {
            Some(midnight) => {
                let wait_ms = (midnight - shifted.naive_utc()).num_milliseconds().max(0) as u64;
                Duration::from_millis(wait_ms)
            }
            None => Duration::ZERO,
        }
    }

    /// Clear backoff and the consecutive-failure count after a successful
    /// remote call.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.backoff_until = None;
    }

    /// Apply an overload signal: the hint wins when present, otherwise
    /// exponential backoff from the current failure count, capped.
    pub fn record_overload(&mut self, retry_after: Option<Duration>, now: DateTime<Utc>) {
        let delay_ms = match retry_after {
            Some(hint) => u64::try_from(hint.as_millis()).unwrap_or(u64::MAX),
            None => self
                .backoff_base_ms
                .saturating_mul(2u64.saturating_pow(self.consecutive_failures.min(32)))
                .min(self.backoff_max_ms),
        };
        self.backoff_until =
            Some(now + ChronoDuration::milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX)));
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Serializable view of the current state.
    pub fn snapshot(&self, now: DateTime<Utc>) -> LedgerSnapshot {
        LedgerSnapshot {
            taken_at: now,
            request_balance: self.request_balance,
            token_balance: self.token_balance,
            daily_used: self.daily_used,
            daily_window: self.daily_window,
            consecutive_failures: self.consecutive_failures,
            backoff_until: self.backoff_until,
        }
    }

    /// Adopt a persisted snapshot conservatively: the merged state never
    /// grants more capacity than either the live ledger or the snapshot.
    pub fn restore(&mut self, snapshot: &LedgerSnapshot, now: DateTime<Utc>) {
        if snapshot.daily_window == Self::local_date(self.utc_offset_minutes, now) {
            self.daily_used = self.daily_used.max(snapshot.daily_used);
        }
        self.request_balance = self.request_balance.min(snapshot.request_balance).max(0.0);
        self.token_balance = self.token_balance.min(snapshot.token_balance).max(0.0);
        self.consecutive_failures = self.consecutive_failures.max(snapshot.consecutive_failures);
        self.backoff_until = match (self.backoff_until, snapshot.backoff_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn available_requests(&self) -> f64 {
        self.request_balance
    }

    pub fn available_tokens(&self) -> f64 {
        self.token_balance
    }

    pub fn request_capacity(&self) -> f64 {
        self.request_capacity
    }

    pub fn token_capacity(&self) -> f64 {
        self.token_capacity
    }

    pub fn daily_used(&self) -> u32 {
        self.daily_used
    }

    pub fn daily_cap(&self) -> u32 {
        self.daily_cap
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn backoff_until(&self) -> Option<DateTime<Utc>> {
        self.backoff_until
    }
}
