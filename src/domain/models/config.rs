//! Configuration domain models.
//!
//! All settings deserialize with serde defaults so a partial YAML file or a
//! handful of environment variables is enough to run. The loader in
//! `infrastructure::config` layers sources and validates the result.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CadenceConfig {
    /// Capacity ledger ceilings and backoff tuning
    #[serde(default)]
    pub governor: GovernorSettings,

    /// Analyzer thresholds
    #[serde(default)]
    pub analyzer: AnalyzerSettings,

    /// Planner chunking parameters
    #[serde(default)]
    pub planner: PlannerSettings,

    /// Orchestrator execution budgets
    #[serde(default)]
    pub execution: ExecutionSettings,

    /// Remote text service endpoint
    #[serde(default)]
    pub service: ServiceSettings,

    /// Checkpoint and history storage
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Ceilings and backoff tuning for the resource governor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GovernorSettings {
    /// Request-bucket capacity per rolling minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Token-bucket capacity per rolling minute
    #[serde(default = "default_tokens_per_minute")]
    pub tokens_per_minute: u32,

    /// Hard daily request cap, reset at caller-local midnight
    #[serde(default = "default_daily_request_cap")]
    pub daily_request_cap: u32,

    /// Refill accounting interval in milliseconds
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,

    /// Base backoff after an overload without a retry-after hint
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling on computed backoff
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Caller-local offset from UTC, in minutes, for the daily reset
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

const fn default_requests_per_minute() -> u32 {
    60
}

const fn default_tokens_per_minute() -> u32 {
    90_000
}

const fn default_daily_request_cap() -> u32 {
    5_000
}

const fn default_refill_interval_ms() -> u64 {
    1_000
}

const fn default_backoff_base_ms() -> u64 {
    2_000
}

const fn default_backoff_max_ms() -> u64 {
    300_000
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            tokens_per_minute: default_tokens_per_minute(),
            daily_request_cap: default_daily_request_cap(),
            refill_interval_ms: default_refill_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            utc_offset_minutes: 0,
        }
    }
}

/// Thresholds the analyzer scores workload signals against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalyzerSettings {
    /// Document volume counted as medium
    #[serde(default = "default_medium_volume_docs")]
    pub medium_volume_docs: u32,

    /// Document volume counted as very large
    #[serde(default = "default_large_volume_docs")]
    pub large_volume_docs: u32,

    /// How many prior tasks to fetch per caller
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,

    /// Word-overlap score a prior task must clear to be retained
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

const fn default_medium_volume_docs() -> u32 {
    25
}

const fn default_large_volume_docs() -> u32 {
    100
}

const fn default_history_limit() -> u32 {
    50
}

const fn default_similarity_threshold() -> f64 {
    0.3
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            medium_volume_docs: default_medium_volume_docs(),
            large_volume_docs: default_large_volume_docs(),
            history_limit: default_history_limit(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Chunking parameters for the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlannerSettings {
    /// Goals at or under this estimate (and low complexity) stay one chunk
    #[serde(default = "default_single_chunk_max_minutes")]
    pub single_chunk_max_minutes: u32,

    /// Chunk size for low complexity
    #[serde(default = "default_chunk_minutes_low")]
    pub chunk_minutes_low: u32,

    /// Chunk size for medium complexity
    #[serde(default = "default_chunk_minutes_medium")]
    pub chunk_minutes_medium: u32,

    /// Chunk size for high complexity
    #[serde(default = "default_chunk_minutes_high")]
    pub chunk_minutes_high: u32,

    /// Floor on any single chunk estimate
    #[serde(default = "default_min_chunk_minutes")]
    pub min_chunk_minutes: u32,

    /// Fraction of chunks allocated to the breadth phase
    #[serde(default = "default_breadth_fraction")]
    pub breadth_fraction: f64,
}

const fn default_single_chunk_max_minutes() -> u32 {
    30
}

const fn default_chunk_minutes_low() -> u32 {
    45
}

const fn default_chunk_minutes_medium() -> u32 {
    30
}

const fn default_chunk_minutes_high() -> u32 {
    20
}

const fn default_min_chunk_minutes() -> u32 {
    5
}

const fn default_breadth_fraction() -> f64 {
    0.3
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            single_chunk_max_minutes: default_single_chunk_max_minutes(),
            chunk_minutes_low: default_chunk_minutes_low(),
            chunk_minutes_medium: default_chunk_minutes_medium(),
            chunk_minutes_high: default_chunk_minutes_high(),
            min_chunk_minutes: default_min_chunk_minutes(),
            breadth_fraction: default_breadth_fraction(),
        }
    }
}

/// Retry budgets and timing for the orchestrator loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionSettings {
    /// Chunk wall-clock deadline as a multiple of its estimate
    #[serde(default = "default_deadline_multiplier")]
    pub deadline_multiplier: f64,

    /// Overload retries allowed per chunk before the service-failure fallback
    #[serde(default = "default_max_overload_retries")]
    pub max_overload_retries: u32,

    /// Hard ceiling on remote invocations per chunk, any failure class
    #[serde(default = "default_max_total_attempts")]
    pub max_total_attempts: u32,

    /// Token cost charged per estimated minute of chunk work
    #[serde(default = "default_tokens_per_minute_cost")]
    pub tokens_per_minute_cost: u32,

    /// Percent of the chunk deadline at which budget warnings fire
    #[serde(default = "default_warn_at_percent")]
    pub warn_at_percent: Vec<u8>,

    /// Capacity of the execution event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

const fn default_deadline_multiplier() -> f64 {
    1.5
}

const fn default_max_overload_retries() -> u32 {
    3
}

const fn default_max_total_attempts() -> u32 {
    5
}

const fn default_tokens_per_minute_cost() -> u32 {
    400
}

fn default_warn_at_percent() -> Vec<u8> {
    vec![50, 90]
}

const fn default_event_buffer() -> usize {
    256
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            deadline_multiplier: default_deadline_multiplier(),
            max_overload_retries: default_max_overload_retries(),
            max_total_attempts: default_max_total_attempts(),
            tokens_per_minute_cost: default_tokens_per_minute_cost(),
            warn_at_percent: default_warn_at_percent(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Remote text service endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceSettings {
    /// Base URL of the generation gateway
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; read from `CADENCE_SERVICE__API_KEY` when unset
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier passed through to the gateway
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request transport timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Default generation budget per request
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_base_url() -> String {
    "http://localhost:8700".to_string()
}

fn default_model() -> String {
    "standard".to_string()
}

const fn default_timeout_secs() -> u64 {
    120
}

const fn default_max_output_tokens() -> u32 {
    1_024
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Checkpoint and history storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageSettings {
    /// `SQLite` database URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://.cadence/cadence.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingSettings {
    /// Default log level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional JSON log file (daily rotation)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}
