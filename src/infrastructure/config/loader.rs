use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::CadenceConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {0}: must be positive")]
    ZeroSetting(&'static str),

    #[error(
        "Invalid backoff configuration: backoff_base_ms ({0}) must be less than backoff_max_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid utc_offset_minutes: {0}. Must be within +/-840 minutes of UTC")]
    InvalidUtcOffset(i32),

    #[error(
        "Invalid volume thresholds: medium_volume_docs ({0}) must be less than large_volume_docs ({1})"
    )]
    InvalidVolumeThresholds(u32, u32),

    #[error("Invalid {0}: {1}. Must be a fraction between 0 and 1")]
    InvalidFraction(&'static str, f64),

    #[error("Invalid deadline_multiplier: {0}. Must be positive")]
    InvalidDeadlineMultiplier(f64),

    #[error(
        "Invalid retry budget: max_overload_retries ({overload}) must be less than max_total_attempts ({total})"
    )]
    InvalidRetryBudget { overload: u32, total: u32 },

    #[error("Invalid warn_at_percent entry: {0}. Must be at most 100")]
    InvalidWarnPercent(u8),

    #[error("Service base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("Database URL cannot be empty")]
    EmptyDatabaseUrl,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .cadence/config.yaml (project config, created by init)
    /// 3. .cadence/local.yaml (project local overrides, optional)
    /// 4. Environment variables (CADENCE_* prefix, highest priority)
    ///
    /// Configuration is project-local (pwd/.cadence/) so several projects on
    /// one machine can run against different gateways and quotas.
    pub fn load() -> Result<CadenceConfig> {
        let config: CadenceConfig = Figment::new()
            .merge(Serialized::defaults(CadenceConfig::default()))
            .merge(Yaml::file(".cadence/config.yaml"))
            .merge(Yaml::file(".cadence/local.yaml"))
            .merge(Env::prefixed("CADENCE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<CadenceConfig> {
        let config: CadenceConfig = Figment::new()
            .merge(Serialized::defaults(CadenceConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("CADENCE_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &CadenceConfig) -> Result<(), ConfigError> {
        // Governor ceilings
        if config.governor.requests_per_minute == 0 {
            return Err(ConfigError::ZeroSetting("governor.requests_per_minute"));
        }
        if config.governor.tokens_per_minute == 0 {
            return Err(ConfigError::ZeroSetting("governor.tokens_per_minute"));
        }
        if config.governor.daily_request_cap == 0 {
            return Err(ConfigError::ZeroSetting("governor.daily_request_cap"));
        }
        if config.governor.refill_interval_ms == 0 {
            return Err(ConfigError::ZeroSetting("governor.refill_interval_ms"));
        }
        if config.governor.backoff_base_ms >= config.governor.backoff_max_ms {
            return Err(ConfigError::InvalidBackoff(
                config.governor.backoff_base_ms,
                config.governor.backoff_max_ms,
            ));
        }
        if config.governor.utc_offset_minutes.abs() > 840 {
            return Err(ConfigError::InvalidUtcOffset(
                config.governor.utc_offset_minutes,
            ));
        }

        // Analyzer thresholds
        if config.analyzer.history_limit == 0 {
            return Err(ConfigError::ZeroSetting("analyzer.history_limit"));
        }
        if config.analyzer.medium_volume_docs >= config.analyzer.large_volume_docs {
            return Err(ConfigError::InvalidVolumeThresholds(
                config.analyzer.medium_volume_docs,
                config.analyzer.large_volume_docs,
            ));
        }
        if !(0.0..=1.0).contains(&config.analyzer.similarity_threshold) {
            return Err(ConfigError::InvalidFraction(
                "analyzer.similarity_threshold",
                config.analyzer.similarity_threshold,
            ));
        }

        // Planner chunking
        if config.planner.min_chunk_minutes == 0 {
            return Err(ConfigError::ZeroSetting("planner.min_chunk_minutes"));
        }
        if config.planner.single_chunk_max_minutes == 0 {
            return Err(ConfigError::ZeroSetting("planner.single_chunk_max_minutes"));
        }
        for (name, minutes) in [
            ("planner.chunk_minutes_low", config.planner.chunk_minutes_low),
            (
                "planner.chunk_minutes_medium",
                config.planner.chunk_minutes_medium,
            ),
            (
                "planner.chunk_minutes_high",
                config.planner.chunk_minutes_high,
            ),
        ] {
            if minutes < config.planner.min_chunk_minutes {
                return Err(ConfigError::ValidationFailed(format!(
                    "{name} ({minutes}) is below planner.min_chunk_minutes ({})",
                    config.planner.min_chunk_minutes
                )));
            }
        }
        if config.planner.breadth_fraction <= 0.0 || config.planner.breadth_fraction >= 1.0 {
            return Err(ConfigError::InvalidFraction(
                "planner.breadth_fraction",
                config.planner.breadth_fraction,
            ));
        }

        // Execution budgets
        if config.execution.deadline_multiplier <= 0.0 {
            return Err(ConfigError::InvalidDeadlineMultiplier(
                config.execution.deadline_multiplier,
            ));
        }
        if config.execution.max_total_attempts == 0 {
            return Err(ConfigError::ZeroSetting("execution.max_total_attempts"));
        }
        if config.execution.max_overload_retries >= config.execution.max_total_attempts {
            return Err(ConfigError::InvalidRetryBudget {
                overload: config.execution.max_overload_retries,
                total: config.execution.max_total_attempts,
            });
        }
        if config.execution.tokens_per_minute_cost == 0 {
            return Err(ConfigError::ZeroSetting("execution.tokens_per_minute_cost"));
        }
        for percent in &config.execution.warn_at_percent {
            if *percent > 100 {
                return Err(ConfigError::InvalidWarnPercent(*percent));
            }
        }
        if config.execution.event_buffer == 0 {
            return Err(ConfigError::ZeroSetting("execution.event_buffer"));
        }

        // Service endpoint
        if config.service.base_url.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if config.service.timeout_secs == 0 {
            return Err(ConfigError::ZeroSetting("service.timeout_secs"));
        }
        if config.service.max_output_tokens == 0 {
            return Err(ConfigError::ZeroSetting("service.max_output_tokens"));
        }

        // Storage
        if config.storage.database_url.is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }
        if config.storage.max_connections == 0 {
            return Err(ConfigError::ZeroSetting("storage.max_connections"));
        }

        // Logging
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CadenceConfig::default();
        assert_eq!(config.governor.requests_per_minute, 60);
        assert_eq!(config.governor.daily_request_cap, 5_000);
        assert_eq!(config.storage.database_url, "sqlite://.cadence/cadence.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
governor:
  requests_per_minute: 30
  tokens_per_minute: 45000
planner:
  chunk_minutes_high: 15
service:
  base_url: http://gateway.internal:9000
  model: large
logging:
  level: debug
  format: json
";

        let config: CadenceConfig = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.governor.requests_per_minute, 30);
        assert_eq!(config.governor.tokens_per_minute, 45_000);
        assert_eq!(config.planner.chunk_minutes_high, 15);
        assert_eq!(config.service.base_url, "http://gateway.internal:9000");
        assert_eq!(config.service.model, "large");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        // Untouched sections keep their defaults
        assert_eq!(config.execution.max_total_attempts, 5);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_requests_per_minute() {
        let mut config = CadenceConfig::default();
        config.governor.requests_per_minute = 0;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ZeroSetting("governor.requests_per_minute")
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = CadenceConfig::default();
        config.governor.backoff_base_ms = 30_000;
        config.governor.backoff_max_ms = 10_000;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidBackoff(30_000, 10_000)
        ));
    }

    #[test]
    fn test_validate_utc_offset_bounds() {
        let mut config = CadenceConfig::default();
        config.governor.utc_offset_minutes = 900;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidUtcOffset(900)
        ));

        config.governor.utc_offset_minutes = -480;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_volume_thresholds() {
        let mut config = CadenceConfig::default();
        config.analyzer.medium_volume_docs = 200;
        config.analyzer.large_volume_docs = 100;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidVolumeThresholds(200, 100)
        ));
    }

    #[test]
    fn test_validate_breadth_fraction() {
        let mut config = CadenceConfig::default();
        config.planner.breadth_fraction = 1.0;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidFraction("planner.breadth_fraction", _)
        ));
    }

    #[test]
    fn test_validate_chunk_minutes_below_floor() {
        let mut config = CadenceConfig::default();
        config.planner.min_chunk_minutes = 25;
        config.planner.chunk_minutes_high = 20;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationFailed(_)
        ));
    }

    #[test]
    fn test_validate_retry_budget() {
        let mut config = CadenceConfig::default();
        config.execution.max_overload_retries = 5;
        config.execution.max_total_attempts = 5;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidRetryBudget {
                overload: 5,
                total: 5
            }
        ));
    }

    #[test]
    fn test_validate_warn_percent() {
        let mut config = CadenceConfig::default();
        config.execution.warn_at_percent = vec![50, 120];

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidWarnPercent(120)
        ));
    }

    #[test]
    fn test_validate_empty_base_url() {
        let mut config = CadenceConfig::default();
        config.service.base_url = String::new();

        let result = ConfigLoader::validate(&config);
        assert!(matches!(result.unwrap_err(), ConfigError::EmptyBaseUrl));
    }

    #[test]
    fn test_validate_empty_database_url() {
        let mut config = CadenceConfig::default();
        config.storage.database_url = String::new();

        let result = ConfigLoader::validate(&config);
        assert!(matches!(result.unwrap_err(), ConfigError::EmptyDatabaseUrl));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = CadenceConfig::default();
        config.logging.level = "verbose".to_string();

        let result = ConfigLoader::validate(&config);
        match result.unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            _ => panic!("Expected InvalidLogLevel error"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = CadenceConfig::default();
        config.logging.format = "xml".to_string();

        let result = ConfigLoader::validate(&config);
        match result.unwrap_err() {
            ConfigError::InvalidLogFormat(format) => assert_eq!(format, "xml"),
            _ => panic!("Expected InvalidLogFormat error"),
        }
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "governor:\n  requests_per_minute: 20\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(
            override_file,
            "governor:\n  requests_per_minute: 40\nlogging:\n  level: debug"
        )
        .unwrap();
        override_file.flush().unwrap();

        let config: CadenceConfig = Figment::new()
            .merge(Serialized::defaults(CadenceConfig::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.governor.requests_per_minute, 40, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("CADENCE_GOVERNOR__REQUESTS_PER_MINUTE", Some("12")),
                ("CADENCE_SERVICE__API_KEY", Some("env-key")),
                ("CADENCE_LOGGING__LEVEL", Some("warn")),
            ],
            || {
                let config: CadenceConfig = Figment::new()
                    .merge(Serialized::defaults(CadenceConfig::default()))
                    .merge(Env::prefixed("CADENCE_").split("__"))
                    .extract()
                    .unwrap();

                assert_eq!(config.governor.requests_per_minute, 12);
                assert_eq!(config.service.api_key.as_deref(), Some("env-key"));
                assert_eq!(config.logging.level, "warn");
            },
        );
    }
}
