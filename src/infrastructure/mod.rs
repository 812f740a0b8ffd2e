//! Infrastructure layer module
//!
//! Cross-cutting concerns that sit outside the domain:
//! - Configuration management (figment-layered YAML and env)
//! - Logging initialization (tracing subscriber setup)

pub mod config;
pub mod logging;
