//! CLI output formatting module
//!
//! Command results implement [`CommandOutput`] once and render as a human
//! table, JSON, or YAML depending on the global `--output` flag.

pub mod progress;
pub mod table;

use clap::ValueEnum;
use serde::Serialize;

pub use table::TableFormatter;

/// Rendering target selected by the global `--output` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and status lines
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

/// A command result that can render itself for every output format.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

/// Print a command result in the selected format.
pub fn output<T: CommandOutput>(result: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", result.to_human()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
        ),
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(&result.to_json()).unwrap_or_default());
        }
    }
}

/// Truncate a string to a maximum length, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
