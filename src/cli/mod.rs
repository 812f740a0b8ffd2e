//! Command-line interface.
//!
//! Subcommand surface over the orchestrator: analyze and plan a goal, run or
//! resume a plan, inspect saved capacity ledgers, and browse task history.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence - Adaptive rate-limited task orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to .cadence/config.yaml layering)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize Cadence configuration and database
    Init(commands::init::InitArgs),

    /// Analyze a goal and print (or save) its chunk plan
    Plan(commands::plan::PlanArgs),

    /// Execute a goal or a saved plan against the text service
    Run(commands::run::RunArgs),

    /// Inspect saved checkpoints and their capacity ledgers
    Ledger(commands::ledger::LedgerArgs),

    /// Browse recorded task history
    History(commands::history::HistoryArgs),
}

/// Print a top-level error in the selected format and exit non-zero.
pub fn handle_error(err: anyhow::Error, format: OutputFormat) -> ! {
    match format {
        OutputFormat::Table => {
            eprintln!("{} {err:#}", console::style("error:").red().bold());
        }
        OutputFormat::Json => {
            let payload = serde_json::json!({ "success": false, "error": format!("{err:#}") });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&payload).unwrap_or_default()
            );
        }
        OutputFormat::Yaml => {
            let payload = serde_json::json!({ "success": false, "error": format!("{err:#}") });
            eprint!("{}", serde_yaml::to_string(&payload).unwrap_or_default());
        }
    }
    std::process::exit(1);
}
