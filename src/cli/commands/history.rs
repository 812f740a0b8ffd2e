//! Implementation of the `cadence history` command.

use anyhow::{Context, Result};
use clap::Args;

use crate::adapters::sqlite::{initialize_database, SqliteHistoryStore};
use crate::cli::output::{output, CommandOutput, OutputFormat, TableFormatter};
use crate::domain::models::CadenceConfig;
use crate::domain::ports::{HistoryStore, TaskRecord};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Caller identity whose history to show
    #[arg(short = 'C', long, default_value = "default")]
    pub caller: String,

    /// Maximum number of records to show
    #[arg(short, long, default_value = "20")]
    pub limit: u32,
}

#[derive(Debug, serde::Serialize)]
pub struct HistoryListOutput {
    pub caller: String,
    pub records: Vec<TaskRecord>,
    pub total: usize,
}

impl CommandOutput for HistoryListOutput {
    fn to_human(&self) -> String {
        if self.records.is_empty() {
            return format!("No task history for caller '{}'.", self.caller);
        }
        format!(
            "{}\n{} record(s) for caller '{}'",
            TableFormatter::new().format_history(&self.records),
            self.total,
            self.caller
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: HistoryArgs, config: &CadenceConfig, format: OutputFormat) -> Result<()> {
    let pool = initialize_database(&config.storage)
        .await
        .context("Failed to open database. Run 'cadence init' first.")?;
    let store = SqliteHistoryStore::new(pool);

    let records = store.recent_for_caller(&args.caller, args.limit).await?;
    let total = records.len();

    output(
        &HistoryListOutput {
            caller: args.caller,
            records,
            total,
        },
        format,
    );
    Ok(())
}
