//! Implementation of the `cadence ledger` command.
//!
//! Inspects the capacity-ledger snapshots persisted with run checkpoints.
//! A fresh process always starts with full buckets, so the stored snapshots
//! are the only window into what an interrupted run had already consumed.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::adapters::sqlite::{initialize_database, SqliteCheckpointStore};
use crate::cli::output::{output, CommandOutput, OutputFormat, TableFormatter};
use crate::domain::models::{CadenceConfig, GovernorSettings, RunCheckpoint};
use crate::domain::ports::CheckpointStore;

#[derive(Args, Debug)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: LedgerCommands,
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// List stored run checkpoints, newest first
    List,
    /// Show the ledger snapshot stored for a plan
    Show {
        /// Plan id the checkpoint belongs to
        plan_id: Uuid,
    },
    /// Delete the checkpoint stored for a plan
    Clear {
        /// Plan id the checkpoint belongs to
        plan_id: Uuid,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct LedgerListOutput {
    pub checkpoints: Vec<RunCheckpoint>,
    pub total: usize,
}

impl CommandOutput for LedgerListOutput {
    fn to_human(&self) -> String {
        if self.checkpoints.is_empty() {
            return "No checkpoints found.".to_string();
        }
        format!(
            "{}\n{} checkpoint(s)",
            TableFormatter::new().format_checkpoints(&self.checkpoints),
            self.total
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct LedgerDetailOutput {
    pub checkpoint: RunCheckpoint,
    /// Configured ceilings the snapshot balances are measured against
    pub request_capacity: u32,
    pub token_capacity: u32,
    pub daily_cap: u32,
}

impl CommandOutput for LedgerDetailOutput {
    fn to_human(&self) -> String {
        let snapshot = &self.checkpoint.ledger;
        let backoff = snapshot
            .backoff_until
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());

        [
            format!("Checkpoint for plan {}", self.checkpoint.plan_id),
            "─────────────────────────────────────────".to_string(),
            format!("Marker:          {}", self.checkpoint.marker),
            format!("Completed:       {} chunk(s)", self.checkpoint.completed_chunk_ids.len()),
            format!(
                "Saved at:        {}",
                self.checkpoint.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            String::new(),
            format!(
                "Ledger snapshot (taken {}):",
                snapshot.taken_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            format!(
                "Requests:        {:.1} of {} per minute",
                snapshot.request_balance, self.request_capacity
            ),
            format!(
                "Tokens:          {:.0} of {} per minute",
                snapshot.token_balance, self.token_capacity
            ),
            format!(
                "Daily requests:  {} of {} (window {})",
                snapshot.daily_used, self.daily_cap, snapshot.daily_window
            ),
            format!("Failures:        {} consecutive", snapshot.consecutive_failures),
            format!("Backoff until:   {backoff}"),
        ]
        .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct LedgerActionOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for LedgerActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: LedgerArgs, config: &CadenceConfig, format: OutputFormat) -> Result<()> {
    let pool = initialize_database(&config.storage)
        .await
        .context("Failed to open database. Run 'cadence init' first.")?;
    let store = SqliteCheckpointStore::new(pool);

    match args.command {
        LedgerCommands::List => {
            let checkpoints = store.list().await?;
            let total = checkpoints.len();
            output(&LedgerListOutput { checkpoints, total }, format);
        }
        LedgerCommands::Show { plan_id } => {
            let checkpoint = store
                .load(plan_id)
                .await?
                .with_context(|| format!("No checkpoint stored for plan {plan_id}"))?;
            output(&detail_output(checkpoint, &config.governor), format);
        }
        LedgerCommands::Clear { plan_id } => {
            let existed = store.load(plan_id).await?.is_some();
            store.delete(plan_id).await?;
            let out = if existed {
                LedgerActionOutput {
                    success: true,
                    message: format!("Cleared checkpoint for plan {plan_id}"),
                }
            } else {
                LedgerActionOutput {
                    success: false,
                    message: format!("No checkpoint stored for plan {plan_id}"),
                }
            };
            output(&out, format);
        }
    }

    Ok(())
}

fn detail_output(checkpoint: RunCheckpoint, governor: &GovernorSettings) -> LedgerDetailOutput {
    LedgerDetailOutput {
        checkpoint,
        request_capacity: governor.requests_per_minute,
        token_capacity: governor.tokens_per_minute,
        daily_cap: governor.daily_request_cap,
    }
}
