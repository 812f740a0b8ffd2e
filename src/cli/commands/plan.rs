//! Implementation of the `cadence plan` command.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

use crate::adapters::sqlite::{initialize_database, SqliteHistoryStore};
use crate::cli::output::{output, CommandOutput, OutputFormat, TableFormatter};
use crate::domain::models::{CadenceConfig, ChunkPlan};
use crate::domain::ports::{DeadlineSignal, StaticWorkload, WorkloadSnapshot};
use crate::services::{ChunkPlanner, TaskAnalyzer};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Goal text to analyze and decompose
    pub goal: String,

    /// Caller identity for history and quota accounting
    #[arg(short = 'C', long, default_value = "default")]
    pub caller: String,

    /// Related document count fed to the analyzer
    #[arg(long, default_value = "0")]
    pub documents: u32,

    /// Open item count fed to the analyzer
    #[arg(long, default_value = "0")]
    pub open_items: u32,

    /// Workload deadline, "label=YYYY-MM-DD" with optional ",critical" suffix
    #[arg(long = "deadline", value_name = "SPEC")]
    pub deadlines: Vec<String>,

    /// Write the plan as JSON for later `run --plan <FILE>`
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct PlanOutput {
    pub plan: ChunkPlan,
    pub saved_to: Option<PathBuf>,
}

impl CommandOutput for PlanOutput {
    fn to_human(&self) -> String {
        let understanding = &self.plan.understanding;
        let mut lines = vec![
            format!("Plan {}", self.plan.id),
            format!("Goal: {}", self.plan.goal),
            format!(
                "Category: {}  Complexity: {} (score {})",
                understanding.category.as_str(),
                understanding.complexity.as_str(),
                understanding.complexity_score
            ),
            format!(
                "Estimated: {} minutes across {} chunk(s)",
                understanding.estimated_minutes,
                self.plan.chunks.len()
            ),
            format!("Approach: {}", self.plan.approach.as_str()),
        ];

        if !understanding.risk_flags.is_empty() {
            let flags: Vec<&str> = understanding.risk_flags.iter().map(|f| f.as_str()).collect();
            lines.push(format!("Risk flags: {}", flags.join(", ")));
        }

        lines.push(String::new());
        lines.push(TableFormatter::new().format_plan(&self.plan));

        if !self.plan.checkpoints.is_empty() {
            let markers: Vec<&str> = self
                .plan
                .checkpoints
                .iter()
                .map(|m| m.name.as_str())
                .collect();
            lines.push(format!("Checkpoint markers: {}", markers.join(", ")));
        }

        if let Some(path) = &self.saved_to {
            lines.push(format!("Plan written to {}", path.display()));
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: PlanArgs, config: &CadenceConfig, format: OutputFormat) -> Result<()> {
    let pool = initialize_database(&config.storage)
        .await
        .context("Failed to open database. Run 'cadence init' first.")?;

    let history = Arc::new(SqliteHistoryStore::new(pool));
    let workload = Arc::new(StaticWorkload::new(workload_from_args(
        args.documents,
        args.open_items,
        &args.deadlines,
    )?));

    let analyzer = TaskAnalyzer::new(history, workload, config.analyzer.clone());
    let understanding = analyzer.analyze(&args.goal, &args.caller).await;

    let planner = ChunkPlanner::new(config.planner.clone());
    let plan = planner.plan(understanding);

    let saved_to = match &args.save {
        Some(path) => {
            let json =
                serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
            fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write plan to {}", path.display()))?;
            Some(path.clone())
        }
        None => None,
    };

    let out = PlanOutput { plan, saved_to };
    output(&out, format);
    Ok(())
}

/// Build a workload snapshot from the shared `--documents`, `--open-items`,
/// and `--deadline` flags.
pub(crate) fn workload_from_args(
    documents: u32,
    open_items: u32,
    deadlines: &[String],
) -> Result<WorkloadSnapshot> {
    let deadlines = deadlines
        .iter()
        .map(|raw| parse_deadline(raw))
        .collect::<Result<Vec<_>>>()?;

    Ok(WorkloadSnapshot {
        related_documents: documents,
        open_items,
        deadlines,
    })
}

/// Parse a `label=YYYY-MM-DD[,critical]` deadline spec.
fn parse_deadline(raw: &str) -> Result<DeadlineSignal> {
    let (spec, critical) = match raw.strip_suffix(",critical") {
        Some(rest) => (rest, true),
        None => (raw, false),
    };

    let (label, date) = spec
        .split_once('=')
        .with_context(|| format!("Invalid deadline '{raw}': expected label=YYYY-MM-DD"))?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid deadline date in '{raw}'"))?;

    Ok(DeadlineSignal {
        label: label.trim().to_string(),
        due_at: date.and_time(NaiveTime::MIN).and_utc(),
        critical,
    })
}
