//! Implementation of the `cadence run` command.
//!
//! Wires the full stack: storage, governor, analyzer, planner, orchestrator,
//! and either the HTTP text service or the built-in mock. Execution events
//! drive an indicatif progress bar; Ctrl-C requests cancellation between
//! chunks.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapters::sqlite::{initialize_database, SqliteCheckpointStore, SqliteHistoryStore};
use crate::adapters::text_service::{HttpTextService, MockTextService};
use crate::application::{ExecutionEvent, Orchestrator};
use crate::cli::commands::plan::workload_from_args;
use crate::cli::output::progress::{create_progress_bar, ProgressBarExt};
use crate::cli::output::{output, truncate, CommandOutput, OutputFormat, TableFormatter};
use crate::domain::models::{CadenceConfig, ChunkPlan, ExecutionReport, ExecutionStatus};
use crate::domain::ports::{CheckpointStore, StaticWorkload, TextService};
use crate::services::{ChunkPlanner, ResourceGovernor, TaskAnalyzer};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Goal text to analyze, plan, and execute
    #[arg(required_unless_present = "plan_file", conflicts_with = "plan_file")]
    pub goal: Option<String>,

    /// Execute a plan saved by `cadence plan --save` instead of planning fresh
    #[arg(long = "plan", value_name = "FILE")]
    pub plan_file: Option<PathBuf>,

    /// Resume the saved plan from its stored checkpoint
    #[arg(long, requires = "plan_file")]
    pub resume: bool,

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

    /// Use the built-in mock text service instead of the HTTP gateway
    #[arg(long)]
    pub mock: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub report: ExecutionReport,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let status_line = match report.status {
            ExecutionStatus::Completed => console::style("completed").green().bold().to_string(),
            ExecutionStatus::PartialFailure => {
                console::style("partial failure").yellow().bold().to_string()
            }
            ExecutionStatus::Failed => console::style("failed").red().bold().to_string(),
            ExecutionStatus::Cancelled => console::style("cancelled").dim().to_string(),
        };

        let elapsed = report
            .finished_at
            .signed_duration_since(report.started_at)
            .num_seconds();

        let mut lines = vec![
            format!("Run {} {}", report.plan_id, status_line),
            format!("Goal: {}", report.goal),
            format!(
                "Chunks: {} completed, {} failed, {} skipped",
                report.completed_count(),
                report.failed_count(),
                report.skipped_count()
            ),
            format!(
                "Work: {} minute(s) recorded, {} token(s), {}s wall clock",
                report.total_actual_minutes, report.total_tokens, elapsed
            ),
            String::new(),
            TableFormatter::new().format_chunk_reports(&report.chunks),
        ];

        let escalated: Vec<u32> = report
            .chunks
            .iter()
            .filter(|c| c.escalated)
            .map(|c| c.ordinal)
            .collect();
        if !escalated.is_empty() {
            let list: Vec<String> = escalated.iter().map(|o| format!("#{o}")).collect();
            lines.push(format!(
                "{} chunk(s) flagged for review: {}",
                escalated.len(),
                list.join(", ")
            ));
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RunArgs, config: &CadenceConfig, format: OutputFormat) -> Result<()> {
    let pool = initialize_database(&config.storage)
        .await
        .context("Failed to open database. Run 'cadence init' first.")?;

    let history = Arc::new(SqliteHistoryStore::new(pool.clone()));
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(SqliteCheckpointStore::new(pool));
    let governor = Arc::new(ResourceGovernor::new(config.governor.clone()));

    let service: Arc<dyn TextService> = if args.mock {
        Arc::new(MockTextService::new())
    } else {
        Arc::new(HttpTextService::new(config.service.clone())?)
    };
    service
        .health_check()
        .await
        .with_context(|| format!("Text service at {} is unreachable", config.service.base_url))?;

    let plan = match &args.plan_file {
        Some(path) => load_plan(path).await?,
        None => {
            let workload = Arc::new(StaticWorkload::new(workload_from_args(
                args.documents,
                args.open_items,
                &args.deadlines,
            )?));
            let analyzer =
                TaskAnalyzer::new(Arc::clone(&history) as _, workload, config.analyzer.clone());
            let goal = args.goal.as_deref().unwrap_or_default();
            let understanding = analyzer.analyze(goal, &args.caller).await;
            ChunkPlanner::new(config.planner.clone()).plan(understanding)
        }
    };

    let checkpoint = if args.resume {
        Some(
            checkpoints
                .load(plan.id)
                .await?
                .with_context(|| format!("No checkpoint stored for plan {}", plan.id))?,
        )
    } else {
        None
    };

    let mut orchestrator = Orchestrator::new(
        service,
        governor,
        Arc::clone(&checkpoints),
        history,
        config.execution.clone(),
    );

    let show_progress = format == OutputFormat::Table && !args.no_progress;
    let mut drain: Option<JoinHandle<()>> = None;
    if show_progress {
        let (sender, receiver) = mpsc::channel(config.execution.event_buffer);
        orchestrator = orchestrator.with_event_sender(sender);
        drain = Some(spawn_progress_drain(receiver, &plan));
    }

    // Ctrl-C cancels between chunks; the in-flight call is never cut off.
    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let result = match checkpoint {
        Some(checkpoint) => orchestrator.resume(plan, checkpoint).await,
        None => orchestrator.run(plan).await,
    };

    // Close the event channel so the drain task sees the end of stream.
    drop(orchestrator);
    if let Some(handle) = drain {
        let _ = handle.await;
    }

    let report = result.context("Run failed")?;
    output(&RunOutput { report }, format);
    Ok(())
}

async fn load_plan(path: &PathBuf) -> Result<ChunkPlan> {
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    let plan: ChunkPlan = serde_json::from_str(&raw)
        .with_context(|| format!("Plan file {} is not a valid plan", path.display()))?;
    Ok(plan)
}

fn spawn_progress_drain(
    mut receiver: mpsc::Receiver<ExecutionEvent>,
    plan: &ChunkPlan,
) -> JoinHandle<()> {
    let bar = create_progress_bar(plan.chunks.len() as u64);
    bar.set_message("waiting for admission");

    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match event {
                ExecutionEvent::ChunkStarted { ordinal, goal, .. } => {
                    bar.set_message(format!("#{ordinal} {}", truncate(&goal, 40)));
                }
                ExecutionEvent::ChunkCompleted { .. } => bar.inc(1),
                ExecutionEvent::ChunkFailed { ordinal, error, .. } => {
                    bar.println(format!(
                        "{} chunk #{ordinal}: {error}",
                        console::style("✗").red().bold()
                    ));
                    bar.inc(1);
                }
                ExecutionEvent::ChunkSkipped { ordinal, .. } => {
                    bar.println(format!(
                        "{} chunk #{ordinal} skipped",
                        console::style("⊘").dim()
                    ));
                    bar.inc(1);
                }
                ExecutionEvent::BackoffApplied { delay, .. } => {
                    bar.set_message(format!("backing off {}ms", delay.as_millis()));
                }
                ExecutionEvent::DeadlineWarning { percent, .. } => {
                    bar.println(format!(
                        "{} chunk at {percent}% of its deadline",
                        console::style("⚠").yellow()
                    ));
                }
                ExecutionEvent::CheckpointSaved { marker, .. } => {
                    bar.println(format!("{} checkpoint '{marker}' saved", console::style("●").cyan()));
                }
                ExecutionEvent::PlanFinished { status, .. } => match status {
                    ExecutionStatus::Completed => bar.finish_success("all chunks completed"),
                    ExecutionStatus::Cancelled => bar.finish_failure("run cancelled"),
                    _ => bar.finish_failure("run finished with failures"),
                },
                ExecutionEvent::PlanStarted { .. } | ExecutionEvent::AdmissionWaited { .. } => {}
            }
        }
        // Channel closed without a terminal event (the run errored early).
        if !bar.is_finished() {
            bar.abandon();
        }
    })
}
