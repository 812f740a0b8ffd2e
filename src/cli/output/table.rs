//! Table output formatting for CLI commands
//!
//! Provides formatted table output for plans, chunk reports, task history,
//! and checkpoints using comfy-table. Supports color-coded cells, automatic
//! column sizing, and accessibility features.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use crate::domain::models::{Chunk, ChunkPlan, ChunkPriority, ChunkReport, ChunkStatus, RunCheckpoint};
use crate::domain::ports::TaskRecord;

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<usize>,
}

impl TableFormatter {
    /// Create a new table formatter
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    /// Create a new table formatter with custom settings
    pub fn with_config(use_colors: bool, max_width: Option<usize>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Format a plan's chunks as a table
    pub fn format_plan(&self, plan: &ChunkPlan) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Chunk goal").add_attribute(Attribute::Bold),
            Cell::new("Priority").add_attribute(Attribute::Bold),
            Cell::new("Est. min").add_attribute(Attribute::Bold),
            Cell::new("Depends on").add_attribute(Attribute::Bold),
            Cell::new("Gates").add_attribute(Attribute::Bold),
        ]);

        for chunk in &plan.chunks {
            let depends = self.format_dependencies(plan, chunk);
            table.add_row(vec![
                Cell::new(chunk.ordinal),
                Cell::new(truncate_text(&chunk.goal, 48)),
                self.priority_cell(chunk.priority),
                Cell::new(chunk.estimated_minutes),
                Cell::new(depends),
                Cell::new(chunk.quality_gates.len()),
            ]);
        }

        table.to_string()
    }

    /// Format per-chunk execution results as a table
    pub fn format_chunk_reports(&self, chunks: &[ChunkReport]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Minutes").add_attribute(Attribute::Bold),
            Cell::new("Result").add_attribute(Attribute::Bold),
        ]);

        for chunk in chunks {
            let minutes = chunk
                .actual_minutes
                .map_or_else(|| "-".to_string(), |m| m.to_string());

            let detail = match (&chunk.result_summary, &chunk.error_detail) {
                (Some(summary), _) => truncate_text(summary, 56),
                (None, Some(error)) => truncate_text(error, 56),
                (None, None) => "-".to_string(),
            };
            let detail = if chunk.escalated {
                format!("{detail} [escalated]")
            } else {
                detail
            };

            table.add_row(vec![
                Cell::new(chunk.ordinal),
                self.status_cell(chunk.status),
                Cell::new(minutes),
                Cell::new(detail),
            ]);
        }

        table.to_string()
    }

    /// Format task history records as a table
    pub fn format_history(&self, records: &[TaskRecord]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Recorded").add_attribute(Attribute::Bold),
            Cell::new("Goal").add_attribute(Attribute::Bold),
            Cell::new("Category").add_attribute(Attribute::Bold),
            Cell::new("Outcome").add_attribute(Attribute::Bold),
            Cell::new("Minutes").add_attribute(Attribute::Bold),
        ]);

        for record in records {
            table.add_row(vec![
                Cell::new(record.recorded_at.format("%Y-%m-%d %H:%M").to_string()),
                Cell::new(truncate_text(&record.goal, 44)),
                Cell::new(record.category.as_str()),
                Cell::new(record.outcome.as_str()),
                Cell::new(record.actual_minutes),
            ]);
        }

        table.to_string()
    }

    /// Format stored checkpoints as a table
    pub fn format_checkpoints(&self, checkpoints: &[RunCheckpoint]) -> String {
        let mut table = self.create_base_table();

        table.set_header(vec![
            Cell::new("Plan").add_attribute(Attribute::Bold),
            Cell::new("Marker").add_attribute(Attribute::Bold),
            Cell::new("Completed").add_attribute(Attribute::Bold),
            Cell::new("Saved").add_attribute(Attribute::Bold),
        ]);

        for checkpoint in checkpoints {
            table.add_row(vec![
                Cell::new(&checkpoint.plan_id.to_string()[..8]),
                Cell::new(&checkpoint.marker),
                Cell::new(checkpoint.completed_chunk_ids.len()),
                Cell::new(checkpoint.saved_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ]);
        }

        table.to_string()
    }

    fn format_dependencies(&self, plan: &ChunkPlan, chunk: &Chunk) -> String {
        if chunk.depends_on.is_empty() {
            return "-".to_string();
        }
        let ordinals: Vec<String> = chunk
            .depends_on
            .iter()
            .filter_map(|id| plan.chunk(*id))
            .map(|dep| dep.ordinal.to_string())
            .collect();
        format!("#{}", ordinals.join(", #"))
    }

    fn status_cell(&self, status: ChunkStatus) -> Cell {
        if self.use_colors {
            Cell::new(status.as_str()).fg(status_color(status))
        } else {
            Cell::new(format!("{} {}", status_icon(status), status.as_str()))
        }
    }

    fn priority_cell(&self, priority: ChunkPriority) -> Cell {
        if self.use_colors {
            Cell::new(priority.as_str()).fg(priority_color(priority))
        } else {
            Cell::new(priority.as_str())
        }
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        // UTF-8 preset for readable borders
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(u16::try_from(width).unwrap_or(u16::MAX));
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    // Respect NO_COLOR environment variable
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    // Check for dumb terminal
    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

/// Map chunk status to color
fn status_color(status: ChunkStatus) -> Color {
    match status {
        ChunkStatus::Completed => Color::Green,
        ChunkStatus::Running => Color::Cyan,
        ChunkStatus::Failed => Color::Red,
        ChunkStatus::Skipped => Color::DarkGrey,
        ChunkStatus::Pending => Color::White,
    }
}

/// Map chunk status to icon for color-free terminals
fn status_icon(status: ChunkStatus) -> &'static str {
    match status {
        ChunkStatus::Completed => "✓",
        ChunkStatus::Running => "⟳",
        ChunkStatus::Failed => "✗",
        ChunkStatus::Skipped => "⊘",
        ChunkStatus::Pending => "○",
    }
}

/// Map chunk priority to color
fn priority_color(priority: ChunkPriority) -> Color {
    match priority {
        ChunkPriority::Critical => Color::Red,
        ChunkPriority::High => Color::Yellow,
        ChunkPriority::Medium => Color::White,
        ChunkPriority::Low => Color::DarkGrey,
    }
}

/// Truncate text for table cells
fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
