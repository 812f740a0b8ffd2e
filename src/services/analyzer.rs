//! Goal analysis service.
//!
//! Turns a free-form goal into a [`TaskUnderstanding`]: category from ordered
//! keyword groups, a weighted complexity score, a duration estimate
//! reconciled against similar past tasks, and risk flags. Analysis never
//! fails; missing workload or history signals degrade to defaults.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::models::config::AnalyzerSettings;
use crate::domain::models::{ComplexityTier, RiskFlag, SimilarTask, TaskCategory, TaskUnderstanding};
use crate::domain::ports::{HistoryStore, TaskRecord, WorkloadProvider, WorkloadSnapshot};

/// Ordered keyword groups for classification. The first group with a hit in
/// the lowercased goal wins; goals matching nothing fall through to general.
const KEYWORD_GROUPS: &[(TaskCategory, &[&str])] = &[
    (
        TaskCategory::Document,
        &["draft", "contract", "agreement", "document", "memo", "brief", "letter"],
    ),
    (
        TaskCategory::Research,
        &["research", "investigate", "case law", "precedent", "statute", "authority"],
    ),
    (
        TaskCategory::Administration,
        &["schedule", "organize", "calendar", "docket", "file"],
    ),
    (
        TaskCategory::Communication,
        &["email", "call", "notify", "respond", "correspond"],
    ),
    (
        TaskCategory::Analysis,
        &["analyze", "review", "assess", "evaluate", "compare", "risk"],
    ),
    (
        TaskCategory::Compliance,
        &["compliance", "regulatory", "filing", "audit", "policy"],
    ),
];

/// Goal text markers that flag sensitive material regardless of category.
const SENSITIVE_KEYWORDS: &[&str] = &["privileged", "confidential", "sealed"];

/// Produces a [`TaskUnderstanding`] from a goal and the caller's context.
pub struct TaskAnalyzer {
    history: Arc<dyn HistoryStore>,
    workload: Arc<dyn WorkloadProvider>,
    settings: AnalyzerSettings,
}

impl TaskAnalyzer {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        workload: Arc<dyn WorkloadProvider>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            history,
            workload,
            settings,
        }
    }

    /// Analyze a goal for a caller.
    ///
    /// Gathers workload and history signals, classifies, scores complexity,
    /// estimates duration, and attaches risk flags. Unreachable signal
    /// sources are logged and treated as empty.
    pub async fn analyze(&self, goal: &str, caller_id: &str) -> TaskUnderstanding {
        let workload = match self.workload.snapshot(caller_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(caller_id, error = %err, "workload snapshot unavailable, using empty signals");
                WorkloadSnapshot::default()
            }
        };

        let history = match self
            .history
            .recent_for_caller(caller_id, self.settings.history_limit)
            .await
        {
            Ok(records) => records,
            Err(err) => {
                warn!(caller_id, error = %err, "task history unavailable, skipping reconciliation");
                Vec::new()
            }
        };

        let mut understanding = TaskUnderstanding::new(goal, caller_id);
        understanding.category = categorize(goal);
        understanding.related_documents = workload.related_documents;
        understanding.critical_deadlines = workload.critical_deadline_count();

        let (similar_tasks, mean_similarity) = self.find_similar(goal, &history);
        understanding.similar_tasks = similar_tasks;
        understanding.historical_similarity = mean_similarity;

        let historical_average = understanding.historical_average_minutes();
        understanding.complexity_score = self.complexity_score(&understanding, historical_average);
        understanding.complexity = ComplexityTier::from_score(understanding.complexity_score);
        understanding.estimated_minutes = self.estimate_minutes(&understanding, historical_average);
        self.flag_risks(&mut understanding, historical_average);

        debug!(
            caller_id,
            category = understanding.category.as_str(),
            complexity = understanding.complexity.as_str(),
            score = understanding.complexity_score,
            estimated_minutes = understanding.estimated_minutes,
            similar_tasks = understanding.similar_tasks.len(),
            "goal analyzed"
        );
        understanding
    }

    /// Weighted complexity score over the gathered signals.
    fn complexity_score(&self, u: &TaskUnderstanding, historical_average: Option<f64>) -> u32 {
        let mut score = 0u32;

        if u.related_documents >= self.settings.large_volume_docs {
            score += 3;
        } else if u.related_documents >= self.settings.medium_volume_docs {
            score += 2;
        }

        // Two points per outstanding critical deadline, capped.
        score += (u.critical_deadlines.saturating_mul(2)).min(4);

        if u.category.is_exploratory() {
            score += 2;
        }

        if let Some(avg) = historical_average {
            if avg > 120.0 {
                score += 2;
            } else if avg > 60.0 {
                score += 1;
            }
        }

        score
    }

    /// Heuristic duration scaled by complexity and volume, reconciled against
    /// the historical average, rounded up to the nearest five minutes.
    fn estimate_minutes(&self, u: &TaskUnderstanding, historical_average: Option<f64>) -> u32 {
        let base = 30.0 * f64::from(u.complexity.duration_multiplier());
        let volume_scale = if u.related_documents >= self.settings.large_volume_docs {
            2.0
        } else if u.related_documents >= self.settings.medium_volume_docs {
            1.5
        } else {
            1.0
        };

        let mut estimate = base * volume_scale;
        if let Some(avg) = historical_average {
            estimate = estimate.max(0.8 * avg);
        }
        round_up_to_five(estimate)
    }

    fn flag_risks(&self, u: &mut TaskUnderstanding, historical_average: Option<f64>) {
        if u.critical_deadlines > 0 {
            u.add_risk_flag(RiskFlag::CriticalDeadline);
        }
        if u.related_documents >= self.settings.large_volume_docs {
            u.add_risk_flag(RiskFlag::HeavyDocumentVolume);
        }
        if historical_average.is_some_and(|avg| avg > 120.0) {
            u.add_risk_flag(RiskFlag::LongRunningHistory);
        }

        let lower = u.goal.to_lowercase();
        if u.category == TaskCategory::Compliance
            || SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k))
        {
            u.add_risk_flag(RiskFlag::SensitiveMaterial);
        }
    }

    /// Prior tasks above the similarity threshold, with their mean score.
    fn find_similar(&self, goal: &str, history: &[TaskRecord]) -> (Vec<SimilarTask>, f64) {
        let mut similar = Vec::new();
        for record in history {
            let similarity = jaccard(goal, &record.goal);
            if similarity > self.settings.similarity_threshold {
                similar.push(SimilarTask {
                    record_id: record.id,
                    similarity,
                    actual_minutes: record.actual_minutes,
                });
            }
        }

        let mean = if similar.is_empty() {
            0.0
        } else {
            similar.iter().map(|t| t.similarity).sum::<f64>() / similar.len() as f64
        };
        (similar, mean)
    }
}

/// Classify a goal against the ordered keyword groups.
fn categorize(goal: &str) -> TaskCategory {
    let lower = goal.to_lowercase();
    for (category, keywords) in KEYWORD_GROUPS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *category;
        }
    }
    TaskCategory::General
}

/// Word-overlap similarity between two goal texts, in `[0.0, 1.0]`.
pub(crate) fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

/// Round up to the next multiple of five, never below five.
fn round_up_to_five(minutes: f64) -> u32 {
    let whole = minutes.ceil().max(0.0) as u32;
    (whole.max(1) + 4) / 5 * 5
}
