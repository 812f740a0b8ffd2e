//! Task understanding domain model.
//!
//! The analyzer distills a free-form goal into a structured understanding:
//! category, complexity tier, duration estimate, and risk flags. An
//! understanding is created once per goal and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category a goal is classified into.
///
/// The set is closed; classification tests the goal text against ordered
/// keyword groups and the first matching category wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Drafting or revising documents
    Document,
    /// Investigation and source gathering
    Research,
    /// Scheduling, filing, calendar upkeep
    Administration,
    /// Outbound messages and client updates
    Communication,
    /// Evaluation, comparison, risk assessment
    Analysis,
    /// Regulatory and policy obligations
    Compliance,
    /// Anything that matches no keyword group
    General,
}

impl Default for TaskCategory {
    fn default() -> Self {
        Self::General
    }
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Research => "research",
            Self::Administration => "administration",
            Self::Communication => "communication",
            Self::Analysis => "analysis",
            Self::Compliance => "compliance",
            Self::General => "general",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "document" => Some(Self::Document),
            "research" => Some(Self::Research),
            "administration" => Some(Self::Administration),
            "communication" => Some(Self::Communication),
            "analysis" => Some(Self::Analysis),
            "compliance" => Some(Self::Compliance),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    /// Categories whose work is inherently exploratory and scores extra
    /// complexity weight.
    pub fn is_exploratory(&self) -> bool {
        matches!(self, Self::Research | Self::Analysis)
    }
}

/// Complexity tier assigned by the weighted scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
}

impl Default for ComplexityTier {
    fn default() -> Self {
        Self::Low
    }
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Map a weighted complexity score onto a tier.
    ///
    /// Scores of 6 and above are high, 3 to 5 medium, everything else low.
    pub fn from_score(score: u32) -> Self {
        if score >= 6 {
            Self::High
        } else if score >= 3 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Duration multiplier applied to the base estimate.
    pub fn duration_multiplier(&self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 4,
        }
    }
}

/// Risk conditions surfaced during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    /// At least one critical deadline is outstanding in the caller's workload
    CriticalDeadline,
    /// Related document volume is at or above the large threshold
    HeavyDocumentVolume,
    /// Similar past tasks averaged more than two hours of actual work
    LongRunningHistory,
    /// Goal references privileged or confidential material, or the category
    /// is compliance
    SensitiveMaterial,
}

impl RiskFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CriticalDeadline => "critical_deadline",
            Self::HeavyDocumentVolume => "heavy_document_volume",
            Self::LongRunningHistory => "long_running_history",
            Self::SensitiveMaterial => "sensitive_material",
        }
    }
}

/// A prior task retained for duration reconciliation.
///
/// Only tasks whose goal text clears the similarity threshold (word-overlap
/// above 0.3) are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarTask {
    /// Identifier of the historical record
    pub record_id: Uuid,
    /// Jaccard word-overlap score against the current goal
    pub similarity: f64,
    /// Actual minutes the historical task took
    pub actual_minutes: u32,
}

/// Structured understanding of a goal, produced once by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUnderstanding {
    /// The goal text as submitted
    pub goal: String,
    /// Opaque caller identity used for history lookups and accounting
    pub caller_id: String,
    /// Classified category
    pub category: TaskCategory,
    /// Assessed complexity tier
    pub complexity: ComplexityTier,
    /// Raw weighted complexity score behind the tier
    pub complexity_score: u32,
    /// Estimated total minutes, rounded up to the nearest five
    pub estimated_minutes: u32,
    /// Risk conditions found during analysis
    pub risk_flags: Vec<RiskFlag>,
    /// Count of outstanding critical deadlines in the workload snapshot
    pub critical_deadlines: u32,
    /// Related document volume from the workload snapshot
    pub related_documents: u32,
    /// Mean similarity over the retained similar tasks (0.0 when none)
    pub historical_similarity: f64,
    /// Similar past tasks above the similarity threshold
    pub similar_tasks: Vec<SimilarTask>,
    /// When the analysis ran
    pub analyzed_at: DateTime<Utc>,
}

impl TaskUnderstanding {
    /// Create an understanding with default signals; the analyzer fills in
    /// the rest as evidence accumulates.
    pub fn new(goal: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            caller_id: caller_id.into(),
            category: TaskCategory::default(),
            complexity: ComplexityTier::default(),
            complexity_score: 0,
            estimated_minutes: 30,
            risk_flags: Vec::new(),
            critical_deadlines: 0,
            related_documents: 0,
            historical_similarity: 0.0,
            similar_tasks: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }

    /// Record a risk flag, deduplicating.
    pub fn add_risk_flag(&mut self, flag: RiskFlag) {
        if !self.risk_flags.contains(&flag) {
            self.risk_flags.push(flag);
        }
    }

    pub fn has_risk_flag(&self, flag: RiskFlag) -> bool {
        self.risk_flags.contains(&flag)
    }

    /// Mean actual minutes over the retained similar tasks, if any.
    pub fn historical_average_minutes(&self) -> Option<f64> {
        if self.similar_tasks.is_empty() {
            return None;
        }
        let total: u64 = self.similar_tasks.iter().map(|t| u64::from(t.actual_minutes)).sum();
        #[allow(clippy::cast_precision_loss)]
        Some(total as f64 / self.similar_tasks.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_score_boundaries() {
        assert_eq!(ComplexityTier::from_score(0), ComplexityTier::Low);
        assert_eq!(ComplexityTier::from_score(2), ComplexityTier::Low);
        assert_eq!(ComplexityTier::from_score(3), ComplexityTier::Medium);
        assert_eq!(ComplexityTier::from_score(5), ComplexityTier::Medium);
        assert_eq!(ComplexityTier::from_score(6), ComplexityTier::High);
        assert_eq!(ComplexityTier::from_score(11), ComplexityTier::High);
    }

    #[test]
    fn test_category_round_trip() {
        for cat in [
            TaskCategory::Document,
            TaskCategory::Research,
            TaskCategory::Administration,
            TaskCategory::Communication,
            TaskCategory::Analysis,
            TaskCategory::Compliance,
            TaskCategory::General,
        ] {
            assert_eq!(TaskCategory::from_str(cat.as_str()), Some(cat));
        }
        assert_eq!(TaskCategory::from_str("unknown"), None);
    }

    #[test]
    fn test_risk_flags_deduplicate() {
        let mut u = TaskUnderstanding::new("Review the vendor agreement", "caller-1");
        u.add_risk_flag(RiskFlag::CriticalDeadline);
        u.add_risk_flag(RiskFlag::CriticalDeadline);
        assert_eq!(u.risk_flags.len(), 1);
        assert!(u.has_risk_flag(RiskFlag::CriticalDeadline));
    }

    #[test]
    fn test_historical_average() {
        let mut u = TaskUnderstanding::new("Draft a contract", "caller-1");
        assert!(u.historical_average_minutes().is_none());

        u.similar_tasks.push(SimilarTask {
            record_id: Uuid::new_v4(),
            similarity: 0.5,
            actual_minutes: 60,
        });
        u.similar_tasks.push(SimilarTask {
            record_id: Uuid::new_v4(),
            similarity: 0.4,
            actual_minutes: 120,
        });
        assert_eq!(u.historical_average_minutes(), Some(90.0));
    }
}
