//! Workload context provider port.
//!
//! Read-only volume and deadline signals for the caller's domain. A failing
//! provider degrades to an empty snapshot at the analyzer; it never fails a
//! task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// An outstanding deadline in the caller's workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineSignal {
    /// Short label, e.g. a matter or filing name
    pub label: String,
    pub due_at: DateTime<Utc>,
    /// Whether missing it is considered critical
    pub critical: bool,
}

/// Current volume/deadline signals for a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    /// Documents related to the caller's active work
    pub related_documents: u32,
    /// Open items of any kind
    pub open_items: u32,
    /// Outstanding deadlines
    pub deadlines: Vec<DeadlineSignal>,
}

impl WorkloadSnapshot {
    pub fn critical_deadline_count(&self) -> u32 {
        u32::try_from(self.deadlines.iter().filter(|d| d.critical).count()).unwrap_or(u32::MAX)
    }
}

/// Read-only source of workload signals.
#[async_trait]
pub trait WorkloadProvider: Send + Sync {
    async fn snapshot(&self, caller_id: &str) -> DomainResult<WorkloadSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_deadline_count() {
        let snapshot = WorkloadSnapshot {
            related_documents: 10,
            open_items: 3,
            deadlines: vec![
                DeadlineSignal { label: "filing".into(), due_at: Utc::now(), critical: true },
                DeadlineSignal { label: "review".into(), due_at: Utc::now(), critical: false },
                DeadlineSignal { label: "hearing".into(), due_at: Utc::now(), critical: true },
            ],
        };
        assert_eq!(snapshot.critical_deadline_count(), 2);
        assert_eq!(WorkloadSnapshot::default().critical_deadline_count(), 0);
    }
}
