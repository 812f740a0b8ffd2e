//! Fixed workload provider implementation.
//!
//! Used when no live workload source exists but the analyzer requires a
//! `WorkloadProvider`. The CLI builds one from command-line flags; the
//! default is an empty snapshot.

use async_trait::async_trait;

use super::workload::{WorkloadProvider, WorkloadSnapshot};
use crate::domain::errors::DomainResult;

/// A workload provider that returns one fixed snapshot for every caller.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkload {
    snapshot: WorkloadSnapshot,
}

impl StaticWorkload {
    pub fn new(snapshot: WorkloadSnapshot) -> Self {
        Self { snapshot }
    }

    /// An empty snapshot: no documents, no open items, no deadlines.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkloadProvider for StaticWorkload {
    async fn snapshot(&self, _caller_id: &str) -> DomainResult<WorkloadSnapshot> {
        Ok(self.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_snapshot_is_caller_independent() {
        let provider = StaticWorkload::new(WorkloadSnapshot {
            related_documents: 12,
            open_items: 4,
            deadlines: vec![],
        });

        let a = provider.snapshot("caller-a").await.unwrap();
        let b = provider.snapshot("caller-b").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.related_documents, 12);

        let empty = StaticWorkload::empty().snapshot("anyone").await.unwrap();
        assert_eq!(empty, WorkloadSnapshot::default());
    }
}
