//! # Usage Aggregator
//!
//! Ordered reads over the per-component usage rows maintained by the
//! backend on every append. Unknown components are `Confirmed(None)`,
//! not errors.

use crate::primitives::clamp_limit;
use crate::storage::RelationshipBackend;
use crate::{ComponentRef, Retrieval, UsageStats};
use std::cmp::Reverse;
use std::sync::Arc;

pub struct UsageAggregator {
    backend: Arc<dyn RelationshipBackend>,
}

impl std::fmt::Debug for UsageAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageAggregator").finish_non_exhaustive()
    }
}

impl UsageAggregator {
    #[must_use]
    pub fn new(backend: Arc<dyn RelationshipBackend>) -> Self {
        Self { backend }
    }

    pub fn get_stats(&self, component: &ComponentRef) -> Retrieval<Option<UsageStats>> {
        Retrieval::from_backend(self.backend.usage_stats(component), "get_stats")
    }

    /// Highest `total_uses` first; ties by component.
    pub fn most_used(
        &self,
        component_type: Option<&str>,
        limit: Option<usize>,
    ) -> Retrieval<Vec<UsageStats>> {
        Retrieval::from_backend(self.backend.all_usage_stats(component_type), "most_used").map(
            |mut rows| {
                rows.sort_by(|a, b| {
                    b.total_uses
                        .cmp(&a.total_uses)
                        .then_with(|| a.component.cmp(&b.component))
                });
                rows.truncate(clamp_limit(limit));
                rows
            },
        )
    }

    /// Latest `last_used_at` first. Rows never touched by an edge are skipped.
    pub fn recently_used(
        &self,
        component_type: Option<&str>,
        limit: Option<usize>,
    ) -> Retrieval<Vec<UsageStats>> {
        Retrieval::from_backend(self.backend.all_usage_stats(component_type), "recently_used")
            .map(|rows| {
                let mut rows: Vec<UsageStats> =
                    rows.into_iter().filter(|r| r.last_used_at.is_some()).collect();
                rows.sort_by_key(|r| (Reverse(r.last_used_at), r.component.clone()));
                rows.truncate(clamp_limit(limit));
                rows
            })
    }
}
