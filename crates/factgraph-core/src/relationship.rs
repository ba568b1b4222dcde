//! # Relationship Recorder
//!
//! Ingests directed, typed edges between named components.
//!
//! - `record` validates, stamps and appends one edge; backend failure is an
//!   error (the append-only log is never silently skipped)
//! - `record_batch` records items in parallel; every item gets its own
//!   outcome and one failure never aborts its siblings

use crate::primitives::{
    MAX_BATCH_SIZE, MAX_ERROR_MESSAGE_LENGTH, MAX_METADATA_ENTRIES, MAX_RELATIONSHIP_TYPE_LENGTH,
    now_millis,
};
use crate::storage::RelationshipBackend;
use crate::{
    ComponentRef, EdgeContext, FactgraphError, Metadata, Relationship, RelationshipId,
    RelationshipRecord,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_success() -> bool {
    true
}

/// An edge as submitted by a caller: raw strings, validated on record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelationship {
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    pub relationship_type: String,
    #[serde(default)]
    pub context: EdgeContext,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Unix milliseconds; `None` means "now".
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl NewRelationship {
    /// A successful edge with no context, metadata or timing.
    pub fn new(
        source: (&str, &str),
        target: (&str, &str),
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source.0.to_string(),
            source_id: source.1.to_string(),
            target_type: target.0.to_string(),
            target_id: target.1.to_string(),
            relationship_type: relationship_type.into(),
            context: EdgeContext::default(),
            metadata: Metadata::new(),
            execution_time_ms: None,
            success: true,
            error_message: None,
            timestamp: None,
        }
    }

    /// Validate into a typed relationship, stamping the current time if none
    /// was given.
    pub fn validate(self) -> Result<Relationship, FactgraphError> {
        let source = ComponentRef::new(self.source_type, self.source_id)?;
        let target = ComponentRef::new(self.target_type, self.target_id)?;

        let rel_type = self.relationship_type;
        if rel_type.is_empty()
            || rel_type.len() > MAX_RELATIONSHIP_TYPE_LENGTH
            || rel_type.chars().any(char::is_whitespace)
        {
            return Err(FactgraphError::InvalidRelationship(format!(
                "relationship type '{}'",
                rel_type
            )));
        }
        if self.metadata.len() > MAX_METADATA_ENTRIES {
            return Err(FactgraphError::InvalidRelationship(format!(
                "{} metadata entries (max {})",
                self.metadata.len(),
                MAX_METADATA_ENTRIES
            )));
        }
        if self
            .error_message
            .as_ref()
            .is_some_and(|m| m.len() > MAX_ERROR_MESSAGE_LENGTH)
        {
            return Err(FactgraphError::InvalidRelationship(
                "error message too long".to_string(),
            ));
        }

        Ok(Relationship {
            source,
            target,
            relationship_type: rel_type,
            context: self.context,
            metadata: self.metadata,
            execution_time_ms: self.execution_time_ms,
            success: self.success,
            error_message: self.error_message,
            timestamp: self.timestamp.unwrap_or_else(now_millis),
        })
    }
}

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Recorded { id: RelationshipId },
    Rejected { error: String },
    BackendFailed { error: String },
}

impl BatchOutcome {
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

impl From<Result<RelationshipId, FactgraphError>> for BatchOutcome {
    fn from(result: Result<RelationshipId, FactgraphError>) -> Self {
        match result {
            Ok(id) => Self::Recorded { id },
            Err(e) if e.is_validation() => Self::Rejected {
                error: e.to_string(),
            },
            Err(e) => Self::BackendFailed {
                error: e.to_string(),
            },
        }
    }
}

/// One entry of a batch report, keyed by input position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    pub outcome: BatchOutcome,
}

/// Per-item results of `record_batch`, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub recorded_count: usize,
    pub failed_count: usize,
    pub results: Vec<BatchItem>,
}

/// Records component relationships into a backend.
pub struct RelationshipRecorder {
    backend: Arc<dyn RelationshipBackend>,
}

impl std::fmt::Debug for RelationshipRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipRecorder").finish_non_exhaustive()
    }
}

impl RelationshipRecorder {
    #[must_use]
    pub fn new(backend: Arc<dyn RelationshipBackend>) -> Self {
        Self { backend }
    }

    /// Validate and append one edge.
    pub fn record(&self, edge: NewRelationship) -> Result<RelationshipId, FactgraphError> {
        let relationship = edge.validate()?;
        let id = self.backend.append(&relationship).inspect_err(|e| {
            tracing::warn!(
                source = %relationship.source,
                target = %relationship.target,
                error = %e,
                "relationship not recorded"
            );
        })?;
        tracing::debug!(id = id.0, source = %relationship.source, target = %relationship.target, "relationship recorded");
        Ok(id)
    }

    /// Record many edges in parallel with independent outcomes.
    ///
    /// Only an oversized batch is rejected as a whole, before anything is written.
    pub fn record_batch(&self, edges: Vec<NewRelationship>) -> Result<BatchReport, FactgraphError> {
        if edges.len() > MAX_BATCH_SIZE {
            return Err(FactgraphError::InvalidRelationship(format!(
                "batch of {} exceeds {}",
                edges.len(),
                MAX_BATCH_SIZE
            )));
        }

        let results: Vec<BatchItem> = edges
            .into_par_iter()
            .enumerate()
            .map(|(index, edge)| BatchItem {
                index,
                outcome: self.record(edge).into(),
            })
            .collect();

        let recorded_count = results.iter().filter(|r| r.outcome.is_recorded()).count();
        let failed_count = results.len().saturating_sub(recorded_count);
        if failed_count > 0 {
            tracing::warn!(recorded_count, failed_count, "batch partially recorded");
        }

        Ok(BatchReport {
            recorded_count,
            failed_count,
            results,
        })
    }

    /// Make a component known without an edge, so it can show up as an orphan.
    pub fn register_component(&self, component: &ComponentRef) -> Result<(), FactgraphError> {
        self.backend.register_component(component)
    }

    /// Fetch one log entry.
    pub fn get(&self, id: RelationshipId) -> Result<Option<RelationshipRecord>, FactgraphError> {
        self.backend.relationship(id)
    }

    /// Number of log entries.
    pub fn count(&self) -> Result<usize, FactgraphError> {
        self.backend.relationship_count()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn recorder() -> (Arc<MemoryBackend>, RelationshipRecorder) {
        let backend = Arc::new(MemoryBackend::new());
        let recorder = RelationshipRecorder::new(backend.clone());
        (backend, recorder)
    }

    #[test]
    fn record_stamps_and_returns_id() {
        let (_, recorder) = recorder();
        let mut edge = NewRelationship::new(("agent", "planner"), ("tool", "search"), "invokes");
        edge.execution_time_ms = Some(42);

        let id = recorder.record(edge).expect("record");
        let stored = recorder.get(id).expect("read").expect("present");
        assert!(stored.relationship.timestamp > 0);
        assert_eq!(stored.relationship.execution_time_ms, Some(42));
        assert_eq!(recorder.count().expect("count"), 1);
    }

    #[test]
    fn record_rejects_bad_input() {
        let (_, recorder) = recorder();
        let bad_type = NewRelationship::new(("agent", "a"), ("tool", "b"), "");
        assert!(matches!(
            recorder.record(bad_type),
            Err(FactgraphError::InvalidRelationship(_))
        ));
        let bad_component = NewRelationship::new(("", "a"), ("tool", "b"), "invokes");
        assert!(matches!(
            recorder.record(bad_component),
            Err(FactgraphError::InvalidComponent(_))
        ));
        assert_eq!(recorder.count().expect("count"), 0);
    }

    #[test]
    fn record_surfaces_backend_outage() {
        let (backend, recorder) = recorder();
        backend.set_online(false);
        let edge = NewRelationship::new(("agent", "a"), ("tool", "b"), "invokes");
        assert!(matches!(
            recorder.record(edge),
            Err(FactgraphError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn batch_partial_failure() {
        let (_, recorder) = recorder();
        let edges = vec![
            NewRelationship::new(("agent", "a"), ("tool", "x"), "invokes"),
            NewRelationship::new(("agent", ""), ("tool", "x"), "invokes"),
            NewRelationship::new(("agent", "c"), ("tool", "x"), "invokes"),
        ];

        let report = recorder.record_batch(edges).expect("batch");
        assert_eq!(report.recorded_count, 2);
        assert_eq!(report.failed_count, 1);
        let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(matches!(
            report.results[1].outcome,
            BatchOutcome::Rejected { .. }
        ));
        assert!(report.results[2].outcome.is_recorded());
    }

    #[test]
    fn oversized_batch_rejected_whole() {
        let (_, recorder) = recorder();
        let edges =
            vec![NewRelationship::new(("agent", "a"), ("tool", "x"), "invokes"); MAX_BATCH_SIZE + 1];
        assert!(recorder.record_batch(edges).is_err());
        assert_eq!(recorder.count().expect("count"), 0);
    }

    #[test]
    fn serde_defaults_fill_optional_fields() {
        let edge: NewRelationship = toml::from_str(
            r#"
            source_type = "agent"
            source_id = "a"
            target_type = "tool"
            target_id = "b"
            relationship_type = "invokes"
            "#,
        )
        .expect("decode");
        assert!(edge.success);
        assert!(edge.timestamp.is_none());
        assert_eq!(edge.context, EdgeContext::default());
    }
}
