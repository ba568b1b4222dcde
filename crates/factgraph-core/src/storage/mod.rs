//! # Backing Store Boundary
//!
//! The relational collaborator that owns durable state is consumed through
//! two traits:
//! - `TripleBackend`: upsert-by-natural-key for triples
//! - `RelationshipBackend`: the append-only edge log plus the aggregates
//!   derived from it (edge summaries in both directions, per-component usage
//!   rows, the component registry)
//!
//! Two implementations ship with the crate:
//! - `MemoryBackend`: volatile, with an outage switch for degraded-mode tests
//! - `RedbBackend`: disk-backed ACID storage using redb
//!
//! Implementations must be `Send + Sync`; the core calls them from any
//! thread, including rayon workers during batch recording.

mod memory;
mod redb_store;

pub use memory::MemoryBackend;
pub use redb_store::RedbBackend;

use crate::{
    ComponentRef, EdgeSummary, FactgraphError, Relationship, RelationshipId, RelationshipRecord,
    Triple, UsageStats,
};

/// Durable storage for facts.
pub trait TripleBackend: Send + Sync {
    /// Insert or replace the fact keyed by `(subject, predicate, object)`.
    fn upsert_triple(&self, triple: &Triple) -> Result<(), FactgraphError>;

    /// Load every durable fact, in key order.
    fn load_triples(&self) -> Result<Vec<Triple>, FactgraphError>;

    /// Number of durable facts.
    fn triple_count(&self) -> Result<usize, FactgraphError>;
}

/// Durable storage for component relationships.
pub trait RelationshipBackend: Send + Sync {
    /// Append one edge to the log and fold it into every aggregate in a
    /// single atomic write. Both endpoints become registered components.
    fn append(&self, relationship: &Relationship) -> Result<RelationshipId, FactgraphError>;

    /// Make a component known without recording any edge.
    fn register_component(&self, component: &ComponentRef) -> Result<(), FactgraphError>;

    /// Fetch one log entry.
    fn relationship(&self, id: RelationshipId)
    -> Result<Option<RelationshipRecord>, FactgraphError>;

    /// Number of log entries.
    fn relationship_count(&self) -> Result<usize, FactgraphError>;

    /// Aggregated inbound edges of `target`, in key order. `limit` stops
    /// the scan after that many rows.
    fn usages(
        &self,
        target: &ComponentRef,
        limit: Option<usize>,
    ) -> Result<Vec<EdgeSummary>, FactgraphError>;

    /// Aggregated outbound edges of `source`, in key order. `limit` stops
    /// the scan after that many rows.
    fn dependencies(
        &self,
        source: &ComponentRef,
        limit: Option<usize>,
    ) -> Result<Vec<EdgeSummary>, FactgraphError>;

    /// The usage row of one component, if any edge touched it.
    fn usage_stats(&self, component: &ComponentRef) -> Result<Option<UsageStats>, FactgraphError>;

    /// All usage rows, optionally restricted to one component type.
    fn all_usage_stats(
        &self,
        component_type: Option<&str>,
    ) -> Result<Vec<UsageStats>, FactgraphError>;

    /// Registered components of one type.
    fn components(&self, component_type: &str) -> Result<Vec<ComponentRef>, FactgraphError>;
}

/// A backend serving both facts and relationships.
pub trait Backend: TripleBackend + RelationshipBackend {}

impl<T: TripleBackend + RelationshipBackend> Backend for T {}
