//! # Engine Module
//!
//! One backend wired into every component:
//! - `FactStore` (facts and pattern queries)
//! - `RelationshipRecorder` (edge ingestion)
//! - `GraphBuilder` (usages, dependencies, traversal, orphans)
//! - `UsageAggregator` (per-component counters)
//!
//! The engine is an explicit value with no global state. Callers that need
//! to share it across threads wrap it in an `Arc`.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryBackend` (fast, volatile)
//! - `Persistent`: `RedbBackend` (disk-backed, ACID)
//! - `Custom`: any other `Backend` implementation

use crate::export::parse_ntriples;
use crate::fact_store::{FactStore, FactStoreStats, FlushReport};
use crate::graph::{DependencyQuery, GraphBuilder, GraphLimits, GraphOptions, GraphOutput, UsageQuery};
use crate::query::Bindings;
use crate::relationship::{BatchReport, NewRelationship, RelationshipRecorder};
use crate::storage::{Backend, MemoryBackend, RedbBackend};
use crate::usage::UsageAggregator;
use crate::{
    AddedTriple, ComponentRef, EdgeSummary, FactgraphError, Metadata, RelationshipId, Retrieval,
    UsageStats,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Which kind of backend an engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    InMemory,
    Persistent,
    Custom,
}

/// Snapshot of engine health and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub storage: StorageKind,
    pub facts: FactStoreStats,
    /// `None` when the backend could not be read.
    pub relationships: Option<usize>,
    pub backend_available: bool,
    pub limits: GraphLimits,
}

/// Outcome of importing an N-Triples snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub memory_only: usize,
}

/// The symbolic relationship graph engine.
pub struct Engine {
    storage: StorageKind,
    facts: FactStore,
    recorder: RelationshipRecorder,
    graph: GraphBuilder,
    usage: UsageAggregator,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("storage", &self.storage)
            .field("facts", &self.facts)
            .field("limits", &self.graph.limits())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// A volatile engine over a fresh `MemoryBackend`.
    #[must_use]
    pub fn in_memory(limits: GraphLimits) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        Self::assemble(StorageKind::InMemory, FactStore::new(backend.clone()), backend, limits)
    }

    /// A persistent engine over a redb file, warm-loading its facts.
    pub fn open_redb(path: impl AsRef<Path>, limits: GraphLimits) -> Result<Self, FactgraphError> {
        let backend = Arc::new(RedbBackend::open(path)?);
        let facts = FactStore::open(backend.clone())?;
        Ok(Self::assemble(StorageKind::Persistent, facts, backend, limits))
    }

    /// An engine over any backend, warm-loading its facts.
    pub fn with_backend<B: Backend + 'static>(
        backend: Arc<B>,
        limits: GraphLimits,
    ) -> Result<Self, FactgraphError> {
        let facts = FactStore::open(backend.clone())?;
        Ok(Self::assemble(StorageKind::Custom, facts, backend, limits))
    }

    fn assemble<B: Backend + 'static>(
        storage: StorageKind,
        facts: FactStore,
        backend: Arc<B>,
        limits: GraphLimits,
    ) -> Self {
        Self {
            storage,
            facts,
            recorder: RelationshipRecorder::new(backend.clone()),
            graph: GraphBuilder::new(backend.clone(), limits),
            usage: UsageAggregator::new(backend),
        }
    }

    #[must_use]
    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    #[must_use]
    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    #[must_use]
    pub fn recorder(&self) -> &RelationshipRecorder {
        &self.recorder
    }

    #[must_use]
    pub fn graph(&self) -> &GraphBuilder {
        &self.graph
    }

    #[must_use]
    pub fn usage(&self) -> &UsageAggregator {
        &self.usage
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let relationships = self.recorder.count().ok();
        EngineStatus {
            storage: self.storage,
            facts: self.facts.stats(),
            backend_available: relationships.is_some(),
            relationships,
            limits: self.graph.limits(),
        }
    }

    // =========================================================================
    // FACTS
    // =========================================================================

    pub fn add_triple(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
        metadata: Metadata,
    ) -> Result<AddedTriple, FactgraphError> {
        self.facts.add_triple(subject, predicate, object, metadata)
    }

    pub fn query(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
    ) -> Result<Vec<Bindings>, FactgraphError> {
        self.facts.query(subject, predicate, object)
    }

    #[must_use]
    pub fn export_ntriples(&self) -> String {
        self.facts.export_ntriples()
    }

    /// Add every fact of an N-Triples snapshot. The snapshot is parsed in
    /// full first, so a malformed line adds nothing.
    pub fn import_ntriples(&self, input: &str) -> Result<ImportReport, FactgraphError> {
        let triples = parse_ntriples(input)?;
        let mut report = ImportReport::default();
        for triple in triples {
            let added = self.facts.add(triple);
            report.imported += 1;
            if !added.persistence.is_durable() {
                report.memory_only += 1;
            }
        }
        Ok(report)
    }

    pub fn flush_pending(&self) -> FlushReport {
        self.facts.flush_pending()
    }

    // =========================================================================
    // RELATIONSHIPS
    // =========================================================================

    pub fn record(&self, edge: NewRelationship) -> Result<RelationshipId, FactgraphError> {
        self.recorder.record(edge)
    }

    pub fn record_batch(&self, edges: Vec<NewRelationship>) -> Result<BatchReport, FactgraphError> {
        self.recorder.record_batch(edges)
    }

    pub fn register_component(&self, component: &ComponentRef) -> Result<(), FactgraphError> {
        self.recorder.register_component(component)
    }

    pub fn find_usages(
        &self,
        target: &ComponentRef,
        query: &UsageQuery,
    ) -> Retrieval<Vec<EdgeSummary>> {
        self.graph.find_usages(target, query)
    }

    pub fn find_dependencies(
        &self,
        source: &ComponentRef,
        query: &DependencyQuery,
    ) -> Retrieval<Vec<EdgeSummary>> {
        self.graph.find_dependencies(source, query)
    }

    pub fn build_graph(
        &self,
        root: &ComponentRef,
        options: &GraphOptions,
    ) -> Retrieval<GraphOutput> {
        self.graph.build_graph(root, options)
    }

    pub fn find_orphans(&self, component_type: &str) -> Retrieval<Vec<ComponentRef>> {
        self.graph.find_orphans(component_type)
    }

    pub fn get_stats(&self, component: &ComponentRef) -> Retrieval<Option<UsageStats>> {
        self.usage.get_stats(component)
    }

    pub fn most_used(
        &self,
        component_type: Option<&str>,
        limit: Option<usize>,
    ) -> Retrieval<Vec<UsageStats>> {
        self.usage.most_used(component_type, limit)
    }

    pub fn recently_used(
        &self,
        component_type: Option<&str>,
        limit: Option<usize>,
    ) -> Retrieval<Vec<UsageStats>> {
        self.usage.recently_used(component_type, limit)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_status() {
        let engine = Engine::in_memory(GraphLimits::default());
        engine
            .add_triple("git:a", "links", "git:b", Metadata::new())
            .expect("add");
        engine
            .record(NewRelationship::new(("service", "a"), ("service", "b"), "calls"))
            .expect("record");

        let status = engine.status();
        assert_eq!(status.storage, StorageKind::InMemory);
        assert_eq!(status.facts.triples, 1);
        assert_eq!(status.relationships, Some(1));
        assert!(status.backend_available);
    }

    #[test]
    fn custom_backend_warm_loads() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let first = Engine::with_backend(backend.clone(), GraphLimits::default())
                .expect("engine");
            first
                .add_triple("git:a", "links", "git:b", Metadata::new())
                .expect("add");
        }
        let second = Engine::with_backend(backend, GraphLimits::default()).expect("engine");
        assert_eq!(second.storage(), StorageKind::Custom);
        assert_eq!(second.facts().len(), 1);
    }

    #[test]
    fn import_is_all_or_nothing_on_parse() {
        let engine = Engine::in_memory(GraphLimits::default());
        assert!(
            engine
                .import_ntriples("<a:b> <p> <c:d> .\nnot a triple\n")
                .is_err()
        );
        assert!(engine.facts().is_empty());

        let report = engine
            .import_ntriples("<a:b> <p> <c:d> .\n<a:b> <q> <c:d> .\n")
            .expect("import");
        assert_eq!(report.imported, 2);
        assert_eq!(engine.facts().len(), 2);
    }
}
