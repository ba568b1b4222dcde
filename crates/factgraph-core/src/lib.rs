//! # factgraph-core
//!
//! The symbolic relationship graph engine - THE LOGIC.
//!
//! Two independent in-process services over one injected backend:
//! - A subject-predicate-object fact store with forward and inverse indices
//!   and single-pattern variable queries
//! - A directed usage/dependency graph between named components, with
//!   bounded traversal and per-component usage counters
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies
//! - No global state: every store is an explicit value
//! - Deterministic ordering and integer-only arithmetic
//! - Backend failure is always visible: `Persistence` on writes, `Retrieval`
//!   on reads, per-item outcomes on batches

// =============================================================================
// MODULES
// =============================================================================

pub mod engine;
pub mod export;
pub mod fact_store;
pub mod graph;
pub mod primitives;
pub mod query;
pub mod relationship;
pub mod seeds;
pub mod storage;
pub mod types;
pub mod usage;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AddedTriple, ComponentRef, EdgeContext, EdgeSummary, FactgraphError, Metadata, Persistence,
    Predicate, Ref, Relationship, RelationshipId, RelationshipRecord, Retrieval, Triple,
    TripleKey, UsageStats, rate_bps,
};

// =============================================================================
// RE-EXPORTS: Engine Components
// =============================================================================

pub use engine::{Engine, EngineStatus, ImportReport, StorageKind};
pub use export::{export_ntriples, parse_ntriples};
pub use fact_store::{FactStore, FactStoreStats, FlushReport};
pub use graph::{
    DependencyQuery, Direction, GraphBuilder, GraphFormat, GraphLimits, GraphLink, GraphNode,
    GraphOptions, GraphOutput, HierarchyNode, NodeLinkGraph, UsageQuery,
};
pub use query::{Bindings, Pattern, Strategy, Term};
pub use relationship::{BatchItem, BatchOutcome, BatchReport, NewRelationship, RelationshipRecorder};
pub use seeds::{SeedPack, SeedReport, SeedTriple};
pub use storage::{Backend, MemoryBackend, RedbBackend, RelationshipBackend, TripleBackend};
pub use usage::UsageAggregator;
