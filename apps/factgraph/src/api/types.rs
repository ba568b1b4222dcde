//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Every response that reads from the backend carries `degraded` and
//! `warning`, so "confirmed empty" and "backend down" never look alike.

use factgraph_core::{
    BatchItem, BatchReport, Bindings, ComponentRef, DependencyQuery, Direction, EdgeSummary,
    EngineStatus, FactgraphError, FlushReport, GraphFormat, GraphOptions, GraphOutput, Metadata,
    NewRelationship, Persistence, Predicate, Ref, RelationshipId, Retrieval, StorageKind, Triple,
    UsageQuery, UsageStats,
};
use serde::{Deserialize, Serialize};

/// `(degraded, warning)` for a retrieval.
fn signal<T>(retrieval: &Retrieval<T>) -> (bool, Option<String>) {
    (
        retrieval.is_degraded(),
        retrieval.reason().map(str::to_string),
    )
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Engine status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub storage: StorageKind,
    pub triples: usize,
    pub subjects: usize,
    pub objects: usize,
    pub pending: usize,
    pub relationships: Option<usize>,
    pub backend_available: bool,
    pub max_depth: usize,
    pub max_edges_explored: usize,
}

impl From<EngineStatus> for StatusResponse {
    fn from(status: EngineStatus) -> Self {
        Self {
            storage: status.storage,
            triples: status.facts.triples,
            subjects: status.facts.subjects,
            objects: status.facts.objects,
            pending: status.facts.pending,
            relationships: status.relationships,
            backend_available: status.backend_available,
            max_depth: status.limits.max_depth,
            max_edges_explored: status.limits.max_edges_explored,
        }
    }
}

// =============================================================================
// TRIPLES
// =============================================================================

/// Add-triple request. Terms are validated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTripleRequest {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Add-triple response.
///
/// `durable: false` with `success: true` means the fact is queryable but
/// did not reach the backend; `POST /triples/flush` retries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTripleResponse {
    pub success: bool,
    pub durable: bool,
    pub warning: Option<String>,
    pub error: Option<String>,
}

impl AddTripleResponse {
    pub fn success(persistence: &Persistence) -> Self {
        let warning = match persistence {
            Persistence::Durable => None,
            Persistence::MemoryOnly { reason } => Some(reason.clone()),
        };
        Self {
            success: true,
            durable: warning.is_none(),
            warning,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            durable: false,
            warning: None,
            error: Some(msg.into()),
        }
    }
}

/// Index lookup request (tagged union).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LookupRequest {
    BySubject {
        subject: String,
        #[serde(default)]
        predicate: Option<String>,
    },
    ByObject {
        object: String,
        #[serde(default)]
        predicate: Option<String>,
    },
    ByPredicate {
        predicate: String,
    },
}

/// Parsed form of a `LookupRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Subject(Ref, Option<Predicate>),
    Object(Ref, Option<Predicate>),
    Predicate(Predicate),
}

impl LookupRequest {
    /// Validate the request terms.
    pub fn to_lookup(&self) -> Result<Lookup, FactgraphError> {
        let predicate = |p: &Option<String>| p.as_deref().map(Predicate::new).transpose();
        match self {
            Self::BySubject { subject, predicate: p } => {
                Ok(Lookup::Subject(Ref::parse(subject)?, predicate(p)?))
            }
            Self::ByObject { object, predicate: p } => {
                Ok(Lookup::Object(Ref::parse(object)?, predicate(p)?))
            }
            Self::ByPredicate { predicate } => Ok(Lookup::Predicate(Predicate::new(predicate)?)),
        }
    }
}

/// Triple JSON representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleJson {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<&Triple> for TripleJson {
    fn from(t: &Triple) -> Self {
        Self {
            subject: t.subject.to_string(),
            predicate: t.predicate.to_string(),
            object: t.object.to_string(),
            metadata: t.metadata.clone(),
        }
    }
}

/// Lookup response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriplesResponse {
    pub success: bool,
    pub triples: Vec<TripleJson>,
    pub error: Option<String>,
}

impl TriplesResponse {
    pub fn with_triples(triples: &[Triple]) -> Self {
        Self {
            success: true,
            triples: triples.iter().map(TripleJson::from).collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            triples: vec![],
            error: Some(msg.into()),
        }
    }
}

/// Pattern query request. Terms starting with `?` are variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

/// Pattern query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub count: usize,
    pub bindings: Vec<Bindings>,
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn with_bindings(bindings: Vec<Bindings>) -> Self {
        Self {
            success: true,
            count: bindings.len(),
            bindings,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            bindings: vec![],
            error: Some(msg.into()),
        }
    }
}

/// Flush response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushResponse {
    pub success: bool,
    pub attempted: usize,
    pub flushed: usize,
    pub remaining: usize,
    pub error: Option<String>,
}

impl From<FlushReport> for FlushResponse {
    fn from(report: FlushReport) -> Self {
        Self {
            success: report.remaining == 0,
            attempted: report.attempted,
            flushed: report.flushed,
            remaining: report.remaining,
            error: report.last_error,
        }
    }
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

/// Single-relationship response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordResponse {
    pub success: bool,
    pub id: Option<u64>,
    pub error: Option<String>,
}

impl RecordResponse {
    pub fn success(id: RelationshipId) -> Self {
        Self {
            success: true,
            id: Some(id.0),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(msg.into()),
        }
    }
}

/// Batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub relationships: Vec<NewRelationship>,
}

/// Batch response with one entry per submitted item, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    pub recorded_count: usize,
    pub failed_count: usize,
    pub results: Vec<BatchItem>,
    pub error: Option<String>,
}

impl From<BatchReport> for BatchResponse {
    fn from(report: BatchReport) -> Self {
        Self {
            success: report.failed_count == 0,
            recorded_count: report.recorded_count,
            failed_count: report.failed_count,
            results: report.results,
            error: None,
        }
    }
}

impl BatchResponse {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            recorded_count: 0,
            failed_count: 0,
            results: vec![],
            error: Some(msg.into()),
        }
    }
}

/// Component registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRequest {
    pub component_type: String,
    pub component_id: String,
}

impl ComponentRequest {
    pub fn to_component(&self) -> Result<ComponentRef, FactgraphError> {
        ComponentRef::new(&self.component_type, &self.component_id)
    }
}

/// Bare success/error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl AckResponse {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// XREF: USAGES / DEPENDENCIES
// =============================================================================

/// Usages request (components that point at the target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagesRequest {
    pub component_type: String,
    pub component_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub success_only: bool,
}

impl UsagesRequest {
    pub fn to_query(&self) -> Result<(ComponentRef, UsageQuery), FactgraphError> {
        let target = ComponentRef::new(&self.component_type, &self.component_id)?;
        Ok((
            target,
            UsageQuery {
                limit: self.limit,
                relationship_type: self.relationship_type.clone(),
                success_only: self.success_only,
            },
        ))
    }
}

/// Dependencies request (components the source points at).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependenciesRequest {
    pub component_type: String,
    pub component_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub relationship_type: Option<String>,
}

impl DependenciesRequest {
    pub fn to_query(
        &self,
    ) -> Result<(ComponentRef, DependencyQuery), FactgraphError> {
        let source = ComponentRef::new(&self.component_type, &self.component_id)?;
        Ok((
            source,
            DependencyQuery {
                limit: self.limit,
                relationship_type: self.relationship_type.clone(),
            },
        ))
    }
}

/// Aggregated edge JSON representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeJson {
    pub source: String,
    pub target: String,
    pub relationship_type: String,
    pub usage_count: u64,
    pub success_count: u64,
    pub success_rate_bps: u32,
    pub last_seen_at: u64,
}

impl From<&EdgeSummary> for EdgeJson {
    fn from(e: &EdgeSummary) -> Self {
        Self {
            source: e.source.to_string(),
            target: e.target.to_string(),
            relationship_type: e.relationship_type.clone(),
            usage_count: e.usage_count,
            success_count: e.success_count,
            success_rate_bps: e.success_rate_bps(),
            last_seen_at: e.last_seen_at,
        }
    }
}

/// Usages / dependencies response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgesResponse {
    pub success: bool,
    pub degraded: bool,
    pub warning: Option<String>,
    pub edges: Vec<EdgeJson>,
    pub error: Option<String>,
}

impl EdgesResponse {
    pub fn from_retrieval(retrieval: &Retrieval<Vec<EdgeSummary>>) -> Self {
        let (degraded, warning) = signal(retrieval);
        Self {
            success: true,
            degraded,
            warning,
            edges: retrieval.value().iter().map(EdgeJson::from).collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            degraded: false,
            warning: None,
            edges: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// XREF: GRAPH
// =============================================================================

/// Graph request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRequest {
    pub component_type: String,
    pub component_id: String,
    #[serde(default)]
    pub depth: Option<usize>,
    #[serde(default)]
    pub format: GraphFormat,
    #[serde(default)]
    pub direction: Direction,
}

impl GraphRequest {
    pub fn to_options(
        &self,
    ) -> Result<(ComponentRef, GraphOptions), FactgraphError> {
        let root = ComponentRef::new(&self.component_type, &self.component_id)?;
        Ok((
            root,
            GraphOptions {
                depth: self.depth,
                format: self.format,
                direction: self.direction,
            },
        ))
    }
}

/// Graph response. `graph` is tagged by `format`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphResponse {
    pub success: bool,
    pub degraded: bool,
    pub warning: Option<String>,
    pub graph: Option<GraphOutput>,
    pub error: Option<String>,
}

impl GraphResponse {
    pub fn from_retrieval(retrieval: Retrieval<GraphOutput>) -> Self {
        let (degraded, warning) = signal(&retrieval);
        Self {
            success: true,
            degraded,
            warning,
            graph: Some(retrieval.into_value()),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            degraded: false,
            warning: None,
            graph: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// XREF: COMPONENTS AND STATS
// =============================================================================

/// `?component_type=` query string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphansParams {
    pub component_type: String,
}

/// `?component_type=&limit=` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingParams {
    #[serde(default)]
    pub component_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Orphans response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentsResponse {
    pub success: bool,
    pub degraded: bool,
    pub warning: Option<String>,
    pub components: Vec<ComponentRef>,
    pub error: Option<String>,
}

impl ComponentsResponse {
    pub fn from_retrieval(retrieval: Retrieval<Vec<ComponentRef>>) -> Self {
        let (degraded, warning) = signal(&retrieval);
        Self {
            success: true,
            degraded,
            warning,
            components: retrieval.into_value(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            degraded: false,
            warning: None,
            components: vec![],
            error: Some(msg.into()),
        }
    }
}

/// Usage counters JSON representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsJson {
    pub component_type: String,
    pub component_id: String,
    pub total_uses: u64,
    pub success_count: u64,
    pub success_rate_bps: u32,
    pub outbound_uses: u64,
    pub avg_execution_ms: Option<u64>,
    pub last_used_at: Option<u64>,
}

impl From<&UsageStats> for StatsJson {
    fn from(s: &UsageStats) -> Self {
        Self {
            component_type: s.component.component_type().to_string(),
            component_id: s.component.component_id().to_string(),
            total_uses: s.total_uses,
            success_count: s.success_count,
            success_rate_bps: s.success_rate_bps(),
            outbound_uses: s.outbound_uses,
            avg_execution_ms: s.avg_execution_ms(),
            last_used_at: s.last_used_at,
        }
    }
}

/// Single-component stats response. `found: false` is a confirmed absence
/// unless `degraded` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub degraded: bool,
    pub warning: Option<String>,
    pub found: bool,
    pub stats: Option<StatsJson>,
    pub error: Option<String>,
}

impl StatsResponse {
    pub fn from_retrieval(retrieval: &Retrieval<Option<UsageStats>>) -> Self {
        let (degraded, warning) = signal(retrieval);
        let stats = retrieval.value().as_ref().map(StatsJson::from);
        Self {
            success: true,
            degraded,
            warning,
            found: stats.is_some(),
            stats,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            degraded: false,
            warning: None,
            found: false,
            stats: None,
            error: Some(msg.into()),
        }
    }
}

/// Most-used / recently-used response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingResponse {
    pub success: bool,
    pub degraded: bool,
    pub warning: Option<String>,
    pub components: Vec<StatsJson>,
}

impl RankingResponse {
    pub fn from_retrieval(retrieval: &Retrieval<Vec<UsageStats>>) -> Self {
        let (degraded, warning) = signal(retrieval);
        Self {
            success: true,
            degraded,
            warning,
            components: retrieval.value().iter().map(StatsJson::from).collect(),
        }
    }
}
