//! # Core Type Definitions
//!
//! This module contains all core types for the factgraph engine:
//! - Symbolic references and predicates (`Ref`, `Predicate`)
//! - Facts (`TripleKey`, `Triple`, `AddedTriple`)
//! - Component relationships (`ComponentRef`, `Relationship`, `RelationshipRecord`)
//! - Aggregates (`EdgeSummary`, `UsageStats`)
//! - Outcome signals (`Persistence`, `Retrieval`)
//! - Error types (`FactgraphError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (rates are basis points)
//! - Implement `Ord` where they are used as `BTreeMap`/`BTreeSet` keys
//! - Use saturating arithmetic for counters to prevent overflow

use crate::primitives::{
    BPS_SCALE, MAX_COMPONENT_LENGTH, MAX_PREDICATE_LENGTH, MAX_REF_LENGTH, NAMESPACE_SEPARATOR,
    VARIABLE_MARKER,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Free-form metadata attached to triples and relationships.
pub type Metadata = BTreeMap<String, String>;

/// Characters that would end a `<term>` or a line in an N-Triples snapshot.
fn breaks_snapshot(s: &str) -> bool {
    s.chars().any(|c| c == '<' || c == '>' || c.is_control())
}

// =============================================================================
// SYMBOLIC REFERENCES
// =============================================================================

/// A structured identifier `namespace:id` naming an entity owned by an
/// external collaborator (e.g. `git:commit`, `gaming:npc`).
///
/// Validated once at construction; a `Ref` in hand is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ref {
    namespace: String,
    id: String,
}

impl Ref {
    /// Build a reference from its two parts.
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Result<Self, FactgraphError> {
        let namespace = namespace.into();
        let id = id.into();
        let raw_len = namespace.len().saturating_add(id.len()).saturating_add(1);

        if namespace.is_empty()
            || namespace.starts_with(VARIABLE_MARKER)
            || namespace.chars().any(char::is_whitespace)
            || breaks_snapshot(&namespace)
            || id.is_empty()
            || breaks_snapshot(&id)
            || raw_len > MAX_REF_LENGTH
        {
            return Err(FactgraphError::InvalidRef(format!(
                "{}{}{}",
                namespace, NAMESPACE_SEPARATOR, id
            )));
        }

        Ok(Self { namespace, id })
    }

    /// Parse `"namespace:id"`. The split happens at the first separator,
    /// so ids may themselves contain `:`.
    pub fn parse(raw: &str) -> Result<Self, FactgraphError> {
        let (namespace, id) = raw
            .split_once(NAMESPACE_SEPARATOR)
            .ok_or_else(|| FactgraphError::InvalidRef(raw.to_string()))?;
        Self::new(namespace, id).map_err(|_| FactgraphError::InvalidRef(raw.to_string()))
    }

    /// The owning collaborator's namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The identifier within the namespace.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.namespace, NAMESPACE_SEPARATOR, self.id)
    }
}

impl FromStr for Ref {
    type Err = FactgraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Ref {
    type Error = FactgraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ref> for String {
    fn from(r: Ref) -> Self {
        r.to_string()
    }
}

/// The relationship name of a triple (e.g. `analyzedBy`, `hasDialogue`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Predicate(String);

impl Predicate {
    /// Create a validated predicate.
    pub fn new(s: impl Into<String>) -> Result<Self, FactgraphError> {
        let s = s.into();
        if s.is_empty()
            || s.len() > MAX_PREDICATE_LENGTH
            || s.starts_with(VARIABLE_MARKER)
            || s.chars().any(char::is_whitespace)
            || breaks_snapshot(&s)
        {
            return Err(FactgraphError::InvalidPredicate(s));
        }
        Ok(Self(s))
    }

    /// Get the predicate as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Predicate {
    type Error = FactgraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Predicate> for String {
    fn from(p: Predicate) -> Self {
        p.0
    }
}

// =============================================================================
// TRIPLES
// =============================================================================

/// The natural key of a fact. The store is a set over this key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripleKey {
    pub subject: Ref,
    pub predicate: Predicate,
    pub object: Ref,
}

impl TripleKey {
    #[must_use]
    pub fn new(subject: Ref, predicate: Predicate, object: Ref) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl fmt::Display for TripleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

/// An atomic (subject, predicate, object) fact with metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Ref,
    pub predicate: Predicate,
    pub object: Ref,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Triple {
    /// Create a triple with empty metadata.
    #[must_use]
    pub fn new(subject: Ref, predicate: Predicate, object: Ref) -> Self {
        Self {
            subject,
            predicate,
            object,
            metadata: Metadata::new(),
        }
    }

    /// Parse and validate all three terms.
    pub fn parse(subject: &str, predicate: &str, object: &str) -> Result<Self, FactgraphError> {
        Ok(Self::new(
            Ref::parse(subject)?,
            Predicate::new(predicate)?,
            Ref::parse(object)?,
        ))
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The natural key of this fact.
    #[must_use]
    pub fn key(&self) -> TripleKey {
        TripleKey::new(
            self.subject.clone(),
            self.predicate.clone(),
            self.object.clone(),
        )
    }
}

/// Whether a write reached the durable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Persistence {
    /// Written to memory and to the backend.
    Durable,
    /// Written to memory only; the backend write failed.
    MemoryOnly { reason: String },
}

impl Persistence {
    #[must_use]
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable)
    }
}

/// Result of a successful `add_triple`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedTriple {
    pub subject: Ref,
    pub predicate: Predicate,
    pub object: Ref,
    pub persistence: Persistence,
}

// =============================================================================
// COMPONENTS & RELATIONSHIPS
// =============================================================================

/// A named component in the usage graph, e.g. `(service, payments)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "ComponentRefRepr")]
pub struct ComponentRef {
    component_type: String,
    component_id: String,
}

#[derive(Deserialize)]
struct ComponentRefRepr {
    component_type: String,
    component_id: String,
}

impl TryFrom<ComponentRefRepr> for ComponentRef {
    type Error = FactgraphError;

    fn try_from(repr: ComponentRefRepr) -> Result<Self, Self::Error> {
        Self::new(repr.component_type, repr.component_id)
    }
}

impl ComponentRef {
    /// Create a validated component reference.
    pub fn new(
        component_type: impl Into<String>,
        component_id: impl Into<String>,
    ) -> Result<Self, FactgraphError> {
        let component_type = component_type.into();
        let component_id = component_id.into();

        if component_type.is_empty()
            || component_type.len() > MAX_COMPONENT_LENGTH
            || component_type.contains(NAMESPACE_SEPARATOR)
            || component_type.chars().any(char::is_whitespace)
        {
            return Err(FactgraphError::InvalidComponent(format!(
                "component type '{}'",
                component_type
            )));
        }
        if component_id.is_empty() || component_id.len() > MAX_COMPONENT_LENGTH {
            return Err(FactgraphError::InvalidComponent(format!(
                "component id '{}'",
                component_id
            )));
        }

        Ok(Self {
            component_type,
            component_id,
        })
    }

    #[must_use]
    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    #[must_use]
    pub fn component_id(&self) -> &str {
        &self.component_id
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component_type, self.component_id)
    }
}

/// Identifier assigned by the backend to an appended relationship.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RelationshipId(pub u64);

/// Causal context of a recorded relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EdgeContext {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// A validated, directed, typed edge between two components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: ComponentRef,
    pub target: ComponentRef,
    pub relationship_type: String,
    pub context: EdgeContext,
    pub metadata: Metadata,
    pub execution_time_ms: Option<u64>,
    pub success: bool,
    pub error_message: Option<String>,
    /// Unix milliseconds.
    pub timestamp: u64,
}

/// A relationship as stored in the append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: RelationshipId,
    pub relationship: Relationship,
}

// =============================================================================
// AGGREGATES
// =============================================================================

/// Integer success rate in basis points (10000 = 100%).
#[must_use]
pub fn rate_bps(successes: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = successes.min(total).saturating_mul(BPS_SCALE) / total;
    scaled as u32
}

/// One aggregated edge: all log entries sharing `(source, target, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSummary {
    pub source: ComponentRef,
    pub target: ComponentRef,
    pub relationship_type: String,
    pub usage_count: u64,
    pub success_count: u64,
    /// Unix milliseconds of the latest occurrence.
    pub last_seen_at: u64,
}

impl EdgeSummary {
    /// Start an aggregate from its first occurrence.
    #[must_use]
    pub fn first(rel: &Relationship) -> Self {
        let mut summary = Self {
            source: rel.source.clone(),
            target: rel.target.clone(),
            relationship_type: rel.relationship_type.clone(),
            usage_count: 0,
            success_count: 0,
            last_seen_at: 0,
        };
        summary.observe(rel);
        summary
    }

    /// Fold one more occurrence into the aggregate.
    pub fn observe(&mut self, rel: &Relationship) {
        self.usage_count = self.usage_count.saturating_add(1);
        if rel.success {
            self.success_count = self.success_count.saturating_add(1);
        }
        self.last_seen_at = self.last_seen_at.max(rel.timestamp);
    }

    #[must_use]
    pub fn success_rate_bps(&self) -> u32 {
        rate_bps(self.success_count, self.usage_count)
    }
}

/// Per-component usage counters.
///
/// `total_uses` counts inbound edges (the component was used);
/// `outbound_uses` counts edges where the component was the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub component: ComponentRef,
    pub total_uses: u64,
    pub success_count: u64,
    pub outbound_uses: u64,
    pub total_execution_ms: u64,
    pub timed_uses: u64,
    /// Unix milliseconds of the latest edge touching this component.
    pub last_used_at: Option<u64>,
}

impl UsageStats {
    /// A zeroed row for a component.
    #[must_use]
    pub fn new(component: ComponentRef) -> Self {
        Self {
            component,
            total_uses: 0,
            success_count: 0,
            outbound_uses: 0,
            total_execution_ms: 0,
            timed_uses: 0,
            last_used_at: None,
        }
    }

    /// Fold an edge in which this component is the target.
    pub fn record_inbound(&mut self, rel: &Relationship) {
        self.total_uses = self.total_uses.saturating_add(1);
        if rel.success {
            self.success_count = self.success_count.saturating_add(1);
        }
        if let Some(ms) = rel.execution_time_ms {
            self.total_execution_ms = self.total_execution_ms.saturating_add(ms);
            self.timed_uses = self.timed_uses.saturating_add(1);
        }
        self.touch(rel.timestamp);
    }

    /// Fold an edge in which this component is the source.
    pub fn record_outbound(&mut self, rel: &Relationship) {
        self.outbound_uses = self.outbound_uses.saturating_add(1);
        self.touch(rel.timestamp);
    }

    fn touch(&mut self, timestamp: u64) {
        self.last_used_at = Some(self.last_used_at.map_or(timestamp, |t| t.max(timestamp)));
    }

    #[must_use]
    pub fn success_rate_bps(&self) -> u32 {
        rate_bps(self.success_count, self.total_uses)
    }

    /// Mean execution time over timed inbound uses.
    #[must_use]
    pub fn avg_execution_ms(&self) -> Option<u64> {
        self.total_execution_ms.checked_div(self.timed_uses)
    }

    /// No recorded edge in either direction.
    #[must_use]
    pub fn is_orphan(&self) -> bool {
        self.total_uses == 0 && self.outbound_uses == 0
    }
}

// =============================================================================
// RETRIEVAL SIGNAL
// =============================================================================

/// A read result that distinguishes "confirmed" from "backend unavailable".
///
/// `Degraded` carries whatever could be produced without the backend (often
/// empty, sometimes partial) together with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval<T> {
    Confirmed(T),
    Degraded { value: T, reason: String },
}

impl<T> Retrieval<T> {
    #[must_use]
    pub fn value(&self) -> &T {
        match self {
            Self::Confirmed(v) | Self::Degraded { value: v, .. } => v,
        }
    }

    #[must_use]
    pub fn into_value(self) -> T {
        match self {
            Self::Confirmed(v) | Self::Degraded { value: v, .. } => v,
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Confirmed(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Retrieval<U> {
        match self {
            Self::Confirmed(v) => Retrieval::Confirmed(f(v)),
            Self::Degraded { value, reason } => Retrieval::Degraded {
                value: f(value),
                reason,
            },
        }
    }

    /// Strict view: a degraded result becomes `BackendUnavailable`.
    pub fn confirmed(self) -> Result<T, FactgraphError> {
        match self {
            Self::Confirmed(v) => Ok(v),
            Self::Degraded { reason, .. } => Err(FactgraphError::BackendUnavailable(reason)),
        }
    }
}

impl<T: Default> Retrieval<T> {
    /// Turn a backend result into a retrieval, substituting the default value
    /// (and logging) when the backend failed.
    pub fn from_backend(result: Result<T, FactgraphError>, context: &str) -> Self {
        match result {
            Ok(v) => Self::Confirmed(v),
            Err(e) => {
                tracing::warn!(operation = context, error = %e, "backend read degraded");
                Self::Degraded {
                    value: T::default(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in factgraph.
///
/// - Validation errors are raised before any mutation
/// - Backend errors are surfaced, not substituted with empty results
/// - The core never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum FactgraphError {
    /// A reference lacks a namespace or is otherwise malformed.
    #[error("Invalid reference '{0}': expected 'namespace:id'")]
    InvalidRef(String),

    /// A predicate is empty, too long, or contains whitespace.
    #[error("Invalid predicate '{0}'")]
    InvalidPredicate(String),

    /// A pattern term could not be interpreted.
    #[error("Invalid pattern term '{0}'")]
    InvalidPattern(String),

    /// A component reference is malformed.
    #[error("Invalid component: {0}")]
    InvalidComponent(String),

    /// A relationship failed validation.
    #[error("Invalid relationship: {0}")]
    InvalidRelationship(String),

    /// The backing store could not be reached or failed.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl FactgraphError {
    /// True for errors raised by input validation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRef(_)
                | Self::InvalidPredicate(_)
                | Self::InvalidPattern(_)
                | Self::InvalidComponent(_)
                | Self::InvalidRelationship(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
