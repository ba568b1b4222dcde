//! # Primitives
//!
//! Hardcoded runtime constants for the factgraph core.
//!
//! These are compiled into the binary and immutable at runtime. Tunable
//! limits (`GraphLimits`) default to values defined here and may only be
//! lowered below the hard caps, never raised above them.

/// Marks an unbound term in a pattern query: `?` or `?name`.
pub const VARIABLE_MARKER: char = '?';

/// Separates namespace from id in a `Ref`.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Scale for integer rates: 10000 basis points = 100%.
pub const BPS_SCALE: u64 = 10_000;

// =============================================================================
// TRAVERSAL BOUNDS
// =============================================================================

/// Hard cap on graph traversal depth.
///
/// - All queries must be computationally bounded.
/// - Requested depths above this are clamped.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

/// Default configured maximum depth for `build_graph`.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Depth used when a caller does not specify one.
pub const DEFAULT_GRAPH_DEPTH: usize = 2;

/// Hard cap on edges examined by a single traversal.
pub const MAX_EDGES_EXPLORED: usize = 1_000_000;

/// Default edge budget for a single traversal.
///
/// Densely connected or cyclic usage graphs stop here and the result is
/// flagged as truncated.
pub const DEFAULT_MAX_EDGES_EXPLORED: usize = 10_000;

// =============================================================================
// RESULT LIMITS
// =============================================================================

/// Default number of rows returned by usage/dependency/ranking reads.
pub const DEFAULT_RESULT_LIMIT: usize = 50;

/// Maximum number of rows any single read may request.
pub const MAX_RESULT_LIMIT: usize = 1000;

/// Maximum number of relationships in a single batch.
pub const MAX_BATCH_SIZE: usize = 1000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a serialized `namespace:id` reference.
pub const MAX_REF_LENGTH: usize = 512;

/// Maximum length of a predicate.
pub const MAX_PREDICATE_LENGTH: usize = 256;

/// Maximum length of a component type or component id.
pub const MAX_COMPONENT_LENGTH: usize = 256;

/// Maximum length of a relationship type.
pub const MAX_RELATIONSHIP_TYPE_LENGTH: usize = 128;

/// Maximum number of metadata entries on a triple or relationship.
pub const MAX_METADATA_ENTRIES: usize = 64;

/// Maximum length of a recorded error message.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 4096;

/// Clamp a caller-supplied limit into `1..=MAX_RESULT_LIMIT`.
#[must_use]
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_RESULT_LIMIT)
        .clamp(1, MAX_RESULT_LIMIT)
}

/// Current wall-clock time in unix milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
