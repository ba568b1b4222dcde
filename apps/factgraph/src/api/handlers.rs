//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Status codes:
//! - 400: validation failure (nothing was written)
//! - 503: a write could not reach the backend
//! - 200: reads, including degraded ones (see `degraded` in the body)

use super::{
    AppState,
    types::{
        AckResponse, AddTripleRequest, AddTripleResponse, BatchRequest, BatchResponse,
        ComponentRequest, ComponentsResponse, DependenciesRequest, EdgesResponse, FlushResponse,
        GraphRequest, GraphResponse, HealthResponse, Lookup, LookupRequest, OrphansParams,
        QueryRequest, QueryResponse, RankingParams, RankingResponse, RecordResponse,
        StatsResponse, StatusResponse, TriplesResponse, UsagesRequest,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use factgraph_core::{ComponentRef, FactgraphError, NewRelationship};

/// Map an engine error to an HTTP status.
fn error_status(e: &FactgraphError) -> StatusCode {
    if e.is_validation() {
        StatusCode::BAD_REQUEST
    } else if matches!(e, FactgraphError::BackendUnavailable(_)) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Get engine status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse::from(state.engine.status())),
    )
}

// =============================================================================
// TRIPLE HANDLERS
// =============================================================================

/// Add (or upsert) a fact.
pub async fn add_triple_handler(
    State(state): State<AppState>,
    Json(request): Json<AddTripleRequest>,
) -> impl IntoResponse {
    match state.engine.add_triple(
        &request.subject,
        &request.predicate,
        &request.object,
        request.metadata,
    ) {
        Ok(added) => (
            StatusCode::OK,
            Json(AddTripleResponse::success(&added.persistence)),
        ),
        Err(e) => (
            error_status(&e),
            Json(AddTripleResponse::error(format!("Invalid triple: {}", e))),
        ),
    }
}

/// Direct index lookup.
pub async fn lookup_handler(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> impl IntoResponse {
    let lookup = match request.to_lookup() {
        Ok(l) => l,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(TriplesResponse::error(format!("Invalid lookup: {}", e))),
            );
        }
    };

    let facts = state.engine.facts();
    let triples = match &lookup {
        Lookup::Subject(subject, predicate) => facts.query_by_subject(subject, predicate.as_ref()),
        Lookup::Object(object, predicate) => facts.query_by_object(object, predicate.as_ref()),
        Lookup::Predicate(predicate) => facts.query_by_predicate(predicate),
    };

    (StatusCode::OK, Json(TriplesResponse::with_triples(&triples)))
}

/// Single-pattern variable query.
pub async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .query(&request.subject, &request.predicate, &request.object)
    {
        Ok(bindings) => (StatusCode::OK, Json(QueryResponse::with_bindings(bindings))),
        Err(e) => (
            error_status(&e),
            Json(QueryResponse::error(format!("Query failed: {}", e))),
        ),
    }
}

/// Export every fact as sorted N-Triples.
pub async fn export_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.engine.export_ntriples(),
    )
}

/// Retry backend writes for memory-only facts.
pub async fn flush_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = FlushResponse::from(state.engine.flush_pending());
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

// =============================================================================
// RELATIONSHIP HANDLERS
// =============================================================================

/// Record one relationship.
pub async fn record_handler(
    State(state): State<AppState>,
    Json(request): Json<NewRelationship>,
) -> impl IntoResponse {
    match state.engine.record(request) {
        Ok(id) => (StatusCode::OK, Json(RecordResponse::success(id))),
        Err(e) => (
            error_status(&e),
            Json(RecordResponse::error(format!("Record failed: {}", e))),
        ),
    }
}

/// Record a batch. Items fail independently; the response lists each outcome.
pub async fn record_batch_handler(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> impl IntoResponse {
    let engine = state.engine.clone();
    let result =
        tokio::task::spawn_blocking(move || engine.record_batch(request.relationships)).await;

    match result {
        Ok(Ok(report)) => (StatusCode::OK, Json(BatchResponse::from(report))),
        Ok(Err(e)) => (
            error_status(&e),
            Json(BatchResponse::error(format!("Batch rejected: {}", e))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(BatchResponse::error(format!("Batch task failed: {}", e))),
        ),
    }
}

/// Register a component so it can be reported as an orphan.
pub async fn register_component_handler(
    State(state): State<AppState>,
    Json(request): Json<ComponentRequest>,
) -> impl IntoResponse {
    let component = match request.to_component() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AckResponse::error(format!("Invalid component: {}", e))),
            );
        }
    };

    match state.engine.register_component(&component) {
        Ok(()) => (StatusCode::OK, Json(AckResponse::success())),
        Err(e) => (
            error_status(&e),
            Json(AckResponse::error(format!("Register failed: {}", e))),
        ),
    }
}

// =============================================================================
// XREF HANDLERS
// =============================================================================

/// Components that use the target.
pub async fn usages_handler(
    State(state): State<AppState>,
    Json(request): Json<UsagesRequest>,
) -> impl IntoResponse {
    match request.to_query() {
        Ok((target, query)) => (
            StatusCode::OK,
            Json(EdgesResponse::from_retrieval(
                &state.engine.find_usages(&target, &query),
            )),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(EdgesResponse::error(format!("Invalid request: {}", e))),
        ),
    }
}

/// Components the source depends on.
pub async fn dependencies_handler(
    State(state): State<AppState>,
    Json(request): Json<DependenciesRequest>,
) -> impl IntoResponse {
    match request.to_query() {
        Ok((source, query)) => (
            StatusCode::OK,
            Json(EdgesResponse::from_retrieval(
                &state.engine.find_dependencies(&source, &query),
            )),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(EdgesResponse::error(format!("Invalid request: {}", e))),
        ),
    }
}

/// Bounded graph around a root component.
pub async fn graph_handler(
    State(state): State<AppState>,
    Json(request): Json<GraphRequest>,
) -> impl IntoResponse {
    let (root, options) = match request.to_options() {
        Ok(parsed) => parsed,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(GraphResponse::error(format!("Invalid request: {}", e))),
            );
        }
    };

    let engine = state.engine.clone();
    match tokio::task::spawn_blocking(move || engine.build_graph(&root, &options)).await {
        Ok(retrieval) => (StatusCode::OK, Json(GraphResponse::from_retrieval(retrieval))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(GraphResponse::error(format!("Graph task failed: {}", e))),
        ),
    }
}

/// Registered components with no edges in either direction.
pub async fn orphans_handler(
    State(state): State<AppState>,
    Query(params): Query<OrphansParams>,
) -> impl IntoResponse {
    if params.component_type.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ComponentsResponse::error("component_type is required")),
        );
    }
    (
        StatusCode::OK,
        Json(ComponentsResponse::from_retrieval(
            state.engine.find_orphans(&params.component_type),
        )),
    )
}

/// Usage counters for one component.
pub async fn stats_handler(
    State(state): State<AppState>,
    Path((component_type, component_id)): Path<(String, String)>,
) -> impl IntoResponse {
    match ComponentRef::new(component_type, component_id) {
        Ok(component) => (
            StatusCode::OK,
            Json(StatsResponse::from_retrieval(
                &state.engine.get_stats(&component),
            )),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(StatsResponse::error(format!("Invalid component: {}", e))),
        ),
    }
}

/// Components ranked by inbound uses.
pub async fn most_used_handler(
    State(state): State<AppState>,
    Query(params): Query<RankingParams>,
) -> impl IntoResponse {
    let retrieval = state
        .engine
        .most_used(params.component_type.as_deref(), params.limit);
    (StatusCode::OK, Json(RankingResponse::from_retrieval(&retrieval)))
}

/// Components ranked by last use, newest first.
pub async fn recently_used_handler(
    State(state): State<AppState>,
    Query(params): Query<RankingParams>,
) -> impl IntoResponse {
    let retrieval = state
        .engine
        .recently_used(params.component_type.as_deref(), params.limit);
    (StatusCode::OK, Json(RankingResponse::from_retrieval(&retrieval)))
}
