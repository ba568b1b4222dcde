//! # factgraph HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Engine status
//! - `POST /triples` - Add a fact
//! - `POST /triples/lookup` - Direct index lookup
//! - `POST /triples/flush` - Retry memory-only facts
//! - `POST /query` - Single-pattern variable query
//! - `GET /export` - N-Triples snapshot
//! - `POST /relationships` - Record one edge
//! - `POST /relationships/batch` - Record many edges
//! - `POST /xref/usages` - Who uses a component
//! - `POST /xref/dependencies` - What a component uses
//! - `POST /xref/graph` - Bounded graph around a component
//! - `POST /xref/components` - Register a component
//! - `GET /xref/orphans` - Registered components with no edges
//! - `GET /xref/stats/{type}/{id}` - Usage counters
//! - `GET /xref/most-used` - Ranked by uses
//! - `GET /xref/recently-used` - Ranked by last use
//!
//! ## CORS
//!
//! `server.cors_origins` (or `FACTGRAPH_CORS_ORIGINS`): comma-separated list
//! of allowed origins, or "*" for all. Unset means localhost only.

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `factgraph::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    add_triple_handler, dependencies_handler, export_handler, flush_handler, graph_handler,
    health_handler, lookup_handler, most_used_handler, orphans_handler, query_handler,
    recently_used_handler, record_batch_handler, record_handler, register_component_handler,
    stats_handler, status_handler, usages_handler,
};
#[allow(unused_imports)]
pub use types::{
    AckResponse, AddTripleRequest, AddTripleResponse, BatchRequest, BatchResponse,
    ComponentRequest, ComponentsResponse, DependenciesRequest, EdgeJson, EdgesResponse,
    FlushResponse, GraphRequest, GraphResponse, HealthResponse, Lookup, LookupRequest,
    OrphansParams, QueryRequest, QueryResponse, RankingParams, RankingResponse, RecordResponse,
    StatsJson, StatsResponse, StatusResponse, TripleJson, TriplesResponse, UsagesRequest,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use factgraph_core::{Engine, FactgraphError};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state. The engine synchronizes internally, so handlers
/// share it without an outer lock.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    /// Create new app state owning an engine.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from the configured origins.
///
/// - `Some("*")`: allows all origins
/// - `None`: localhost only
/// - Otherwise: the comma-separated list; invalid entries are skipped
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. Do not expose this server publicly.");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = [
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit.
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let cors = build_cors_layer(server.cors_origins.as_deref());

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/triples", post(handlers::add_triple_handler))
        .route("/triples/lookup", post(handlers::lookup_handler))
        .route("/triples/flush", post(handlers::flush_handler))
        .route("/query", post(handlers::query_handler))
        .route("/export", get(handlers::export_handler))
        .route("/relationships", post(handlers::record_handler))
        .route("/relationships/batch", post(handlers::record_batch_handler))
        .route("/xref/usages", post(handlers::usages_handler))
        .route("/xref/dependencies", post(handlers::dependencies_handler))
        .route("/xref/graph", post(handlers::graph_handler))
        .route("/xref/components", post(handlers::register_component_handler))
        .route("/xref/orphans", get(handlers::orphans_handler))
        .route("/xref/stats/{type}/{id}", get(handlers::stats_handler))
        .route("/xref/most-used", get(handlers::most_used_handler))
        .route("/xref/recently-used", get(handlers::recently_used_handler))
        .layer(axum::extract::DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(engine: Engine, server: &ServerConfig) -> Result<(), FactgraphError> {
    let addr = format!("{}:{}", server.host, server.port);
    let router = create_router(AppState::new(engine), server);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FactgraphError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("factgraph HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| FactgraphError::IoError(format!("Server error: {}", e)))
}
