//! Integration tests for the factgraph HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use factgraph::api::{
    AckResponse, AddTripleResponse, BatchResponse, ComponentsResponse, EdgesResponse,
    FlushResponse, GraphResponse, HealthResponse, QueryResponse, RankingResponse,
    RecordResponse, StatsResponse, StatusResponse, TriplesResponse, AppState, create_router,
};
use factgraph::config::ServerConfig;
use factgraph_core::{
    BatchOutcome, Engine, GraphLimits, GraphOutput, MemoryBackend, NewRelationship, StorageKind,
};
use serde_json::json;
use std::sync::Arc;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn server_for(engine: Engine) -> TestServer {
    let router = create_router(AppState::new(engine), &ServerConfig::default());
    TestServer::new(router).unwrap()
}

/// Create a test server with a fresh in-memory engine.
fn create_test_server() -> TestServer {
    server_for(Engine::in_memory(GraphLimits::default()))
}

/// Create a test server with facts and a small call graph:
/// web -> api (x2, one failure), web -> auth, api -> db, cron -> db.
fn create_populated_test_server() -> TestServer {
    let engine = Engine::in_memory(GraphLimits::default());

    engine
        .add_triple(
            "git:commit",
            "analyzedBy",
            "copilot:code_review",
            Default::default(),
        )
        .unwrap();
    engine
        .add_triple(
            "gaming:npc",
            "hasDialogue",
            "visual:dialogue_tree",
            Default::default(),
        )
        .unwrap();

    let edge = |from: &str, to: &str, ts: u64| {
        let mut e = NewRelationship::new(("service", from), ("service", to), "calls");
        e.timestamp = Some(ts);
        e
    };
    let mut failed = edge("web", "api", 1_500);
    failed.success = false;

    for e in [
        edge("web", "api", 1_000),
        failed,
        edge("web", "auth", 1_200),
        edge("api", "db", 2_000),
        edge("cron", "db", 500),
    ] {
        engine.record(e).unwrap();
    }

    server_for(engine)
}

/// A server whose backend can be switched off, plus the switch.
fn create_switchable_server() -> (TestServer, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let engine = Engine::with_backend(backend.clone(), GraphLimits::default()).unwrap();
    (server_for(engine), backend)
}

// =============================================================================
// HEALTH / STATUS ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_empty_engine() {
    let server = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.storage, StorageKind::InMemory);
    assert_eq!(status.triples, 0);
    assert_eq!(status.relationships, Some(0));
    assert!(status.backend_available);
}

#[tokio::test]
async fn test_status_populated_engine() {
    let server = create_populated_test_server();

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.triples, 2);
    assert_eq!(status.relationships, Some(5));
}

// =============================================================================
// TRIPLE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_add_triple() {
    let server = create_test_server();

    let response = server
        .post("/triples")
        .json(&json!({
            "subject": "git:commit",
            "predicate": "analyzedBy",
            "object": "copilot:code_review",
            "metadata": {"source": "ci"}
        }))
        .await;

    response.assert_status_ok();
    let result: AddTripleResponse = response.json();
    assert!(result.success);
    assert!(result.durable);
    assert!(result.warning.is_none());
}

#[tokio::test]
async fn test_add_triple_without_namespace_is_rejected() {
    let server = create_test_server();

    let response = server
        .post("/triples")
        .json(&json!({
            "subject": "commit",
            "predicate": "analyzedBy",
            "object": "copilot:code_review"
        }))
        .await;

    response.assert_status_bad_request();
    let result: AddTripleResponse = response.json();
    assert!(!result.success);
    assert!(result.error.is_some());

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.triples, 0);
}

#[tokio::test]
async fn test_lookup_by_each_index() {
    let server = create_populated_test_server();

    let by_subject: TriplesResponse = server
        .post("/triples/lookup")
        .json(&json!({"type": "by_subject", "subject": "git:commit"}))
        .await
        .json();
    assert_eq!(by_subject.triples.len(), 1);
    assert_eq!(by_subject.triples[0].object, "copilot:code_review");

    let by_object: TriplesResponse = server
        .post("/triples/lookup")
        .json(&json!({
            "type": "by_object",
            "object": "visual:dialogue_tree",
            "predicate": "hasDialogue"
        }))
        .await
        .json();
    assert_eq!(by_object.triples.len(), 1);
    assert_eq!(by_object.triples[0].subject, "gaming:npc");

    let by_predicate: TriplesResponse = server
        .post("/triples/lookup")
        .json(&json!({"type": "by_predicate", "predicate": "analyzedBy"}))
        .await
        .json();
    assert_eq!(by_predicate.triples.len(), 1);
}

#[tokio::test]
async fn test_lookup_invalid_ref() {
    let server = create_test_server();

    let response = server
        .post("/triples/lookup")
        .json(&json!({"type": "by_subject", "subject": "no-namespace"}))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_pattern_query_binds_variables() {
    let server = create_populated_test_server();

    let response = server
        .post("/query")
        .json(&json!({"subject": "?x", "predicate": "hasDialogue", "object": "?y"}))
        .await;

    response.assert_status_ok();
    let result: QueryResponse = response.json();
    assert_eq!(result.count, 1);
    assert_eq!(result.bindings[0].get("x"), Some("gaming:npc"));
    assert_eq!(result.bindings[0].get("y"), Some("visual:dialogue_tree"));
}

#[tokio::test]
async fn test_pattern_query_unknown_subject_is_empty() {
    let server = create_populated_test_server();

    let result: QueryResponse = server
        .post("/query")
        .json(&json!({"subject": "nonexistent:thing", "predicate": "hasDialogue", "object": "?y"}))
        .await
        .json();

    assert!(result.success);
    assert_eq!(result.count, 0);
}

#[tokio::test]
async fn test_pattern_query_bad_variable() {
    let server = create_test_server();

    let response = server
        .post("/query")
        .json(&json!({"subject": "?bad-name", "predicate": "p", "object": "?o"}))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_export_is_sorted_ntriples() {
    let server = create_populated_test_server();

    let response = server.get("/export").await;

    response.assert_status_ok();
    let body = response.text();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(
        lines,
        vec![
            "<gaming:npc> <hasDialogue> <visual:dialogue_tree> .",
            "<git:commit> <analyzedBy> <copilot:code_review> .",
        ]
    );
}

// =============================================================================
// RELATIONSHIP ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_record_relationship() {
    let server = create_test_server();

    let response = server
        .post("/relationships")
        .json(&json!({
            "source_type": "service",
            "source_id": "web",
            "target_type": "service",
            "target_id": "api",
            "relationship_type": "calls",
            "execution_time_ms": 12,
            "context": {"request_id": "r-1"}
        }))
        .await;

    response.assert_status_ok();
    let result: RecordResponse = response.json();
    assert!(result.success);
    assert!(result.id.is_some());
}

#[tokio::test]
async fn test_record_invalid_relationship() {
    let server = create_test_server();

    let response = server
        .post("/relationships")
        .json(&json!({
            "source_type": "service",
            "source_id": "",
            "target_type": "service",
            "target_id": "api",
            "relationship_type": "calls"
        }))
        .await;

    response.assert_status_bad_request();
    let result: RecordResponse = response.json();
    assert!(!result.success);
}

#[tokio::test]
async fn test_batch_partial_failure() {
    let server = create_test_server();
    let edge = |id: &str| {
        json!({
            "source_type": "service",
            "source_id": id,
            "target_type": "service",
            "target_id": "x",
            "relationship_type": "calls"
        })
    };

    let response = server
        .post("/relationships/batch")
        .json(&json!({"relationships": [edge("a"), edge(""), edge("c")]}))
        .await;

    response.assert_status_ok();
    let result: BatchResponse = response.json();
    assert!(!result.success);
    assert_eq!(result.recorded_count, 2);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.results.len(), 3);
    assert!(result.results[0].outcome.is_recorded());
    assert!(matches!(
        result.results[1].outcome,
        BatchOutcome::Rejected { .. }
    ));
    assert!(result.results[2].outcome.is_recorded());
}

// =============================================================================
// XREF ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_usages() {
    let server = create_populated_test_server();

    let result: EdgesResponse = server
        .post("/xref/usages")
        .json(&json!({"component_type": "service", "component_id": "db"}))
        .await
        .json();

    assert!(!result.degraded);
    let sources: Vec<&str> = result.edges.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(sources.len(), 2);
    assert!(sources.contains(&"service:api"));
    assert!(sources.contains(&"service:cron"));
}

#[tokio::test]
async fn test_usages_aggregate_repeated_edges() {
    let server = create_populated_test_server();

    let result: EdgesResponse = server
        .post("/xref/usages")
        .json(&json!({"component_type": "service", "component_id": "api"}))
        .await
        .json();

    assert_eq!(result.edges.len(), 1);
    assert_eq!(result.edges[0].usage_count, 2);
    assert_eq!(result.edges[0].success_rate_bps, 5000);
}

#[tokio::test]
async fn test_dependencies() {
    let server = create_populated_test_server();

    let result: EdgesResponse = server
        .post("/xref/dependencies")
        .json(&json!({"component_type": "service", "component_id": "web", "limit": 10}))
        .await
        .json();

    let targets: Vec<&str> = result.edges.iter().map(|e| e.target.as_str()).collect();
    assert_eq!(targets.len(), 2);
    assert!(targets.contains(&"service:api"));
    assert!(targets.contains(&"service:auth"));
}

#[tokio::test]
async fn test_usages_invalid_component() {
    let server = create_test_server();

    let response = server
        .post("/xref/usages")
        .json(&json!({"component_type": "", "component_id": "db"}))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_graph_nodes_links() {
    let server = create_populated_test_server();

    let response = server
        .post("/xref/graph")
        .json(&json!({
            "component_type": "service",
            "component_id": "web",
            "depth": 2
        }))
        .await;

    response.assert_status_ok();
    let result: GraphResponse = response.json();
    match result.graph {
        Some(GraphOutput::NodesLinks(graph)) => {
            assert_eq!(graph.root, "service:web");
            assert!(graph.nodes.iter().any(|n| n.id == "service:db" && n.depth == 2));
            assert!(graph.nodes.iter().all(|n| n.depth <= 2));
            assert!(!graph.truncated);
        }
        other => panic!("expected nodes-links graph, got {:?}", other),
    }
}

#[tokio::test]
async fn test_graph_hierarchical() {
    let server = create_populated_test_server();

    let result: GraphResponse = server
        .post("/xref/graph")
        .json(&json!({
            "component_type": "service",
            "component_id": "web",
            "format": "hierarchical"
        }))
        .await
        .json();

    match result.graph {
        Some(GraphOutput::Hierarchical { tree, .. }) => {
            assert_eq!(tree.id, "service:web");
            assert_eq!(tree.children.len(), 2);
        }
        other => panic!("expected hierarchical graph, got {:?}", other),
    }
}

#[tokio::test]
async fn test_graph_inbound_direction() {
    let server = create_populated_test_server();

    let result: GraphResponse = server
        .post("/xref/graph")
        .json(&json!({
            "component_type": "service",
            "component_id": "db",
            "depth": 1,
            "direction": "inbound"
        }))
        .await
        .json();

    match result.graph {
        Some(GraphOutput::NodesLinks(graph)) => {
            assert_eq!(graph.nodes.len(), 3);
            assert!(graph.links.iter().all(|l| l.target == "service:db"));
        }
        other => panic!("expected nodes-links graph, got {:?}", other),
    }
}

#[tokio::test]
async fn test_orphans_after_registration() {
    let server = create_populated_test_server();

    let response = server
        .post("/xref/components")
        .json(&json!({"component_type": "service", "component_id": "legacy"}))
        .await;
    response.assert_status_ok();
    let ack: AckResponse = response.json();
    assert!(ack.success);

    let result: ComponentsResponse = server
        .get("/xref/orphans?component_type=service")
        .await
        .json();
    assert_eq!(result.components.len(), 1);
    assert_eq!(result.components[0].component_id(), "legacy");
}

#[tokio::test]
async fn test_stats_found_and_missing() {
    let server = create_populated_test_server();

    let api: StatsResponse = server.get("/xref/stats/service/api").await.json();
    assert!(api.found);
    let stats = api.stats.unwrap();
    assert_eq!(stats.total_uses, 2);
    assert_eq!(stats.success_rate_bps, 5000);
    assert_eq!(stats.outbound_uses, 1);

    let ghost: StatsResponse = server.get("/xref/stats/service/ghost").await.json();
    assert!(ghost.success);
    assert!(!ghost.found);
    assert!(!ghost.degraded);
}

#[tokio::test]
async fn test_most_used() {
    let server = create_populated_test_server();

    let result: RankingResponse = server
        .get("/xref/most-used?component_type=service&limit=2")
        .await
        .json();

    let ids: Vec<&str> = result
        .components
        .iter()
        .map(|c| c.component_id.as_str())
        .collect();
    assert_eq!(ids, vec!["api", "db"]);
}

#[tokio::test]
async fn test_recently_used() {
    let server = create_populated_test_server();

    let result: RankingResponse = server.get("/xref/recently-used").await.json();

    let ids: Vec<&str> = result
        .components
        .iter()
        .map(|c| c.component_id.as_str())
        .collect();
    assert_eq!(ids[0..2], ["api", "db"]);
    assert_eq!(ids.last(), Some(&"cron"));
}

// =============================================================================
// DEGRADED BACKEND TESTS
// =============================================================================

#[tokio::test]
async fn test_backend_outage_is_visible() {
    let (server, backend) = create_switchable_server();
    backend.set_online(false);

    let added: AddTripleResponse = server
        .post("/triples")
        .json(&json!({"subject": "git:a", "predicate": "links", "object": "git:b"}))
        .await
        .json();
    assert!(added.success);
    assert!(!added.durable);
    assert!(added.warning.is_some());

    let usages: EdgesResponse = server
        .post("/xref/usages")
        .json(&json!({"component_type": "service", "component_id": "db"}))
        .await
        .json();
    assert!(usages.degraded);
    assert!(usages.warning.is_some());

    let response = server
        .post("/relationships")
        .json(&json!({
            "source_type": "service",
            "source_id": "web",
            "target_type": "service",
            "target_id": "api",
            "relationship_type": "calls"
        }))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let status: StatusResponse = server.get("/status").await.json();
    assert!(!status.backend_available);
    assert_eq!(status.pending, 1);
}

#[tokio::test]
async fn test_flush_after_recovery() {
    let (server, backend) = create_switchable_server();
    backend.set_online(false);

    server
        .post("/triples")
        .json(&json!({"subject": "git:a", "predicate": "links", "object": "git:b"}))
        .await
        .assert_status_ok();

    let failed = server.post("/triples/flush").await;
    failed.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    backend.set_online(true);
    let response = server.post("/triples/flush").await;
    response.assert_status_ok();
    let result: FlushResponse = response.json();
    assert_eq!(result.flushed, 1);
    assert_eq!(result.remaining, 0);
}
