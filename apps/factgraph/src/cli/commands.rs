//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::{BackendKind, FactgraphConfig};
use factgraph_core::primitives::{MAX_BATCH_SIZE, NAMESPACE_SEPARATOR};
use factgraph_core::{
    BatchOutcome, ComponentRef, DependencyQuery, EdgeSummary, Engine, FactgraphError, GraphOutput,
    GraphOptions, HierarchyNode, Metadata, NewRelationship, Persistence, Retrieval, SeedPack,
    UsageQuery, UsageStats,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for relationship records (100 MB).
const MAX_RECORD_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum file size for N-Triples import (500 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Maximum file size for a seed pack (10 MB).
const MAX_SEED_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), FactgraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| FactgraphError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(FactgraphError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, FactgraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        FactgraphError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(FactgraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path and require a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, FactgraphError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        FactgraphError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(FactgraphError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| FactgraphError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a validated, size-checked text file.
fn read_input(path: &Path, max_size: u64) -> Result<String, FactgraphError> {
    let validated_path = validate_file_path(path)?;
    validate_file_size(&validated_path, max_size)?;
    std::fs::read_to_string(&validated_path)
        .map_err(|e| FactgraphError::IoError(format!("Read file: {}", e)))
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the engine described by the configuration.
pub fn open_engine(config: &FactgraphConfig) -> Result<Engine, FactgraphError> {
    let limits = config.graph.limits();
    match config.storage.backend {
        BackendKind::Redb => Engine::open_redb(&config.storage.database, limits),
        BackendKind::Memory => {
            tracing::warn!("Memory backend: nothing written by this process will persist");
            Ok(Engine::in_memory(limits))
        }
    }
}

/// Parse `type:id` into a component reference.
pub fn parse_component(raw: &str) -> Result<ComponentRef, FactgraphError> {
    let (component_type, component_id) = raw.split_once(NAMESPACE_SEPARATOR).ok_or_else(|| {
        FactgraphError::InvalidComponent(format!("'{}': expected 'type:id'", raw))
    })?;
    ComponentRef::new(component_type, component_id)
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

/// Tell the user a read could not be confirmed.
fn report_degraded<T>(retrieval: &Retrieval<T>) {
    if let Some(reason) = retrieval.reason() {
        eprintln!("Warning: backend unavailable, results may be incomplete: {}", reason);
    }
}

fn print_edges(title: &str, edges: &[EdgeSummary]) {
    println!("{}", title);
    if edges.is_empty() {
        println!("  (none)");
    }
    for e in edges {
        println!(
            "  {} -[{}]-> {}  uses: {}  success: {}bps",
            e.source,
            e.relationship_type,
            e.target,
            e.usage_count,
            e.success_rate_bps()
        );
    }
}

fn print_stats_rows(title: &str, rows: &[UsageStats]) {
    println!("{}", title);
    if rows.is_empty() {
        println!("  (none)");
    }
    for s in rows {
        println!(
            "  {:<40} uses: {:<6} outbound: {:<6} success: {}bps",
            s.component.to_string(),
            s.total_uses,
            s.outbound_uses,
            s.success_rate_bps()
        );
    }
}

fn print_tree(node: &HierarchyNode, indent: usize) {
    let edge = match (&node.relationship_type, node.usage_count) {
        (Some(rel), Some(count)) => format!(" ({} x{})", rel, count),
        _ => String::new(),
    };
    println!("{:indent$}{}{}", "", node.id, edge, indent = indent * 2);
    for child in &node.children {
        print_tree(child, indent + 1);
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &FactgraphConfig) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;

    println!("factgraph server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", config.storage.backend);
    println!("  Database: {:?}", config.storage.database);
    println!(
        "  Limits:   depth {} / {} edges",
        config.graph.limits().max_depth,
        config.graph.limits().max_edges_explored
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(engine, &config.server).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show engine status.
pub fn cmd_status(config: &FactgraphConfig, json_mode: bool) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;
    let status = engine.status();

    if json_mode {
        print_json(&serde_json::json!({
            "database": config.storage.database.to_string_lossy(),
            "backend": config.storage.backend.to_string(),
            "triples": status.facts.triples,
            "subjects": status.facts.subjects,
            "objects": status.facts.objects,
            "pending": status.facts.pending,
            "relationships": status.relationships,
            "backend_available": status.backend_available,
            "max_depth": status.limits.max_depth,
            "max_edges_explored": status.limits.max_edges_explored
        }));
        return Ok(());
    }

    println!("factgraph Status");
    println!("================");
    println!("Database: {:?}", config.storage.database);
    println!("Backend:  {}", config.storage.backend);
    println!();
    println!("Triples:       {}", status.facts.triples);
    println!("Subjects:      {}", status.facts.subjects);
    println!("Objects:       {}", status.facts.objects);
    println!("Pending:       {}", status.facts.pending);
    match status.relationships {
        Some(n) => println!("Relationships: {}", n),
        None => println!("Relationships: unavailable"),
    }
    println!(
        "Limits:        depth {} / {} edges",
        status.limits.max_depth, status.limits.max_edges_explored
    );

    Ok(())
}

// =============================================================================
// INIT / SEED COMMANDS
// =============================================================================

/// Initialize a new database, optionally applying the bundled seed pack.
pub fn cmd_init(
    config: &FactgraphConfig,
    json_mode: bool,
    force: bool,
) -> Result<(), FactgraphError> {
    let db_path = &config.storage.database;

    if config.storage.backend == BackendKind::Redb && db_path.exists() {
        if !force {
            return Err(FactgraphError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| FactgraphError::IoError(format!("Remove database: {}", e)))?;
    }

    let engine = open_engine(config)?;
    let seeded = if config.seeds.apply_on_init {
        Some(SeedPack::bundled()?.apply(engine.facts()))
    } else {
        None
    };

    if json_mode {
        print_json(&serde_json::json!({
            "database": db_path.to_string_lossy(),
            "backend": config.storage.backend.to_string(),
            "seeded": seeded,
        }));
        return Ok(());
    }

    println!(
        "Initialized new {} database at {:?}",
        config.storage.backend, db_path
    );
    if let Some(report) = seeded {
        println!("Applied seed pack '{}': {} facts", report.id, report.applied);
    }

    Ok(())
}

/// Apply a seed pack to the fact store.
pub fn cmd_seed(
    config: &FactgraphConfig,
    json_mode: bool,
    file: Option<&Path>,
) -> Result<(), FactgraphError> {
    let pack = match file.or(config.seeds.path.as_deref()) {
        Some(path) => SeedPack::parse(&read_input(path, MAX_SEED_FILE_SIZE)?)?,
        None => SeedPack::bundled()?,
    };

    let engine = open_engine(config)?;
    let report = pack.apply(engine.facts());

    if json_mode {
        print_json(&serde_json::json!(report));
        return Ok(());
    }

    println!(
        "Seed pack '{}' v{}: {} applied, {} memory-only, {} rejected",
        pack.id,
        pack.version,
        report.applied,
        report.memory_only,
        report.rejected.len()
    );
    for rejected in &report.rejected {
        println!("  rejected: {}", rejected);
    }

    Ok(())
}

// =============================================================================
// FACT COMMANDS
// =============================================================================

/// Add a fact.
pub fn cmd_add(
    config: &FactgraphConfig,
    json_mode: bool,
    subject: &str,
    predicate: &str,
    object: &str,
    metadata: Metadata,
) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;
    let added = engine.add_triple(subject, predicate, object, metadata)?;

    if json_mode {
        print_json(&serde_json::json!(added));
        return Ok(());
    }

    println!("Added <{}> <{}> <{}>", added.subject, added.predicate, added.object);
    if let Persistence::MemoryOnly { reason } = &added.persistence {
        eprintln!("Warning: fact is not durable: {}", reason);
    }

    Ok(())
}

/// Run a single-pattern query.
pub fn cmd_query(
    config: &FactgraphConfig,
    json_mode: bool,
    subject: &str,
    predicate: &str,
    object: &str,
) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;
    let rows = engine.query(subject, predicate, object)?;

    if json_mode {
        print_json(&serde_json::json!({
            "count": rows.len(),
            "bindings": rows,
        }));
        return Ok(());
    }

    if rows.is_empty() {
        println!("No matches");
        return Ok(());
    }
    for row in &rows {
        if row.is_empty() {
            println!("match");
        } else {
            println!("{}", row);
        }
    }
    println!("{} row(s)", rows.len());

    Ok(())
}

/// Export facts as N-Triples to a file or stdout.
pub fn cmd_export(config: &FactgraphConfig, output: Option<&Path>) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;
    let data = engine.export_ntriples();

    match output {
        Some(path) => {
            let validated_output = validate_output_path(path)?;
            std::fs::write(&validated_output, &data)
                .map_err(|e| FactgraphError::IoError(format!("Write file: {}", e)))?;
            eprintln!(
                "Exported {} facts to {:?}",
                engine.facts().len(),
                validated_output
            );
        }
        None => print!("{}", data),
    }

    Ok(())
}

/// Import facts from an N-Triples file.
pub fn cmd_import(
    config: &FactgraphConfig,
    json_mode: bool,
    input: &Path,
) -> Result<(), FactgraphError> {
    let text = read_input(input, MAX_IMPORT_FILE_SIZE)?;
    let engine = open_engine(config)?;
    let report = engine.import_ntriples(&text)?;

    if json_mode {
        print_json(&serde_json::json!(report));
        return Ok(());
    }

    println!("Imported {} facts", report.imported);
    if report.memory_only > 0 {
        eprintln!(
            "Warning: {} facts did not reach the backend; run `factgraph flush`",
            report.memory_only
        );
    }
    println!("Store now holds {} facts", engine.facts().len());

    Ok(())
}

/// Retry backend writes for memory-only facts.
pub fn cmd_flush(config: &FactgraphConfig, json_mode: bool) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;
    let report = engine.flush_pending();

    if json_mode {
        print_json(&serde_json::json!(report));
        return Ok(());
    }

    println!(
        "Flushed {} of {} pending facts ({} remaining)",
        report.flushed, report.attempted, report.remaining
    );
    if let Some(e) = report.last_error {
        eprintln!("Last error: {}", e);
    }

    Ok(())
}

// =============================================================================
// RELATIONSHIP COMMANDS
// =============================================================================

/// Record relationships from a JSON file holding one object or an array.
pub fn cmd_record(
    config: &FactgraphConfig,
    json_mode: bool,
    file: &Path,
) -> Result<(), FactgraphError> {
    tracing::info!("Recording relationships from {:?}", file);

    let text = read_input(file, MAX_RECORD_FILE_SIZE)?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| FactgraphError::DeserializationError(format!("{}: {}", file.display(), e)))?;
    let edges: Vec<NewRelationship> = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value),
        single => serde_json::from_value::<NewRelationship>(single).map(|edge| vec![edge]),
    }
    .map_err(|e| FactgraphError::DeserializationError(format!("{}: {}", file.display(), e)))?;

    let engine = open_engine(config)?;
    let mut recorded = 0usize;
    let mut failures = Vec::new();

    for (chunk_index, chunk) in edges.chunks(MAX_BATCH_SIZE).enumerate() {
        let report = engine.record_batch(chunk.to_vec())?;
        recorded += report.recorded_count;
        for item in report.results {
            let index = chunk_index * MAX_BATCH_SIZE + item.index;
            match item.outcome {
                BatchOutcome::Recorded { .. } => {}
                BatchOutcome::Rejected { error } | BatchOutcome::BackendFailed { error } => {
                    failures.push((index, error));
                }
            }
        }
    }

    if json_mode {
        print_json(&serde_json::json!({
            "recorded_count": recorded,
            "failed_count": failures.len(),
            "failures": failures
                .iter()
                .map(|(index, error)| serde_json::json!({"index": index, "error": error}))
                .collect::<Vec<_>>(),
        }));
        return Ok(());
    }

    println!("Recorded {} of {} relationships", recorded, edges.len());
    for (index, error) in &failures {
        println!("  item {}: {}", index, error);
    }

    Ok(())
}

/// Register a component.
pub fn cmd_register(
    config: &FactgraphConfig,
    json_mode: bool,
    component: &str,
) -> Result<(), FactgraphError> {
    let component = parse_component(component)?;
    let engine = open_engine(config)?;
    engine.register_component(&component)?;

    if json_mode {
        print_json(&serde_json::json!({ "registered": component }));
    } else {
        println!("Registered {}", component);
    }
    Ok(())
}

// =============================================================================
// GRAPH COMMANDS
// =============================================================================

/// Show what uses a component.
pub fn cmd_usages(
    config: &FactgraphConfig,
    json_mode: bool,
    component: &str,
    query: &UsageQuery,
) -> Result<(), FactgraphError> {
    let target = parse_component(component)?;
    let engine = open_engine(config)?;
    let usages = engine.find_usages(&target, query);

    if json_mode {
        print_json(&serde_json::json!({
            "degraded": usages.is_degraded(),
            "warning": usages.reason(),
            "edges": usages.value(),
        }));
        return Ok(());
    }

    report_degraded(&usages);
    print_edges(&format!("Usages of {}:", target), usages.value());
    Ok(())
}

/// Show what a component uses.
pub fn cmd_deps(
    config: &FactgraphConfig,
    json_mode: bool,
    component: &str,
    query: &DependencyQuery,
) -> Result<(), FactgraphError> {
    let source = parse_component(component)?;
    let engine = open_engine(config)?;
    let deps = engine.find_dependencies(&source, query);

    if json_mode {
        print_json(&serde_json::json!({
            "degraded": deps.is_degraded(),
            "warning": deps.reason(),
            "edges": deps.value(),
        }));
        return Ok(());
    }

    report_degraded(&deps);
    print_edges(&format!("Dependencies of {}:", source), deps.value());
    Ok(())
}

/// Build and print the graph around a component.
pub fn cmd_graph(
    config: &FactgraphConfig,
    json_mode: bool,
    component: &str,
    options: &GraphOptions,
) -> Result<(), FactgraphError> {
    let root = parse_component(component)?;
    let engine = open_engine(config)?;
    let graph = engine.build_graph(&root, options);

    if json_mode {
        print_json(&serde_json::json!({
            "degraded": graph.is_degraded(),
            "warning": graph.reason(),
            "graph": graph.value(),
        }));
        return Ok(());
    }

    report_degraded(&graph);
    match graph.value() {
        GraphOutput::NodesLinks(g) => {
            println!("Graph from {} ({} nodes, {} links)", g.root, g.nodes.len(), g.links.len());
            for node in &g.nodes {
                println!("  [{}] {}", node.depth, node.id);
            }
            for link in &g.links {
                println!(
                    "  {} -[{}]-> {}  uses: {}",
                    link.source, link.relationship_type, link.target, link.usage_count
                );
            }
        }
        GraphOutput::Hierarchical { tree, .. } => print_tree(tree, 0),
    }
    if graph.value().is_truncated() {
        println!("(truncated: traversal budget reached)");
    }

    Ok(())
}

// =============================================================================
// USAGE COMMANDS
// =============================================================================

/// Show usage counters for one component.
pub fn cmd_stats(
    config: &FactgraphConfig,
    json_mode: bool,
    component: &str,
) -> Result<(), FactgraphError> {
    let component = parse_component(component)?;
    let engine = open_engine(config)?;
    let stats = engine.get_stats(&component);

    if json_mode {
        print_json(&serde_json::json!({
            "degraded": stats.is_degraded(),
            "warning": stats.reason(),
            "found": stats.value().is_some(),
            "stats": stats.value().as_ref().map(api::StatsJson::from),
        }));
        return Ok(());
    }

    report_degraded(&stats);
    match stats.value() {
        Some(s) => {
            println!("Usage of {}", component);
            println!("  Uses:          {}", s.total_uses);
            println!("  Success rate:  {}bps", s.success_rate_bps());
            println!("  Outbound uses: {}", s.outbound_uses);
            match s.avg_execution_ms() {
                Some(ms) => println!("  Avg exec:      {}ms", ms),
                None => println!("  Avg exec:      n/a"),
            }
            match s.last_used_at {
                Some(at) => println!("  Last used at:  {}", at),
                None => println!("  Last used at:  never"),
            }
        }
        None => println!("{} has no recorded usage", component),
    }

    Ok(())
}

/// Most used components.
pub fn cmd_top(
    config: &FactgraphConfig,
    json_mode: bool,
    component_type: Option<&str>,
    limit: Option<usize>,
) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;
    let rows = engine.most_used(component_type, limit);
    print_ranking(json_mode, "Most used:", &rows);
    Ok(())
}

/// Most recently used components.
pub fn cmd_recent(
    config: &FactgraphConfig,
    json_mode: bool,
    component_type: Option<&str>,
    limit: Option<usize>,
) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;
    let rows = engine.recently_used(component_type, limit);
    print_ranking(json_mode, "Recently used:", &rows);
    Ok(())
}

fn print_ranking(json_mode: bool, title: &str, rows: &Retrieval<Vec<UsageStats>>) {
    if json_mode {
        print_json(&serde_json::json!({
            "degraded": rows.is_degraded(),
            "warning": rows.reason(),
            "components": rows.value().iter().map(api::StatsJson::from).collect::<Vec<_>>(),
        }));
        return;
    }
    report_degraded(rows);
    print_stats_rows(title, rows.value());
}

/// Registered components with no edges.
pub fn cmd_orphans(
    config: &FactgraphConfig,
    json_mode: bool,
    component_type: &str,
) -> Result<(), FactgraphError> {
    let engine = open_engine(config)?;
    let orphans = engine.find_orphans(component_type);

    if json_mode {
        print_json(&serde_json::json!({
            "degraded": orphans.is_degraded(),
            "warning": orphans.reason(),
            "components": orphans.value(),
        }));
        return Ok(());
    }

    report_degraded(&orphans);
    println!("Orphaned {} components:", component_type);
    if orphans.value().is_empty() {
        println!("  (none)");
    }
    for c in orphans.value() {
        println!("  {}", c);
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
