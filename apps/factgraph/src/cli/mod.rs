//! # factgraph CLI Module
//!
//! This module implements the CLI interface for factgraph.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show engine status
//! - `init` - Initialize a new database
//! - `seed` - Apply a seed pack of facts
//! - `add` / `query` - Write and query facts
//! - `export` / `import` - N-Triples snapshots
//! - `record` - Record relationships from a JSON file
//! - `register` - Register a component
//! - `usages` / `deps` / `graph` - Walk the relationship graph
//! - `stats` / `top` / `recent` / `orphans` - Usage aggregates
//! - `flush` - Retry memory-only facts
//!
//! Components are written `type:id`, e.g. `service:payments`.

mod commands;

use crate::config::{BackendKind, FactgraphConfig};
use clap::{Parser, Subcommand};
use factgraph_core::{
    DependencyQuery, Direction, FactgraphError, GraphFormat, GraphOptions, UsageQuery,
};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// factgraph - symbolic fact store and component relationship graph
///
/// Records which components use which, answers usage and dependency
/// questions, and stores namespaced subject-predicate-object facts.
#[derive(Parser, Debug)]
#[command(name = "factgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ./factgraph.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database (overrides config and FACTGRAPH_DB)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (ACID database) or "memory" (volatile)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<BackendKind>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show engine status
    Status,

    /// Initialize a new database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Apply a seed pack (bundled pack unless --file or seeds.path is set)
    Seed {
        /// Seed pack TOML file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Add a fact
    Add {
        subject: String,
        predicate: String,
        object: String,

        /// Metadata entry, repeatable
        #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Query facts with one pattern; `?name` terms are variables
    Query {
        subject: String,
        predicate: String,
        object: String,
    },

    /// Export all facts as N-Triples
    Export {
        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import facts from an N-Triples file
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Record relationships from a JSON file (one object or an array)
    Record {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Register a component without recording an edge
    Register {
        /// Component as `type:id`
        component: String,
    },

    /// Show what uses a component
    Usages {
        /// Component as `type:id`
        component: String,

        /// Maximum number of edges
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only this relationship type
        #[arg(short = 't', long)]
        relationship_type: Option<String>,

        /// Only edges with at least one success
        #[arg(long)]
        success_only: bool,
    },

    /// Show what a component uses
    Deps {
        /// Component as `type:id`
        component: String,

        /// Maximum number of edges
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only this relationship type
        #[arg(short = 't', long)]
        relationship_type: Option<String>,
    },

    /// Build the graph around a component
    Graph {
        /// Root component as `type:id`
        component: String,

        /// Hops from the root
        #[arg(short, long)]
        depth: Option<usize>,

        /// Output shape (nodes-links, hierarchical)
        #[arg(short, long, default_value = "nodes-links")]
        format: GraphFormat,

        /// Edges to follow (outbound, inbound, both)
        #[arg(long, default_value = "outbound")]
        direction: Direction,
    },

    /// Show usage counters for a component
    Stats {
        /// Component as `type:id`
        component: String,
    },

    /// Most used components
    Top {
        /// Only this component type
        #[arg(short = 't', long)]
        component_type: Option<String>,

        /// Maximum number of rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Most recently used components
    Recent {
        /// Only this component type
        #[arg(short = 't', long)]
        component_type: Option<String>,

        /// Maximum number of rows
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Registered components with no edges
    Orphans {
        /// Component type to scan
        component_type: String,
    },

    /// Retry backend writes for memory-only facts
    Flush,
}

/// Parse a `KEY=VALUE` pair.
fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve configuration from file, environment and flags.
pub fn resolve_config(cli: &Cli) -> Result<FactgraphConfig, FactgraphError> {
    let mut config = FactgraphConfig::load(cli.config.as_deref())?;
    config.apply_env();
    config.apply_flags(cli.database.clone(), cli.backend);
    if cli.verbose {
        tracing::info!(?config, "resolved configuration");
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), FactgraphError> {
    let mut config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Status) => cmd_status(&config, json_mode),
        Some(Commands::Init { force }) => cmd_init(&config, json_mode, force),
        Some(Commands::Seed { file }) => cmd_seed(&config, json_mode, file.as_deref()),
        Some(Commands::Add {
            subject,
            predicate,
            object,
            meta,
        }) => cmd_add(
            &config,
            json_mode,
            &subject,
            &predicate,
            &object,
            meta.into_iter().collect(),
        ),
        Some(Commands::Query {
            subject,
            predicate,
            object,
        }) => cmd_query(&config, json_mode, &subject, &predicate, &object),
        Some(Commands::Export { output }) => cmd_export(&config, output.as_deref()),
        Some(Commands::Import { input }) => cmd_import(&config, json_mode, &input),
        Some(Commands::Record { file }) => cmd_record(&config, json_mode, &file),
        Some(Commands::Register { component }) => cmd_register(&config, json_mode, &component),
        Some(Commands::Usages {
            component,
            limit,
            relationship_type,
            success_only,
        }) => cmd_usages(
            &config,
            json_mode,
            &component,
            &UsageQuery {
                limit,
                relationship_type,
                success_only,
            },
        ),
        Some(Commands::Deps {
            component,
            limit,
            relationship_type,
        }) => cmd_deps(
            &config,
            json_mode,
            &component,
            &DependencyQuery {
                limit,
                relationship_type,
            },
        ),
        Some(Commands::Graph {
            component,
            depth,
            format,
            direction,
        }) => cmd_graph(
            &config,
            json_mode,
            &component,
            &GraphOptions {
                depth,
                format,
                direction,
            },
        ),
        Some(Commands::Stats { component }) => cmd_stats(&config, json_mode, &component),
        Some(Commands::Top {
            component_type,
            limit,
        }) => cmd_top(&config, json_mode, component_type.as_deref(), limit),
        Some(Commands::Recent {
            component_type,
            limit,
        }) => cmd_recent(&config, json_mode, component_type.as_deref(), limit),
        Some(Commands::Orphans { component_type }) => {
            cmd_orphans(&config, json_mode, &component_type)
        }
        Some(Commands::Flush) => cmd_flush(&config, json_mode),
        None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_val_splits_on_first_equals() {
        assert_eq!(
            parse_key_val("kind=a=b"),
            Ok(("kind".to_string(), "a=b".to_string()))
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn graph_flags_parse() {
        let cli = Cli::try_parse_from([
            "factgraph",
            "-B",
            "memory",
            "graph",
            "service:web",
            "--depth",
            "3",
            "--format",
            "hierarchical",
            "--direction",
            "both",
        ])
        .expect("parse");

        assert_eq!(cli.backend, Some(BackendKind::Memory));
        match cli.command {
            Some(Commands::Graph {
                component,
                depth,
                format,
                direction,
            }) => {
                assert_eq!(component, "service:web");
                assert_eq!(depth, Some(3));
                assert_eq!(format, GraphFormat::Hierarchical);
                assert_eq!(direction, Direction::Both);
            }
            other => unreachable!("expected graph, got {:?}", other),
        }
    }

    #[test]
    fn add_collects_metadata() {
        let cli = Cli::try_parse_from([
            "factgraph",
            "add",
            "git:commit",
            "analyzedBy",
            "copilot:code_review",
            "--meta",
            "source=ci",
            "-m",
            "run=42",
        ])
        .expect("parse");

        match cli.command {
            Some(Commands::Add { meta, .. }) => {
                assert_eq!(meta.len(), 2);
                assert_eq!(meta[1], ("run".to_string(), "42".to_string()));
            }
            other => unreachable!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn unknown_backend_rejected() {
        assert!(Cli::try_parse_from(["factgraph", "-B", "file", "status"]).is_err());
    }
}
