//! # factgraph - Relationship Graph Server
//!
//! The main binary for the factgraph engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for facts, relationships and usage queries
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/factgraph (THE BINARY)              │
//! │                                                          │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │    Config    │   │
//! │   │   (clap)    │   │   (axum)    │   │ (toml + env) │   │
//! │   └──────┬──────┘   └──────┬──────┘   └──────┬───────┘   │
//! │          └─────────────────┼─────────────────┘           │
//! │                            ▼                             │
//! │                  ┌──────────────────┐                    │
//! │                  │  factgraph-core  │                    │
//! │                  │   (THE LOGIC)    │                    │
//! │                  └──────────────────┘                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! factgraph server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! factgraph add git:commit analyzedBy copilot:code_review
//! factgraph query '?x' hasDialogue '?y'
//! factgraph record -f edges.json
//! factgraph graph service:web --depth 3 --format hierarchical
//! ```

use clap::Parser;
use factgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // FACTGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("FACTGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "factgraph=info,factgraph_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
   __            _                       _
  / _| __ _  ___| |_ __ _ _ __ __ _ _ __ | |__
 | |_ / _` |/ __| __/ _` | '__/ _` | '_ \| '_ \
 |  _| (_| | (__| || (_| | | | (_| | |_) | | | |
 |_|  \__,_|\___|\__\__, |_|  \__,_| .__/|_| |_|
                    |___/          |_|

  Relationship Graph Engine v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
