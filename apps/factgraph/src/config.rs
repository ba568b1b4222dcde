//! # Configuration
//!
//! Settings are layered, later layers winning:
//! 1. Built-in defaults
//! 2. TOML file (`--config <path>`, or `factgraph.toml` in the working directory)
//! 3. Environment variables
//! 4. Command-line flags
//!
//! ## Environment Variables
//!
//! - `FACTGRAPH_DB`: database path
//! - `FACTGRAPH_BACKEND`: `redb` or `memory`
//! - `FACTGRAPH_CORS_ORIGINS`: comma-separated origins, or `*`
//! - `FACTGRAPH_MAX_DEPTH`: traversal depth cap
//! - `FACTGRAPH_MAX_EDGES`: traversal edge budget

use factgraph_core::primitives::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_EDGES_EXPLORED};
use factgraph_core::{FactgraphError, GraphLimits};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "factgraph.toml";

/// Upper bound on a configuration file.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Disk-backed redb database.
    #[default]
    Redb,
    /// Volatile; state lives for one process only.
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!(
                "unknown backend '{}' (expected redb or memory)",
                other
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redb => f.write_str("redb"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` means localhost only; `"*"` allows every origin.
    pub cors_origins: Option<String>,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: None,
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redb,
            database: PathBuf::from("factgraph.redb"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub max_depth: usize,
    pub max_edges_explored: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_edges_explored: DEFAULT_MAX_EDGES_EXPLORED,
        }
    }
}

impl GraphConfig {
    /// The engine limits, clamped to the hard caps.
    #[must_use]
    pub fn limits(&self) -> GraphLimits {
        GraphLimits::new(self.max_depth, self.max_edges_explored)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedsConfig {
    /// Apply the bundled pack when `init` creates a database.
    pub apply_on_init: bool,
    /// Pack used by `seed` when no `--file` is given; `None` is the bundled pack.
    pub path: Option<PathBuf>,
}

// =============================================================================
// TOP-LEVEL CONFIG
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactgraphConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub graph: GraphConfig,
    pub seeds: SeedsConfig,
}

impl FactgraphConfig {
    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn parse(toml_str: &str) -> Result<Self, FactgraphError> {
        toml::from_str(toml_str)
            .map_err(|e| FactgraphError::DeserializationError(format!("config: {}", e)))
    }

    /// Read a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, FactgraphError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| FactgraphError::IoError(format!("{}: {}", path.display(), e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(FactgraphError::IoError(format!(
                "config file {} exceeds {} bytes",
                path.display(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| FactgraphError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Load the file layer.
    ///
    /// An explicit path must exist. Without one, `factgraph.toml` is read if
    /// present and defaults are used otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, FactgraphError> {
        match explicit {
            Some(path) => {
                tracing::info!("Loading configuration from {:?}", path);
                Self::from_file(path)
            }
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    tracing::info!("Loading configuration from {:?}", fallback);
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply the environment layer from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply the environment layer through `lookup`.
    ///
    /// Unparseable numeric or backend values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup("FACTGRAPH_DB") {
            self.storage.database = PathBuf::from(db);
        }

        if let Some(raw) = lookup("FACTGRAPH_BACKEND") {
            match raw.parse() {
                Ok(kind) => self.storage.backend = kind,
                Err(e) => tracing::warn!("Ignoring FACTGRAPH_BACKEND: {}", e),
            }
        }

        if let Some(origins) = lookup("FACTGRAPH_CORS_ORIGINS") {
            self.server.cors_origins = Some(origins);
        }

        if let Some(raw) = lookup("FACTGRAPH_MAX_DEPTH") {
            match raw.trim().parse() {
                Ok(depth) => self.graph.max_depth = depth,
                Err(_) => tracing::warn!("Ignoring FACTGRAPH_MAX_DEPTH='{}'", raw),
            }
        }

        if let Some(raw) = lookup("FACTGRAPH_MAX_EDGES") {
            match raw.trim().parse() {
                Ok(edges) => self.graph.max_edges_explored = edges,
                Err(_) => tracing::warn!("Ignoring FACTGRAPH_MAX_EDGES='{}'", raw),
            }
        }
    }

    /// Apply the flag layer. `None` leaves the lower layers in place.
    pub fn apply_flags(&mut self, database: Option<PathBuf>, backend: Option<BackendKind>) {
        if let Some(database) = database {
            self.storage.database = database;
        }
        if let Some(backend) = backend {
            self.storage.backend = backend;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
