//! # Seed Packs
//!
//! TOML bundles of facts applied to a fact store, typically at boot. One
//! pack (`default`) is compiled into the binary; others load from disk.
//!
//! ```toml
//! [seed]
//! id = "default"
//! name = "Default mappings"
//! version = "1.0.0"
//! description = "..."
//!
//! [[triples]]
//! subject = "git:commit"
//! predicate = "analyzedBy"
//! object = "copilot:code_review"
//! ```

use crate::fact_store::FactStore;
use crate::{FactgraphError, Metadata};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../data/seeds/default.toml");

/// A fact as written in a seed file; validated when applied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct SeedMeta {
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct SeedToml {
    seed: SeedMeta,
    #[serde(default)]
    triples: Vec<SeedTriple>,
}

/// A parsed seed pack.
#[derive(Debug, Clone)]
pub struct SeedPack {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub triples: Vec<SeedTriple>,
}

/// Outcome of applying a pack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedReport {
    pub id: String,
    pub applied: usize,
    /// Facts that reached memory but not the backend.
    pub memory_only: usize,
    /// `"<s> <p> <o>: reason"` for each fact that failed validation.
    pub rejected: Vec<String>,
}

impl SeedPack {
    /// Parse a pack from TOML text.
    pub fn parse(toml_str: &str) -> Result<Self, FactgraphError> {
        let parsed: SeedToml = toml::from_str(toml_str)
            .map_err(|e| FactgraphError::DeserializationError(format!("seed pack: {}", e)))?;
        Ok(Self {
            id: parsed.seed.id,
            name: parsed.seed.name,
            version: parsed.seed.version,
            description: parsed.seed.description,
            triples: parsed.triples,
        })
    }

    /// The pack compiled into the binary.
    pub fn bundled() -> Result<Self, FactgraphError> {
        Self::parse(DEFAULT_TOML)
    }

    /// Load a pack from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FactgraphError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FactgraphError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    /// Add every fact to `store`. Invalid facts are reported, not fatal.
    pub fn apply(&self, store: &FactStore) -> SeedReport {
        let mut report = SeedReport {
            id: self.id.clone(),
            ..SeedReport::default()
        };

        for t in &self.triples {
            match store.add_triple(&t.subject, &t.predicate, &t.object, t.metadata.clone()) {
                Ok(added) => {
                    report.applied += 1;
                    if !added.persistence.is_durable() {
                        report.memory_only += 1;
                    }
                }
                Err(e) => report
                    .rejected
                    .push(format!("{} {} {}: {}", t.subject, t.predicate, t.object, e)),
            }
        }

        tracing::info!(
            seed = %self.id,
            version = %self.version,
            applied = report.applied,
            rejected = report.rejected.len(),
            "seed pack applied"
        );
        report
    }
}
