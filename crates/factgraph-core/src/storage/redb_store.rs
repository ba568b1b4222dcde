//! # redb-backed Storage
//!
//! A disk-backed implementation of both backend traits using the redb
//! embedded database:
//! - ACID transactions (an appended edge and every aggregate it touches
//!   commit together)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Components are keyed by their `type:id` display form. Component types
//! cannot contain `:`, so the key is unambiguous.

use super::{RelationshipBackend, TripleBackend};
use crate::{
    ComponentRef, EdgeSummary, FactgraphError, Metadata, Relationship, RelationshipId,
    RelationshipRecord, Triple, UsageStats,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Facts: (subject, predicate, object) -> serialized Metadata
const TRIPLES: TableDefinition<(&str, &str, &str), &[u8]> = TableDefinition::new("triples");

/// Append-only edge log: RelationshipId(u64) -> serialized Relationship
const RELATIONSHIPS: TableDefinition<u64, &[u8]> = TableDefinition::new("relationships");

type EdgeTable = TableDefinition<'static, (&'static str, &'static str, &'static str), &'static [u8]>;

/// Outbound aggregates: (source, target, type) -> serialized EdgeSummary
const EDGES_OUT: EdgeTable = TableDefinition::new("edges_out");

/// Inbound index: (target, source, type) -> serialized EdgeSummary
const EDGES_IN: EdgeTable = TableDefinition::new("edges_in");

/// Usage rows: (component_type, component_id) -> serialized UsageStats
const USAGE_STATS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("usage_stats");

/// Component registry: (component_type, component_id) -> registration time (unix ms)
const COMPONENTS: TableDefinition<(&str, &str), u64> = TableDefinition::new("components");

/// Counters: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_RELATIONSHIP_ID: &str = "next_relationship_id";

fn unavailable(e: impl std::fmt::Display) -> FactgraphError {
    FactgraphError::BackendUnavailable(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, FactgraphError> {
    postcard::to_allocvec(value).map_err(|e| FactgraphError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FactgraphError> {
    postcard::from_bytes(bytes).map_err(|e| FactgraphError::DeserializationError(e.to_string()))
}

/// A disk-backed store for facts and relationships.
pub struct RedbBackend {
    db: Database,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend").finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FactgraphError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| FactgraphError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(unavailable)?;
            let _ = write_txn.open_table(TRIPLES).map_err(unavailable)?;
            let _ = write_txn.open_table(RELATIONSHIPS).map_err(unavailable)?;
            let _ = write_txn.open_table(EDGES_OUT).map_err(unavailable)?;
            let _ = write_txn.open_table(EDGES_IN).map_err(unavailable)?;
            let _ = write_txn.open_table(USAGE_STATS).map_err(unavailable)?;
            let _ = write_txn.open_table(COMPONENTS).map_err(unavailable)?;
            let _ = write_txn.open_table(METADATA).map_err(unavailable)?;
            write_txn.commit().map_err(unavailable)?;
        }

        Ok(Self { db })
    }

    /// Scan one side of the edge index for the rows whose first key equals
    /// `anchor`, stopping after `limit` rows.
    fn edges_from(
        &self,
        definition: EdgeTable,
        anchor: &ComponentRef,
        limit: Option<usize>,
    ) -> Result<Vec<EdgeSummary>, FactgraphError> {
        let limit = limit.unwrap_or(usize::MAX);
        let anchor = anchor.to_string();
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn.open_table(definition).map_err(unavailable)?;

        let mut out = Vec::new();
        for entry in table
            .range((anchor.as_str(), "", "")..)
            .map_err(unavailable)?
        {
            if out.len() >= limit {
                break;
            }
            let (key, value) = entry.map_err(unavailable)?;
            if key.value().0 != anchor {
                break;
            }
            out.push(decode(value.value())?);
        }
        Ok(out)
    }
}

impl TripleBackend for RedbBackend {
    fn upsert_triple(&self, triple: &Triple) -> Result<(), FactgraphError> {
        let subject = triple.subject.to_string();
        let object = triple.object.to_string();
        let bytes = encode(&triple.metadata)?;

        let write_txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut table = write_txn.open_table(TRIPLES).map_err(unavailable)?;
            table
                .insert(
                    (subject.as_str(), triple.predicate.as_str(), object.as_str()),
                    bytes.as_slice(),
                )
                .map_err(unavailable)?;
        }
        write_txn.commit().map_err(unavailable)?;
        Ok(())
    }

    fn load_triples(&self) -> Result<Vec<Triple>, FactgraphError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn.open_table(TRIPLES).map_err(unavailable)?;

        let mut triples = Vec::new();
        for entry in table.iter().map_err(unavailable)? {
            let (key, value) = entry.map_err(unavailable)?;
            let (subject, predicate, object) = key.value();
            let metadata: Metadata = decode(value.value())?;
            let triple = Triple::parse(subject, predicate, object)
                .map_err(|e| FactgraphError::DeserializationError(e.to_string()))?;
            triples.push(triple.with_metadata(metadata));
        }
        Ok(triples)
    }

    fn triple_count(&self) -> Result<usize, FactgraphError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn.open_table(TRIPLES).map_err(unavailable)?;
        let len = table.len().map_err(unavailable)?;
        Ok(len as usize)
    }
}

impl RelationshipBackend for RedbBackend {
    fn append(&self, relationship: &Relationship) -> Result<RelationshipId, FactgraphError> {
        let source = relationship.source.to_string();
        let target = relationship.target.to_string();
        let rel_type = relationship.relationship_type.as_str();
        let log_bytes = encode(relationship)?;

        let write_txn = self.db.begin_write().map_err(unavailable)?;
        let id = {
            let mut meta = write_txn.open_table(METADATA).map_err(unavailable)?;
            let id = meta
                .get(NEXT_RELATIONSHIP_ID)
                .map_err(unavailable)?
                .map(|v| v.value())
                .unwrap_or(0);
            meta.insert(NEXT_RELATIONSHIP_ID, id.saturating_add(1))
                .map_err(unavailable)?;

            let mut log = write_txn.open_table(RELATIONSHIPS).map_err(unavailable)?;
            log.insert(id, log_bytes.as_slice()).map_err(unavailable)?;

            // Edge aggregate, mirrored into the inbound index.
            let mut out_table = write_txn.open_table(EDGES_OUT).map_err(unavailable)?;
            let existing: Option<EdgeSummary> = out_table
                .get((source.as_str(), target.as_str(), rel_type))
                .map_err(unavailable)?
                .map(|data| decode(data.value()))
                .transpose()?;
            let summary = match existing {
                Some(mut summary) => {
                    summary.observe(relationship);
                    summary
                }
                None => EdgeSummary::first(relationship),
            };
            let summary_bytes = encode(&summary)?;
            out_table
                .insert(
                    (source.as_str(), target.as_str(), rel_type),
                    summary_bytes.as_slice(),
                )
                .map_err(unavailable)?;
            let mut in_table = write_txn.open_table(EDGES_IN).map_err(unavailable)?;
            in_table
                .insert(
                    (target.as_str(), source.as_str(), rel_type),
                    summary_bytes.as_slice(),
                )
                .map_err(unavailable)?;

            // Usage rows. A self-loop reads back the row written for the
            // source within the same transaction.
            let mut stats = write_txn.open_table(USAGE_STATS).map_err(unavailable)?;
            let mut components = write_txn.open_table(COMPONENTS).map_err(unavailable)?;
            for (component, inbound) in [(&relationship.source, false), (&relationship.target, true)]
            {
                let key = (component.component_type(), component.component_id());
                let mut row: UsageStats = stats
                    .get(key)
                    .map_err(unavailable)?
                    .map(|data| decode(data.value()))
                    .transpose()?
                    .unwrap_or_else(|| UsageStats::new(component.clone()));
                if inbound {
                    row.record_inbound(relationship);
                } else {
                    row.record_outbound(relationship);
                }
                let row_bytes = encode(&row)?;
                stats.insert(key, row_bytes.as_slice()).map_err(unavailable)?;

                let registered = components.get(key).map_err(unavailable)?.is_some();
                if !registered {
                    components
                        .insert(key, relationship.timestamp)
                        .map_err(unavailable)?;
                }
            }

            id
        };
        write_txn.commit().map_err(unavailable)?;

        Ok(RelationshipId(id))
    }

    fn register_component(&self, component: &ComponentRef) -> Result<(), FactgraphError> {
        let key = (component.component_type(), component.component_id());
        let write_txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut table = write_txn.open_table(COMPONENTS).map_err(unavailable)?;
            let registered = table.get(key).map_err(unavailable)?.is_some();
            if !registered {
                table
                    .insert(key, crate::primitives::now_millis())
                    .map_err(unavailable)?;
            }
        }
        write_txn.commit().map_err(unavailable)?;
        Ok(())
    }

    fn relationship(
        &self,
        id: RelationshipId,
    ) -> Result<Option<RelationshipRecord>, FactgraphError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn.open_table(RELATIONSHIPS).map_err(unavailable)?;
        table
            .get(id.0)
            .map_err(unavailable)?
            .map(|data| {
                decode(data.value()).map(|relationship| RelationshipRecord { id, relationship })
            })
            .transpose()
    }

    fn relationship_count(&self) -> Result<usize, FactgraphError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn.open_table(RELATIONSHIPS).map_err(unavailable)?;
        let len = table.len().map_err(unavailable)?;
        Ok(len as usize)
    }

    fn usages(
        &self,
        target: &ComponentRef,
        limit: Option<usize>,
    ) -> Result<Vec<EdgeSummary>, FactgraphError> {
        self.edges_from(EDGES_IN, target, limit)
    }

    fn dependencies(
        &self,
        source: &ComponentRef,
        limit: Option<usize>,
    ) -> Result<Vec<EdgeSummary>, FactgraphError> {
        self.edges_from(EDGES_OUT, source, limit)
    }

    fn usage_stats(&self, component: &ComponentRef) -> Result<Option<UsageStats>, FactgraphError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn.open_table(USAGE_STATS).map_err(unavailable)?;
        table
            .get((component.component_type(), component.component_id()))
            .map_err(unavailable)?
            .map(|data| decode(data.value()))
            .transpose()
    }

    fn all_usage_stats(
        &self,
        component_type: Option<&str>,
    ) -> Result<Vec<UsageStats>, FactgraphError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn.open_table(USAGE_STATS).map_err(unavailable)?;

        let mut rows = Vec::new();
        match component_type {
            Some(wanted) => {
                for entry in table.range((wanted, "")..).map_err(unavailable)? {
                    let (key, value) = entry.map_err(unavailable)?;
                    if key.value().0 != wanted {
                        break;
                    }
                    rows.push(decode(value.value())?);
                }
            }
            None => {
                for entry in table.iter().map_err(unavailable)? {
                    let (_, value) = entry.map_err(unavailable)?;
                    rows.push(decode(value.value())?);
                }
            }
        }
        Ok(rows)
    }

    fn components(&self, component_type: &str) -> Result<Vec<ComponentRef>, FactgraphError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = read_txn.open_table(COMPONENTS).map_err(unavailable)?;

        let mut out = Vec::new();
        for entry in table.range((component_type, "")..).map_err(unavailable)? {
            let (key, _) = entry.map_err(unavailable)?;
            let (kind, id) = key.value();
            if kind != component_type {
                break;
            }
            out.push(
                ComponentRef::new(kind, id)
                    .map_err(|e| FactgraphError::DeserializationError(e.to_string()))?,
            );
        }
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::EdgeContext;
    use tempfile::tempdir;

    fn component(t: &str, id: &str) -> ComponentRef {
        ComponentRef::new(t, id).expect("component")
    }

    fn edge(source: &ComponentRef, target: &ComponentRef, rel_type: &str) -> Relationship {
        Relationship {
            source: source.clone(),
            target: target.clone(),
            relationship_type: rel_type.to_string(),
            context: EdgeContext::default(),
            metadata: Metadata::new(),
            execution_time_ms: Some(12),
            success: true,
            error_message: None,
            timestamp: 1_000,
        }
    }

    #[test]
    fn triples_round_trip_through_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("facts.redb");

        {
            let backend = RedbBackend::open(&path).expect("open");
            let mut metadata = Metadata::new();
            metadata.insert("source".into(), "import".into());
            let triple = Triple::parse("git:commit", "analyzedBy", "visual:tree")
                .expect("triple")
                .with_metadata(metadata);
            backend.upsert_triple(&triple).expect("upsert");
            backend.upsert_triple(&triple).expect("upsert again");
            assert_eq!(backend.triple_count().expect("count"), 1);
        }

        let backend = RedbBackend::open(&path).expect("reopen");
        let loaded = backend.load_triples().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].subject.to_string(), "git:commit");
        assert_eq!(
            loaded[0].metadata.get("source").map(String::as_str),
            Some("import")
        );
    }

    #[test]
    fn append_updates_both_edge_indices() {
        let dir = tempdir().expect("tempdir");
        let backend = RedbBackend::open(dir.path().join("graph.redb")).expect("open");
        let a = component("service", "a");
        let b = component("service", "b");
        let c = component("service", "c");

        let first = backend.append(&edge(&a, &b, "calls")).expect("append");
        backend.append(&edge(&a, &b, "calls")).expect("append");
        backend.append(&edge(&c, &b, "calls")).expect("append");
        assert_eq!(first, RelationshipId(0));
        assert_eq!(backend.relationship_count().expect("count"), 3);

        let usages = backend.usages(&b, None).expect("usages");
        assert_eq!(usages.len(), 2);
        let deps = backend.dependencies(&a, None).expect("deps");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].usage_count, 2);

        let stats = backend.usage_stats(&b).expect("stats").expect("row");
        assert_eq!(stats.total_uses, 3);
        assert_eq!(stats.avg_execution_ms(), Some(12));

        let record = backend
            .relationship(first)
            .expect("read")
            .expect("present");
        assert_eq!(record.relationship.target, b);
    }

    #[test]
    fn prefix_scans_do_not_leak_into_neighbours() {
        let dir = tempdir().expect("tempdir");
        let backend = RedbBackend::open(dir.path().join("graph.redb")).expect("open");
        let a = component("service", "a");
        let ab = component("service", "ab");
        let x = component("service", "x");

        backend.append(&edge(&a, &x, "calls")).expect("append");
        backend.append(&edge(&ab, &x, "calls")).expect("append");

        assert_eq!(backend.dependencies(&a, None).expect("deps").len(), 1);
        assert_eq!(backend.dependencies(&ab, None).expect("deps").len(), 1);
    }

    #[test]
    fn limited_scan_stops_early() {
        let dir = tempdir().expect("tempdir");
        let backend = RedbBackend::open(dir.path().join("graph.redb")).expect("open");
        let hub = component("service", "hub");
        for i in 0..10 {
            let leaf = component("service", &format!("leaf{}", i));
            backend.append(&edge(&hub, &leaf, "calls")).expect("append");
        }

        let first = backend.dependencies(&hub, Some(4)).expect("deps");
        assert_eq!(first.len(), 4);
        assert_eq!(first[0].target.component_id(), "leaf0");
        assert_eq!(backend.dependencies(&hub, Some(0)).expect("deps").len(), 0);
        assert_eq!(backend.dependencies(&hub, None).expect("deps").len(), 10);
    }

    #[test]
    fn registry_filters_by_type() {
        let dir = tempdir().expect("tempdir");
        let backend = RedbBackend::open(dir.path().join("graph.redb")).expect("open");
        backend
            .register_component(&component("service", "lonely"))
            .expect("register");
        backend
            .register_component(&component("servicex", "other"))
            .expect("register");
        backend
            .append(&edge(
                &component("agent", "a"),
                &component("service", "b"),
                "calls",
            ))
            .expect("append");

        let services = backend.components("service").expect("components");
        assert_eq!(services.len(), 2);
        assert!(
            backend
                .all_usage_stats(Some("agent"))
                .expect("stats")
                .iter()
                .all(|s| s.component.component_type() == "agent")
        );
        assert_eq!(backend.all_usage_stats(None).expect("stats").len(), 2);
    }
}
