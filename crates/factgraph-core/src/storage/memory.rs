//! # In-Memory Backend
//!
//! Volatile reference implementation of both backend traits.
//!
//! The backend can be switched offline with `set_online(false)`; every call
//! then fails with `BackendUnavailable`, which is how degraded-mode behavior
//! of the core is exercised without a real outage.

use super::{RelationshipBackend, TripleBackend};
use crate::{
    ComponentRef, EdgeSummary, FactgraphError, Metadata, Relationship, RelationshipId,
    RelationshipRecord, Triple, TripleKey, UsageStats,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// The far end of an edge plus its relationship type.
type FarEnd = (ComponentRef, String);

#[derive(Debug, Default)]
struct Tables {
    triples: BTreeMap<TripleKey, Metadata>,
    log: Vec<RelationshipRecord>,
    /// source -> (target, type) -> aggregate
    edges: BTreeMap<ComponentRef, BTreeMap<FarEnd, EdgeSummary>>,
    /// target -> (source, type), pointing back into `edges`
    inbound: BTreeMap<ComponentRef, BTreeSet<FarEnd>>,
    stats: BTreeMap<ComponentRef, UsageStats>,
    components: BTreeSet<ComponentRef>,
}

/// A volatile backend guarded by a single mutex.
#[derive(Debug)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    online: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty, online backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            online: AtomicBool::new(true),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), FactgraphError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(FactgraphError::BackendUnavailable(
                "memory backend is offline".to_string(),
            ))
        }
    }
}

impl TripleBackend for MemoryBackend {
    fn upsert_triple(&self, triple: &Triple) -> Result<(), FactgraphError> {
        self.check_online()?;
        self.tables
            .lock()
            .triples
            .insert(triple.key(), triple.metadata.clone());
        Ok(())
    }

    fn load_triples(&self) -> Result<Vec<Triple>, FactgraphError> {
        self.check_online()?;
        let tables = self.tables.lock();
        Ok(tables
            .triples
            .iter()
            .map(|(key, metadata)| {
                Triple::new(
                    key.subject.clone(),
                    key.predicate.clone(),
                    key.object.clone(),
                )
                .with_metadata(metadata.clone())
            })
            .collect())
    }

    fn triple_count(&self) -> Result<usize, FactgraphError> {
        self.check_online()?;
        Ok(self.tables.lock().triples.len())
    }
}

impl RelationshipBackend for MemoryBackend {
    fn append(&self, relationship: &Relationship) -> Result<RelationshipId, FactgraphError> {
        self.check_online()?;
        let mut tables = self.tables.lock();

        let id = RelationshipId(tables.log.len() as u64);
        tables.log.push(RelationshipRecord {
            id,
            relationship: relationship.clone(),
        });

        tables
            .edges
            .entry(relationship.source.clone())
            .or_default()
            .entry((
                relationship.target.clone(),
                relationship.relationship_type.clone(),
            ))
            .and_modify(|summary| summary.observe(relationship))
            .or_insert_with(|| EdgeSummary::first(relationship));
        tables
            .inbound
            .entry(relationship.target.clone())
            .or_default()
            .insert((
                relationship.source.clone(),
                relationship.relationship_type.clone(),
            ));

        tables
            .stats
            .entry(relationship.source.clone())
            .or_insert_with(|| UsageStats::new(relationship.source.clone()))
            .record_outbound(relationship);
        tables
            .stats
            .entry(relationship.target.clone())
            .or_insert_with(|| UsageStats::new(relationship.target.clone()))
            .record_inbound(relationship);

        tables.components.insert(relationship.source.clone());
        tables.components.insert(relationship.target.clone());

        Ok(id)
    }

    fn register_component(&self, component: &ComponentRef) -> Result<(), FactgraphError> {
        self.check_online()?;
        self.tables.lock().components.insert(component.clone());
        Ok(())
    }

    fn relationship(
        &self,
        id: RelationshipId,
    ) -> Result<Option<RelationshipRecord>, FactgraphError> {
        self.check_online()?;
        let tables = self.tables.lock();
        Ok(usize::try_from(id.0)
            .ok()
            .and_then(|idx| tables.log.get(idx))
            .cloned())
    }

    fn relationship_count(&self) -> Result<usize, FactgraphError> {
        self.check_online()?;
        Ok(self.tables.lock().log.len())
    }

    fn usages(
        &self,
        target: &ComponentRef,
        limit: Option<usize>,
    ) -> Result<Vec<EdgeSummary>, FactgraphError> {
        self.check_online()?;
        let tables = self.tables.lock();
        Ok(tables
            .inbound
            .get(target)
            .into_iter()
            .flatten()
            .filter_map(|(source, rel)| {
                tables
                    .edges
                    .get(source)?
                    .get(&(target.clone(), rel.clone()))
            })
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn dependencies(
        &self,
        source: &ComponentRef,
        limit: Option<usize>,
    ) -> Result<Vec<EdgeSummary>, FactgraphError> {
        self.check_online()?;
        let tables = self.tables.lock();
        Ok(tables
            .edges
            .get(source)
            .into_iter()
            .flat_map(BTreeMap::values)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn usage_stats(&self, component: &ComponentRef) -> Result<Option<UsageStats>, FactgraphError> {
        self.check_online()?;
        Ok(self.tables.lock().stats.get(component).cloned())
    }

    fn all_usage_stats(
        &self,
        component_type: Option<&str>,
    ) -> Result<Vec<UsageStats>, FactgraphError> {
        self.check_online()?;
        let tables = self.tables.lock();
        Ok(tables
            .stats
            .values()
            .filter(|s| component_type.is_none_or(|t| s.component.component_type() == t))
            .cloned()
            .collect())
    }

    fn components(&self, component_type: &str) -> Result<Vec<ComponentRef>, FactgraphError> {
        self.check_online()?;
        let tables = self.tables.lock();
        Ok(tables
            .components
            .iter()
            .filter(|c| c.component_type() == component_type)
            .cloned()
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
