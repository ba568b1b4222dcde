//! # Fact Store
//!
//! Subject-predicate-object facts with a forward index (subject -> facts) and
//! an inverse index (object -> facts).
//!
//! ## Consistency Model
//!
//! - Read-through at open: `open` warm-loads every durable fact
//! - Write-through afterwards: memory first, then a backend upsert
//! - A failed upsert never fails the call. The key joins the pending set,
//!   the result says `Persistence::MemoryOnly`, and `flush_pending` retries
//!   on request. Nothing retries on its own.
//!
//! Both indices and the pending set sit behind one `RwLock`; backend I/O
//! always happens with the lock released. Writers additionally hold the
//! write gate from the memory update through the backend upsert, so the
//! backend applies writes to a key in the same order memory did and a key
//! leaves the pending set only when its latest value is durable. Readers
//! never take the gate.

use crate::export::export_ntriples;
use crate::query::{Bindings, Pattern, Strategy};
use crate::storage::TripleBackend;
use crate::{
    AddedTriple, FactgraphError, Metadata, Persistence, Predicate, Ref, Triple, TripleKey,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Forward entries of one subject: (predicate, object) -> metadata.
type Outgoing = BTreeMap<(Predicate, Ref), Metadata>;

#[derive(Debug, Default)]
struct FactIndex {
    forward: BTreeMap<Ref, Outgoing>,
    /// object -> (predicate, subject); metadata lives in `forward`.
    inverse: BTreeMap<Ref, BTreeSet<(Predicate, Ref)>>,
    /// Facts held in memory whose backend upsert failed.
    pending: BTreeSet<TripleKey>,
}

impl FactIndex {
    /// Upsert. Returns true if the key was new.
    fn insert(&mut self, triple: Triple) -> bool {
        let Triple {
            subject,
            predicate,
            object,
            metadata,
        } = triple;

        self.inverse
            .entry(object.clone())
            .or_default()
            .insert((predicate.clone(), subject.clone()));
        self.forward
            .entry(subject)
            .or_default()
            .insert((predicate, object), metadata)
            .is_none()
    }

    fn triple(subject: &Ref, predicate: &Predicate, object: &Ref, metadata: &Metadata) -> Triple {
        Triple::new(subject.clone(), predicate.clone(), object.clone())
            .with_metadata(metadata.clone())
    }

    fn metadata(&self, subject: &Ref, predicate: &Predicate, object: &Ref) -> Option<&Metadata> {
        self.forward
            .get(subject)?
            .get(&(predicate.clone(), object.clone()))
    }

    fn len(&self) -> usize {
        self.forward.values().map(BTreeMap::len).sum()
    }

    /// Visit every fact matching `pattern` through the index its strategy selects.
    fn for_each_candidate(
        &self,
        pattern: &Pattern,
        mut visit: impl FnMut(&Ref, &Predicate, &Ref, &Metadata),
    ) {
        match pattern.strategy() {
            Strategy::Exists => {
                if let (Some(s), Some(p), Some(o)) = (
                    pattern.subject.bound(),
                    pattern.predicate.bound(),
                    pattern.object.bound(),
                ) && let Some(metadata) = self.metadata(s, p, o)
                {
                    visit(s, p, o, metadata);
                }
            }
            Strategy::BySubject => {
                let Some(s) = pattern.subject.bound() else {
                    return;
                };
                for ((p, o), metadata) in self.forward.get(s).into_iter().flatten() {
                    visit(s, p, o, metadata);
                }
            }
            Strategy::ByObject => {
                let Some(o) = pattern.object.bound() else {
                    return;
                };
                for (p, s) in self.inverse.get(o).into_iter().flatten() {
                    if let Some(metadata) = self.metadata(s, p, o) {
                        visit(s, p, o, metadata);
                    }
                }
            }
            // Linear over all subjects: the one non-indexed lookup.
            Strategy::ByPredicate | Strategy::FullScan => {
                for (s, outgoing) in &self.forward {
                    for ((p, o), metadata) in outgoing {
                        visit(s, p, o, metadata);
                    }
                }
            }
        }
    }
}

/// Counters describing the in-memory view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactStoreStats {
    pub triples: usize,
    pub subjects: usize,
    pub objects: usize,
    pub pending: usize,
}

/// Outcome of `flush_pending`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    pub attempted: usize,
    pub flushed: usize,
    pub remaining: usize,
    pub last_error: Option<String>,
}

/// The fact store: in-memory indices over a durable triple backend.
pub struct FactStore {
    index: RwLock<FactIndex>,
    /// Held across memory update plus backend upsert. Taken before `index`.
    write_gate: Mutex<()>,
    backend: Arc<dyn TripleBackend>,
}

impl std::fmt::Debug for FactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index.read();
        f.debug_struct("FactStore")
            .field("subjects", &index.forward.len())
            .field("pending", &index.pending.len())
            .finish_non_exhaustive()
    }
}

impl FactStore {
    /// An empty store over `backend`, without loading anything from it.
    #[must_use]
    pub fn new(backend: Arc<dyn TripleBackend>) -> Self {
        Self {
            index: RwLock::new(FactIndex::default()),
            write_gate: Mutex::new(()),
            backend,
        }
    }

    /// A store warm-loaded with every durable fact of `backend`.
    pub fn open(backend: Arc<dyn TripleBackend>) -> Result<Self, FactgraphError> {
        let triples = backend.load_triples()?;
        let store = Self::new(backend);
        {
            let mut index = store.index.write();
            for triple in triples {
                index.insert(triple);
            }
        }
        tracing::debug!(triples = store.len(), "fact store loaded");
        Ok(store)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Validate and upsert a fact.
    ///
    /// Fails only on validation. Backend failure downgrades the result to
    /// `Persistence::MemoryOnly`.
    pub fn add_triple(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
        metadata: Metadata,
    ) -> Result<AddedTriple, FactgraphError> {
        let triple = Triple::parse(subject, predicate, object)?.with_metadata(metadata);
        Ok(self.add(triple))
    }

    /// Upsert an already validated fact.
    pub fn add(&self, triple: Triple) -> AddedTriple {
        let key = triple.key();
        let _gate = self.write_gate.lock();
        self.index.write().insert(triple.clone());

        let persistence = match self.backend.upsert_triple(&triple) {
            Ok(()) => {
                self.index.write().pending.remove(&key);
                Persistence::Durable
            }
            Err(e) => {
                tracing::warn!(triple = %key, error = %e, "triple kept in memory only");
                self.index.write().pending.insert(key.clone());
                Persistence::MemoryOnly {
                    reason: e.to_string(),
                }
            }
        };

        AddedTriple {
            subject: key.subject,
            predicate: key.predicate,
            object: key.object,
            persistence,
        }
    }

    /// Retry the backend upsert of every memory-only fact.
    ///
    /// Each fact is re-read under the write gate, so the value sent to the
    /// backend is the latest one. A key that a concurrent `add` already
    /// persisted is skipped.
    pub fn flush_pending(&self) -> FlushReport {
        let keys = self.pending_keys();
        let mut report = FlushReport::default();

        for key in keys {
            let _gate = self.write_gate.lock();
            let current = {
                let index = self.index.read();
                if index.pending.contains(&key) {
                    index
                        .metadata(&key.subject, &key.predicate, &key.object)
                        .map(|m| FactIndex::triple(&key.subject, &key.predicate, &key.object, m))
                } else {
                    None
                }
            };
            let Some(triple) = current else {
                continue;
            };

            report.attempted += 1;
            match self.backend.upsert_triple(&triple) {
                Ok(()) => {
                    self.index.write().pending.remove(&key);
                    report.flushed += 1;
                }
                Err(e) => report.last_error = Some(e.to_string()),
            }
        }
        report.remaining = self.index.read().pending.len();

        if report.remaining > 0 {
            tracing::warn!(
                flushed = report.flushed,
                remaining = report.remaining,
                "pending triples not fully flushed"
            );
        }
        report
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Facts with this subject, optionally restricted to one predicate.
    #[must_use]
    pub fn query_by_subject(&self, subject: &Ref, predicate: Option<&Predicate>) -> Vec<Triple> {
        let index = self.index.read();
        index
            .forward
            .get(subject)
            .into_iter()
            .flatten()
            .filter(|((p, _), _)| predicate.is_none_or(|wanted| p == wanted))
            .map(|((p, o), m)| FactIndex::triple(subject, p, o, m))
            .collect()
    }

    /// Facts with this object, optionally restricted to one predicate.
    #[must_use]
    pub fn query_by_object(&self, object: &Ref, predicate: Option<&Predicate>) -> Vec<Triple> {
        let index = self.index.read();
        index
            .inverse
            .get(object)
            .into_iter()
            .flatten()
            .filter(|(p, _)| predicate.is_none_or(|wanted| p == wanted))
            .filter_map(|(p, s)| {
                index
                    .metadata(s, p, object)
                    .map(|m| FactIndex::triple(s, p, object, m))
            })
            .collect()
    }

    /// Facts with this predicate. Scans every subject.
    #[must_use]
    pub fn query_by_predicate(&self, predicate: &Predicate) -> Vec<Triple> {
        let index = self.index.read();
        index
            .forward
            .iter()
            .flat_map(|(s, outgoing)| {
                outgoing
                    .iter()
                    .filter(|((p, _), _)| p == predicate)
                    .map(move |((p, o), m)| FactIndex::triple(s, p, o, m))
            })
            .collect()
    }

    /// Resolve a raw pattern. No match is an empty result, not an error.
    pub fn query(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
    ) -> Result<Vec<Bindings>, FactgraphError> {
        let pattern = Pattern::parse(subject, predicate, object)?;
        Ok(self.query_pattern(&pattern))
    }

    /// Resolve a parsed pattern.
    #[must_use]
    pub fn query_pattern(&self, pattern: &Pattern) -> Vec<Bindings> {
        let index = self.index.read();
        let mut out = Vec::new();
        index.for_each_candidate(pattern, |s, p, o, _| {
            if let Some(bindings) = pattern.bind(s, p, o) {
                out.push(bindings);
            }
        });
        out
    }

    #[must_use]
    pub fn get(&self, key: &TripleKey) -> Option<Triple> {
        let index = self.index.read();
        index
            .metadata(&key.subject, &key.predicate, &key.object)
            .map(|m| FactIndex::triple(&key.subject, &key.predicate, &key.object, m))
    }

    #[must_use]
    pub fn contains(&self, key: &TripleKey) -> bool {
        self.index
            .read()
            .metadata(&key.subject, &key.predicate, &key.object)
            .is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().forward.is_empty()
    }

    /// Every fact, in key order.
    #[must_use]
    pub fn all(&self) -> Vec<Triple> {
        let index = self.index.read();
        index
            .forward
            .iter()
            .flat_map(|(s, outgoing)| {
                outgoing
                    .iter()
                    .map(move |((p, o), m)| FactIndex::triple(s, p, o, m))
            })
            .collect()
    }

    /// Keys of facts that are held in memory only.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<TripleKey> {
        self.index.read().pending.iter().cloned().collect()
    }

    #[must_use]
    pub fn stats(&self) -> FactStoreStats {
        let index = self.index.read();
        FactStoreStats {
            triples: index.len(),
            subjects: index.forward.len(),
            objects: index.inverse.len(),
            pending: index.pending.len(),
        }
    }

    /// Deterministic `<s> <p> <o> .` snapshot of the in-memory view.
    #[must_use]
    pub fn export_ntriples(&self) -> String {
        export_ntriples(&self.all())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn store() -> (Arc<MemoryBackend>, FactStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = FactStore::new(backend.clone());
        (backend, store)
    }

    fn meta(k: &str, v: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(k.into(), v.into());
        m
    }

    fn fixture() -> FactStore {
        let (_, store) = store();
        store
            .add_triple("git:commit", "analyzedBy", "copilot:code_review", Metadata::new())
            .expect("add");
        store
            .add_triple(
                "gaming:npc",
                "hasDialogue",
                "visual:dialogue_tree",
                Metadata::new(),
            )
            .expect("add");
        store
    }

    #[test]
    fn upsert_replaces_metadata() {
        let (_, store) = store();
        store
            .add_triple("git:a", "links", "git:b", meta("v", "1"))
            .expect("add");
        store
            .add_triple("git:a", "links", "git:b", meta("v", "2"))
            .expect("add");

        assert_eq!(store.len(), 1);
        let subject = Ref::parse("git:a").expect("ref");
        let found = store.query_by_subject(&subject, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].metadata.get("v").map(String::as_str), Some("2"));
    }

    #[test]
    fn validation_happens_before_mutation() {
        let (_, store) = store();
        assert!(matches!(
            store.add_triple("nonamespace", "p", "git:b", Metadata::new()),
            Err(FactgraphError::InvalidRef(_))
        ));
        assert!(matches!(
            store.add_triple("git:a", "has space", "git:b", Metadata::new()),
            Err(FactgraphError::InvalidPredicate(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn inverse_index_answers_by_object() {
        let store = fixture();
        let object = Ref::parse("visual:dialogue_tree").expect("ref");
        let predicate = Predicate::new("hasDialogue").expect("predicate");

        let found = store.query_by_object(&object, Some(&predicate));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].subject.to_string(), "gaming:npc");

        let wrong = Predicate::new("analyzedBy").expect("predicate");
        assert!(store.query_by_object(&object, Some(&wrong)).is_empty());
    }

    #[test]
    fn pattern_fixture() {
        let store = fixture();

        let rows = store.query("?x", "hasDialogue", "?y").expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("x"), Some("gaming:npc"));
        assert_eq!(rows[0].get("y"), Some("visual:dialogue_tree"));

        let exact = store
            .query("gaming:npc", "hasDialogue", "visual:dialogue_tree")
            .expect("query");
        assert_eq!(exact.len(), 1);

        let none = store
            .query("nonexistent:thing", "hasDialogue", "?y")
            .expect("query");
        assert!(none.is_empty());

        assert!(store.query("nonamespace", "hasDialogue", "?y").is_err());
    }

    #[test]
    fn free_predicate_is_bound() {
        let store = fixture();
        let rows = store
            .query("git:commit", "?rel", "copilot:code_review")
            .expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("rel"), Some("analyzedBy"));

        assert_eq!(store.query("?", "?", "?").expect("query").len(), 2);
    }

    #[test]
    fn backend_outage_marks_pending() {
        let (backend, store) = store();
        backend.set_online(false);

        let added = store
            .add_triple("git:a", "links", "git:b", Metadata::new())
            .expect("add still succeeds");
        assert!(!added.persistence.is_durable());
        assert_eq!(store.pending_keys().len(), 1);
        assert_eq!(store.len(), 1);

        let failed = store.flush_pending();
        assert_eq!(failed.flushed, 0);
        assert_eq!(failed.remaining, 1);
        assert!(failed.last_error.is_some());

        backend.set_online(true);
        let report = store.flush_pending();
        assert_eq!(report.flushed, 1);
        assert_eq!(report.remaining, 0);
        assert_eq!(backend.triple_count().expect("count"), 1);
    }

    /// Sleeps before persisting `v=slow` and refuses `v=fail`.
    struct StallingBackend {
        inner: MemoryBackend,
    }

    impl TripleBackend for StallingBackend {
        fn upsert_triple(&self, triple: &Triple) -> Result<(), FactgraphError> {
            match triple.metadata.get("v").map(String::as_str) {
                Some("slow") => std::thread::sleep(Duration::from_millis(300)),
                Some("fail") => {
                    return Err(FactgraphError::BackendUnavailable("refused".to_string()));
                }
                _ => {}
            }
            self.inner.upsert_triple(triple)
        }

        fn load_triples(&self) -> Result<Vec<Triple>, FactgraphError> {
            self.inner.load_triples()
        }

        fn triple_count(&self) -> Result<usize, FactgraphError> {
            self.inner.triple_count()
        }
    }

    fn stalling() -> (Arc<StallingBackend>, Arc<FactStore>) {
        let backend = Arc::new(StallingBackend {
            inner: MemoryBackend::new(),
        });
        let store = Arc::new(FactStore::new(backend.clone()));
        (backend, store)
    }

    fn durable_v(backend: &StallingBackend) -> Option<String> {
        backend
            .load_triples()
            .expect("load")
            .first()
            .and_then(|t| t.metadata.get("v").cloned())
    }

    fn memory_v(store: &FactStore) -> Option<String> {
        store.all().first().and_then(|t| t.metadata.get("v").cloned())
    }

    #[test]
    fn racing_writers_leave_latest_value_durable() {
        let (backend, store) = stalling();

        let slow = {
            let store = store.clone();
            std::thread::spawn(move || {
                store.add_triple("git:a", "links", "git:b", meta("v", "slow"))
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        let fast = store
            .add_triple("git:a", "links", "git:b", meta("v", "2"))
            .expect("add");
        let slow = slow.join().expect("join").expect("add");

        assert!(slow.persistence.is_durable());
        assert!(fast.persistence.is_durable());
        assert!(store.pending_keys().is_empty());
        assert_eq!(memory_v(&store).as_deref(), Some("2"));
        assert_eq!(durable_v(&backend).as_deref(), Some("2"));

        let reopened = FactStore::open(backend).expect("open");
        assert_eq!(memory_v(&reopened).as_deref(), Some("2"));
    }

    #[test]
    fn flush_does_not_drop_a_newer_failed_write() {
        let (backend, store) = stalling();
        backend.inner.set_online(false);
        store
            .add_triple("git:a", "links", "git:b", meta("v", "slow"))
            .expect("add");
        assert_eq!(store.pending_keys().len(), 1);
        backend.inner.set_online(true);

        let flusher = {
            let store = store.clone();
            std::thread::spawn(move || store.flush_pending())
        };
        std::thread::sleep(Duration::from_millis(50));
        let newer = store
            .add_triple("git:a", "links", "git:b", meta("v", "fail"))
            .expect("add");
        let report = flusher.join().expect("join");

        assert_eq!(report.flushed, 1);
        assert!(!newer.persistence.is_durable());
        assert_eq!(memory_v(&store).as_deref(), Some("fail"));
        assert_eq!(durable_v(&backend).as_deref(), Some("slow"));
        assert_eq!(store.pending_keys().len(), 1);
    }

    #[test]
    fn concurrent_writers_readers_and_flushes_converge() {
        let backend = Arc::new(MemoryBackend::new());
        let store = FactStore::new(backend.clone());
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let writers: Vec<_> = (0..8)
                .map(|t| {
                    let store = &store;
                    scope.spawn(move || {
                        for round in ["1", "2"] {
                            for i in 0..40 {
                                let subject = format!("w{}:k{}", t, i);
                                store
                                    .add_triple(&subject, "links", "git:hub", meta("v", round))
                                    .expect("add");
                            }
                        }
                    })
                })
                .collect();

            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let _ = store.query("?s", "links", "git:hub").expect("query");
                    let hub = Ref::parse("git:hub").expect("ref");
                    let _ = store.query_by_object(&hub, None);
                }
            });
            scope.spawn(|| {
                let mut online = false;
                while !done.load(Ordering::SeqCst) {
                    backend.set_online(online);
                    online = !online;
                    store.flush_pending();
                    std::thread::sleep(Duration::from_millis(1));
                }
            });

            for writer in writers {
                writer.join().expect("writer");
            }
            done.store(true, Ordering::SeqCst);
        });

        backend.set_online(true);
        let report = store.flush_pending();
        assert_eq!(report.remaining, 0);

        assert_eq!(store.len(), 320);
        assert!(store.pending_keys().is_empty());
        let all = store.all();
        assert!(all.iter().all(|t| t.metadata.get("v").map(String::as_str) == Some("2")));
        assert_eq!(backend.load_triples().expect("load"), all);
        assert_eq!(store.query("?s", "links", "git:hub").expect("query").len(), 320);
    }

    #[test]
    fn open_warm_loads() {
        let (backend, store) = store();
        store
            .add_triple("git:a", "links", "git:b", Metadata::new())
            .expect("add");

        let reopened = FactStore::open(backend).expect("open");
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.stats().objects, 1);
        assert_eq!(reopened.stats().pending, 0);
    }
}
