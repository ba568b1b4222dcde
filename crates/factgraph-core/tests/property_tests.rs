//! # Property-Based Tests
//!
//! Fact store invariants checked with proptest:
//! - upsert idempotence
//! - forward/inverse index consistency
//! - deterministic export that reads back to the same keys
//! - snapshot delimiters rejected at validation

use factgraph_core::{
    FactStore, MemoryBackend, Metadata, Predicate, Ref, Triple, TripleKey, parse_ntriples,
};
use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn store() -> FactStore {
    FactStore::new(Arc::new(MemoryBackend::new()))
}

fn ref_strategy() -> impl Strategy<Value = String> {
    ("[a-zA-Z0-9_.-]{1,6}", "[a-zA-Z0-9_:./#@=?é -]{1,10}")
        .prop_map(|(ns, id)| format!("{}:{}", ns, id))
}

fn predicate_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z]{0,10}"
}

fn fact_strategy() -> impl Strategy<Value = (String, String, String)> {
    (ref_strategy(), predicate_strategy(), ref_strategy())
}

proptest! {
    /// Adding the same key twice keeps one fact carrying the latest metadata.
    #[test]
    fn upsert_is_idempotent(
        (s, p, o) in fact_strategy(),
        first in "[a-z]{1,5}",
        second in "[a-z]{1,5}",
    ) {
        let store = store();
        let mut m1 = Metadata::new();
        m1.insert("v".into(), first);
        let mut m2 = Metadata::new();
        m2.insert("v".into(), second.clone());

        store.add_triple(&s, &p, &o, m1).expect("add");
        let subject = Ref::parse(&s).expect("ref");
        let before = store.query_by_subject(&subject, None).len();
        store.add_triple(&s, &p, &o, m2).expect("add");

        let after = store.query_by_subject(&subject, None);
        prop_assert_eq!(after.len(), before);
        prop_assert_eq!(store.len(), 1);
        prop_assert_eq!(after[0].metadata.get("v"), Some(&second));
    }

    /// Every added fact is reachable from both ends.
    #[test]
    fn inverse_index_consistent(facts in vec(fact_strategy(), 1..40)) {
        let store = store();
        for (s, p, o) in &facts {
            store.add_triple(s, p, o, Metadata::new()).expect("add");
        }

        for (s, p, o) in &facts {
            let subject = Ref::parse(s).expect("ref");
            let object = Ref::parse(o).expect("ref");
            let predicate = Predicate::new(p.as_str()).expect("predicate");

            prop_assert!(store
                .query_by_object(&object, Some(&predicate))
                .iter()
                .any(|t| t.subject == subject));
            prop_assert!(store
                .query_by_subject(&subject, Some(&predicate))
                .iter()
                .any(|t| t.object == object));
        }

        let distinct: BTreeSet<_> = facts.iter().collect();
        prop_assert_eq!(store.len(), distinct.len());
    }

    /// Insertion order does not change the export, and the export reads back.
    #[test]
    fn export_is_order_independent(facts in vec(fact_strategy(), 1..30)) {
        let forward = store();
        let reverse = store();
        for (s, p, o) in &facts {
            forward.add_triple(s, p, o, Metadata::new()).expect("add");
        }
        for (s, p, o) in facts.iter().rev() {
            reverse.add_triple(s, p, o, Metadata::new()).expect("add");
        }

        let snapshot = forward.export_ntriples();
        prop_assert_eq!(&snapshot, &reverse.export_ntriples());

        let parsed = parse_ntriples(&snapshot).expect("parse");
        let read_back: BTreeSet<TripleKey> = parsed.iter().map(Triple::key).collect();
        let stored: BTreeSet<TripleKey> = forward.all().iter().map(Triple::key).collect();
        prop_assert_eq!(parsed.len(), forward.len());
        prop_assert_eq!(read_back, stored);
    }

    /// Ids carrying `<`, `>` or a control character never become facts.
    #[test]
    fn snapshot_delimiters_rejected(
        (s, p, o) in fact_strategy(),
        bad in prop_oneof![Just('<'), Just('>'), Just('\n'), Just('\r'), Just('\t'), Just('\u{0}')],
        at in 0usize..3,
    ) {
        let poisoned = |raw: &str| format!("{}{}", raw, bad);
        let result = match at {
            0 => Triple::parse(&poisoned(&s), &p, &o),
            1 => Triple::parse(&s, &poisoned(&p), &o),
            _ => Triple::parse(&s, &p, &poisoned(&o)),
        };
        prop_assert!(result.is_err());

        let store = store();
        prop_assert!(store.add_triple(&poisoned(&s), &p, &o, Metadata::new()).is_err());
        prop_assert!(store.is_empty());
    }

    /// A free subject with a bound predicate binds exactly the matching facts.
    #[test]
    fn predicate_pattern_matches_scan(facts in vec(fact_strategy(), 1..30)) {
        let store = store();
        for (s, p, o) in &facts {
            store.add_triple(s, p, o, Metadata::new()).expect("add");
        }

        let (_, p, _) = &facts[0];
        let rows = store.query("?s", p, "?o").expect("query");
        let predicate = Predicate::new(p.as_str()).expect("predicate");
        prop_assert_eq!(rows.len(), store.query_by_predicate(&predicate).len());
    }
}
