//! # N-Triples Export Module
//!
//! Deterministic line-oriented snapshots of the fact store:
//!
//! ```text
//! <git:commit> <analyzedBy> <copilot:code_review> .
//! ```
//!
//! Lines are sorted by key, one fact per line. This is not RDF-compliant
//! (no literal escaping, metadata is not exported); it exists for snapshots
//! and debugging. `parse_ntriples` reads back what `export_ntriples` writes.

use crate::{FactgraphError, Triple};

/// Maximum number of lines accepted by `parse_ntriples`.
///
/// Prevents memory exhaustion from oversized or corrupted snapshots.
pub const MAX_IMPORT_LINES: usize = 1_000_000;

/// Serialize facts as sorted `<s> <p> <o> .` lines.
#[must_use]
pub fn export_ntriples(triples: &[Triple]) -> String {
    let mut lines: Vec<String> = triples
        .iter()
        .map(|t| format!("<{}> <{}> <{}> .", t.subject, t.predicate, t.object))
        .collect();
    lines.sort();
    lines.dedup();

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Take one `<...>` term off the front of `rest`.
fn take_term(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim_start().strip_prefix('<')?;
    let end = rest.find('>')?;
    Some((&rest[..end], &rest[end + 1..]))
}

fn parse_line(line: &str) -> Option<(&str, &str, &str)> {
    let (subject, rest) = take_term(line)?;
    let (predicate, rest) = take_term(rest)?;
    let (object, rest) = take_term(rest)?;
    (rest.trim() == ".").then_some((subject, predicate, object))
}

/// Parse a snapshot. Blank lines and `#` comments are skipped; any other
/// malformed line fails the whole parse with its line number.
pub fn parse_ntriples(input: &str) -> Result<Vec<Triple>, FactgraphError> {
    let mut triples = Vec::new();

    for (n, line) in input.lines().enumerate() {
        if n >= MAX_IMPORT_LINES {
            return Err(FactgraphError::DeserializationError(format!(
                "snapshot exceeds {} lines",
                MAX_IMPORT_LINES
            )));
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line_no = n.saturating_add(1);
        let (s, p, o) = parse_line(line).ok_or_else(|| {
            FactgraphError::DeserializationError(format!("line {}: expected '<s> <p> <o> .'", line_no))
        })?;
        let triple = Triple::parse(s, p, o).map_err(|e| {
            FactgraphError::DeserializationError(format!("line {}: {}", line_no, e))
        })?;
        triples.push(triple);
    }

    Ok(triples)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::parse(s, p, o).expect("triple")
    }

    #[test]
    fn export_is_sorted_and_terminated() {
        let out = export_ntriples(&[
            t("gaming:npc", "hasDialogue", "visual:dialogue_tree"),
            t("git:commit", "analyzedBy", "copilot:code_review"),
        ]);
        assert_eq!(
            out,
            "<gaming:npc> <hasDialogue> <visual:dialogue_tree> .\n\
             <git:commit> <analyzedBy> <copilot:code_review> .\n"
        );
        assert_eq!(export_ntriples(&[]), "");
    }

    #[test]
    fn parse_reads_export_back() {
        let facts = vec![
            t("git:commit", "analyzedBy", "copilot:code_review"),
            t("visual:tree:root", "contains", "visual:tree:leaf"),
        ];
        let parsed = parse_ntriples(&export_ntriples(&facts)).expect("parse");
        let mut keys: Vec<_> = parsed.iter().map(Triple::key).collect();
        keys.sort();
        let mut expected: Vec<_> = facts.iter().map(Triple::key).collect();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn punctuated_ids_survive_a_snapshot() {
        let facts = vec![
            t("doc:release notes #4", "cites", "url:https://host/a.b?c=d"),
            t("doc: leading", "cites", "doc:trailing "),
            t("doc:x@y.z", "seeAlso", "doc:caf\u{e9} / \u{1f600}"),
        ];
        let mut parsed = parse_ntriples(&export_ntriples(&facts)).expect("parse");
        parsed.sort_by_key(Triple::key);
        let mut expected = facts;
        expected.sort_by_key(Triple::key);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn snapshot_delimiters_never_enter_a_fact() {
        assert!(Triple::parse("doc:a>b", "p", "doc:c").is_err());
        assert!(Triple::parse("doc:a", "p", "doc:c\n<x:y> <p> <z:w> .").is_err());
        assert!(Triple::parse("doc:a", "p<", "doc:c").is_err());
    }

    #[test]
    fn parse_skips_comments_and_rejects_garbage() {
        let ok = parse_ntriples("# snapshot\n\n<a:b> <p> <c:d> .\n").expect("parse");
        assert_eq!(ok.len(), 1);

        let err = parse_ntriples("<a:b> <p> <c:d> .\n<a:b> <p>\n").expect_err("bad line");
        assert!(err.to_string().contains("line 2"));

        assert!(parse_ntriples("<nonamespace> <p> <c:d> .").is_err());
    }
}
