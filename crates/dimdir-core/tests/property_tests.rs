//! # Property-Based Tests
//!
//! Dedup, ordering, addressing and relation invariants checked with proptest
//! over the in-memory backend.

use dimdir_core::{
    DocumentIndex, EntityKind, FormulaValue, NewDocument, NoCells, parse_address,
};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn sentence() -> impl Strategy<Value = String> {
    vec("[a-z]{1,8}", 1..4).prop_map(|words| format!("{} end.", words.join(" ")))
}

fn ingest(index: &DocumentIndex, content: &str, long_id: &str) -> dimdir_core::IngestReport {
    index
        .ingest_document(NewDocument {
            content: content.to_string(),
            long_id: long_id.to_string(),
            ..NewDocument::default()
        })
        .expect("ingest")
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Re-ingesting the same content creates nothing new.
    #[test]
    fn ingest_is_idempotent(sentences in vec(sentence(), 1..6)) {
        let index = DocumentIndex::in_memory();
        let content = sentences.join(" ");

        let first = ingest(&index, &content, "A");
        let before = index.status().expect("status");
        let second = ingest(&index, &content, "A");
        let after = index.status().expect("status");

        prop_assert_eq!(first.document_id, second.document_id);
        prop_assert!(!second.is_new);
        prop_assert_eq!(before, after);
    }

    /// Distinct normalized sentences map to distinct units, equal ones share.
    #[test]
    fn one_unit_per_distinct_sentence(sentences in vec(sentence(), 1..8)) {
        let index = DocumentIndex::in_memory();
        ingest(&index, &sentences.join(" "), "A");

        let distinct: BTreeSet<&String> = sentences.iter().collect();
        prop_assert_eq!(index.status().expect("status").sentences, distinct.len());
    }

    /// Occurrence positions run 0..n and each resolves to its own text.
    #[test]
    fn positions_are_contiguous(sentences in vec(sentence(), 1..8)) {
        let index = DocumentIndex::in_memory();
        let report = ingest(&index, &sentences.join(" "), "A");

        let positions: Vec<u32> = report.sentences.iter().map(|s| s.position).collect();
        let expected: Vec<u32> = (0..sentences.len() as u32).collect();
        prop_assert_eq!(positions, expected);

        for (i, text) in sentences.iter().enumerate() {
            let res = index
                .resolve(&format!("{}-{i}", report.address), None)
                .expect("resolve");
            prop_assert_eq!(res.kind, Some(EntityKind::Sentence));
            prop_assert_eq!(res.content.as_deref(), Some(text.as_str()));
        }
    }

    /// Attribute suffixes parse back into the canonical base and pairs.
    #[test]
    fn address_attributes_round_trip(
        levels in vec("[a-z0-9]{1,6}", 1..5),
        attrs in btree_map("[a-z]{1,6}", "[a-z0-9]{1,6}", 0..4),
    ) {
        let base = levels.join("-");
        let suffix: String = attrs.iter().map(|(k, v)| format!("_{k}={v}")).collect();
        let parsed = parse_address(&format!("{base}{suffix}")).expect("parse");

        prop_assert_eq!(parsed.canonical, base);
        prop_assert_eq!(parsed.attributes, attrs);
    }

    /// Linking the same triple repeatedly stores one edge.
    #[test]
    fn relation_upsert_is_idempotent(repeats in 1usize..6) {
        let index = DocumentIndex::in_memory();
        let report = ingest(&index, "alpha end. beta end.", "A");
        let source = format!("{}-0", report.address);
        let target = format!("{}-1", report.address);

        for i in 0..repeats {
            let outcome = index.link(&source, &target, "next").expect("link");
            prop_assert_eq!(outcome.created, i == 0);
        }
        let id = index.endpoint(&source).expect("endpoint");
        prop_assert_eq!(index.related_count(id, None).expect("count"), 1);
    }

    /// `rel.count` agrees with the related list for any edge set.
    #[test]
    fn rel_count_matches_related(edges in vec((0usize..4, 0usize..3), 0..12)) {
        let index = DocumentIndex::in_memory();
        let report = ingest(
            &index,
            "zero end. one end. two end. three end. four end.",
            "A",
        );
        let types = ["cites", "translation", "see_also"];
        let source = format!("{}-0", report.address);
        for (target, ty) in &edges {
            let target = format!("{}-{}", report.address, target + 1);
            index.link(&source, &target, types[*ty]).expect("link");
        }

        let id = index.endpoint(&source).expect("endpoint");
        let listed = index.related(id, None).expect("related").len();
        let counted = index
            .evaluate(&format!("=rel.count({source})"), &NoCells, None)
            .expect("evaluate");
        prop_assert_eq!(counted, FormulaValue::Int(listed as i64));

        let distinct: BTreeSet<_> = edges.iter().collect();
        prop_assert_eq!(listed, distinct.len());
    }
}
