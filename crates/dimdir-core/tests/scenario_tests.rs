//! # Scenario Tests
//!
//! End-to-end flows run against both backends:
//! - in-memory tables
//! - redb + filesystem blob tree in a temp dir

use dimdir_core::{
    CellMap, DimdirError, DocumentIndex, EntityKind, FormulaValue, IndexOptions, IngestReport,
    NewDocument, NoCells, SheetLayout,
};
use tempfile::TempDir;

/// Index plus the temp dir that must outlive it.
struct Backend {
    name: &'static str,
    index: DocumentIndex,
    _dir: Option<TempDir>,
}

fn backends() -> Vec<Backend> {
    let dir = TempDir::new().expect("tempdir");
    let on_disk = DocumentIndex::open(&IndexOptions {
        data_dir: dir.path().to_path_buf(),
        ..IndexOptions::default()
    })
    .expect("open");
    vec![
        Backend {
            name: "memory",
            index: DocumentIndex::in_memory(),
            _dir: None,
        },
        Backend {
            name: "redb",
            index: on_disk,
            _dir: Some(dir),
        },
    ]
}

fn ingest(index: &DocumentIndex, content: &str, long_id: &str) -> IngestReport {
    index
        .ingest_document(NewDocument {
            content: content.to_string(),
            long_id: long_id.to_string(),
            ..NewDocument::default()
        })
        .expect("ingest")
}

// =============================================================================
// DEDUP ACROSS DOCUMENTS
// =============================================================================

mod dedup {
    use super::*;

    #[test]
    fn shared_sentence_has_one_unit_and_two_occurrences() {
        for Backend { name, index, .. } in backends() {
            let d1 = ingest(&index, "Cats are mammals. Dogs are mammals.", "Zoo");
            let d2 = ingest(&index, "Dogs are mammals. Birds are mammals.", "Zoo");

            let dogs_1 = &d1.sentences[1];
            let dogs_2 = &d2.sentences[0];
            assert_eq!(dogs_1.id, dogs_2.id, "{name}");
            assert!(dogs_1.is_new, "{name}");
            assert!(!dogs_2.is_new, "{name}");
            assert_eq!(index.status().expect("status").sentences, 3, "{name}");

            let found = index
                .find_documents_with_sentence("Dogs  are mammals.")
                .expect("find");
            let places: Vec<_> = found.iter().map(|p| (p.document, p.position)).collect();
            assert_eq!(places.len(), 2, "{name}");
            assert!(places.contains(&(d1.document_id, 1)), "{name}");
            assert!(places.contains(&(d2.document_id, 0)), "{name}");

            let addresses = index
                .evaluate(&format!("=addr({})", dogs_1.id), &NoCells, None)
                .expect("evaluate");
            let items = match addresses {
                FormulaValue::List(items) => items,
                other => vec![other],
            };
            assert_eq!(items.len(), 2, "{name}");
            assert!(items.contains(&FormulaValue::Text(format!("doc:{}-1", d1.document_id))));
            assert!(items.contains(&FormulaValue::Text(format!("doc:{}-0", d2.document_id))));
        }
    }

    #[test]
    fn shared_sentence_is_tokenized_once() {
        for Backend { name, index, .. } in backends() {
            let d1 = ingest(&index, "Dogs are mammals.", "A");
            ingest(&index, "Dogs are mammals. Cats too.", "B");

            let sentence = index.sentence(d1.sentences[0].id).expect("sentence");
            assert_eq!(sentence.tokens.len(), 3, "{name}");
            assert_eq!(sentence.documents.len(), 2, "{name}");
            assert_eq!(index.search_by_token("mammals").expect("search").len(), 1, "{name}");
        }
    }
}

// =============================================================================
// FORMULA EVALUATION
// =============================================================================

mod formulas {
    use super::*;

    #[test]
    fn rel_through_cell_reference() {
        for Backend { name, index, .. } in backends() {
            let x = ingest(&index, "Good morning.", "English");
            let y = ingest(&index, "Bonjour.", "French");
            let source = format!("{}-0", x.address);
            let target = format!("{}-0", y.address);
            index.link(&source, &target, "translation").expect("link");

            let cells = CellMap::from_pairs([("A1", source.as_str())]).expect("cells");
            assert_eq!(
                index.evaluate("=rel(A1, \"translation\")", &cells, None),
                Ok(FormulaValue::Text("Bonjour.".into())),
                "{name}"
            );
            assert_eq!(
                index.evaluate("=rel(B2, \"translation\")", &cells, None),
                Err(DimdirError::AddressNotFound("B2".into())),
                "{name}"
            );
        }
    }

    #[test]
    fn sheet_layout_rows_follow_positions() {
        for Backend { name, index, .. } in backends() {
            let x = ingest(&index, "One. Two.", "English");
            let y = ingest(&index, "Une. Deux.", "French");
            index
                .link(&format!("{}-1", x.address), &format!("{}-1", y.address), "translation")
                .expect("link");

            let layout = SheetLayout::new().with_column(0, x.document_id);
            assert_eq!(
                index.evaluate("=rel(A2, \"translation\")", &layout, None),
                Ok(FormulaValue::Text("Deux.".into())),
                "{name}"
            );
        }
    }
}

// =============================================================================
// MAPPING ALIASES
// =============================================================================

mod mappings {
    use super::*;

    #[test]
    fn second_registration_keeps_first_short_id() {
        for Backend { name, index, .. } in backends() {
            let first = index
                .register_mapping("Report", Some("rep1"), None)
                .expect("register");
            let second = index
                .register_mapping("Report", Some("rep2"), None)
                .expect("register");

            assert!(first.created, "{name}");
            assert!(!second.created, "{name}");
            assert_eq!(second.mapping.short_id, "rep1", "{name}");
            assert!(index.mapping_by_short("rep2").expect("get").is_none(), "{name}");
            assert_eq!(
                index.mapping_registry().global_aliases().expect("aliases").get("Report"),
                Some(&"rep1".to_string()),
                "{name}"
            );
        }
    }

    #[test]
    fn ingest_with_new_short_id_keeps_existing_mapping() {
        for Backend { name, index, .. } in backends() {
            let a = index
                .ingest_document(NewDocument {
                    content: "First report.".into(),
                    long_id: "Report".into(),
                    short_id: Some("r".into()),
                    ..NewDocument::default()
                })
                .expect("ingest");
            let b = index
                .ingest_document(NewDocument {
                    content: "Second report.".into(),
                    long_id: "Report".into(),
                    short_id: Some("other".into()),
                    ..NewDocument::default()
                })
                .expect("ingest");
            assert_eq!(a.short_id, "r", "{name}");
            assert_eq!(b.short_id, "r", "{name}");
        }
    }
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn on_disk_index_survives_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let options = IndexOptions {
        data_dir: dir.path().to_path_buf(),
        ..IndexOptions::default()
    };

    let report = {
        let index = DocumentIndex::open(&options).expect("open");
        let report = ingest(&index, "Cats purr. Dogs bark.", "Pets");
        index
            .link(
                &format!("{}-0", report.address),
                &format!("{}-1", report.address),
                "contrast",
            )
            .expect("link");
        report
    };

    let index = DocumentIndex::open(&options).expect("reopen");
    let view = index.document(report.document_id).expect("document");
    assert_eq!(view.content.as_deref(), Some("Cats purr. Dogs bark."));
    assert_eq!(view.sentences.len(), 2);

    let res = index
        .resolve(&format!("{}-1", report.address), None)
        .expect("resolve");
    assert_eq!(res.kind, Some(EntityKind::Sentence));
    assert_eq!(res.content.as_deref(), Some("Dogs bark."));

    let source = index.endpoint(&format!("{}-0", report.address)).expect("endpoint");
    assert_eq!(index.related_count(source, Some("contrast")).expect("count"), 1);
    assert_eq!(index.mapping_by_long("Pets").expect("get").map(|m| m.long_id), Some("Pets".into()));
}

#[test]
fn unresolvable_link_endpoint() {
    for Backend { name, index, .. } in backends() {
        let report = ingest(&index, "Cats purr.", "Pets");
        let err = index
            .link(&format!("{}-0", report.address), "doc:nowhere-9", "see")
            .expect_err("missing endpoint");
        assert!(matches!(err, DimdirError::UnresolvedEndpoint(_)), "{name}");
    }
}
