//! # Index Benchmarks
//!
//! Ingestion, resolution and formula throughput on the in-memory backend.
//!
//! Run with: `cargo bench -p dimdir-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dimdir_core::{CellMap, DocumentIndex, IngestReport, NewDocument, parse_formula};
use std::hint::black_box;

/// A document of `sentences` sentences, roughly half of them repeated.
fn document(sentences: usize, salt: usize) -> String {
    (0..sentences)
        .map(|i| {
            if i % 2 == 0 {
                format!("Shared sentence number {} is here.", i / 2)
            } else {
                format!("Unique sentence {i} of document {salt}.")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn ingest(index: &DocumentIndex, content: String) -> IngestReport {
    index
        .ingest_document(NewDocument {
            content,
            long_id: "bench".to_string(),
            ..NewDocument::default()
        })
        .expect("ingest")
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let index = DocumentIndex::in_memory();
                black_box(ingest(&index, document(size, 0)))
            });
        });
    }

    group.finish();
}

fn bench_ingest_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_dedup");

    for size in [10, 100].iter() {
        let index = DocumentIndex::in_memory();
        ingest(&index, document(*size, 0));
        let mut salt = 1;
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                salt += 1;
                black_box(ingest(&index, document(size, salt)))
            });
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    let index = DocumentIndex::in_memory();
    let report = ingest(&index, document(100, 0));
    let sentence = report.sentences[10].id;
    let addresses = [
        ("registered", format!("{}-50", report.address)),
        ("dotted", format!("{}-10.1", report.address)),
        ("token", format!("{sentence}-2")),
        ("id", sentence.to_string()),
    ];

    for (name, addr) in &addresses {
        group.bench_with_input(BenchmarkId::from_parameter(name), addr, |b, addr| {
            b.iter(|| black_box(index.resolve(addr, None).expect("resolve")));
        });
    }

    group.finish();
}

fn bench_formula(c: &mut Criterion) {
    let index = DocumentIndex::in_memory();
    let report = ingest(&index, document(20, 0));
    let source = format!("{}-0", report.address);
    for i in 1..20 {
        index
            .link(&source, &format!("{}-{i}", report.address), "next")
            .expect("link");
    }
    let cells = CellMap::from_pairs([("A1", source.as_str())]).expect("cells");

    c.bench_function("parse_formula", |b| {
        b.iter(|| black_box(parse_formula("=rel.count(uuid(A1), \"next\")")));
    });
    c.bench_function("evaluate_rel_all", |b| {
        b.iter(|| black_box(index.evaluate("=rel.all(A1, \"next\")", &cells, None)));
    });
}

criterion_group!(
    benches,
    bench_ingest,
    bench_ingest_dedup,
    bench_resolve,
    bench_formula,
);

criterion_main!(benches);
