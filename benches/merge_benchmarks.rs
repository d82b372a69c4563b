//! Benchmarks for the load / merge / write pipeline.
//!
//! Inputs are generated in memory: each document has one shared font and
//! one content stream per page, so the merge exercises deduplication.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pdf_merge::{load_document, load_documents, merge_documents, write_document, MergeSource};
use std::hint::black_box;

// =============================================================================
// Test Data Generation
// =============================================================================

/// Classic-xref PDF with `pages` pages sharing one font.
fn generate_pdf(pages: usize) -> Vec<u8> {
    let mut bodies = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        String::new(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    let mut kids = Vec::with_capacity(pages);
    for i in 0..pages {
        let page = bodies.len() + 1;
        kids.push(format!("{} 0 R", page));
        bodies.push(format!(
            "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            page + 1
        ));
        let content = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", i);
        bodies.push(format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content));
    }
    bodies[1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 612 792] >>",
        kids.join(" "),
        pages
    );

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(bodies.len());
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", bodies.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            bodies.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    out
}

/// The same file with its `startxref` cut off, forcing reconstruction.
fn generate_broken_pdf(pages: usize) -> Vec<u8> {
    let mut bytes = generate_pdf(pages);
    if let Some(at) = bytes.windows(9).rposition(|w| w == b"startxref") {
        bytes.truncate(at);
    }
    bytes
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    for pages in [10, 100, 1000] {
        let bytes = generate_pdf(pages);
        group.bench_with_input(BenchmarkId::new("xref", pages), &bytes, |b, bytes| {
            b.iter(|| {
                let mut doc = load_document(black_box(bytes.clone())).unwrap();
                black_box(doc.page_count().unwrap())
            })
        });

        let broken = generate_broken_pdf(pages);
        group.bench_with_input(BenchmarkId::new("reconstructed", pages), &broken, |b, bytes| {
            b.iter(|| {
                let mut doc = load_document(black_box(bytes.clone())).unwrap();
                black_box(doc.page_count().unwrap())
            })
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for sources in [2, 8] {
        let inputs: Vec<Vec<u8>> = (0..sources).map(|_| generate_pdf(100)).collect();
        group.bench_with_input(BenchmarkId::new("sources_x100_pages", sources), &inputs, |b, inputs| {
            b.iter(|| {
                let docs = load_documents(inputs.clone()).unwrap();
                let merged = merge_documents(docs.into_iter().map(MergeSource::all).collect()).unwrap();
                black_box(merged)
            })
        });
    }
    group.finish();
}

fn bench_write(c: &mut Criterion) {
    let inputs: Vec<Vec<u8>> = (0..4).map(|_| generate_pdf(250)).collect();
    c.bench_function("write_1000_pages", |b| {
        b.iter(|| {
            let docs = load_documents(inputs.clone()).unwrap();
            let mut merged = merge_documents(docs.into_iter().map(MergeSource::all).collect()).unwrap();
            black_box(write_document(&mut merged).unwrap())
        })
    });
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn bench_all(c: &mut Criterion) {
    init_logging();
    bench_load(c);
    bench_merge(c);
    bench_write(c);
}

criterion_group!(benches, bench_all);
criterion_main!(benches);
