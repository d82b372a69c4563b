//! Incremental updates and cross-reference reconstruction.

mod common;

use common::{append_update, labelled_pdf, PdfBuilder};
use pdf_merge::{
    load_document, load_document_with_options, merge_documents, write_document, MergeSource, Object, ObjectRef,
    ParserOptions, Warning,
};

fn base_font(doc: &mut pdf_merge::Document, number: u32) -> String {
    let dict = doc.resolve_dict(ObjectRef::new(number, 0)).unwrap();
    dict["BaseFont"].as_name().unwrap().to_string()
}

// ============================================================================
// /Prev chains
// ============================================================================

#[test]
fn test_incremental_update_overrides_object() {
    let base = labelled_pdf("A", 1);
    let updated = append_update(base, &[(3, "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>")], 12);

    let mut doc = load_document(updated).unwrap();
    assert_eq!(base_font(&mut doc, 3), "Courier");
    assert!(doc.warnings().is_empty());
}

#[test]
fn test_newest_update_wins() {
    let base = labelled_pdf("A", 1);
    let first = append_update(base, &[(3, "<< /Type /Font /BaseFont /Courier >>")], 12);
    let second = append_update(first, &[(3, "<< /Type /Font /BaseFont /Symbol >>")], 12);

    let mut doc = load_document(second).unwrap();
    assert_eq!(base_font(&mut doc, 3), "Symbol");
    // untouched objects still come from the original section
    assert_eq!(doc.page_count().unwrap(), 1);
}

#[test]
fn test_update_adds_page() {
    let base = labelled_pdf("A", 1);
    let updated = append_update(
        base,
        &[
            (2, "<< /Type /Pages /Kids [10 0 R 20 0 R] /Count 2 /MediaBox [0 0 612 792] >>"),
            (20, "<< /Type /Page /Parent 2 0 R /Label (A-new) >>"),
        ],
        21,
    );

    let doc = load_document(updated).unwrap();
    let mut merged = merge_documents(vec![MergeSource::all(doc)]).unwrap();
    assert_eq!(merged.page_count().unwrap(), 2);
    let last = merged.pages().unwrap()[1];
    assert_eq!(
        merged.resolve_dict(last).unwrap()["Label"],
        Object::String(b"A-new".to_vec())
    );
}

// ============================================================================
// Reconstruction
// ============================================================================

#[test]
fn test_missing_startxref_reconstructs_and_merges() {
    let mut bytes = labelled_pdf("R", 2);
    let at = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    bytes.truncate(at);

    let doc = load_document(bytes).unwrap();
    assert!(doc
        .warnings()
        .iter()
        .any(|w| matches!(w, Warning::ReconstructedXref { .. })));

    let other = load_document(labelled_pdf("B", 1)).unwrap();
    let mut merged = merge_documents(vec![MergeSource::all(doc), MergeSource::all(other)]).unwrap();
    assert_eq!(merged.page_count().unwrap(), 3);
    assert!(merged
        .warnings()
        .iter()
        .any(|w| matches!(w, Warning::ReconstructedXref { .. })));

    let out = write_document(&mut merged).unwrap();
    let mut reloaded = load_document(out).unwrap();
    assert_eq!(reloaded.page_count().unwrap(), 3);
    assert!(reloaded.warnings().is_empty());
}

#[test]
fn test_corrupted_startxref_offset() {
    let bytes = labelled_pdf("R", 1);
    let text = String::from_utf8_lossy(&bytes).to_string();
    let at = text.rfind("startxref\n").unwrap() + "startxref\n".len();
    let mut broken = bytes[..at].to_vec();
    broken.extend_from_slice(b"999999\n%%EOF\n");

    let mut doc = load_document(broken.clone()).unwrap();
    assert_eq!(doc.page_count().unwrap(), 1);
    assert!(load_document_with_options(broken, &ParserOptions::strict()).is_err());
}

#[test]
fn test_xref_table_shifted_by_leading_garbage() {
    // Every offset is off by the length of the prefix.
    let mut bytes = b"garbage line\n".to_vec();
    bytes.extend_from_slice(&labelled_pdf("S", 2));

    let mut doc = load_document(bytes).unwrap();
    assert_eq!(doc.page_count().unwrap(), 2);
}

#[test]
fn test_wrong_stream_length_recovered() {
    let mut builder = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>");
    builder = builder.raw_object(4, 0, b"<< /Length 3 >>\nstream\n0 0 m 10 10 l S\nendstream".to_vec());
    let mut doc = load_document(builder.build()).unwrap();

    let content = doc.resolve(ObjectRef::new(4, 0)).unwrap();
    match content {
        Object::Stream { data, .. } => assert_eq!(&data[..], b"0 0 m 10 10 l S"),
        other => panic!("expected stream, got {:?}", other),
    }
    assert!(doc
        .warnings()
        .iter()
        .any(|w| matches!(w, Warning::LengthMismatch { declared: 3, .. })));
}
