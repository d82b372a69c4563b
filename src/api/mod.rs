//! Crate surface: load, merge and write.
//!
//! Every function here works on byte buffers and returns values or explicit
//! errors; none of them touches the filesystem or the console.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_merge::api::{load_documents, merge_documents, write_document};
//! use pdf_merge::merge::MergeSource;
//!
//! let inputs = vec![std::fs::read("a.pdf")?, std::fs::read("b.pdf")?];
//! let mut docs = load_documents(inputs)?.into_iter();
//! let a = docs.next().unwrap();
//! let b = docs.next().unwrap();
//!
//! let mut merged = merge_documents(vec![
//!     MergeSource::pages(a, vec![0, 2]),
//!     MergeSource::all(b),
//! ])?;
//! for warning in merged.warnings() {
//!     eprintln!("warning: {}", warning);
//! }
//! std::fs::write("merged.pdf", write_document(&mut merged)?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::document::Document;
use crate::error::Result;
use crate::merge::{merge, MergeOptions, MergeSource};
use crate::parser_config::ParserOptions;
use bytes::Bytes;
use rayon::prelude::*;

pub use crate::writer::write_document;

/// Load one document with lenient defaults.
///
/// # Errors
///
/// [`crate::Error::MalformedSyntax`], [`crate::Error::PasswordRequired`] and
/// [`crate::Error::UnsupportedEncryption`] among others; see
/// [`Document::load`].
pub fn load_document(bytes: impl Into<Bytes>) -> Result<Document> {
    Document::load(bytes, &ParserOptions::default())
}

/// Load one document with explicit parser options.
pub fn load_document_with_options(bytes: impl Into<Bytes>, options: &ParserOptions) -> Result<Document> {
    Document::load(bytes, options)
}

/// Load independent sources in parallel.
///
/// Results come back in input order. When several inputs fail, the error of
/// the earliest one is returned.
pub fn load_documents(inputs: Vec<Vec<u8>>) -> Result<Vec<Document>> {
    load_documents_with_options(inputs, &ParserOptions::default())
}

/// [`load_documents`] with explicit parser options.
pub fn load_documents_with_options(inputs: Vec<Vec<u8>>, options: &ParserOptions) -> Result<Vec<Document>> {
    log::debug!("Loading {} sources", inputs.len());
    let results: Vec<Result<Document>> = inputs
        .into_par_iter()
        .map(|bytes| Document::load(bytes, options))
        .collect();
    results.into_iter().collect()
}

/// Merge sources with default options.
pub fn merge_documents(sources: Vec<MergeSource>) -> Result<Document> {
    merge(sources, &MergeOptions::default())
}

/// Merge sources with explicit options.
///
/// # Errors
///
/// [`crate::Error::InvalidPageIndex`], [`crate::Error::CyclicPageTree`],
/// [`crate::Error::CyclicReference`] or [`crate::Error::DanglingReference`].
/// Nothing is produced on error.
pub fn merge_documents_with_options(sources: Vec<MergeSource>, options: &MergeOptions) -> Result<Document> {
    merge(sources, options)
}
