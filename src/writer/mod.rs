//! PDF writing module.
//!
//! ## Architecture
//!
//! ```text
//! Document (merged or loaded)
//!     ↓
//! [write_document] (ascending object order, drops encryption artifacts)
//!     ↓
//! [PdfWriter] (header, offsets, xref table, trailer)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! PDF bytes
//! ```
//!
//! ## Example
//!
//! ```
//! use pdf_merge::document::Document;
//! use pdf_merge::writer::write_document;
//!
//! let mut doc = Document::new_destination();
//! let bytes = write_document(&mut doc)?;
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! # Ok::<(), pdf_merge::Error>(())
//! ```

mod object_serializer;
mod pdf_writer;

pub use object_serializer::ObjectSerializer;
pub use pdf_writer::{write_document, write_document_with_config, PdfWriter, PdfWriterConfig};
