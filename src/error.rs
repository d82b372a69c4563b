//! Error and warning types for the merge core.
//!
//! Fatal conditions are [`Error`] values propagated with `?`. Recoverable
//! conditions are [`Warning`] values collected on the document that hit them
//! and handed back next to the successful result.

use crate::object::ObjectRef;
use serde::Serialize;

/// Result type alias for PDF library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during PDF processing.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Bytes at `offset` could not be parsed as the expected token class
    #[error("Malformed syntax at byte {offset}: expected {expected}")]
    MalformedSyntax {
        /// Absolute byte offset where parsing failed
        offset: usize,
        /// Token class the parser was looking for
        expected: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Reference to an object that is free or absent from the xref table
    #[error("Dangling reference: {0}")]
    DanglingReference(ObjectRef),

    /// Reference chain longer than the configured depth
    #[error("Cyclic reference chain starting at {0}")]
    CyclicReference(ObjectRef),

    /// Page tree node that is its own transitive ancestor
    #[error("Cyclic page tree at node {0}")]
    CyclicPageTree(ObjectRef),

    /// Page selector names a page that does not exist or names one twice
    #[error("Invalid page index {index} for source {source_index} ({page_count} pages): {reason}")]
    InvalidPageIndex {
        /// Position of the offending source in the merge input
        source_index: usize,
        /// Requested 0-based page index
        index: usize,
        /// Number of pages in that source
        page_count: usize,
        /// Why the index was rejected
        reason: String,
    },

    /// The document can only be opened with a non-empty user password
    #[error("Document is encrypted and requires a password")]
    PasswordRequired,

    /// Security handler, revision or crypt filter method is not supported
    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// Ciphertext could not be decrypted (bad padding, truncated IV)
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),
}

impl Error {
    /// Shorthand for [`Error::MalformedSyntax`].
    pub fn malformed(offset: usize, expected: impl Into<String>) -> Self {
        Error::MalformedSyntax {
            offset,
            expected: expected.into(),
        }
    }
}

/// Recoverable condition recorded while loading or merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Stream `/Length` disagreed with the real `endstream` position
    LengthMismatch {
        /// Object owning the stream, when known
        object: Option<ObjectRef>,
        /// Length declared in the stream dictionary
        declared: usize,
        /// Length up to the real `endstream` keyword
        actual: usize,
    },
    /// The cross-reference table was rebuilt by scanning the file
    ReconstructedXref {
        /// Number of object definitions found by the scan
        objects: usize,
    },
    /// A cross-reference section could not be read
    BrokenXrefSection {
        /// Offset the section was expected at
        offset: usize,
        /// Parser message
        reason: String,
    },
    /// Page tree node skipped because its type does not fit its position
    SkippedPageNode {
        /// The skipped node
        node: ObjectRef,
        /// Why it was skipped
        reason: String,
    },
    /// Reference to an unselected source page replaced with `null`
    DroppedPageLink {
        /// Source document position in the merge input
        source_index: usize,
        /// Referenced page-tree node in the source
        target: ObjectRef,
    },
    /// An object listed in the xref table could not be read
    UnreadableObject {
        /// The object
        object: ObjectRef,
        /// Parser message
        reason: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::LengthMismatch {
                object,
                declared,
                actual,
            } => match object {
                Some(obj) => write!(
                    f,
                    "stream {} declares /Length {} but endstream is at {}",
                    obj, declared, actual
                ),
                None => write!(f, "stream declares /Length {} but endstream is at {}", declared, actual),
            },
            Warning::ReconstructedXref { objects } => {
                write!(f, "cross-reference table reconstructed from {} objects", objects)
            },
            Warning::BrokenXrefSection { offset, reason } => {
                write!(f, "xref section at byte {} unreadable: {}", offset, reason)
            },
            Warning::SkippedPageNode { node, reason } => {
                write!(f, "skipped page tree node {}: {}", node, reason)
            },
            Warning::DroppedPageLink {
                source_index,
                target,
            } => write!(
                f,
                "source {}: reference to unselected page node {} replaced with null",
                source_index, target
            ),
            Warning::UnreadableObject { object, reason } => {
                write!(f, "object {} unreadable: {}", object, reason)
            },
        }
    }
}
