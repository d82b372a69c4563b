//! PDF document writer.
//!
//! Assembles complete PDF files with proper structure: header, body, a
//! classic cross-reference table and trailer. Output is never encrypted;
//! objects read from an encrypted source are written as decrypted plain text.

use super::object_serializer::ObjectSerializer;
use crate::document::Document;
use crate::error::{Error, Result, Warning};
use crate::object::{Dictionary, Object, ObjectRef};
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::io::Write;

/// Configuration for PDF generation.
#[derive(Debug, Clone)]
pub struct PdfWriterConfig {
    /// One dictionary per line instead of one entry per line
    pub compact: bool,
    /// Write a trailer `/ID` derived from the body
    pub file_id: bool,
}

impl Default for PdfWriterConfig {
    fn default() -> Self {
        Self {
            compact: true,
            file_id: true,
        }
    }
}

impl PdfWriterConfig {
    /// Choose between compact and pretty object layout.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Enable or disable the trailer `/ID`.
    pub fn with_file_id(mut self, file_id: bool) -> Self {
        self.file_id = file_id;
        self
    }
}

/// Low-level PDF file assembler.
///
/// Objects may be written in any order; the xref table is built from the
/// recorded offsets in [`finish`](Self::finish).
pub struct PdfWriter {
    config: PdfWriterConfig,
    serializer: ObjectSerializer,
    output: Vec<u8>,
    /// Object number -> (byte offset, generation)
    offsets: BTreeMap<u32, (usize, u16)>,
}

impl PdfWriter {
    /// Start a file with the `%PDF-M.m` header and a binary marker comment.
    pub fn new(version: (u8, u8), config: PdfWriterConfig) -> Self {
        let serializer = if config.compact {
            ObjectSerializer::compact()
        } else {
            ObjectSerializer::new()
        };
        let mut output = format!("%PDF-{}.{}\n", version.0, version.1).into_bytes();
        // Binary marker (recommended for binary content)
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            config,
            serializer,
            output,
            offsets: BTreeMap::new(),
        }
    }

    /// Append `N G obj ... endobj` and record its offset.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPdf`] if object number 0 or a number already written
    /// is passed.
    pub fn write_object(&mut self, reference: ObjectRef, obj: &Object) -> Result<()> {
        if reference.id == 0 {
            return Err(Error::InvalidPdf("object number 0 is reserved".to_string()));
        }
        if self.offsets.contains_key(&reference.id) {
            return Err(Error::InvalidPdf(format!("object {} written twice", reference.id)));
        }
        self.offsets.insert(reference.id, (self.output.len(), reference.gen));
        self.output
            .extend_from_slice(&self.serializer.serialize_indirect(reference.id, reference.gen, obj));
        Ok(())
    }

    /// Whether `number` has been written.
    pub fn contains(&self, number: u32) -> bool {
        self.offsets.contains_key(&number)
    }

    /// Number of objects written so far.
    pub fn object_count(&self) -> usize {
        self.offsets.len()
    }

    /// Write the xref table, trailer and `%%EOF`.
    ///
    /// `trailer` supplies `/Root` and optionally `/Info`; `/Size` and `/ID`
    /// are filled in here.
    pub fn finish(mut self, mut trailer: Dictionary) -> Result<Vec<u8>> {
        let size = self.offsets.keys().next_back().map_or(1, |max| max + 1);

        if self.config.file_id {
            let digest = Md5::digest(&self.output).to_vec();
            trailer.insert(
                "ID".to_string(),
                Object::Array(vec![Object::String(digest.clone()), Object::String(digest)]),
            );
        }
        trailer.insert("Size".to_string(), Object::Integer(i64::from(size)));

        let xref_start = self.output.len();
        writeln!(self.output, "xref")?;
        writeln!(self.output, "0 {}", size)?;

        // Free entries form a linked list through the gaps, starting at 0.
        let free: Vec<u32> = (1..size).filter(|n| !self.offsets.contains_key(n)).collect();
        let mut next_free = free.iter().copied();
        writeln!(self.output, "{:010} 65535 f ", next_free.next().unwrap_or(0))?;
        for number in 1..size {
            match self.offsets.get(&number) {
                Some(&(offset, gen)) => writeln!(self.output, "{:010} {:05} n ", offset, gen)?,
                None => writeln!(self.output, "{:010} 00000 f ", next_free.next().unwrap_or(0))?,
            }
        }

        writeln!(self.output, "trailer")?;
        let trailer_bytes = self.serializer.serialize(&Object::Dictionary(trailer));
        self.output.extend_from_slice(&trailer_bytes);
        writeln!(self.output)?;
        writeln!(self.output, "startxref")?;
        writeln!(self.output, "{}", xref_start)?;
        writeln!(self.output, "%%EOF")?;

        log::debug!(
            "Wrote {} objects ({} free entries), xref at byte {}",
            self.offsets.len(),
            free.len(),
            xref_start
        );
        Ok(self.output)
    }
}

/// Serialize `doc` with the default configuration.
///
/// See [`write_document_with_config`].
pub fn write_document(doc: &mut Document) -> Result<Vec<u8>> {
    write_document_with_config(doc, &PdfWriterConfig::default())
}

/// Serialize every live object of `doc` in ascending number order.
///
/// Object streams, cross-reference streams and the `/Encrypt` dictionary are
/// not written: compressed objects become ordinary objects and the output is
/// unencrypted. `/Crypt` filters are removed from stream filter chains since
/// the data they describe is already decrypted.
///
/// An object that cannot be read is skipped with
/// [`Warning::UnreadableObject`], unless the document was loaded in strict
/// mode, where the error is returned.
pub fn write_document_with_config(doc: &mut Document, config: &PdfWriterConfig) -> Result<Vec<u8>> {
    let root = doc.catalog_ref()?;
    let encrypt_ref = doc.trailer().get("Encrypt").and_then(Object::as_reference);
    let mut writer = PdfWriter::new(doc.version(), config.clone());

    for reference in doc.object_refs() {
        if Some(reference) == encrypt_ref {
            continue;
        }
        let obj = match doc.resolve(reference) {
            Ok(obj) => obj,
            Err(err) if !doc.options().strict && reference != root => {
                doc.push_warning(Warning::UnreadableObject {
                    object: reference,
                    reason: err.to_string(),
                });
                continue;
            },
            Err(err) => return Err(err),
        };
        if matches!(obj.dict_type(), Some("XRef") | Some("ObjStm")) && matches!(obj, Object::Stream { .. }) {
            log::debug!("Dropping {} stream {}", obj.dict_type().unwrap_or_default(), reference);
            continue;
        }
        writer.write_object(reference, &strip_crypt_filter(obj))?;
    }

    let mut trailer = Dictionary::new();
    trailer.insert("Root".to_string(), Object::Reference(root));
    if let Some(info) = doc.trailer().get("Info").and_then(Object::as_reference) {
        if writer.contains(info.id) {
            trailer.insert("Info".to_string(), Object::Reference(info));
        }
    }

    writer.finish(trailer)
}

/// Remove a leading `/Crypt` entry from a stream's `/Filter` chain together
/// with its `/DecodeParms` slot.
fn strip_crypt_filter(obj: Object) -> Object {
    let (mut dict, data) = match obj {
        Object::Stream { dict, data } => (dict, data),
        other => return other,
    };

    match dict.get("Filter") {
        Some(Object::Name(name)) if name == "Crypt" => {
            dict.remove("Filter");
            dict.remove("DecodeParms");
        },
        Some(Object::Array(filters)) if filters.first().and_then(Object::as_name) == Some("Crypt") => {
            let rest: Vec<Object> = filters[1..].to_vec();
            if rest.is_empty() {
                dict.remove("Filter");
            } else {
                dict.insert("Filter".to_string(), Object::Array(rest));
            }
            let drop_parms = match dict.get_mut("DecodeParms") {
                Some(Object::Array(parms)) => {
                    if !parms.is_empty() {
                        parms.remove(0);
                    }
                    parms.iter().all(Object::is_null)
                },
                _ => true,
            };
            if drop_parms {
                dict.remove("DecodeParms");
            }
        },
        _ => {},
    }

    Object::Stream { dict, data }
}
