//! Cross-reference table reconstruction for damaged PDFs.
//!
//! When `startxref` is missing or the xref data it points at is unreadable,
//! the whole file is scanned for `N G obj` headers and a synthetic table is
//! built from what is found.
//!
//! Rules:
//! - When an object number is defined more than once, the definition that
//!   appears last in the file wins (incremental updates append).
//! - Members of object streams found by the scan are registered as
//!   compressed entries unless a direct definition exists. In encrypted
//!   files the streams are only recorded; see [`index_object_stream`].
//! - The trailer is the last `trailer` dictionary whose `/Root` exists, else
//!   the newest cross-reference stream dictionary, else a synthetic trailer
//!   pointing at the last `/Type /Catalog` object.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::ObjectStream;
use crate::parser::{ParseContext, parse_indirect_object};
use crate::parser_config::ParserOptions;
use crate::xref::{CrossRefTable, XRefEntry, parse_trailer_dict};
use lazy_static::lazy_static;
use std::collections::BTreeMap;

lazy_static! {
    /// "N G obj" headers
    static ref RE_OBJ_PATTERN: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(?-u)(\d{1,10})[ \t\r\n\x0c\x00]+(\d{1,5})[ \t\r\n\x0c\x00]+obj").unwrap();

    /// "trailer <<"
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"(?-u)trailer[ \t\r\n\x0c\x00]*<<").unwrap();
}

/// Rebuild the cross-reference table by scanning `bytes`.
///
/// The returned table carries the recovered trailer.
///
/// # Errors
///
/// [`Error::InvalidPdf`] if no object definitions or no catalog are found.
pub fn reconstruct_xref(bytes: &[u8], options: &ParserOptions) -> Result<CrossRefTable> {
    log::info!("Reconstructing xref table by scanning {} bytes", bytes.len());

    // number -> (offset, generation); later definitions overwrite earlier ones
    let mut found: BTreeMap<u32, (usize, u16)> = BTreeMap::new();
    for capture in RE_OBJ_PATTERN.captures_iter(bytes) {
        let (Some(whole), Some(num), Some(gen)) = (capture.get(0), capture.get(1), capture.get(2)) else {
            continue;
        };
        let start = whole.start();

        // "12 0 obj" must not be the tail of "112 0 obj" or "x12 0 obj"
        if start > 0 && bytes[start - 1].is_ascii_alphanumeric() {
            continue;
        }
        // ...nor the head of "objects"
        if bytes.get(whole.end()).is_some_and(|&c| crate::lexer::is_regular(c)) {
            continue;
        }

        let (Some(num), Some(gen)) = (parse_decimal::<u32>(num.as_bytes()), parse_decimal::<u16>(gen.as_bytes())) else {
            log::debug!("Skipping out-of-range object header at offset {}", start);
            continue;
        };
        found.insert(num, (start, gen));
    }

    if found.is_empty() {
        return Err(Error::InvalidPdf("no objects found during xref reconstruction".to_string()));
    }
    log::info!("Reconstruction found {} object definitions", found.len());

    let mut table = CrossRefTable::new();
    let mut object_streams = Vec::new();
    let mut newest_xref_stream: Option<(usize, Dictionary)> = None;
    let mut last_catalog: Option<(usize, ObjectRef)> = None;

    for (&num, &(offset, generation)) in &found {
        table.add_entry(num, XRefEntry::InUse { offset, generation });

        let mut ctx = ParseContext::new(*options);
        let object = match parse_indirect_object(bytes, offset, &mut ctx) {
            Ok(indirect) => indirect.object,
            Err(e) => {
                log::debug!("Reconstructed object {} at {} does not parse: {}", num, offset, e);
                continue;
            },
        };

        match object.dict_type() {
            Some("ObjStm") => object_streams.push((num, object)),
            Some("XRef") => {
                if newest_xref_stream.as_ref().map_or(true, |(at, _)| offset > *at) {
                    if let Object::Stream { dict, .. } = object {
                        newest_xref_stream = Some((offset, dict));
                    }
                }
            },
            Some("Catalog") => {
                if last_catalog.map_or(true, |(at, _)| offset > at) {
                    last_catalog = Some((offset, ObjectRef::new(num, generation)));
                }
            },
            _ => {},
        }
    }

    let trailer = recover_trailer(bytes, &table, newest_xref_stream, last_catalog)?;

    // Object streams of an encrypted file are still ciphertext here; the
    // document lists their members after decryption is set up.
    let encrypted = trailer.contains_key("Encrypt");
    for (stream_num, stream) in &object_streams {
        if encrypted {
            table.defer_object_stream(*stream_num);
            continue;
        }
        if let Err(e) = index_object_stream(&mut table, *stream_num, stream, options) {
            log::debug!("Object stream {} unreadable during reconstruction: {}", stream_num, e);
        }
    }
    if encrypted && !object_streams.is_empty() {
        log::info!(
            "Encrypted file: indexing of {} object streams deferred until decryption",
            object_streams.len()
        );
    }

    table.set_trailer(trailer);
    Ok(table)
}

/// Register the members of object stream `stream_num` as compressed
/// entries, except numbers the table already locates. Returns how many were
/// added.
///
/// `stream` must already be decrypted.
pub fn index_object_stream(
    table: &mut CrossRefTable,
    stream_num: u32,
    stream: &Object,
    options: &ParserOptions,
) -> Result<usize> {
    let objstm = ObjectStream::parse(stream, options)?;
    let mut added = 0;
    for (index, member) in objstm.object_numbers().enumerate() {
        if !table.contains(member) {
            table.add_entry(
                member,
                XRefEntry::Compressed {
                    stream: stream_num,
                    index,
                },
            );
            added += 1;
        }
    }
    Ok(added)
}

fn parse_decimal<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn root_exists(trailer: &Dictionary, table: &CrossRefTable) -> bool {
    trailer
        .get("Root")
        .and_then(|r| r.as_reference())
        .is_some_and(|r| table.contains(r.id))
}

fn recover_trailer(
    bytes: &[u8],
    table: &CrossRefTable,
    xref_stream: Option<(usize, Dictionary)>,
    catalog: Option<(usize, ObjectRef)>,
) -> Result<Dictionary> {
    let trailers: Vec<usize> = RE_TRAILER.find_iter(bytes).map(|m| m.start() + b"trailer".len()).collect();
    for &at in trailers.iter().rev() {
        match parse_trailer_dict(bytes, at) {
            Some(dict) if root_exists(&dict, table) => {
                log::info!("Using trailer dictionary at offset {}", at);
                return Ok(without_chain_keys(dict));
            },
            Some(_) => log::debug!("Trailer at {} names a missing /Root", at),
            None => log::debug!("Trailer at {} does not parse", at),
        }
    }

    if let Some((at, dict)) = xref_stream {
        if root_exists(&dict, table) {
            log::info!("Using cross-reference stream dictionary at offset {} as trailer", at);
            let trailer = ["Root", "Info", "ID", "Encrypt", "Size"]
                .iter()
                .filter_map(|key| dict.get(*key).map(|v| (key.to_string(), v.clone())))
                .collect();
            return Ok(trailer);
        }
    }

    let (_, root) = catalog.ok_or_else(|| Error::InvalidPdf("could not find catalog in reconstructed xref".to_string()))?;
    log::info!("Synthesising trailer with /Root {}", root);
    let size = table.live_object_numbers().last().map_or(1, |max| i64::from(*max) + 1);
    let mut trailer = Dictionary::new();
    trailer.insert("Root".to_string(), Object::Reference(root));
    trailer.insert("Size".to_string(), Object::Integer(size));
    Ok(trailer)
}

fn without_chain_keys(mut trailer: Dictionary) -> Dictionary {
    trailer.remove("Prev");
    trailer.remove("XRefStm");
    trailer
}
