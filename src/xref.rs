//! Cross-reference resolver.
//!
//! The xref table maps object numbers to byte offsets or object-stream slots.
//! Supports classic tables (PDF 1.0-1.4), cross-reference streams (PDF 1.5+),
//! hybrid files (`/XRefStm` in a classic trailer) and incremental updates
//! chained through `/Prev`.
//!
//! Sections are read newest first. An entry already present (from a newer
//! section) is never replaced by an older one, which is the same as applying
//! the sections oldest to newest.

use crate::error::{Error, Result};
use crate::lexer::skip_ws;
use crate::object::{Dictionary, Object};
use crate::parser::{ParseContext, parse, parse_indirect_object};
use crate::parser_config::ParserOptions;
use nom::IResult;
use nom::character::complete::{one_of, space1, u32 as dec_u32, u64 as dec_u64};
use std::collections::{HashMap, HashSet};

/// Keys copied from a cross-reference stream dictionary into the trailer.
const TRAILER_KEYS: [&str; 7] = ["Size", "Root", "Info", "ID", "Encrypt", "Prev", "XRefStm"];

/// Location of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object; `next` is the next free object number
    Free {
        /// Next free object number
        next: u32,
        /// Generation to use if the number is reused
        generation: u16,
    },
    /// Object stored at a byte offset in the file
    InUse {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        generation: u16,
    },
    /// Object stored in an object stream (generation is always 0)
    Compressed {
        /// Object number of the containing object stream
        stream: u32,
        /// Slot within the object stream
        index: usize,
    },
}

impl XRefEntry {
    /// Generation of the object this entry describes.
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }

    /// True for free entries.
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }
}

/// Cross-reference table with its trailer dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Dictionary,
    /// Object streams located by a scan whose members are not indexed yet
    deferred_object_streams: Vec<u32>,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trailer dictionary (for xref streams, the trailer keys of the stream dictionary).
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Replace the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = trailer;
    }

    /// Add or replace an entry.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Check if an object number has an entry (free or not).
    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    /// Object numbers of in-use and compressed entries, ascending.
    pub fn live_object_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.is_free())
            .map(|(n, _)| *n)
            .collect();
        numbers.sort_unstable();
        numbers
    }

    /// Fold in an older section: entries and trailer keys already present win.
    pub fn merge_older(&mut self, older: CrossRefTable) {
        for (num, entry) in older.entries {
            self.entries.entry(num).or_insert(entry);
        }
        for (key, value) in older.trailer {
            self.trailer.entry(key).or_insert(value);
        }
    }

    /// Remember an object stream whose members can only be listed once the
    /// document is decrypted.
    pub fn defer_object_stream(&mut self, object_number: u32) {
        self.deferred_object_streams.push(object_number);
    }

    /// Take the object streams recorded by [`Self::defer_object_stream`].
    pub fn take_deferred_object_streams(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.deferred_object_streams)
    }

    /// Number of entries, free ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the offset named by the last `startxref` keyword in the file.
///
/// # Errors
///
/// [`Error::InvalidXref`] if there is no `startxref` or no number after it.
pub fn find_startxref(bytes: &[u8]) -> Result<usize> {
    const KEYWORD: &[u8] = b"startxref";
    let pos = bytes
        .windows(KEYWORD.len())
        .rposition(|w| w == KEYWORD)
        .ok_or(Error::InvalidXref)?;

    let after = &bytes[pos + KEYWORD.len()..];
    let (after, _) = skip_ws(after).map_err(|_| Error::InvalidXref)?;
    let digits = after.iter().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return Err(Error::InvalidXref);
    }
    std::str::from_utf8(&after[..digits])
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(Error::InvalidXref)
}

/// Read the xref section at `start` and every older section reachable
/// through `/Prev`.
///
/// Newer sections override older ones entry by entry. A `/Prev` loop ends
/// the chain; a chain longer than `max_xref_chain` is an error.
///
/// # Errors
///
/// [`Error::MalformedSyntax`] (offset of the unreadable section) or
/// [`Error::InvalidXref`] for any section that cannot be read.
pub fn read_xref_chain(bytes: &[u8], start: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut visited = HashSet::new();
    let mut next = Some(start);

    while let Some(offset) = next {
        if !visited.insert(offset) {
            log::warn!("xref /Prev chain loops back to offset {}", offset);
            break;
        }
        if visited.len() > options.max_xref_chain {
            return Err(Error::InvalidPdf(format!(
                "xref /Prev chain longer than {} sections",
                options.max_xref_chain
            )));
        }

        let section = read_xref_section(bytes, offset, options)?;
        log::debug!("xref section at {}: {} entries", offset, section.len());
        next = section
            .trailer()
            .get("Prev")
            .and_then(|p| p.as_integer())
            .and_then(|p| usize::try_from(p).ok());
        table.merge_older(section);
    }

    table.trailer.remove("Prev");
    table.trailer.remove("XRefStm");
    Ok(table)
}

/// Read one section (classic or stream) without following `/Prev`.
pub fn read_xref_section(bytes: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let at = bytes.get(offset..).ok_or_else(|| Error::malformed(offset, "xref section inside the file"))?;
    let (at, _) = skip_ws(at).map_err(|_| Error::malformed(offset, "xref section"))?;

    if at.starts_with(b"xref") {
        let mut table = read_classic_section(bytes, bytes.len() - at.len(), options)?;

        // Hybrid file: the classic table wins over its companion stream.
        if let Some(stm_offset) = table
            .trailer()
            .get("XRefStm")
            .and_then(|o| o.as_integer())
            .and_then(|o| usize::try_from(o).ok())
        {
            match read_stream_section(bytes, stm_offset, options) {
                Ok(mut stream_table) => {
                    stream_table.trailer.clear();
                    table.merge_older(stream_table);
                },
                Err(e) => log::warn!("Ignoring unreadable /XRefStm at {}: {}", stm_offset, e),
            }
        }
        Ok(table)
    } else {
        read_stream_section(bytes, offset, options)
    }
}

fn subsection_header(input: &[u8]) -> IResult<&[u8], (u32, u32)> {
    let (input, _) = skip_ws(input)?;
    let (input, start) = dec_u32(input)?;
    let (input, _) = space1(input)?;
    let (input, count) = dec_u32(input)?;
    Ok((input, (start, count)))
}

/// One `nnnnnnnnnn ggggg n` line. Widths are not enforced.
fn entry_line(input: &[u8]) -> IResult<&[u8], (u64, u32, char)> {
    let (input, _) = skip_ws(input)?;
    let (input, offset) = dec_u64(input)?;
    let (input, _) = space1(input)?;
    let (input, gen) = dec_u32(input)?;
    let (input, _) = space1(input)?;
    let (input, kind) = one_of("nf")(input)?;
    Ok((input, (offset, gen, kind)))
}

/// Classic `xref` table followed by `trailer << ... >>`.
fn read_classic_section(bytes: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut rest = &bytes[offset + b"xref".len()..];
    let pos = |r: &[u8]| bytes.len() - r.len();

    loop {
        let (after_ws, _) = skip_ws(rest).map_err(|_| Error::malformed(pos(rest), "xref subsection"))?;
        if after_ws.starts_with(b"trailer") {
            rest = &after_ws[b"trailer".len()..];
            break;
        }

        let (after, (start, count)) =
            subsection_header(rest).map_err(|_| Error::malformed(pos(after_ws), "xref subsection header or trailer"))?;
        if count > 10_000_000 {
            return Err(Error::InvalidPdf(format!("xref subsection of {} entries", count)));
        }
        rest = after;

        for i in 0..count {
            let (after, (entry_offset, gen, kind)) =
                entry_line(rest).map_err(|_| Error::malformed(pos(rest), "xref entry `offset gen n|f`"))?;
            rest = after;

            let number = start
                .checked_add(i)
                .ok_or_else(|| Error::InvalidPdf("xref object number overflow".to_string()))?;
            let generation = u16::try_from(gen).unwrap_or(u16::MAX);
            let entry = match kind {
                'n' => XRefEntry::InUse {
                    offset: entry_offset as usize,
                    generation,
                },
                _ => XRefEntry::Free {
                    next: u32::try_from(entry_offset).unwrap_or(0),
                    generation,
                },
            };
            // First subsection mentioning a number wins inside one section.
            table.entries.entry(number).or_insert(entry);
        }
    }

    let trailer_at = pos(rest);
    let mut ctx = ParseContext::new(*options);
    let (trailer, _) = crate::parser::parse_with_context(bytes, trailer_at, &mut ctx, None)?;
    match trailer {
        Object::Dictionary(dict) => table.set_trailer(dict),
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            });
        },
    }

    Ok(table)
}

/// Cross-reference stream (`/Type /XRef`).
fn read_stream_section(bytes: &[u8], offset: usize, options: &ParserOptions) -> Result<CrossRefTable> {
    let mut ctx = ParseContext::new(*options);
    let indirect = parse_indirect_object(bytes, offset, &mut ctx)?;
    let dict = match &indirect.object {
        Object::Stream { dict, .. } if dict.get("Type").and_then(|t| t.as_name()) == Some("XRef") => dict,
        _ => return Err(Error::malformed(offset, "xref table or /Type /XRef stream")),
    };

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|w| w.as_array())
        .map(|arr| arr.iter().map(|o| o.as_integer().unwrap_or(0).max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() < 3 || widths.iter().any(|&w| w > 8) {
        return Err(Error::InvalidPdf(format!("invalid xref stream /W {:?}", widths)));
    }
    let row = widths[0] + widths[1] + widths[2];
    if row == 0 {
        return Err(Error::InvalidPdf("xref stream /W has zero row width".to_string()));
    }

    let size = dict.get("Size").and_then(|s| s.as_integer()).unwrap_or(0).max(0);
    let subsections: Vec<(i64, i64)> = match dict.get("Index").and_then(|i| i.as_array()) {
        Some(index) => index
            .chunks(2)
            .filter_map(|pair| match pair {
                [start, count] => Some((start.as_integer()?, count.as_integer()?)),
                _ => None,
            })
            .collect(),
        None => vec![(0, size)],
    };

    let data = indirect.object.decode_stream_data(options)?;
    let mut table = CrossRefTable::new();
    let mut rows = data.chunks_exact(row);

    'sections: for (start, count) in subsections {
        if start < 0 || !(0..=10_000_000).contains(&count) {
            return Err(Error::InvalidPdf(format!("invalid xref stream /Index pair {} {}", start, count)));
        }
        for i in 0..count {
            let Some(fields) = rows.next() else {
                log::warn!("xref stream at {} ends before its /Index is exhausted", offset);
                break 'sections;
            };
            let number = u32::try_from(start + i)
                .map_err(|_| Error::InvalidPdf("xref stream object number overflow".to_string()))?;

            let (f1, rest) = fields.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to type 1.
            let kind = if widths[0] == 0 { 1 } else { read_be(f1) };
            let (f2, f3) = (read_be(f2), read_be(f3));

            let entry = match kind {
                0 => XRefEntry::Free {
                    next: f2 as u32,
                    generation: f3.min(u16::MAX as u64) as u16,
                },
                1 => XRefEntry::InUse {
                    offset: f2 as usize,
                    generation: f3.min(u16::MAX as u64) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: f2 as u32,
                    index: f3 as usize,
                },
                other => {
                    log::debug!("xref stream entry type {} for object {} ignored", other, number);
                    continue;
                },
            };
            table.entries.entry(number).or_insert(entry);
        }
    }

    let trailer = TRAILER_KEYS
        .iter()
        .filter_map(|key| dict.get(*key).map(|v| (key.to_string(), v.clone())))
        .collect();
    table.set_trailer(trailer);
    Ok(table)
}

/// Big-endian unsigned integer of up to 8 bytes.
fn read_be(field: &[u8]) -> u64 {
    field.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Parse a standalone trailer dictionary at `offset` (after the keyword).
pub(crate) fn parse_trailer_dict(bytes: &[u8], offset: usize) -> Option<Dictionary> {
    match parse(bytes, offset) {
        Ok((Object::Dictionary(dict), _)) => Some(dict),
        _ => None,
    }
}
