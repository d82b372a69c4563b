//! Object stream parsing (PDF 1.5+).
//!
//! Object streams (`/Type /ObjStm`) pack several indirect objects into one
//! compressed stream:
//!
//! ```text
//! 15 0 obj
//! << /Type /ObjStm /N 3 /First 17 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28    % pairs: (object number, offset relative to /First)
//! << /Type /Font >>   % object 10
//! ...
//! endstream
//! endobj
//! ```
//!
//! Objects stored here always have generation 0. The container stream is
//! decrypted as a whole before this module sees it, so the members are
//! plaintext.

use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use crate::object::Object;
use crate::parser::{ParseContext, parse_with_context};
use crate::parser_config::ParserOptions;

/// A decoded object stream with its member directory.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// Decoded stream payload
    data: Vec<u8>,
    /// Offset of the first member in `data`
    first: usize,
    /// (object number, offset relative to `first`) per slot
    entries: Vec<(u32, usize)>,
    options: ParserOptions,
}

impl ObjectStream {
    /// Decode an object stream and read its pair directory.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidObjectType`] if `stream_obj` is not a stream
    /// - [`Error::InvalidPdf`] for a wrong `/Type` or bad `/N` / `/First`
    /// - decoding errors from the stream filters
    pub fn parse(stream_obj: &Object, options: &ParserOptions) -> Result<Self> {
        let dict = match stream_obj {
            Object::Stream { dict, .. } => dict,
            other => {
                return Err(Error::InvalidObjectType {
                    expected: "Stream".to_string(),
                    found: other.type_name().to_string(),
                });
            },
        };

        if let Some(type_name) = dict.get("Type").and_then(|t| t.as_name()) {
            if type_name != "ObjStm" {
                return Err(Error::InvalidPdf(format!("expected /Type /ObjStm, got /Type /{}", type_name)));
            }
        }

        let n = dict
            .get("N")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| Error::InvalidPdf("object stream missing /N entry".to_string()))?;
        let first = dict
            .get("First")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| Error::InvalidPdf("object stream missing /First entry".to_string()))?;

        if !(0..=1_000_000).contains(&n) {
            return Err(Error::InvalidPdf(format!("invalid object stream /N value: {}", n)));
        }
        if first < 0 {
            return Err(Error::InvalidPdf(format!("invalid object stream /First value: {}", first)));
        }
        let (n, first) = (n as usize, first as usize);

        let data = stream_obj.decode_stream_data(options)?;
        if data.len() < first {
            return Err(Error::InvalidPdf(format!(
                "object stream data too short: {} bytes, /First is {}",
                data.len(),
                first
            )));
        }

        let entries = parse_pairs(&data[..first], n)?;
        log::debug!("Object stream with {} members, /First {}", entries.len(), first);

        Ok(Self {
            data,
            first,
            entries,
            options: *options,
        })
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the stream has no members.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object numbers in slot order.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(num, _)| *num)
    }

    /// Parse the member stored for object `number`.
    ///
    /// `index` is the slot named by the cross-reference entry. When that slot
    /// holds a different object number, the directory is searched instead.
    pub fn get(&self, number: u32, index: usize) -> Result<Object> {
        let slot = match self.entries.get(index) {
            Some((num, _)) if *num == number => index,
            _ => self
                .entries
                .iter()
                .position(|(num, _)| *num == number)
                .ok_or_else(|| Error::InvalidPdf(format!("object {} is not in this object stream", number)))?,
        };
        self.parse_slot(slot).map(|(_, obj)| obj)
    }

    /// Parse the member in `slot`, returning its object number and value.
    pub fn parse_slot(&self, slot: usize) -> Result<(u32, Object)> {
        let (number, rel) = *self
            .entries
            .get(slot)
            .ok_or_else(|| Error::InvalidPdf(format!("object stream slot {} out of range", slot)))?;

        let start = self.first + rel;
        if start >= self.data.len() {
            return Err(Error::InvalidPdf(format!(
                "object {} offset {} is beyond object stream data ({} bytes)",
                number,
                start,
                self.data.len()
            )));
        }

        let mut ctx = ParseContext::new(self.options);
        let (obj, _) = parse_with_context(&self.data, start, &mut ctx, None)?;
        if matches!(obj, Object::Stream { .. }) {
            return Err(Error::InvalidPdf(format!("object {} inside an object stream is a stream", number)));
        }
        Ok((number, obj))
    }
}

/// Read `count` (object number, offset) pairs.
fn parse_pairs(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut remaining = data;

    for i in 0..count {
        let (rest, num) = read_unsigned(remaining).ok_or_else(|| {
            Error::malformed(data.len() - remaining.len(), format!("object number for pair {}", i))
        })?;
        let (rest, offset) = read_unsigned(rest)
            .ok_or_else(|| Error::malformed(data.len() - rest.len(), format!("offset for pair {}", i)))?;

        let num = u32::try_from(num).map_err(|_| Error::InvalidPdf(format!("object number {} too large", num)))?;
        pairs.push((num, offset as usize));
        remaining = rest;
    }

    Ok(pairs)
}

fn read_unsigned(input: &[u8]) -> Option<(&[u8], u64)> {
    match token(input) {
        Ok((rest, Token::Integer(i))) if i >= 0 => Some((rest, i as u64)),
        _ => None,
    }
}
