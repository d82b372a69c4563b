//! PDF object parser.
//!
//! Combines lexer tokens into [`Object`] values and indirect object
//! definitions.
//!
//! # Architecture
//!
//! Two layers:
//! 1. [`parse_object`] is a nom parser for direct values (everything except
//!    stream bodies, which need the surrounding byte buffer).
//! 2. [`parse`], [`parse_with_context`] and [`parse_indirect_object`] work on
//!    a whole buffer plus an absolute offset, read stream bodies, and turn nom
//!    failures into [`Error::MalformedSyntax`] carrying the absolute offset.
//!
//! # Stream lengths
//!
//! `/Length` is trusted only when `endstream` really follows the declared
//! number of bytes. Otherwise the real `endstream` position wins and a
//! [`Warning::LengthMismatch`] is recorded (an error in strict mode).

use crate::error::{Error, Result, Warning};
use crate::lexer::{Token, skip_ws, token};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser_config::ParserOptions;
use bytes::Bytes;
use nom::IResult;

/// Decode escape sequences in PDF literal strings.
///
/// Handles the escapes of ISO 32000-1:2008, Section 7.3.4.2:
///
/// - `\n`, `\r`, `\t`, `\b`, `\f`
/// - `\(`, `\)`, `\\`
/// - `\ddd` octal codes (1-3 digits, high bits discarded)
/// - `\<EOL>` line continuation (removed)
///
/// Unknown escapes drop the backslash. Bare end-of-line sequences inside the
/// string (`\r`, `\r\n`) are normalised to `\n`.
///
/// # Examples
///
/// ```
/// # use pdf_merge::parser::decode_literal_string_escapes;
/// let decoded = decode_literal_string_escapes(b"Section \\247 71.01");
/// assert_eq!(decoded, b"Section \xa7 71.01");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        if c == b'\r' {
            // Unescaped EOL inside a string reads as a single LF
            result.push(b'\n');
            i += if raw.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            continue;
        }
        if c != b'\\' || i + 1 >= raw.len() {
            result.push(c);
            i += 1;
            continue;
        }

        let escaped = raw[i + 1];
        i += 2;
        match escaped {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(escaped),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = u32::from(escaped - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                            digits += 1;
                        },
                        _ => break,
                    }
                }
                result.push((value & 0xFF) as u8);
            },
            other => result.push(other),
        }
    }

    result
}

/// Decode a hex string body to bytes.
///
/// Whitespace is ignored; an odd final digit is padded with `0`.
///
/// # Example
///
/// ```
/// use pdf_merge::parser::decode_hex;
///
/// assert_eq!(decode_hex(b"48656C6C6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"7").unwrap(), vec![0x70]);
/// ```
///
/// # Errors
///
/// Returns [`Error::Decode`] for characters that are neither hex digits nor
/// whitespace.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(hex_bytes.len() / 2 + 1);
    let mut pending: Option<u8> = None;

    for &c in hex_bytes {
        if crate::lexer::is_whitespace(c) {
            continue;
        }
        let nibble = (c as char)
            .to_digit(16)
            .ok_or_else(|| Error::Decode(format!("invalid hex digit {:?} in string", c as char)))?
            as u8;
        match pending.take() {
            Some(high) => result.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }
    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

fn nom_error(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Parse a direct PDF object from input bytes.
///
/// Handles null, booleans, numbers, strings, names, arrays, dictionaries and
/// `N G R` references. A dictionary followed by `stream` is returned as a
/// plain dictionary with the `stream` keyword left in the remaining input;
/// use [`parse`] to read stream bodies.
///
/// # Example
///
/// ```
/// use pdf_merge::parser::parse_object;
///
/// let (remaining, obj) = parse_object(b"[ 1 2 /Name ] tail").unwrap();
/// assert_eq!(obj.as_array().map(|a| a.len()), Some(3));
/// assert_eq!(remaining, b" tail");
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_nested(input, ParserOptions::default().max_nesting)
}

fn parse_nested(input: &[u8], depth: usize) -> IResult<&[u8], Object> {
    let start = input;
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),

        Token::Integer(i) => {
            // `N G R` is a reference; anything else leaves the integer alone
            if let Ok((after_gen, Token::Integer(gen))) = token(input) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if let (Ok(id), Ok(gen)) = (u32::try_from(i), u16::try_from(gen)) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(id, gen))));
                    }
                }
            }
            Ok((input, Object::Integer(i)))
        },

        Token::Real(r) => Ok((input, Object::Real(r))),

        Token::LiteralString(raw) => Ok((input, Object::String(decode_literal_string_escapes(raw)))),

        Token::HexString(hex) => match decode_hex(hex) {
            Ok(decoded) => Ok((input, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                start,
                nom::error::ErrorKind::HexDigit,
            ))),
        },

        Token::Name(name) => Ok((input, Object::Name(name))),

        Token::ArrayStart => {
            if depth == 0 {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    start,
                    nom::error::ErrorKind::TooLarge,
                )));
            }
            parse_array(input, depth - 1)
        },

        Token::DictStart => {
            if depth == 0 {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    start,
                    nom::error::ErrorKind::TooLarge,
                )));
            }
            let (rest, dict) = parse_dictionary(input, depth - 1)?;
            Ok((rest, Object::Dictionary(dict)))
        },

        _ => Err(nom_error(start, nom::error::ErrorKind::Tag)),
    }
}

/// Parse array elements after `[` up to and including `]`.
fn parse_array(input: &[u8], depth: usize) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        let (after, tok) = token(remaining)?;
        if tok == Token::ArrayEnd {
            return Ok((after, Object::Array(objects)));
        }
        let (after, obj) = parse_nested(remaining, depth)?;
        objects.push(obj);
        remaining = after;
    }
}

/// Parse dictionary entries after `<<` up to and including `>>`.
///
/// Keys must be names; a repeated key keeps its last value.
fn parse_dictionary(input: &[u8], depth: usize) -> IResult<&[u8], Dictionary> {
    let mut dict = Dictionary::new();
    let mut remaining = input;

    loop {
        let (after, tok) = token(remaining)?;
        match tok {
            Token::DictEnd => return Ok((after, dict)),
            Token::Name(key) => {
                let (after, value) = parse_nested(after, depth)?;
                dict.insert(key, value);
                remaining = after;
            },
            _ => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining,
                    nom::error::ErrorKind::Verify,
                )));
            },
        }
    }
}

/// Convert a nom failure inside `bytes` into a positioned [`Error`].
fn syntax_error(bytes: &[u8], err: nom::Err<nom::error::Error<&[u8]>>, what: &str) -> Error {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = bytes.len() - e.input.len();
            let expected = match e.code {
                nom::error::ErrorKind::Verify => "name as dictionary key".to_string(),
                nom::error::ErrorKind::TooLarge => "shallower array/dictionary nesting".to_string(),
                nom::error::ErrorKind::HexDigit => "hex digit".to_string(),
                _ if e.input.is_empty() => format!("{} before end of input", what),
                _ => what.to_string(),
            };
            Error::malformed(offset, expected)
        },
        nom::Err::Incomplete(_) => Error::malformed(bytes.len(), format!("{} before end of input", what)),
    }
}

/// Resolver for `/Length` values stored as indirect objects.
pub type LengthResolver<'r> = &'r dyn Fn(ObjectRef) -> Option<usize>;

/// State shared by the offset-based parsing entry points.
pub struct ParseContext<'r> {
    /// Parsing policy
    pub options: ParserOptions,
    /// Lookup for indirect `/Length` values
    pub resolve_length: Option<LengthResolver<'r>>,
    /// Recoverable conditions met while parsing
    pub warnings: Vec<Warning>,
    /// Shared buffer the parsed bytes come from; stream payloads slice it
    source: Option<Bytes>,
}

impl<'r> ParseContext<'r> {
    /// Context without a length resolver.
    pub fn new(options: ParserOptions) -> Self {
        Self {
            options,
            resolve_length: None,
            warnings: Vec::new(),
            source: None,
        }
    }

    /// Share stream payloads with `source` instead of copying them.
    ///
    /// Only takes effect when the parser is handed exactly this buffer.
    pub fn with_source(mut self, source: Bytes) -> Self {
        self.source = Some(source);
        self
    }

    /// `bytes[range]` as a [`Bytes`], sharing the source buffer when `bytes`
    /// is that buffer.
    fn payload(&self, bytes: &[u8], range: std::ops::Range<usize>) -> Bytes {
        match &self.source {
            Some(source) if source.as_ptr() == bytes.as_ptr() && source.len() == bytes.len() => source.slice(range),
            _ => Bytes::copy_from_slice(&bytes[range]),
        }
    }

    /// Attach a resolver for indirect `/Length` references.
    pub fn with_length_resolver(mut self, resolver: LengthResolver<'r>) -> Self {
        self.resolve_length = Some(resolver);
        self
    }
}

impl std::fmt::Debug for ParseContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseContext")
            .field("options", &self.options)
            .field("resolve_length", &self.resolve_length.is_some())
            .field("warnings", &self.warnings)
            .field("shared_source", &self.source.is_some())
            .finish()
    }
}

/// An `N G obj ... endobj` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    /// Number and generation from the object header
    pub reference: ObjectRef,
    /// The object's value
    pub object: Object,
    /// Offset just past `endobj` (or past the value when `endobj` is missing)
    pub end: usize,
}

/// Parse one PDF value starting at `offset`.
///
/// Returns the value and the offset immediately after it. A dictionary
/// followed by `stream` is read together with its body.
///
/// # Example
///
/// ```
/// use pdf_merge::parser::parse;
/// use pdf_merge::object::Object;
///
/// let bytes = b"junk << /Count 3 >> more";
/// let (obj, next) = parse(bytes, 5).unwrap();
/// assert_eq!(obj.as_dict().and_then(|d| d.get("Count")), Some(&Object::Integer(3)));
/// assert_eq!(next, 19);
/// ```
///
/// # Errors
///
/// [`Error::MalformedSyntax`] with the absolute offset of the offending byte.
pub fn parse(bytes: &[u8], offset: usize) -> Result<(Object, usize)> {
    let mut ctx = ParseContext::new(ParserOptions::default());
    parse_with_context(bytes, offset, &mut ctx, None)
}

/// [`parse`] with explicit options, length resolver and warning sink.
///
/// `owner` names the indirect object the value belongs to, for warnings.
pub fn parse_with_context(
    bytes: &[u8],
    offset: usize,
    ctx: &mut ParseContext<'_>,
    owner: Option<ObjectRef>,
) -> Result<(Object, usize)> {
    if offset > bytes.len() {
        return Err(Error::malformed(bytes.len(), "offset inside the input"));
    }

    let (rest, obj) =
        parse_nested(&bytes[offset..], ctx.options.max_nesting).map_err(|e| syntax_error(bytes, e, "PDF object"))?;
    let pos = bytes.len() - rest.len();

    let Object::Dictionary(dict) = obj else {
        return Ok((obj, pos));
    };
    match token(rest) {
        Ok((after_kw, Token::StreamStart)) => {
            let body_start = bytes.len() - after_kw.len();
            let (data, end) = parse_stream_body(bytes, body_start, &dict, ctx, owner)?;
            Ok((Object::Stream { dict, data }, end))
        },
        _ => Ok((Object::Dictionary(dict), pos)),
    }
}

/// Parse an indirect object definition starting at `offset`.
///
/// # Errors
///
/// [`Error::MalformedSyntax`] when the header is not `N G obj`, the value is
/// malformed, or (strict mode) `endobj` is missing or a stream `/Length` is
/// wrong.
pub fn parse_indirect_object(bytes: &[u8], offset: usize, ctx: &mut ParseContext<'_>) -> Result<IndirectObject> {
    if offset > bytes.len() {
        return Err(Error::malformed(bytes.len(), "offset inside the input"));
    }

    let (rest, reference) =
        parse_object_header(&bytes[offset..]).map_err(|e| syntax_error(bytes, e, "indirect object header `N G obj`"))?;
    let header_end = bytes.len() - rest.len();

    let (object, value_end) = parse_with_context(bytes, header_end, ctx, Some(reference))?;

    let end = match token(&bytes[value_end..]) {
        Ok((rest, Token::ObjEnd)) => bytes.len() - rest.len(),
        _ if ctx.options.strict => return Err(Error::malformed(value_end, "endobj")),
        _ => {
            log::debug!("Object {} has no endobj keyword, accepting value at {}", reference, value_end);
            value_end
        },
    };

    Ok(IndirectObject { reference, object, end })
}

/// Parse `N G obj`.
pub(crate) fn parse_object_header(input: &[u8]) -> IResult<&[u8], ObjectRef> {
    let (rest, num) = token(input)?;
    let (rest, gen) = token(rest)?;
    let (rest, kw) = token(rest)?;
    match (num, gen, kw) {
        (Token::Integer(n), Token::Integer(g), Token::ObjStart) => {
            match (u32::try_from(n), u16::try_from(g)) {
                (Ok(id), Ok(gen)) => Ok((rest, ObjectRef::new(id, gen))),
                _ => Err(nom_error(input, nom::error::ErrorKind::Digit)),
            }
        },
        _ => Err(nom_error(input, nom::error::ErrorKind::Tag)),
    }
}

/// Offset of the first `endstream` keyword at or after `from`.
fn find_endstream(bytes: &[u8], from: usize) -> Option<usize> {
    const KEYWORD: &[u8] = b"endstream";
    bytes
        .get(from..)?
        .windows(KEYWORD.len())
        .position(|window| window == KEYWORD)
        .map(|p| from + p)
}

/// If `endstream` follows `pos` after optional whitespace, return the offset
/// just past it.
fn endstream_at(bytes: &[u8], pos: usize) -> Option<usize> {
    let (rest, _) = skip_ws(bytes.get(pos..)?).ok()?;
    match token(rest) {
        Ok((after, Token::StreamEnd)) => Some(bytes.len() - after.len()),
        _ => None,
    }
}

/// Read a stream body. `start` is the offset just past the `stream` keyword.
///
/// Returns the raw (still encoded) payload and the offset past `endstream`.
fn parse_stream_body(
    bytes: &[u8],
    start: usize,
    dict: &Dictionary,
    ctx: &mut ParseContext<'_>,
    owner: Option<ObjectRef>,
) -> Result<(Bytes, usize)> {
    // The keyword is followed by CRLF or LF; CR alone and stray spaces are
    // tolerated outside strict mode.
    let mut data_start = start;
    if !ctx.options.strict {
        while matches!(bytes.get(data_start), Some(b' ') | Some(b'\t')) {
            data_start += 1;
        }
    }
    if bytes[data_start..].starts_with(b"\r\n") {
        data_start += 2;
    } else if bytes[data_start..].starts_with(b"\n") {
        data_start += 1;
    } else if bytes[data_start..].starts_with(b"\r") {
        log::debug!("stream keyword followed by CR alone at byte {}", data_start);
        data_start += 1;
    } else if ctx.options.strict {
        return Err(Error::malformed(data_start, "end-of-line after stream keyword"));
    }

    let declared = match dict.get("Length") {
        Some(Object::Integer(n)) => usize::try_from(*n).ok(),
        Some(Object::Reference(r)) => {
            let resolved = ctx.resolve_length.and_then(|resolve| resolve(*r));
            if resolved.is_none() {
                log::debug!("stream /Length {} could not be resolved, scanning for endstream", r);
            }
            resolved
        },
        _ => None,
    };

    if let Some(length) = declared {
        if let Some(data_end) = data_start.checked_add(length).filter(|&e| e <= bytes.len()) {
            if let Some(end) = endstream_at(bytes, data_end) {
                return Ok((ctx.payload(bytes, data_start..data_end), end));
            }
        }
    }

    let keyword_pos = find_endstream(bytes, data_start).ok_or_else(|| Error::malformed(bytes.len(), "endstream"))?;

    // The EOL before endstream is not part of the data.
    let mut data_end = keyword_pos;
    if data_end > data_start && bytes[data_end - 1] == b'\n' {
        data_end -= 1;
    }
    if data_end > data_start && bytes[data_end - 1] == b'\r' {
        data_end -= 1;
    }
    let actual = data_end - data_start;

    match declared {
        Some(length) if ctx.options.strict => {
            return Err(Error::malformed(
                data_start + length.min(bytes.len() - data_start),
                format!("endstream after /Length {} (found it after {} bytes)", length, actual),
            ));
        },
        Some(length) => {
            let warning = Warning::LengthMismatch {
                object: owner,
                declared: length,
                actual,
            };
            log::warn!("{}", warning);
            ctx.warnings.push(warning);
        },
        None if ctx.options.strict => return Err(Error::malformed(start, "stream with a usable /Length")),
        None => {},
    }

    Ok((ctx.payload(bytes, data_start..data_end), keyword_pos + b"endstream".len()))
}
