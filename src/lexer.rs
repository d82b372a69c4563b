//! PDF lexer (tokenizer).
//!
//! Low-level tokenization of PDF byte streams with nom combinators. Tokens
//! borrow from the input; string escapes are decoded later by the parser,
//! name escapes are decoded here.
//!
//! # PDF Syntax Overview
//!
//! - Numbers: integers (42, -123) and reals (3.14, -.5, 5.)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: identifiers starting with / (/Type, /A#20B)
//! - Keywords: true, false, null, obj, endobj, stream, endstream, R
//! - Delimiters: `[`, `]`, `<<`, `>>`
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, tuple},
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real (floating-point) number (e.g., 3.14, -2.5, .5)
    Real(f64),

    /// Literal string bytes between the outer parentheses, escapes undecoded
    LiteralString(&'a [u8]),

    /// Hexadecimal string digits between `<` and `>`, whitespace included
    HexString(&'a [u8]),

    /// Name with `#xx` escapes decoded, one char per byte (Latin-1)
    Name(String),

    /// Boolean true keyword
    True,

    /// Boolean false keyword
    False,

    /// Null keyword
    Null,

    /// Array start delimiter [
    ArrayStart,

    /// Array end delimiter ]
    ArrayEnd,

    /// Dictionary start delimiter <<
    DictStart,

    /// Dictionary end delimiter >>
    DictEnd,

    /// Indirect object start keyword "obj"
    ObjStart,

    /// Indirect object end keyword "endobj"
    ObjEnd,

    /// Stream start keyword "stream"
    StreamStart,

    /// Stream end keyword "endstream"
    StreamEnd,

    /// Reference keyword "R" (used in "10 0 R")
    R,
}

/// PDF whitespace set (ISO 32000-1, Table 1).
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter set (ISO 32000-1, Table 2).
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Anything that is neither whitespace nor a delimiter.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) = take_while(is_whitespace)(input)?;
    if ws.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Space)));
    }
    Ok((remaining, ()))
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], ()> {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
        } else if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
        } else {
            return Ok((remaining, ()));
        }
    }
}

fn digit_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
}

/// Parse an integer or real number.
///
/// Accepts an optional sign, a leading or trailing decimal point and an
/// exponent suffix (`1.5e3`), which the PDF grammar forbids but some
/// producers emit anyway.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    // Sign and digits are ASCII by construction.
    let text = std::str::from_utf8(text).map_err(|_| digit_error(input))?;
    let is_real = text.contains(['.', 'e', 'E']);

    if !is_real {
        if let Ok(i) = text.parse::<i64>() {
            return Ok((rest, Token::Integer(i)));
        }
    }

    // Overflowing integers degrade to reals rather than failing.
    let normalized = text.trim_start_matches('+');
    let normalized = if normalized.ends_with('.') {
        format!("{}0", normalized)
    } else {
        normalized.to_string()
    };
    let real: f64 = normalized.parse().map_err(|_| digit_error(input))?;
    Ok((rest, Token::Real(real)))
}

/// Parse a literal string enclosed in parentheses.
///
/// Balanced inner parentheses are part of the string; `\(`, `\)` and `\\`
/// do not count toward the balance.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    // Unterminated string
    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)))
}

/// Parse a hexadecimal string enclosed in angle brackets.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        nom::combinator::map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#XX` escape sequences in a raw name.
///
/// Each resulting byte becomes one `char` (Latin-1), so names made of
/// arbitrary bytes survive a parse/serialize round trip. Malformed escapes
/// are kept literally.
///
/// # Examples
///
/// ```
/// # use pdf_merge::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"Type"), "Type");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            if let (Some(hi), Some(lo)) = (hex_value(raw[i + 1]), hex_value(raw[i + 2])) {
                result.push(((hi << 4) | lo) as char);
                i += 3;
                continue;
            }
        }
        result.push(raw[i] as char);
        i += 1;
    }

    result
}

fn hex_value(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// Parse a name starting with /.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, raw) = preceded(char('/'), take_while(is_regular))(input)?;
    Ok((rest, Token::Name(decode_name_escapes(raw))))
}

/// Match an alphabetic keyword that is not the prefix of a longer word.
fn keyword<'a>(
    word: &'static [u8],
    tok: Token<'static>,
) -> impl Fn(&'a [u8]) -> IResult<&'a [u8], Token<'a>> {
    move |input: &'a [u8]| {
        let (rest, _) = tag(word)(input)?;
        if rest.first().is_some_and(|&c| is_regular(c)) {
            return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
        }
        Ok((rest, tok.clone()))
    }
}

/// Parse PDF keywords and delimiters.
///
/// Order matters: `endstream` before `stream`, `<<` before hex strings.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        keyword(b"false", Token::False),
        keyword(b"true", Token::True),
        keyword(b"null", Token::Null),
        keyword(b"obj", Token::ObjStart),
        keyword(b"endobj", Token::ObjEnd),
        keyword(b"endstream", Token::StreamEnd),
        keyword(b"stream", Token::StreamStart),
        keyword(b"R", Token::R),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// Parse a single PDF token, skipping leading whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;

    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

/// Parse tokens until the input is exhausted or no token matches.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    let (rest, toks) = many0(token)(input)?;
    let (rest, _) = skip_ws(rest)?;
    Ok((rest, toks))
}
