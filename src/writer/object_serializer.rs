//! PDF object serialization.
//!
//! Serializes PDF objects to their byte representation according to
//! PDF specification ISO 32000-1:2008, Section 7.3. Output parses back to
//! the same [`Object`] with [`crate::parser::parse`].

use crate::object::{Dictionary, Object};

/// Serializer for PDF objects.
///
/// Dictionary keys are written in sorted order so output is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Minimal whitespace (one line per dictionary)
    compact: bool,
}

impl ObjectSerializer {
    /// Serializer with one dictionary entry per line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut buf = format!("{} {} obj\n", id, gen).into_bytes();
        self.write_object(&mut buf, obj);
        buf.extend_from_slice(b"\nendobj\n");
        buf
    }

    /// Append the serialized form of `obj` to `out`.
    pub fn write_object(&self, out: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(b) => out.extend_from_slice(if *b { &b"true"[..] } else { &b"false"[..] }),
            Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => write_real(out, *r),
            Object::String(s) => write_string(out, s),
            Object::Name(n) => write_name(out, n),
            Object::Array(arr) => self.write_array(out, arr),
            Object::Dictionary(dict) => self.write_dictionary(out, dict),
            Object::Stream { dict, data } => self.write_stream(out, dict, data),
            Object::Reference(r) => out.extend_from_slice(format!("{} {} R", r.id, r.gen).as_bytes()),
        }
    }

    fn write_array(&self, out: &mut Vec<u8>, arr: &[Object]) {
        out.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                out.push(b' ');
            }
            self.write_object(out, obj);
        }
        out.push(b']');
    }

    fn write_dictionary(&self, out: &mut Vec<u8>, dict: &Dictionary) {
        out.extend_from_slice(b"<<");

        // Sort keys for deterministic output
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();

        for key in keys {
            if !self.compact {
                out.extend_from_slice(b"\n  ");
            }
            write_name(out, key);
            out.push(b' ');
            self.write_object(out, &dict[key]);
        }

        if !self.compact && !dict.is_empty() {
            out.push(b'\n');
        }
        out.extend_from_slice(b">>");
    }

    /// Streams always get `/Length` set to the real payload size.
    fn write_stream(&self, out: &mut Vec<u8>, dict: &Dictionary, data: &[u8]) {
        let mut dict = dict.clone();
        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(out, &dict);
        out.extend_from_slice(b"\nstream\n");
        out.extend_from_slice(data);
        out.extend_from_slice(b"\nendstream");
    }
}

/// Shortest decimal form that parses back to the same value, never with an
/// exponent. Integral values keep a `.0` so they stay reals.
fn write_real(out: &mut Vec<u8>, value: f64) {
    if !value.is_finite() {
        out.push(b'0');
        return;
    }
    let text = format!("{}", value);
    out.extend_from_slice(text.as_bytes());
    if !text.contains('.') {
        out.extend_from_slice(b".0");
    }
}

/// Literal string syntax `(...)` with escapes for printable data, hex
/// syntax `<...>` otherwise.
fn write_string(out: &mut Vec<u8>, data: &[u8]) {
    let is_printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if is_printable {
        out.push(b'(');
        for &byte in data {
            match byte {
                b'(' => out.extend_from_slice(b"\\("),
                b')' => out.extend_from_slice(b"\\)"),
                b'\\' => out.extend_from_slice(b"\\\\"),
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                b'\t' => out.extend_from_slice(b"\\t"),
                _ => out.push(byte),
            }
        }
        out.push(b')');
    } else {
        out.push(b'<');
        for byte in data {
            out.extend_from_slice(format!("{:02X}", byte).as_bytes());
        }
        out.push(b'>');
    }
}

/// Names start with `/`; delimiters, `#`, whitespace and bytes outside
/// `!`..`~` are written as `#xx`.
///
/// Name characters are Latin-1 code points, as produced by the lexer.
fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for ch in name.chars() {
        let mut buf = [0u8; 4];
        let bytes: &[u8] = match u8::try_from(u32::from(ch)) {
            Ok(byte) => {
                buf[0] = byte;
                &buf[..1]
            },
            Err(_) => ch.encode_utf8(&mut buf).as_bytes(),
        };
        for &byte in bytes {
            let plain = (0x21..=0x7E).contains(&byte) && byte != b'#' && !crate::lexer::is_delimiter(byte);
            if plain {
                out.push(byte);
            } else {
                out.extend_from_slice(format!("#{:02X}", byte).as_bytes());
            }
        }
    }
}
