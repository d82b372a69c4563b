//! ASCIIHexDecode implementation.

use crate::decoders::{DecodeParams, StreamDecoder};
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
///
/// Whitespace is ignored, `>` ends the data and a trailing odd digit is
/// padded with `0`.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8], _params: Option<&DecodeParams>) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut high: Option<u8> = None;

        for &c in input {
            if c == b'>' {
                break;
            }
            if matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C) {
                continue;
            }
            let nibble = hex_value(c).ok_or_else(|| {
                Error::Decode(format!("ASCIIHexDecode: invalid hex digit '{}'", c as char))
            })?;
            match high.take() {
                Some(h) => output.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            output.push(h << 4);
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}
