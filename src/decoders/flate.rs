//! FlateDecode (zlib/deflate) implementation.
//!
//! Nearly every object stream and xref stream in the wild is Flate-encoded.

use crate::decoders::{DecodeParams, StreamDecoder, check_output_limit};
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl FlateDecoder {
    /// Inflate `input`, reading at most one byte past `limit` so oversized
    /// output is rejected without being materialised.
    fn inflate(input: &[u8], limit: Option<usize>) -> Result<Vec<u8>> {
        let cap = limit.map_or(u64::MAX, |l| l as u64 + 1);
        let finish = |output: Vec<u8>| match limit {
            Some(limit) => check_output_limit("FlateDecode", output, limit),
            None => Ok(output),
        };

        let mut output = Vec::new();
        let zlib_err = match ZlibDecoder::new(input).take(cap).read_to_end(&mut output) {
            Ok(_) => return finish(output),
            Err(e) => e,
        };

        // Truncated streams still carry a usable prefix (xref rows, object headers).
        if !output.is_empty() {
            log::warn!(
                "FlateDecode recovered {} bytes before corruption: {}",
                output.len(),
                zlib_err
            );
            return finish(output);
        }

        // Some producers omit the zlib wrapper and write raw deflate.
        log::debug!("Zlib decode failed ({}), retrying as raw deflate", zlib_err);
        output.clear();
        match DeflateDecoder::new(input).take(cap).read_to_end(&mut output) {
            Ok(_) if !output.is_empty() => finish(output),
            Err(_) if !output.is_empty() => {
                log::warn!("Raw deflate recovered {} bytes before corruption", output.len());
                finish(output)
            },
            Ok(_) | Err(_) => Err(Error::Decode(format!(
                "FlateDecode failed on {} bytes: {}",
                input.len(),
                zlib_err
            ))),
        }
    }
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8], _params: Option<&DecodeParams>) -> Result<Vec<u8>> {
        Self::inflate(input, None)
    }

    fn decode_limited(&self, input: &[u8], _params: Option<&DecodeParams>, limit: usize) -> Result<Vec<u8>> {
        Self::inflate(input, Some(limit))
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
