//! Stream decoders for the filters the merge core has to read.
//!
//! Only cross-reference streams and object streams are ever decoded. Page
//! content, images and fonts are copied with their encoded bytes, so the
//! image codecs (DCT, JBIG2, CCITT) are intentionally absent.
//!
//! Supported filters:
//! - FlateDecode (zlib/deflate)
//! - LZWDecode
//! - ASCIIHexDecode
//!
//! PNG and TIFF predictors from `/DecodeParms` run after the filter that
//! declares them.

use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;

mod ascii_hex;
mod flate;
mod lzw;
mod predictor;

pub use ascii_hex::AsciiHexDecoder;
pub use flate::FlateDecoder;
pub use lzw::LzwDecoder;
pub use predictor::{DecodeParams, decode_predictor};

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8], params: Option<&DecodeParams>) -> Result<Vec<u8>>;

    /// Decode, failing once the output would exceed `limit` bytes.
    ///
    /// Decoders that can stop early override this; the default decodes fully
    /// and checks afterwards.
    fn decode_limited(&self, input: &[u8], params: Option<&DecodeParams>, limit: usize) -> Result<Vec<u8>> {
        let output = self.decode(input, params)?;
        check_output_limit(self.name(), output, limit)
    }

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// One filter of a stream's pipeline together with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStep {
    /// Filter name without the slash, e.g. `FlateDecode`
    pub name: String,
    /// Entry of `/DecodeParms` aligned with this filter
    pub params: Option<DecodeParams>,
}

impl FilterStep {
    /// A step with no parameters.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: None,
        }
    }
}

pub(crate) fn check_output_limit(filter: &str, output: Vec<u8>, limit: usize) -> Result<Vec<u8>> {
    if output.len() > limit {
        return Err(Error::Decode(format!("{} output exceeds limit of {} bytes", filter, limit)));
    }
    Ok(output)
}

/// Largest output a single step may produce under `options`, if any limit
/// applies.
fn output_limit(compressed_size: usize, options: &ParserOptions) -> Option<usize> {
    let by_ratio = (options.max_decompression_ratio > 0).then(|| {
        // the ratio check uses integer division, so anything below the next
        // multiple still passes
        (options.max_decompression_ratio as usize + 1)
            .saturating_mul(compressed_size)
            .saturating_sub(1)
    });
    let by_size = (options.max_decompressed_size > 0).then_some(options.max_decompressed_size);
    match (by_ratio, by_size) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn decoder_for(name: &str) -> Result<Box<dyn StreamDecoder>> {
    Ok(match name {
        "FlateDecode" | "Fl" => Box::new(FlateDecoder),
        "LZWDecode" | "LZW" => Box::new(LzwDecoder),
        "ASCIIHexDecode" | "AHx" => Box::new(AsciiHexDecoder),
        _ => return Err(Error::UnsupportedFilter(name.to_string())),
    })
}

/// Decode stream data through a filter pipeline.
///
/// Every step is checked against the decompression limits in `options`
/// (ratio against the encoded input and absolute output size).
pub fn decode_stream(data: &[u8], steps: &[FilterStep], options: &ParserOptions) -> Result<Vec<u8>> {
    let compressed_size = data.len().max(1);
    let limit = output_limit(compressed_size, options);
    let mut current = data.to_vec();

    for step in steps {
        // The Crypt filter is handled during decryption; Identity is a no-op here.
        if step.name == "Crypt" {
            continue;
        }
        let decoder = decoder_for(&step.name)?;
        current = match limit {
            Some(limit) => decoder.decode_limited(&current, step.params.as_ref(), limit)?,
            None => decoder.decode(&current, step.params.as_ref())?,
        };

        if let Some(params) = &step.params {
            if params.predictor > 1 {
                current = decode_predictor(&current, params)?;
            }
        }

        if options.max_decompression_ratio > 0 {
            let ratio = current.len() / compressed_size;
            if ratio > options.max_decompression_ratio as usize {
                return Err(Error::Decode(format!(
                    "{} output ratio {}:1 exceeds limit {}:1",
                    decoder.name(),
                    ratio,
                    options.max_decompression_ratio
                )));
            }
        }
        if options.max_decompressed_size > 0 && current.len() > options.max_decompressed_size {
            return Err(Error::Decode(format!(
                "{} output of {} bytes exceeds limit of {} bytes",
                decoder.name(),
                current.len(),
                options.max_decompressed_size
            )));
        }
    }

    Ok(current)
}
