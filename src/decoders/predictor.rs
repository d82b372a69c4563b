//! PNG and TIFF predictors for Flate/LZW encoded streams.
//!
//! Cross-reference streams are almost always written with PNG Up (12) and
//! `/Columns` equal to the entry width.

use crate::error::{Error, Result};

/// Decode parameters for stream decoders.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample (default 1)
    pub colors: usize,
    /// Bits per component (default 8)
    pub bits_per_component: usize,
    /// LZW `/EarlyChange` (default on)
    pub early_change: bool,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
            early_change: true,
        }
    }
}

impl DecodeParams {
    /// Bytes of sample data per row, excluding the PNG tag byte.
    pub fn row_bytes(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Distance in bytes to the corresponding byte of the previous pixel.
    pub fn pixel_bytes(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor named in `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// TIFF predictor 2, 8-bit components only.
fn decode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Decode(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_len = params.row_bytes();
    let bpp = params.pixel_bytes();
    let mut output = data.to_vec();

    for row in output.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    Ok(output)
}

/// PNG predictors: every row starts with its own algorithm tag.
fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_bytes();
    let bpp = params.pixel_bytes();
    let stride = row_len + 1;

    let mut output = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];

    for chunk in data.chunks(stride) {
        if chunk.len() < stride {
            log::warn!("PNG predictor: dropping {} trailing bytes", chunk.len());
            break;
        }
        let tag = chunk[0];
        let mut row = chunk[1..].to_vec();

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)));
                },
            };
            row[i] = row[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&row);
        prev = row;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
