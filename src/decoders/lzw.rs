//! LZWDecode implementation.
//!
//! PDF LZW is MSB-first with 9 to 12 bit codes, clear code 256 and EOD 257.
//! With `/EarlyChange 1` (the default) the code width grows one code early,
//! which is the TIFF flavour of weezl's decoder.

use crate::decoders::{DecodeParams, StreamDecoder, check_output_limit};
use crate::error::{Error, Result};
use weezl::{BitOrder, LzwStatus, decode::Decoder as WeezlDecoder};

/// LZWDecode filter implementation.
pub struct LzwDecoder;

impl LzwDecoder {
    fn weezl_decoder(params: Option<&DecodeParams>) -> WeezlDecoder {
        let early_change = params.map(|p| p.early_change).unwrap_or(true);
        if early_change {
            WeezlDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            WeezlDecoder::new(BitOrder::Msb, 8)
        }
    }
}

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8], params: Option<&DecodeParams>) -> Result<Vec<u8>> {
        let mut decoder = Self::weezl_decoder(params);
        let mut output = Vec::new();
        let result = decoder.into_vec(&mut output).decode(input);
        match result.status {
            Ok(_) => Ok(output),
            Err(e) if !output.is_empty() => {
                log::warn!("LZWDecode recovered {} bytes before error: {:?}", output.len(), e);
                Ok(output)
            },
            Err(e) => Err(Error::Decode(format!("LZWDecode error: {:?}", e))),
        }
    }

    fn decode_limited(&self, input: &[u8], params: Option<&DecodeParams>, limit: usize) -> Result<Vec<u8>> {
        let mut decoder = Self::weezl_decoder(params);
        let mut output = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut rest = input;

        loop {
            let result = decoder.decode_bytes(rest, &mut chunk);
            rest = &rest[result.consumed_in..];
            output.extend_from_slice(&chunk[..result.consumed_out]);
            if output.len() > limit {
                return check_output_limit(self.name(), output, limit);
            }
            match result.status {
                Ok(LzwStatus::Ok) => {},
                Ok(LzwStatus::Done) | Ok(LzwStatus::NoProgress) => break,
                Err(e) if !output.is_empty() => {
                    log::warn!("LZWDecode recovered {} bytes before error: {:?}", output.len(), e);
                    break;
                },
                Err(e) => return Err(Error::Decode(format!("LZWDecode error: {:?}", e))),
            }
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weezl::encode::Encoder as WeezlEncoder;

    #[test]
    fn test_lzw_round_trip_early_change() {
        let original = b"-----A---B-----A---B-----A---B".to_vec();
        let encoded = WeezlEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(&original)
            .unwrap();

        let decoded = LzwDecoder.decode(&encoded, None).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_lzw_without_early_change() {
        let original = b"repetition repetition repetition".to_vec();
        let encoded = WeezlEncoder::new(BitOrder::Msb, 8).encode(&original).unwrap();
        let params = DecodeParams {
            early_change: false,
            ..Default::default()
        };

        let decoded = LzwDecoder.decode(&encoded, Some(&params)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_lzw_decode_limited() {
        let original = vec![b'z'; 64 * 1024];
        let encoded = WeezlEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(&original)
            .unwrap();

        assert!(matches!(LzwDecoder.decode_limited(&encoded, None, 1000), Err(Error::Decode(_))));
        assert_eq!(LzwDecoder.decode_limited(&encoded, None, original.len()).unwrap(), original);
    }
}
