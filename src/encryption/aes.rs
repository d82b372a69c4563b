//! AES-CBC primitives for PDF decryption.
//!
//! Encrypted strings and streams carry a 16-byte IV prefix followed by
//! AES-CBC ciphertext with PKCS#7 padding. The R5/R6 key unwrapping and
//! Algorithm 2.B use raw CBC without padding.
//!
//! PDF Spec: Section 7.6.2 - General Encryption Algorithm

use crate::error::{Error, Result};
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

fn check_lengths(key: &[u8], iv: &[u8], data: &[u8]) -> Result<()> {
    if key.len() != 16 && key.len() != 32 {
        return Err(Error::Decryption(format!("AES key must be 16 or 32 bytes, got {}", key.len())));
    }
    if iv.len() != 16 {
        return Err(Error::Decryption(format!("AES IV must be 16 bytes, got {}", iv.len())));
    }
    if data.len() % 16 != 0 {
        return Err(Error::Decryption(format!(
            "AES ciphertext length {} is not a multiple of 16",
            data.len()
        )));
    }
    Ok(())
}

/// CBC-decrypt whole blocks; the key length picks AES-128 or AES-256.
pub fn cbc_decrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, iv, data)?;
    let mut buffer = data.to_vec();
    let failed = |_| Error::Decryption("AES-CBC decryption failed".to_string());
    if key.len() == 16 {
        Aes128CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(failed)?;
    } else {
        Aes256CbcDec::new(key.into(), iv.into())
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(failed)?;
    }
    Ok(buffer)
}

/// CBC-encrypt whole blocks; the key length picks AES-128 or AES-256.
pub fn cbc_encrypt_raw(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, iv, data)?;
    let mut buffer = data.to_vec();
    let len = buffer.len();
    let failed = |_| Error::Decryption("AES-CBC encryption failed".to_string());
    if key.len() == 16 {
        Aes128CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .map_err(failed)?;
    } else {
        Aes256CbcEnc::new(key.into(), iv.into())
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .map_err(failed)?;
    }
    Ok(buffer)
}

/// Decrypt an IV-prefixed, PKCS#7-padded payload.
///
/// Padding that does not verify is left in place; some producers write
/// malformed padding and readers accept it.
pub fn decrypt_payload(key: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < 16 {
        return Err(Error::Decryption(format!(
            "AES payload of {} bytes is shorter than its IV",
            payload.len()
        )));
    }
    let (iv, ciphertext) = payload.split_at(16);
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }

    let mut plain = cbc_decrypt_raw(key, iv, ciphertext)?;
    let pad = plain[plain.len() - 1] as usize;
    let valid = (1..=16).contains(&pad) && plain[plain.len() - pad..].iter().all(|&b| b as usize == pad);
    if valid {
        plain.truncate(plain.len() - pad);
    } else {
        log::debug!("AES payload has invalid PKCS#7 padding, keeping all {} bytes", plain.len());
    }
    Ok(plain)
}
