//! Standard security handler key derivation.
//!
//! PDF Spec: Section 7.6.3 - Standard Security Handler (R2-R4)
//! PDF 2.0 Spec (ISO 32000-2:2020): Section 7.6.4.3 - Algorithms 2.A/2.B (R5/R6)

use super::aes::{cbc_decrypt_raw, cbc_encrypt_raw};
use super::rc4::rc4_crypt;
use crate::error::Result;
use crate::object::ObjectRef;
use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

/// Padding string used in PDF encryption (32 bytes).
///
/// PDF Spec: Algorithm 2, step 1
pub const PADDING: &[u8; 32] = b"\x28\xBF\x4E\x5E\x4E\x75\x8A\x41\
                                 \x64\x00\x4E\x56\xFF\xFA\x01\x08\
                                 \x2E\x2E\x00\xB6\xD0\x68\x3E\x80\
                                 \x2F\x0C\xA9\xFE\x64\x53\x69\x7A";

/// Pad or truncate a password to 32 bytes using the standard padding.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Inputs of Algorithm 2 taken from the encryption dictionary and trailer.
#[derive(Debug, Clone, Copy)]
pub struct KeyInputs<'a> {
    /// `/O` entry
    pub owner_key: &'a [u8],
    /// `/P` entry
    pub permissions: i32,
    /// First element of the trailer `/ID` array
    pub file_id: &'a [u8],
    /// `/R` entry
    pub revision: u32,
    /// Key length in bytes (5 to 16)
    pub key_length: usize,
    /// `/EncryptMetadata`
    pub encrypt_metadata: bool,
}

/// Algorithm 2: file encryption key for R2-R4.
pub fn compute_file_key(password: &[u8], inputs: &KeyInputs<'_>) -> Vec<u8> {
    let n = inputs.key_length.clamp(5, 16);

    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(inputs.owner_key);
    hasher.update(inputs.permissions.to_le_bytes());
    hasher.update(inputs.file_id);
    if inputs.revision >= 4 && !inputs.encrypt_metadata {
        hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut hash = hasher.finalize().to_vec();

    if inputs.revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..n]).to_vec();
        }
    }

    hash.truncate(n);
    hash
}

/// Algorithm 4 (R2) or 5 (R3/R4): the `/U` value a key produces.
///
/// For R3/R4 only the first 16 bytes are significant.
pub fn compute_user_key(file_key: &[u8], revision: u32, file_id: &[u8]) -> Vec<u8> {
    if revision < 3 {
        return rc4_crypt(file_key, PADDING);
    }

    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut hash = hasher.finalize().to_vec();

    for i in 0..20u8 {
        let round_key: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
        hash = rc4_crypt(&round_key, &hash);
    }

    hash.extend_from_slice(&[0u8; 16]);
    hash
}

/// Algorithms 4/5 check of a user password; returns the file key on success.
pub fn authenticate_user_password(password: &[u8], user_key: &[u8], inputs: &KeyInputs<'_>) -> Option<Vec<u8>> {
    let key = compute_file_key(password, inputs);
    let expected = compute_user_key(&key, inputs.revision, inputs.file_id);
    let significant = if inputs.revision >= 3 { 16 } else { 32 };

    if user_key.len() < significant {
        return None;
    }
    constant_time_eq(&user_key[..significant], &expected[..significant]).then_some(key)
}

/// Algorithm 2.B: the iterated hash of R6.
///
/// `udata` is the 48-byte `/U` string when hashing for the owner, empty
/// otherwise.
pub fn hash_r6(password: &[u8], salt: &[u8], udata: &[u8]) -> Result<[u8; 32]> {
    let password = &password[..password.len().min(127)];

    let mut k: Vec<u8> = {
        let mut h = Sha256::new();
        h.update(password);
        h.update(salt);
        h.update(udata);
        h.finalize().to_vec()
    };

    let mut round = 0usize;
    loop {
        let mut k1 = Vec::with_capacity(64 * (password.len() + k.len() + udata.len()));
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(udata);
        }

        let e = cbc_encrypt_raw(&k[..16], &k[16..32], &k1)?;
        let selector: u32 = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        let last = usize::from(*e.last().unwrap_or(&0));
        if round >= 64 && last + 32 <= round {
            break;
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    Ok(out)
}

/// Algorithm 2.A hash: plain SHA-256 for R5, Algorithm 2.B for R6.
fn hash_r5_or_r6(revision: u32, password: &[u8], salt: &[u8], udata: &[u8]) -> Result<[u8; 32]> {
    if revision == 5 {
        let mut h = Sha256::new();
        h.update(password);
        h.update(salt);
        h.update(udata);
        Ok(h.finalize().into())
    } else {
        hash_r6(password, salt, udata)
    }
}

/// Algorithm 2.A user-password branch for R5/R6.
///
/// `/U` is hash(32) + validation salt(8) + key salt(8); the file key is
/// `/UE` decrypted with AES-256-CBC (zero IV, no padding) under
/// hash(password + key salt).
pub fn authenticate_user_password_r6(
    password: &[u8],
    revision: u32,
    user_key: &[u8],
    user_encryption: &[u8],
) -> Result<Option<Vec<u8>>> {
    if user_key.len() < 48 || user_encryption.len() < 32 {
        return Ok(None);
    }
    let password = &password[..password.len().min(127)];
    let (hash, salts) = user_key.split_at(32);
    let (validation_salt, key_salt) = (&salts[..8], &salts[8..16]);

    let check = hash_r5_or_r6(revision, password, validation_salt, &[])?;
    if !constant_time_eq(&check, hash) {
        return Ok(None);
    }

    let intermediate = hash_r5_or_r6(revision, password, key_salt, &[])?;
    let file_key = cbc_decrypt_raw(&intermediate, &[0u8; 16], &user_encryption[..32])?;
    Ok(Some(file_key))
}

/// Per-object key (Algorithm 1): MD5 of the file key, the low three bytes of
/// the object number and the low two bytes of the generation, plus `sAlT`
/// for AES, truncated to `min(n + 5, 16)` bytes.
pub fn object_key(file_key: &[u8], reference: ObjectRef, aes: bool) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&reference.id.to_le_bytes()[..3]);
    hasher.update(&reference.gen.to_le_bytes()[..2]);
    if aes {
        hasher.update(b"sAlT");
    }
    let hash = hasher.finalize();
    hash[..(file_key.len() + 5).min(16)].to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
