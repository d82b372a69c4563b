//! PDF decryption support.
//!
//! Implements the standard security handler (ISO 32000-1:2008, Section 7.6,
//! and ISO 32000-2:2020 for R6) for reading:
//!
//! - RC4 with 40 to 128 bit keys (V 1/2, R 2/3)
//! - crypt filters with RC4 or AES-128 (V 4, R 4)
//! - AES-256 (V 5, R 5/6)
//!
//! Only the empty user password is tried. Output is never encrypted.
//!
//! # References
//!
//! - PDF Spec Section 7.6.3: Standard Security Handler
//! - PDF Spec Section 7.6.5: Crypt Filters

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use std::collections::HashMap;

mod aes;
mod algorithms;
mod handler;
mod rc4;

pub use algorithms::{KeyInputs, compute_file_key, compute_user_key, object_key};
pub use handler::DecryptionContext;
pub use rc4::rc4_crypt;

/// Encryption algorithm declared by the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RC4 with a 40-bit key (V=1, R=2)
    RC4_40,
    /// RC4 with a key longer than 40 bits (V=2 or V=4 with `/V2`)
    Rc4_128,
    /// AES-128 in CBC mode (V=4 with `/AESV2`)
    Aes128,
    /// AES-256 in CBC mode (V=5)
    Aes256,
}

impl Algorithm {
    /// Check if this is an AES algorithm.
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128 | Algorithm::Aes256)
    }
}

/// Cipher applied by one crypt filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// `/Identity` or `/CFM /None`: data is stored in the clear
    None,
    /// `/CFM /V2`
    Rc4,
    /// `/CFM /AESV2`
    Aes128,
    /// `/CFM /AESV3`
    Aes256,
}

impl CryptMethod {
    fn from_cfm(name: &str) -> Result<Self> {
        match name {
            "None" => Ok(CryptMethod::None),
            "V2" => Ok(CryptMethod::Rc4),
            "AESV2" => Ok(CryptMethod::Aes128),
            "AESV3" => Ok(CryptMethod::Aes256),
            other => Err(Error::UnsupportedEncryption(format!("crypt filter method /{}", other))),
        }
    }
}

/// PDF encryption dictionary (`/Encrypt` entry in the trailer).
///
/// PDF Spec: Table 20 and Table 21
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// Security handler name (only "Standard" is supported)
    pub filter: String,
    /// Algorithm version (V)
    pub version: u32,
    /// Key length in bits (Length)
    pub length: Option<u32>,
    /// Revision number (R): 2 to 6
    pub revision: u32,
    /// `/O` string: 32 or 48 bytes
    pub owner_password: Vec<u8>,
    /// `/U` string: 32 or 48 bytes
    pub user_password: Vec<u8>,
    /// `/OE` string (R5/R6)
    pub owner_encryption: Option<Vec<u8>>,
    /// `/UE` string (R5/R6)
    pub user_encryption: Option<Vec<u8>>,
    /// User permissions (P)
    pub permissions: i32,
    /// `/EncryptMetadata`, true by default
    pub encrypt_metadata: bool,
    /// Crypt filters by name from `/CF`, `/Identity` included
    pub crypt_filters: HashMap<String, CryptMethod>,
    /// `/StmF`, defaults to `Identity`
    pub stream_filter: String,
    /// `/StrF`, defaults to `Identity`
    pub string_filter: String,
}

impl EncryptDict {
    /// Parse an encryption dictionary.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedEncryption`] for a non-Standard security handler
    /// or an unknown crypt filter method, [`Error::InvalidPdf`] when a
    /// required entry is missing.
    pub fn from_dict(dict: &Dictionary) -> Result<Self> {
        let filter = dict
            .get("Filter")
            .and_then(|o| o.as_name())
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /Filter".to_string()))?
            .to_string();
        if filter != "Standard" {
            return Err(Error::UnsupportedEncryption(format!("security handler /{}", filter)));
        }

        let int = |key: &str| dict.get(key).and_then(|o| o.as_integer());
        let bytes = |key: &str| dict.get(key).and_then(|o| o.as_string()).map(|s| s.to_vec());

        let version = int("V").unwrap_or(0);
        let revision = int("R").ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /R".to_string()))?;
        let owner_password =
            bytes("O").ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /O".to_string()))?;
        let user_password =
            bytes("U").ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /U".to_string()))?;
        let permissions = int("P").ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /P".to_string()))?;

        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|o| o.as_bool())
            .unwrap_or(true);

        let mut crypt_filters = HashMap::new();
        crypt_filters.insert("Identity".to_string(), CryptMethod::None);
        if let Some(cf) = dict.get("CF").and_then(|o| o.as_dict()) {
            for (name, filter) in cf {
                let cfm = filter
                    .as_dict()
                    .and_then(|f| f.get("CFM"))
                    .and_then(|o| o.as_name())
                    .unwrap_or("None");
                crypt_filters.insert(name.clone(), CryptMethod::from_cfm(cfm)?);
            }
        }

        let filter_name = |key: &str| {
            dict.get(key)
                .and_then(|o| o.as_name())
                .unwrap_or("Identity")
                .to_string()
        };

        Ok(EncryptDict {
            filter,
            version: u32::try_from(version).unwrap_or(0),
            length: int("Length").and_then(|l| u32::try_from(l).ok()),
            revision: u32::try_from(revision).unwrap_or(0),
            owner_password,
            user_password,
            owner_encryption: bytes("OE"),
            user_encryption: bytes("UE"),
            // /P is a 32-bit signed field that some writers store unsigned
            permissions: permissions as i32,
            encrypt_metadata,
            crypt_filters,
            stream_filter: filter_name("StmF"),
            string_filter: filter_name("StrF"),
        })
    }

    /// Parse an encryption dictionary from an object.
    pub fn from_object(obj: &Object) -> Result<Self> {
        let dict = obj
            .as_dict()
            .ok_or_else(|| Error::InvalidPdf("Encrypt entry is not a dictionary".to_string()))?;
        Self::from_dict(dict)
    }

    /// File key length in bytes used by Algorithm 2.
    ///
    /// V 1 is always 40 bits; otherwise `/Length` (in bits) clamped to
    /// 40..=128. V 5 keys are always 32 bytes.
    pub fn key_length_bytes(&self) -> usize {
        match self.version {
            1 => 5,
            5 => 32,
            _ => {
                let default = if self.version >= 4 { 128 } else { 40 };
                (self.length.unwrap_or(default) as usize / 8).clamp(5, 16)
            },
        }
    }

    /// Method of the crypt filter named `name`.
    pub fn crypt_filter(&self, name: &str) -> Result<CryptMethod> {
        self.crypt_filters
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnsupportedEncryption(format!("undefined crypt filter /{}", name)))
    }

    /// Methods applied to (strings, streams).
    ///
    /// V 1/2 always use RC4; V 4/5 use the `/StrF` and `/StmF` filters.
    pub fn methods(&self) -> Result<(CryptMethod, CryptMethod)> {
        match self.version {
            1 | 2 => Ok((CryptMethod::Rc4, CryptMethod::Rc4)),
            4 | 5 => Ok((self.crypt_filter(&self.string_filter)?, self.crypt_filter(&self.stream_filter)?)),
            v => Err(Error::UnsupportedEncryption(format!("/V {}", v))),
        }
    }

    /// The algorithm family declared by V/R and the stream filter.
    pub fn algorithm(&self) -> Result<Algorithm> {
        let (strings, streams) = self.methods()?;
        let dominant = if streams == CryptMethod::None { strings } else { streams };
        Ok(match (self.version, dominant) {
            (_, CryptMethod::Aes256) | (5, _) => Algorithm::Aes256,
            (_, CryptMethod::Aes128) => Algorithm::Aes128,
            _ if self.key_length_bytes() == 5 => Algorithm::RC4_40,
            _ => Algorithm::Rc4_128,
        })
    }
}
