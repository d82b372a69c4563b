//! Per-document decryption state.
//!
//! A [`DecryptionContext`] is built once at load time from the `/Encrypt`
//! dictionary by authenticating the empty user password. It then decrypts
//! every object as it is read, so the rest of the crate only sees plaintext.

use super::aes::decrypt_payload;
use super::algorithms::{self, KeyInputs};
use super::rc4::rc4_crypt;
use super::{Algorithm, CryptMethod, EncryptDict};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::HashMap;

/// Decryption state derived from the standard security handler.
#[derive(Debug, Clone)]
pub struct DecryptionContext {
    algorithm: Algorithm,
    file_key: Vec<u8>,
    string_method: CryptMethod,
    stream_method: CryptMethod,
    encrypt_metadata: bool,
    crypt_filters: HashMap<String, CryptMethod>,
    /// Object holding the `/Encrypt` dictionary, never decrypted
    encrypt_ref: Option<ObjectRef>,
}

impl DecryptionContext {
    /// Authenticate the empty user password against `/Encrypt`.
    ///
    /// `file_id` is the first element of the trailer `/ID` array (empty when
    /// absent).
    ///
    /// # Errors
    ///
    /// - [`Error::PasswordRequired`] when the empty password is rejected
    /// - [`Error::UnsupportedEncryption`] for handlers, versions or crypt
    ///   filter methods this crate cannot decrypt
    pub fn new(encrypt: &Dictionary, file_id: &[u8], encrypt_ref: Option<ObjectRef>) -> Result<Self> {
        let dict = EncryptDict::from_dict(encrypt)?;
        let (string_method, stream_method) = dict.methods()?;
        let algorithm = dict.algorithm()?;

        log::info!(
            "PDF is encrypted with {:?} (V={}, R={}, StmF={:?}, StrF={:?})",
            algorithm,
            dict.version,
            dict.revision,
            stream_method,
            string_method
        );

        let file_key = match dict.revision {
            2..=4 => {
                let inputs = KeyInputs {
                    owner_key: &dict.owner_password,
                    permissions: dict.permissions,
                    file_id,
                    revision: dict.revision,
                    key_length: dict.key_length_bytes(),
                    encrypt_metadata: dict.encrypt_metadata,
                };
                algorithms::authenticate_user_password(b"", &dict.user_password, &inputs)
            },
            5 | 6 => {
                let ue = dict.user_encryption.as_deref().ok_or_else(|| {
                    Error::InvalidPdf("Encrypt dictionary missing /UE".to_string())
                })?;
                algorithms::authenticate_user_password_r6(b"", dict.revision, &dict.user_password, ue)?
            },
            r => return Err(Error::UnsupportedEncryption(format!("/R {}", r))),
        };

        let file_key = file_key.ok_or(Error::PasswordRequired)?;
        log::debug!("Authenticated empty user password, {}-byte file key", file_key.len());

        Ok(Self {
            algorithm,
            file_key,
            string_method,
            stream_method,
            encrypt_metadata: dict.encrypt_metadata,
            crypt_filters: dict.crypt_filters,
            encrypt_ref,
        })
    }

    /// The declared algorithm family.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The derived file encryption key.
    pub fn file_key(&self) -> &[u8] {
        &self.file_key
    }

    /// Decrypt every string and stream payload of the indirect object
    /// `reference`.
    ///
    /// Dictionary keys and names are never encrypted. The `/Encrypt` object
    /// and cross-reference streams are returned unchanged.
    pub fn decrypt_object(&self, obj: Object, reference: ObjectRef) -> Result<Object> {
        if Some(reference) == self.encrypt_ref {
            return Ok(obj);
        }
        if let Object::Stream { dict, .. } = &obj {
            if dict.get("Type").and_then(|t| t.as_name()) == Some("XRef") {
                return Ok(obj);
            }
        }
        self.decrypt_value(obj, reference)
    }

    fn decrypt_value(&self, obj: Object, reference: ObjectRef) -> Result<Object> {
        Ok(match obj {
            Object::String(data) => Object::String(self.decrypt_bytes(self.string_method, &data, reference)?),
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.decrypt_value(item, reference))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.decrypt_dict(dict, reference)?),
            Object::Stream { dict, data } => {
                let method = self.stream_method_for(&dict);
                let data = match method {
                    CryptMethod::None => data,
                    method => self.decrypt_bytes(method, &data, reference)?.into(),
                };
                Object::Stream {
                    dict: self.decrypt_dict(dict, reference)?,
                    data,
                }
            },
            other => other,
        })
    }

    fn decrypt_dict(&self, dict: Dictionary, reference: ObjectRef) -> Result<Dictionary> {
        dict.into_iter()
            .map(|(key, value)| Ok((key, self.decrypt_value(value, reference)?)))
            .collect()
    }

    /// Crypt method for one stream: an explicit `/Crypt` first filter
    /// overrides `/StmF`, and unencrypted metadata stays in the clear.
    fn stream_method_for(&self, dict: &Dictionary) -> CryptMethod {
        if !self.encrypt_metadata && dict.get("Type").and_then(|t| t.as_name()) == Some("Metadata") {
            return CryptMethod::None;
        }

        let first_filter = match dict.get("Filter") {
            Some(Object::Name(name)) => Some(name.as_str()),
            Some(Object::Array(filters)) => filters.first().and_then(|f| f.as_name()),
            _ => None,
        };
        if first_filter == Some("Crypt") {
            let parms = match dict.get("DecodeParms") {
                Some(Object::Array(parms)) => parms.first().and_then(|p| p.as_dict()),
                Some(other) => other.as_dict(),
                None => None,
            };
            let name = parms
                .and_then(|p| p.get("Name"))
                .and_then(|n| n.as_name())
                .unwrap_or("Identity");
            return self.crypt_filters.get(name).copied().unwrap_or(CryptMethod::None);
        }

        self.stream_method
    }

    fn decrypt_bytes(&self, method: CryptMethod, data: &[u8], reference: ObjectRef) -> Result<Vec<u8>> {
        match method {
            CryptMethod::None => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4_crypt(&algorithms::object_key(&self.file_key, reference, false), data)),
            // empty strings are often left unencrypted by writers
            CryptMethod::Aes128 | CryptMethod::Aes256 if data.is_empty() => Ok(Vec::new()),
            CryptMethod::Aes128 => decrypt_payload(&algorithms::object_key(&self.file_key, reference, true), data)
                .map_err(|e| Error::Decryption(format!("object {}: {}", reference, e))),
            CryptMethod::Aes256 => decrypt_payload(&self.file_key, data)
                .map_err(|e| Error::Decryption(format!("object {}: {}", reference, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::aes::cbc_encrypt_raw;
    use super::*;
    use bytes::Bytes;

    const FILE_ID: &[u8] = b"\x8a\x1f\x03\x77\x42\x10\xc9\x5e\x0b\x66\xd4\x21\x9a\x3c\x58\xe7";

    fn encrypt_dict(version: i64, revision: i64, length: i64) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("Filter".to_string(), Object::name("Standard"));
        dict.insert("V".to_string(), Object::Integer(version));
        dict.insert("R".to_string(), Object::Integer(revision));
        dict.insert("Length".to_string(), Object::Integer(length));
        dict.insert("O".to_string(), Object::String(vec![0x4Fu8; 32]));
        dict.insert("P".to_string(), Object::Integer(-1028));
        dict
    }

    /// Fill in `/U` so that the empty password authenticates; returns the file key.
    fn install_user_key(dict: &mut Dictionary, revision: u32, key_length: usize) -> Vec<u8> {
        let owner = dict.get("O").and_then(|o| o.as_string()).unwrap().to_vec();
        let inputs = KeyInputs {
            owner_key: &owner,
            permissions: -1028,
            file_id: FILE_ID,
            revision,
            key_length,
            encrypt_metadata: true,
        };
        let key = algorithms::compute_file_key(b"", &inputs);
        let u = algorithms::compute_user_key(&key, revision, FILE_ID);
        dict.insert("U".to_string(), Object::String(u));
        key
    }

    fn aes_encrypt(key: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let iv = [7u8; 16];
        let pad = 16 - plaintext.len() % 16;
        let mut padded = plaintext.to_vec();
        padded.extend(std::iter::repeat(pad as u8).take(pad));
        let mut out = iv.to_vec();
        out.extend(cbc_encrypt_raw(key, &iv, &padded).unwrap());
        out
    }

    fn stream(dict: Dictionary, data: Vec<u8>) -> Object {
        Object::Stream {
            dict,
            data: Bytes::from(data),
        }
    }

    // ========================================================================
    // RC4 (R2/R3)
    // ========================================================================

    #[test]
    fn test_r3_rc4_strings_and_streams() {
        let mut dict = encrypt_dict(2, 3, 128);
        let key = install_user_key(&mut dict, 3, 16);
        let ctx = DecryptionContext::new(&dict, FILE_ID, Some(ObjectRef::new(9, 0))).unwrap();
        assert_eq!(ctx.algorithm(), Algorithm::Rc4_128);
        assert_eq!(ctx.file_key(), key.as_slice());

        let r = ObjectRef::new(4, 0);
        let obj_key = algorithms::object_key(&key, r, false);
        let mut page = Dictionary::new();
        page.insert("Title".to_string(), Object::String(rc4_crypt(&obj_key, b"Hello")));
        page.insert("Type".to_string(), Object::name("Annot"));
        let plain = ctx.decrypt_object(Object::Dictionary(page), r).unwrap();
        assert_eq!(plain.as_dict().unwrap()["Title"], Object::String(b"Hello".to_vec()));
        assert_eq!(plain.as_dict().unwrap()["Type"], Object::name("Annot"));

        let content = stream(Dictionary::new(), rc4_crypt(&obj_key, b"BT ET"));
        match ctx.decrypt_object(content, r).unwrap() {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"BT ET"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_r2_rc4_40() {
        let mut dict = encrypt_dict(1, 2, 40);
        let key = install_user_key(&mut dict, 2, 5);
        let ctx = DecryptionContext::new(&dict, FILE_ID, None).unwrap();
        assert_eq!(ctx.algorithm(), Algorithm::RC4_40);

        let r = ObjectRef::new(12, 0);
        let cipher = rc4_crypt(&algorithms::object_key(&key, r, false), b"(nested) text");
        let obj = Object::Array(vec![Object::Integer(1), Object::String(cipher)]);
        let plain = ctx.decrypt_object(obj, r).unwrap();
        assert_eq!(plain.as_array().unwrap()[1], Object::String(b"(nested) text".to_vec()));
    }

    #[test]
    fn test_non_empty_password_required() {
        let mut dict = encrypt_dict(2, 3, 128);
        install_user_key(&mut dict, 3, 16);
        dict.insert("U".to_string(), Object::String(vec![0xEEu8; 32]));
        assert!(matches!(
            DecryptionContext::new(&dict, FILE_ID, None),
            Err(Error::PasswordRequired)
        ));
    }

    #[test]
    fn test_wrong_file_id_fails_authentication() {
        let mut dict = encrypt_dict(2, 3, 128);
        install_user_key(&mut dict, 3, 16);
        assert!(matches!(
            DecryptionContext::new(&dict, b"another id", None),
            Err(Error::PasswordRequired)
        ));
    }

    // ========================================================================
    // Exclusions
    // ========================================================================

    #[test]
    fn test_encrypt_object_and_xref_stream_untouched() {
        let mut dict = encrypt_dict(2, 3, 128);
        install_user_key(&mut dict, 3, 16);
        let encrypt_ref = ObjectRef::new(9, 0);
        let ctx = DecryptionContext::new(&dict, FILE_ID, Some(encrypt_ref)).unwrap();

        let raw = Object::Dictionary(dict.clone());
        assert_eq!(ctx.decrypt_object(raw.clone(), encrypt_ref).unwrap(), raw);

        let mut xref_dict = Dictionary::new();
        xref_dict.insert("Type".to_string(), Object::name("XRef"));
        xref_dict.insert("ID".to_string(), Object::String(FILE_ID.to_vec()));
        let xref = stream(xref_dict, vec![1, 0, 0, 2]);
        assert_eq!(ctx.decrypt_object(xref.clone(), ObjectRef::new(20, 0)).unwrap(), xref);
    }

    #[test]
    fn test_identity_crypt_filter_stream() {
        let mut dict = encrypt_dict(2, 3, 128);
        install_user_key(&mut dict, 3, 16);
        let ctx = DecryptionContext::new(&dict, FILE_ID, None).unwrap();

        let mut s = Dictionary::new();
        s.insert("Filter".to_string(), Object::Array(vec![Object::name("Crypt")]));
        let obj = stream(s, b"clear text".to_vec());
        match ctx.decrypt_object(obj, ObjectRef::new(3, 0)).unwrap() {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"clear text"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    // ========================================================================
    // AES (R4/R6)
    // ========================================================================

    fn aesv2_dict(encrypt_metadata: bool) -> Dictionary {
        let mut dict = encrypt_dict(4, 4, 128);
        let mut std_cf = Dictionary::new();
        std_cf.insert("CFM".to_string(), Object::name("AESV2"));
        let mut cf = Dictionary::new();
        cf.insert("StdCF".to_string(), Object::Dictionary(std_cf));
        dict.insert("CF".to_string(), Object::Dictionary(cf));
        dict.insert("StmF".to_string(), Object::name("StdCF"));
        dict.insert("StrF".to_string(), Object::name("StdCF"));
        dict.insert("EncryptMetadata".to_string(), Object::Boolean(encrypt_metadata));
        dict
    }

    #[test]
    fn test_r4_aesv2() {
        let mut dict = aesv2_dict(true);
        let key = install_user_key(&mut dict, 4, 16);
        let ctx = DecryptionContext::new(&dict, FILE_ID, None).unwrap();
        assert_eq!(ctx.algorithm(), Algorithm::Aes128);

        let r = ObjectRef::new(5, 0);
        let obj_key = algorithms::object_key(&key, r, true);
        let mut s = Dictionary::new();
        s.insert("Label".to_string(), Object::String(aes_encrypt(&obj_key, b"label")));
        let obj = stream(s, aes_encrypt(&obj_key, b"0 0 m 10 10 l S"));

        match ctx.decrypt_object(obj, r).unwrap() {
            Object::Stream { dict, data } => {
                assert_eq!(&data[..], b"0 0 m 10 10 l S");
                assert_eq!(dict["Label"], Object::String(b"label".to_vec()));
            },
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_r4_metadata_left_in_clear() {
        let mut dict = aesv2_dict(false);
        let inputs_key = {
            let owner = vec![0x4Fu8; 32];
            let inputs = KeyInputs {
                owner_key: &owner,
                permissions: -1028,
                file_id: FILE_ID,
                revision: 4,
                key_length: 16,
                encrypt_metadata: false,
            };
            algorithms::compute_file_key(b"", &inputs)
        };
        let u = algorithms::compute_user_key(&inputs_key, 4, FILE_ID);
        dict.insert("U".to_string(), Object::String(u));
        let ctx = DecryptionContext::new(&dict, FILE_ID, None).unwrap();

        let mut m = Dictionary::new();
        m.insert("Type".to_string(), Object::name("Metadata"));
        let xml = stream(m, b"<x:xmpmeta/>".to_vec());
        assert_eq!(ctx.decrypt_object(xml.clone(), ObjectRef::new(8, 0)).unwrap(), xml);
    }

    #[test]
    fn test_r4_empty_string_stays_empty() {
        let mut dict = aesv2_dict(true);
        install_user_key(&mut dict, 4, 16);
        let ctx = DecryptionContext::new(&dict, FILE_ID, None).unwrap();
        let out = ctx.decrypt_object(Object::String(Vec::new()), ObjectRef::new(1, 0)).unwrap();
        assert_eq!(out, Object::String(Vec::new()));
    }

    #[test]
    fn test_r4_truncated_ciphertext_is_error() {
        let mut dict = aesv2_dict(true);
        install_user_key(&mut dict, 4, 16);
        let ctx = DecryptionContext::new(&dict, FILE_ID, None).unwrap();
        let result = ctx.decrypt_object(Object::String(vec![1, 2, 3]), ObjectRef::new(1, 0));
        assert!(matches!(result, Err(Error::Decryption(_))));
    }

    #[test]
    fn test_r6_aesv3() {
        let file_key = [0x42u8; 32];
        let validation_salt = *b"vsalt123";
        let key_salt = *b"ksalt456";

        let mut u = algorithms::hash_r6(b"", &validation_salt, &[]).unwrap().to_vec();
        u.extend_from_slice(&validation_salt);
        u.extend_from_slice(&key_salt);
        let intermediate = algorithms::hash_r6(b"", &key_salt, &[]).unwrap();
        let ue = cbc_encrypt_raw(&intermediate, &[0u8; 16], &file_key).unwrap();

        let mut dict = encrypt_dict(5, 6, 256);
        dict.insert("O".to_string(), Object::String(vec![0u8; 48]));
        dict.insert("U".to_string(), Object::String(u));
        dict.insert("UE".to_string(), Object::String(ue));
        let mut std_cf = Dictionary::new();
        std_cf.insert("CFM".to_string(), Object::name("AESV3"));
        let mut cf = Dictionary::new();
        cf.insert("StdCF".to_string(), Object::Dictionary(std_cf));
        dict.insert("CF".to_string(), Object::Dictionary(cf));
        dict.insert("StmF".to_string(), Object::name("StdCF"));
        dict.insert("StrF".to_string(), Object::name("StdCF"));

        let ctx = DecryptionContext::new(&dict, b"", None).unwrap();
        assert_eq!(ctx.algorithm(), Algorithm::Aes256);
        assert_eq!(ctx.file_key(), &file_key);

        // AES-256 uses the file key for every object
        let cipher = aes_encrypt(&file_key, b"Page text");
        for r in [ObjectRef::new(3, 0), ObjectRef::new(77, 1)] {
            let out = ctx.decrypt_object(Object::String(cipher.clone()), r).unwrap();
            assert_eq!(out, Object::String(b"Page text".to_vec()));
        }
    }

    #[test]
    fn test_r6_missing_ue() {
        let mut dict = encrypt_dict(5, 6, 256);
        dict.insert("U".to_string(), Object::String(vec![0u8; 48]));
        assert!(DecryptionContext::new(&dict, b"", None).is_err());
    }

    #[test]
    fn test_unsupported_revision() {
        let mut dict = encrypt_dict(2, 7, 128);
        dict.insert("U".to_string(), Object::String(vec![0u8; 32]));
        assert!(matches!(
            DecryptionContext::new(&dict, FILE_ID, None),
            Err(Error::UnsupportedEncryption(_))
        ));
    }
}
