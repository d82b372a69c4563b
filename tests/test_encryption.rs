//! Encrypted sources: decryption at load time, plain output after merging.

mod common;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use common::{hex, PdfBuilder};
use pdf_merge::encryption::{compute_file_key, compute_user_key, object_key, rc4_crypt, Algorithm, KeyInputs};
use pdf_merge::{
    load_document, merge_documents, write_document, Document, Error, MergeSource, Object, ObjectRef, Warning,
};

const FILE_ID: &[u8] = b"0123456789abcdef";
const OWNER: [u8; 32] = [0x4F; 32];
const LABEL: &[u8] = b"Quarterly numbers";
const CONTENT: &[u8] = b"BT /F1 12 Tf (classified) Tj ET";

#[derive(Clone, Copy)]
enum Cipher {
    Rc4,
    Aes128,
}

fn aes_encrypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    let iv = [7u8; 16];
    let mut buf = vec![0u8; data.len() + 16];
    buf[..data.len()].copy_from_slice(data);
    let ciphertext = cbc::Encryptor::<aes::Aes128>::new(key.into(), iv[..].into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
        .unwrap()
        .to_vec();
    let mut out = iv.to_vec();
    out.extend_from_slice(&ciphertext);
    out
}

/// A one-page document encrypted for the empty user password. The page label
/// (object 10) and content stream (object 11) are encrypted.
fn encrypted_pdf(cipher: Cipher, file_id_in_trailer: &[u8]) -> Vec<u8> {
    let revision = match cipher {
        Cipher::Rc4 => 3,
        Cipher::Aes128 => 4,
    };
    let inputs = KeyInputs {
        owner_key: &OWNER,
        permissions: -4,
        file_id: FILE_ID,
        revision,
        key_length: 16,
        encrypt_metadata: true,
    };
    let key = compute_file_key(b"", &inputs);
    let user = compute_user_key(&key, revision, FILE_ID);

    let encrypt = |number: u32, data: &[u8]| match cipher {
        Cipher::Rc4 => rc4_crypt(&object_key(&key, ObjectRef::new(number, 0), false), data),
        Cipher::Aes128 => aes_encrypt(&object_key(&key, ObjectRef::new(number, 0), true), data),
    };

    let encrypt_dict = match cipher {
        Cipher::Rc4 => format!(
            "<< /Filter /Standard /V 2 /R 3 /Length 128 /O <{}> /U <{}> /P -4 >>",
            hex(&OWNER),
            hex(&user)
        ),
        Cipher::Aes128 => format!(
            "<< /Filter /Standard /V 4 /R 4 /Length 128 /CF << /StdCF << /CFM /AESV2 /Length 16 >> >> \
             /StmF /StdCF /StrF /StdCF /O <{}> /U <{}> /P -4 >>",
            hex(&OWNER),
            hex(&user)
        ),
    };

    PdfBuilder::new()
        .version("1.6")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [10 0 R] /Count 1 /MediaBox [0 0 612 792] >>")
        .object(9, &encrypt_dict)
        .object(
            10,
            &format!(
                "<< /Type /Page /Parent 2 0 R /Label <{}> /Contents 11 0 R >>",
                hex(&encrypt(10, LABEL))
            ),
        )
        .stream(11, "", &encrypt(11, CONTENT))
        .trailer(&format!(
            "/Encrypt 9 0 R /ID [<{}> <{}>]",
            hex(file_id_in_trailer),
            hex(file_id_in_trailer)
        ))
        .build()
}

fn assert_plaintext(doc: &mut Document) {
    let page = doc.pages().unwrap()[0];
    let dict = doc.resolve_dict(page).unwrap();
    assert_eq!(dict["Label"], Object::String(LABEL.to_vec()));
    let contents = dict["Contents"].as_reference().unwrap();
    match doc.resolve(contents).unwrap() {
        Object::Stream { data, .. } => assert_eq!(&data[..], CONTENT),
        other => panic!("expected stream, got {:?}", other),
    }
}

#[test]
fn test_rc4_source_decrypted_on_load() {
    let mut doc = load_document(encrypted_pdf(Cipher::Rc4, FILE_ID)).unwrap();
    assert!(doc.is_encrypted());
    assert_eq!(doc.decryption().unwrap().algorithm(), Algorithm::Rc4_128);
    assert_plaintext(&mut doc);
}

#[test]
fn test_aes_source_decrypted_on_load() {
    let mut doc = load_document(encrypted_pdf(Cipher::Aes128, FILE_ID)).unwrap();
    assert_eq!(doc.decryption().unwrap().algorithm(), Algorithm::Aes128);
    assert_plaintext(&mut doc);
}

#[test]
fn test_merged_output_is_unencrypted() {
    for cipher in [Cipher::Rc4, Cipher::Aes128] {
        let doc = load_document(encrypted_pdf(cipher, FILE_ID)).unwrap();
        let mut merged = merge_documents(vec![MergeSource::all(doc)]).unwrap();
        let bytes = write_document(&mut merged).unwrap();

        assert!(!String::from_utf8_lossy(&bytes).contains("/Encrypt"));
        let mut reloaded = load_document(bytes).unwrap();
        assert!(!reloaded.is_encrypted());
        assert_plaintext(&mut reloaded);
    }
}

#[test]
fn test_rewriting_encrypted_document_drops_encryption() {
    let mut doc = load_document(encrypted_pdf(Cipher::Rc4, FILE_ID)).unwrap();
    let bytes = write_document(&mut doc).unwrap();
    let mut reloaded = load_document(bytes).unwrap();
    assert!(!reloaded.is_encrypted());
    assert!(reloaded.resolve(ObjectRef::new(9, 0)).is_err());
    assert_plaintext(&mut reloaded);
}

/// RC4 source whose page sits in an encrypted object stream, with no
/// cross-reference data at all.
fn encrypted_object_stream_without_xref() -> Vec<u8> {
    let inputs = KeyInputs {
        owner_key: &OWNER,
        permissions: -4,
        file_id: FILE_ID,
        revision: 3,
        key_length: 16,
        encrypt_metadata: true,
    };
    let key = compute_file_key(b"", &inputs);
    let user = compute_user_key(&key, 3, FILE_ID);
    let rc4 = |number: u32, data: &[u8]| rc4_crypt(&object_key(&key, ObjectRef::new(number, 0), false), data);

    let payload = format!(
        "10 0 << /Type /Page /Parent 2 0 R /Label ({}) /Contents 11 0 R >>",
        String::from_utf8_lossy(LABEL)
    );
    let (mut bytes, _) = PdfBuilder::new()
        .version("1.5")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [10 0 R] /Count 1 /MediaBox [0 0 612 792] >>")
        .object(
            9,
            &format!(
                "<< /Filter /Standard /V 2 /R 3 /Length 128 /O <{}> /U <{}> /P -4 >>",
                hex(&OWNER),
                hex(&user)
            ),
        )
        .stream(11, "", &rc4(11, CONTENT))
        .stream(20, "/Type /ObjStm /N 1 /First 5", &rc4(20, payload.as_bytes()))
        .body();
    bytes.extend_from_slice(
        format!(
            "trailer\n<< /Size 21 /Root 1 0 R /Encrypt 9 0 R /ID [<{0}> <{0}>] >>\n%%EOF\n",
            hex(FILE_ID)
        )
        .as_bytes(),
    );
    bytes
}

#[test]
fn test_reconstructed_encrypted_object_stream() {
    let mut doc = load_document(encrypted_object_stream_without_xref()).unwrap();
    assert!(doc
        .warnings()
        .iter()
        .any(|w| matches!(w, Warning::ReconstructedXref { .. })));
    assert_eq!(doc.pages().unwrap(), vec![ObjectRef::new(10, 0)]);
    assert_plaintext(&mut doc);

    let mut merged = merge_documents(vec![MergeSource::all(doc)]).unwrap();
    let mut reloaded = load_document(write_document(&mut merged).unwrap()).unwrap();
    assert_plaintext(&mut reloaded);
}

#[test]
fn test_non_empty_user_password_required() {
    // A different /ID changes the derived key, so the empty password no
    // longer authenticates.
    let bytes = encrypted_pdf(Cipher::Rc4, b"fedcba9876543210");
    assert!(matches!(load_document(bytes), Err(Error::PasswordRequired)));
}

#[test]
fn test_unknown_security_handler() {
    let bytes = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(3, "<< /Filter /Adobe.PubSec /V 4 /R 4 >>")
        .trailer("/Encrypt 3 0 R /ID [<00> <00>]")
        .build();
    assert!(matches!(load_document(bytes), Err(Error::UnsupportedEncryption(_))));
}

// ============================================================================
// Fixtures written by an independent encryptor
// ============================================================================

const FIXTURE_TITLE: &[u8] = b"Encrypted fixture";
const FIXTURE_CONTENT: &[u8] = b"BT /F1 12 Tf 72 720 Td (Fixture page) Tj ET";

fn load_fixture(name: &str) -> Document {
    let bytes = std::fs::read(format!("tests/fixtures/{}", name)).unwrap();
    load_document(bytes).unwrap()
}

fn assert_fixture_plaintext(doc: &mut Document) {
    let info = doc.trailer()["Info"].as_reference().unwrap();
    let info = doc.resolve_dict(info).unwrap();
    assert_eq!(info["Title"], Object::String(FIXTURE_TITLE.to_vec()));
    assert_eq!(info["Producer"], Object::String(b"fixture generator".to_vec()));

    let page = doc.pages().unwrap()[0];
    let contents = doc.resolve_dict(page).unwrap()["Contents"].as_reference().unwrap();
    match doc.resolve(contents).unwrap() {
        Object::Stream { data, .. } => assert_eq!(&data[..], FIXTURE_CONTENT),
        other => panic!("expected stream, got {:?}", other),
    }
}

#[test]
fn test_fixture_rc4_40_bit() {
    let mut doc = load_fixture("rc4_40_r2.pdf");
    let ctx = doc.decryption().unwrap();
    assert_eq!(ctx.algorithm(), Algorithm::RC4_40);
    assert_eq!(hex(ctx.file_key()), "6265C000BE");
    assert_fixture_plaintext(&mut doc);
}

#[test]
fn test_fixture_aes_128_with_clear_metadata() {
    let mut doc = load_fixture("aes128_r4_clear_metadata.pdf");
    let ctx = doc.decryption().unwrap();
    assert_eq!(ctx.algorithm(), Algorithm::Aes128);
    assert_eq!(hex(ctx.file_key()), "248D55B55E3410FA045D420B1CDB5DF3");
    assert_fixture_plaintext(&mut doc);

    match doc.resolve(ObjectRef::new(6, 0)).unwrap() {
        Object::Stream { data, .. } => assert!(data.starts_with(b"<?xpacket begin=")),
        other => panic!("expected metadata stream, got {:?}", other),
    }
}

#[test]
fn test_fixture_aes_256_r6() {
    let mut doc = load_fixture("aes256_r6.pdf");
    let ctx = doc.decryption().unwrap();
    assert_eq!(ctx.algorithm(), Algorithm::Aes256);
    assert_eq!(
        hex(ctx.file_key()),
        "F3D82533342E5AAAF82585CDCA5A43A3A6A5A509BB94976F88C9847B0CF55BEB"
    );
    assert_fixture_plaintext(&mut doc);
}

#[test]
fn test_fixtures_merge_into_plain_output() {
    let sources = ["rc4_40_r2.pdf", "aes128_r4_clear_metadata.pdf", "aes256_r6.pdf"]
        .into_iter()
        .map(|name| MergeSource::all(load_fixture(name)))
        .collect();
    let mut merged = merge_documents(sources).unwrap();
    let bytes = write_document(&mut merged).unwrap();

    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("/Encrypt"));
    assert_eq!(text.matches("Fixture page").count(), 3);

    let mut reloaded = load_document(bytes).unwrap();
    assert!(!reloaded.is_encrypted());
    assert_eq!(reloaded.version(), (1, 7));
    assert_eq!(reloaded.page_count().unwrap(), 3);
}
