//! End-to-end decryption tests: documents are assembled with hand-rolled
//! encryption and read back through the public API.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use pdf_resolve::encryption::dict::EncryptionDictionary;
use pdf_resolve::encryption::rc4::rc4_apply;
use pdf_resolve::encryption::standard_security::compute_file_key;
use pdf_resolve::parser::objects::PdfDictionary;
use pdf_resolve::{ObjectId, ParseError, PdfReader};
use pretty_assertions::assert_eq;
use std::io::Cursor;

const FILE_ID: &[u8] = &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x11, 0x22, 0x33];
const PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56,
    0xFF, 0xFA, 0x01, 0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80,
    0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 2);
    out.push('<');
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out.push('>');
    out
}

/// `/U` for revision 3+ (ISO 32000-1 Algorithm 5), padded to 32 bytes.
fn user_hash_r3(file_key: &[u8]) -> Vec<u8> {
    let mut input = PAD.to_vec();
    input.extend_from_slice(FILE_ID);
    let digest = md5::compute(&input).0;

    let mut value = rc4_apply(file_key, &digest);
    for i in 1..=19u8 {
        let round_key: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
        value = rc4_apply(&round_key, &value);
    }
    value.resize(32, 0);
    value
}

/// Per-object key: MD5(fileKey ++ objNum LE24 ++ gen LE16 [++ "sAlT"]).
fn object_key(file_key: &[u8], id: ObjectId, aes: bool) -> Vec<u8> {
    let mut input = file_key.to_vec();
    input.extend_from_slice(&id.number().to_le_bytes()[..3]);
    input.extend_from_slice(&id.generation().to_le_bytes()[..2]);
    if aes {
        input.extend_from_slice(b"sAlT");
    }
    let digest = md5::compute(&input).0;
    let len = if aes { 16 } else { file_key.len().min(16) };
    digest[..len].to_vec()
}

/// Parse an encryption dictionary literal the same way the reader would,
/// returning the dictionary text and the file key derived from `password`.
fn encrypt_dict_for_password(
    extra: &str,
    owner_hash: &[u8],
    length: i64,
    password: &[u8],
) -> (String, Vec<u8>) {
    let user_placeholder = vec![0u8; 32];
    let text = |user: &[u8]| {
        format!(
            "<< /Filter /Standard {extra} /Length {length} /P -44 /O {} /U {} >>",
            hex_string(owner_hash),
            hex_string(user)
        )
    };

    // Derive the key against a placeholder /U first; /U does not feed the
    // key derivation, so the final dictionary yields the same key
    let dict = parse_dict_literal(&text(&user_placeholder));
    let enc = EncryptionDictionary::from_dict(&dict).unwrap();
    let file_key = compute_file_key(password, &enc, FILE_ID);
    let user_hash = user_hash_r3(&file_key);
    (text(&user_hash), file_key)
}

/// Empty-password variant, the common case.
fn standard_encrypt_dict(extra: &str, owner_hash: &[u8], length: i64) -> (String, Vec<u8>) {
    encrypt_dict_for_password(extra, owner_hash, length, b"")
}

fn parse_dict_literal(text: &str) -> PdfDictionary {
    let bytes = format!("9 0 obj\n{text}\nendobj\n");
    let mut lexer =
        pdf_resolve::parser::lexer::Lexer::new(Cursor::new(bytes.into_bytes()));
    let (_, obj) = pdf_resolve::parser::objects::parse_indirect_object(
        &mut lexer,
        &pdf_resolve::ParseOptions::default(),
    )
    .unwrap();
    obj.as_dict().unwrap().clone()
}

fn assemble(objects: &[(u32, String)], encrypt_obj: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.6\n");

    let mut offsets = Vec::new();
    for (number, body) in objects {
        offsets.push((*number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }

    let size = objects.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
    let xref = out.len();
    out.extend_from_slice(b"xref\n0 1\n0000000000 65535 f \n");
    for (number, offset) in &offsets {
        out.extend_from_slice(format!("{number} 1\n{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {size} /Root 1 0 R /Encrypt {encrypt_obj} 0 R /ID [{id} {id}] >>\n",
            id = hex_string(FILE_ID)
        )
        .as_bytes(),
    );
    out.extend_from_slice(format!("startxref\n{xref}\n%%EOF\n").as_bytes());
    out
}

#[test]
fn rc4_protected_string_decrypts() {
    let (enc_dict, file_key) =
        standard_encrypt_dict("/V 2 /R 3", &[0x5A; 32], 128);
    assert_eq!(file_key.len(), 16);

    let string_id = ObjectId::new(2, 0);
    let ciphertext = rc4_apply(&object_key(&file_key, string_id, false), b"top secret");

    let objects = vec![
        (1, "<< /Type /Catalog >>".to_string()),
        (2, hex_string(&ciphertext)),
        (3, enc_dict),
    ];
    let mut reader = PdfReader::new(Cursor::new(assemble(&objects, 3))).unwrap();
    assert!(reader.is_encrypted());

    let obj = reader.get_object(string_id).unwrap();
    assert_eq!(obj.as_string().unwrap().as_bytes(), b"top secret");
}

#[test]
fn rc4_protected_stream_decrypts() {
    let (enc_dict, file_key) =
        standard_encrypt_dict("/V 2 /R 3", &[0x5A; 32], 128);

    let stream_id = ObjectId::new(2, 0);
    let body = rc4_apply(
        &object_key(&file_key, stream_id, false),
        b"stream contents",
    );
    let mut stream_text = format!("<< /Length {} >>\nstream\n", body.len()).into_bytes();
    stream_text.extend_from_slice(&body);
    stream_text.extend_from_slice(b"\nendstream");

    // Ciphertext is not valid UTF-8; assemble at the byte level
    let objects: Vec<(u32, Vec<u8>)> = vec![
        (1, b"<< /Type /Catalog >>".to_vec()),
        (2, stream_text),
        (3, enc_dict.into_bytes()),
    ];
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.6\n");
    let mut offsets = Vec::new();
    for (number, body) in &objects {
        offsets.push((*number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    let xref = out.len();
    out.extend_from_slice(b"xref\n0 1\n0000000000 65535 f \n");
    for (number, offset) in &offsets {
        out.extend_from_slice(format!("{number} 1\n{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size 4 /Root 1 0 R /Encrypt 3 0 R /ID [{id} {id}] >>\n",
            id = hex_string(FILE_ID)
        )
        .as_bytes(),
    );
    out.extend_from_slice(format!("startxref\n{xref}\n%%EOF\n").as_bytes());

    let mut reader = PdfReader::new(Cursor::new(out)).unwrap();
    let obj = reader.get_object(stream_id).unwrap();
    assert_eq!(obj.as_stream().unwrap().raw_data(), b"stream contents");
}

#[test]
fn aes_protected_string_round_trips() {
    let cf = "/V 4 /R 4 /CF << /StdCF << /CFM /AESV2 >> >> /StmF /StdCF /StrF /StdCF";
    let (enc_dict, file_key) = standard_encrypt_dict(cf, &[0x77; 32], 128);

    let string_id = ObjectId::new(2, 0);
    let key = object_key(&file_key, string_id, true);
    let iv = [0x42u8; 16];
    let ciphertext = cbc::Encryptor::<Aes128>::new_from_slices(&key, &iv)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(b"aes secret");
    let mut payload = iv.to_vec();
    payload.extend_from_slice(&ciphertext);

    let objects = vec![
        (1, "<< /Type /Catalog >>".to_string()),
        (2, hex_string(&payload)),
        (3, enc_dict),
    ];
    let mut reader = PdfReader::new(Cursor::new(assemble(&objects, 3))).unwrap();
    assert!(reader.is_encrypted());

    let obj = reader.get_object(string_id).unwrap();
    assert_eq!(obj.as_string().unwrap().as_bytes(), b"aes secret");
}

#[test]
fn user_password_protected_file_opens_locked() {
    let (enc_dict, file_key) =
        encrypt_dict_for_password("/V 2 /R 3", &[0x5A; 32], 128, b"hunter2");

    let string_id = ObjectId::new(2, 0);
    let ciphertext = rc4_apply(&object_key(&file_key, string_id, false), b"top secret");

    let objects = vec![
        (1, "<< /Type /Catalog >>".to_string()),
        (2, hex_string(&ciphertext)),
        (3, enc_dict),
    ];
    let mut reader = PdfReader::new(Cursor::new(assemble(&objects, 3))).unwrap();
    assert!(reader.is_encrypted());
    assert!(reader.is_locked());

    // The encryption dictionary stays readable, everything else does not
    assert!(reader.get_object(ObjectId::new(3, 0)).is_ok());
    assert!(matches!(
        reader.get_object(string_id),
        Err(ParseError::DecryptionError(_))
    ));

    assert!(matches!(
        reader.unlock_with_password(b"wrong"),
        Err(ParseError::DecryptionError(_))
    ));
    assert!(reader.is_locked());

    reader.unlock_with_password(b"hunter2").unwrap();
    assert!(!reader.is_locked());
    let obj = reader.get_object(string_id).unwrap();
    assert_eq!(obj.as_string().unwrap().as_bytes(), b"top secret");
}

#[test]
fn unlock_is_noop_on_unencrypted_file() {
    let objects = vec![
        (1, "<< /Type /Catalog >>".to_string()),
        (2, "(plain)".to_string()),
    ];
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (number, body) in &objects {
        offsets.push((*number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(b"xref\n0 1\n0000000000 65535 f \n");
    for (number, offset) in &offsets {
        out.extend_from_slice(format!("{number} 1\n{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(b"trailer\n<< /Size 3 /Root 1 0 R >>\n");
    out.extend_from_slice(format!("startxref\n{xref}\n%%EOF\n").as_bytes());

    let mut reader = PdfReader::new(Cursor::new(out)).unwrap();
    assert!(!reader.is_encrypted());
    reader.unlock_with_password(b"anything").unwrap();
    let obj = reader.get_object(ObjectId::new(2, 0)).unwrap();
    assert_eq!(obj.as_string().unwrap().as_bytes(), b"plain");
}

#[test]
fn encryption_dictionary_itself_not_decrypted() {
    let (enc_dict, _) = standard_encrypt_dict("/V 2 /R 3", &[0x5A; 32], 128);

    let objects = vec![
        (1, "<< /Type /Catalog >>".to_string()),
        (2, "(unused)".to_string()),
        (3, enc_dict.clone()),
    ];
    let mut reader = PdfReader::new(Cursor::new(assemble(&objects, 3))).unwrap();

    let obj = reader.get_object(ObjectId::new(3, 0)).unwrap();
    let dict = obj.as_dict().unwrap();
    // /O survives untouched, proving the dictionary skipped decryption
    let o = dict.get("O").unwrap().as_string().unwrap();
    assert_eq!(o.as_bytes(), &[0x5A; 32]);
}

#[test]
fn aesv3_fails_instead_of_downgrading() {
    let cf = "/V 4 /R 4 /CF << /StdCF << /CFM /AESV3 >> >> /StmF /StdCF /StrF /StdCF";
    let (enc_dict, _) = standard_encrypt_dict(cf, &[0x77; 32], 128);

    let objects = vec![
        (1, "<< /Type /Catalog >>".to_string()),
        (3, enc_dict),
    ];
    assert!(PdfReader::new(Cursor::new(assemble(&objects, 3))).is_err());
}
