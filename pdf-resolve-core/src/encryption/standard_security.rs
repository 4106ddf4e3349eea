//! Standard security handler: file key derivation and password checks
//!
//! Implements the padded-password MD5 key derivation (ISO 32000-1
//! Algorithm 2) and user/owner password authentication for revisions 2-4.
//! The derived file key feeds the per-object keys in
//! [`super::Decryptor`].

use super::dict::EncryptionDictionary;
use super::rc4::rc4_apply;
use crate::parser::{ParseError, ParseResult};

/// Standard padding string (ISO 32000-1 Table 21 preamble).
const PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56,
    0xFF, 0xFA, 0x01, 0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80,
    0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Password padded or truncated to exactly 32 bytes.
fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let take = password.len().min(32);
    padded[..take].copy_from_slice(&password[..take]);
    padded[take..].copy_from_slice(&PAD[..32 - take]);
    padded
}

/// Derive the file encryption key from a user password (Algorithm 2).
pub fn compute_file_key(
    password: &[u8],
    enc: &EncryptionDictionary,
    file_id: &[u8],
) -> Vec<u8> {
    let mut input = Vec::with_capacity(96);
    input.extend_from_slice(&pad_password(password));
    input.extend_from_slice(&enc.owner_hash);
    input.extend_from_slice(&enc.permissions.to_le_bytes());
    input.extend_from_slice(file_id);
    if enc.revision >= 4 && !enc.encrypt_metadata {
        input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    let key_len = if enc.revision == 2 {
        5
    } else {
        enc.key_length_bytes()
    };

    let mut digest = md5::compute(&input).0;
    if enc.revision >= 3 {
        for _ in 0..50 {
            digest = md5::compute(&digest[..key_len]).0;
        }
    }

    digest[..key_len].to_vec()
}

/// Compute the `/U` value a correct user password would produce
/// (Algorithms 4 and 5). Revision 2 yields 32 bytes; revision 3+ yields
/// the 16 significant bytes.
pub(crate) fn compute_user_hash(
    file_key: &[u8],
    file_id: &[u8],
    revision: i64,
) -> Vec<u8> {
    if revision == 2 {
        return rc4_apply(file_key, &PAD);
    }

    let mut input = PAD.to_vec();
    input.extend_from_slice(file_id);
    let digest = md5::compute(&input).0;

    let mut value = rc4_apply(file_key, &digest);
    for i in 1..=19u8 {
        let round_key: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
        value = rc4_apply(&round_key, &value);
    }
    value
}

/// Check a user password, returning the file key on success.
pub fn authenticate_user_password(
    password: &[u8],
    enc: &EncryptionDictionary,
    file_id: &[u8],
) -> Option<Vec<u8>> {
    let file_key = compute_file_key(password, enc, file_id);
    let expected = compute_user_hash(&file_key, file_id, enc.revision);

    let matches = if enc.revision == 2 {
        enc.user_hash == expected
    } else {
        enc.user_hash.len() >= 16 && enc.user_hash[..16] == expected[..16]
    };

    matches.then_some(file_key)
}

/// Check an owner password by recovering the user password from `/O`
/// (Algorithm 7), returning the file key on success.
pub fn authenticate_owner_password(
    password: &[u8],
    enc: &EncryptionDictionary,
    file_id: &[u8],
) -> Option<Vec<u8>> {
    let key_len = if enc.revision == 2 {
        5
    } else {
        enc.key_length_bytes()
    };

    let mut digest = md5::compute(pad_password(password)).0;
    if enc.revision >= 3 {
        for _ in 0..50 {
            digest = md5::compute(digest).0;
        }
    }
    let owner_key = &digest[..key_len];

    let user_password = if enc.revision == 2 {
        rc4_apply(owner_key, &enc.owner_hash)
    } else {
        let mut value = enc.owner_hash.clone();
        for i in (0..=19u8).rev() {
            let round_key: Vec<u8> = owner_key.iter().map(|b| b ^ i).collect();
            value = rc4_apply(&round_key, &value);
        }
        value
    };

    authenticate_user_password(&user_password, enc, file_id)
}

/// Authenticate with the given password as user then owner; the empty
/// password unlocks most encrypted-for-distribution documents.
pub fn unlock(
    password: &[u8],
    enc: &EncryptionDictionary,
    file_id: &[u8],
) -> ParseResult<Vec<u8>> {
    authenticate_user_password(password, enc, file_id)
        .or_else(|| authenticate_owner_password(password, enc, file_id))
        .ok_or_else(|| {
            ParseError::DecryptionError("password authentication failed".to_string())
        })
}
