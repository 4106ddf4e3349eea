//! AES-128-CBC decryption for the AESV2 crypt filter
//!
//! Encrypted payloads carry their IV in the first 16 bytes, followed by
//! PKCS#7-padded ciphertext.

use crate::parser::{ParseError, ParseResult};
use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const AES_BLOCK_SIZE: usize = 16;
pub const AES_128_KEY_SIZE: usize = 16;

/// Decrypt an AESV2 payload laid out as `[16-byte IV][ciphertext]`.
/// The payload must exceed one block; an IV with no ciphertext (or less)
/// is malformed.
pub fn decrypt_payload(key: &[u8], payload: &[u8]) -> ParseResult<Vec<u8>> {
    if payload.len() <= AES_BLOCK_SIZE {
        return Err(ParseError::DecryptionError(format!(
            "AES payload is {} bytes, need more than {AES_BLOCK_SIZE}",
            payload.len()
        )));
    }
    let (iv, ciphertext) = payload.split_at(AES_BLOCK_SIZE);
    aes_cbc_decrypt(key, iv, ciphertext)
}

/// AES-128-CBC decrypt with PKCS#7 unpadding.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> ParseResult<Vec<u8>> {
    if key.len() != AES_128_KEY_SIZE {
        return Err(ParseError::DecryptionError(format!(
            "AES key is {} bytes, expected {AES_128_KEY_SIZE}",
            key.len()
        )));
    }
    if iv.len() != AES_BLOCK_SIZE {
        return Err(ParseError::DecryptionError(format!(
            "AES IV is {} bytes, expected {AES_BLOCK_SIZE}",
            iv.len()
        )));
    }
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(ParseError::DecryptionError(format!(
            "AES ciphertext length {} is not a positive multiple of {AES_BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let decryptor = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|e| ParseError::DecryptionError(format!("cipher init failed: {e}")))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ParseError::DecryptionError("invalid PKCS#7 padding".to_string()))
}
