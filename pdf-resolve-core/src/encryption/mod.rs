//! Per-object decryption
//!
//! Strings and stream bodies are encrypted individually with a key derived
//! from the file key and the owning object's number and generation. The
//! [`Decryptor`] selects RC4 or AES-128-CBC per use (string vs stream)
//! from the encryption dictionary's crypt filters.

pub mod aes;
pub mod dict;
pub mod rc4;
pub mod standard_security;

pub use dict::{CryptMethod, EncryptionDictionary};
pub use standard_security::unlock;

use crate::parser::objects::ObjectId;
use crate::parser::ParseResult;
use rc4::rc4_apply;

const AES_SALT: &[u8] = b"sAlT";

/// Decrypts strings and stream bodies for one document.
pub struct Decryptor {
    file_key: Vec<u8>,
    string_method: CryptMethod,
    stream_method: CryptMethod,
}

impl Decryptor {
    /// Build a decryptor from an authenticated file key. Fails when the
    /// dictionary selects an unsupported cipher.
    pub fn new(enc: &EncryptionDictionary, file_key: Vec<u8>) -> ParseResult<Self> {
        Ok(Self {
            string_method: enc.string_method()?,
            stream_method: enc.stream_method()?,
            file_key,
        })
    }

    /// Derive the per-object key: `MD5(fileKey ++ objNum[0..3 LE] ++
    /// gen[0..2 LE] ++ salt)`, where the salt is present only for AES.
    /// RC4 keys are truncated to the file key length, AES keys to 16.
    fn object_key(&self, id: ObjectId, method: CryptMethod) -> Vec<u8> {
        let mut input = self.file_key.clone();
        input.extend_from_slice(&id.number().to_le_bytes()[..3]);
        input.extend_from_slice(&id.generation().to_le_bytes()[..2]);
        if method == CryptMethod::Aes128 {
            input.extend_from_slice(AES_SALT);
        }

        let digest = md5::compute(&input).0;
        let len = match method {
            CryptMethod::Rc4 => self.file_key.len().min(16),
            CryptMethod::Aes128 => aes::AES_128_KEY_SIZE,
        };
        digest[..len].to_vec()
    }

    /// Decrypt a string value owned by object `id`.
    pub fn decrypt_string(&self, data: &[u8], id: ObjectId) -> ParseResult<Vec<u8>> {
        self.apply(self.string_method, data, id)
    }

    /// Decrypt a stream body owned by object `id`.
    pub fn decrypt_stream(&self, data: &[u8], id: ObjectId) -> ParseResult<Vec<u8>> {
        self.apply(self.stream_method, data, id)
    }

    fn apply(
        &self,
        method: CryptMethod,
        data: &[u8],
        id: ObjectId,
    ) -> ParseResult<Vec<u8>> {
        let key = self.object_key(id, method);
        match method {
            CryptMethod::Rc4 => Ok(rc4_apply(&key, data)),
            CryptMethod::Aes128 => aes::decrypt_payload(&key, data),
        }
    }
}
