//! Encryption dictionary (`/Encrypt`)
//!
//! Typed view over the trailer's encryption dictionary, plus the crypt
//! filter selection that maps `/StrF` and `/StmF` names through `/CF` to a
//! concrete cipher. `/CF` is only meaningful for V4 handlers.

use crate::parser::objects::PdfDictionary;
use crate::parser::{ParseError, ParseResult};
use tracing::warn;

/// Cipher selected by the crypt filter map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Rc4,
    Aes128,
}

/// Parsed `/Encrypt` dictionary for the standard security handler.
#[derive(Debug, Clone)]
pub struct EncryptionDictionary {
    pub filter: String,
    pub sub_filter: Option<String>,
    pub v: i64,
    pub revision: i64,
    /// Key length in bits (`/Length`), default 40.
    pub length: i64,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    pub permissions: i32,
    pub encrypt_metadata: bool,
    pub crypt_filters: Option<PdfDictionary>,
    pub stream_filter: Option<String>,
    pub string_filter: Option<String>,
}

impl EncryptionDictionary {
    pub fn from_dict(dict: &PdfDictionary) -> ParseResult<Self> {
        let filter = dict
            .get("Filter")
            .and_then(|obj| obj.as_name())
            .map(|name| name.as_str().to_string())
            .ok_or_else(|| ParseError::MissingKey("Filter".to_string()))?;
        if filter != "Standard" {
            return Err(ParseError::UnsupportedEncryption(format!(
                "security handler /{filter}"
            )));
        }

        let v = required_int(dict, "V")?;
        let revision = required_int(dict, "R")?;
        let owner_hash = required_string(dict, "O")?;
        let user_hash = required_string(dict, "U")?;
        let permissions = required_int(dict, "P")? as i32;

        Ok(Self {
            filter,
            sub_filter: dict
                .get("SubFilter")
                .and_then(|obj| obj.as_name())
                .map(|name| name.as_str().to_string()),
            v,
            revision,
            length: dict
                .get("Length")
                .and_then(|obj| obj.as_integer())
                .unwrap_or(40),
            owner_hash,
            user_hash,
            permissions,
            encrypt_metadata: dict
                .get("EncryptMetadata")
                .and_then(|obj| obj.as_bool())
                .unwrap_or(true),
            crypt_filters: dict.get("CF").and_then(|obj| obj.as_dict()).cloned(),
            stream_filter: dict
                .get("StmF")
                .and_then(|obj| obj.as_name())
                .map(|name| name.as_str().to_string()),
            string_filter: dict
                .get("StrF")
                .and_then(|obj| obj.as_name())
                .map(|name| name.as_str().to_string()),
        })
    }

    /// File key length in bytes. V1 handlers are fixed at 40 bits.
    pub fn key_length_bytes(&self) -> usize {
        if self.v == 1 {
            5
        } else {
            ((self.length / 8).clamp(5, 16)) as usize
        }
    }

    /// Cipher for stream bodies.
    pub fn stream_method(&self) -> ParseResult<CryptMethod> {
        self.method_for(self.stream_filter.as_deref())
    }

    /// Cipher for strings.
    pub fn string_method(&self) -> ParseResult<CryptMethod> {
        self.method_for(self.string_filter.as_deref())
    }

    /// Resolve a crypt filter name against `/CF`. Absent names and
    /// unrecognized methods fall back to RC4; `/AESV3` is a hard failure
    /// rather than a silent downgrade.
    fn method_for(&self, filter_name: Option<&str>) -> ParseResult<CryptMethod> {
        match self.v {
            1 | 2 => Ok(CryptMethod::Rc4),
            4 => {
                let name = match filter_name {
                    Some(name) => name,
                    None => return Ok(CryptMethod::Rc4),
                };
                match self.crypt_filter_method(name) {
                    Some("AESV2") => Ok(CryptMethod::Aes128),
                    Some("AESV3") => Err(ParseError::UnsupportedEncryption(
                        "AESV3 (AES-256)".to_string(),
                    )),
                    Some("V2") | Some("RC4") => Ok(CryptMethod::Rc4),
                    Some(other) => {
                        warn!("unrecognized crypt filter method /{other}, using RC4");
                        Ok(CryptMethod::Rc4)
                    }
                    None => Ok(CryptMethod::Rc4),
                }
            }
            5 => Err(ParseError::UnsupportedEncryption(
                "V5 / AES-256 security handler".to_string(),
            )),
            other => Err(ParseError::UnsupportedEncryption(format!(
                "encryption version V={other}"
            ))),
        }
    }

    /// The `/CFM` name of a crypt filter entry in `/CF`.
    fn crypt_filter_method(&self, name: &str) -> Option<&str> {
        self.crypt_filters
            .as_ref()?
            .get(name)?
            .as_dict()?
            .get("CFM")?
            .as_name()
            .map(|n| n.as_str())
    }
}

fn required_int(dict: &PdfDictionary, key: &str) -> ParseResult<i64> {
    dict.get(key)
        .and_then(|obj| obj.as_integer())
        .ok_or_else(|| ParseError::MissingKey(key.to_string()))
}

fn required_string(dict: &PdfDictionary, key: &str) -> ParseResult<Vec<u8>> {
    dict.get(key)
        .and_then(|obj| obj.as_string())
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| ParseError::MissingKey(key.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfName, PdfObject, PdfString};

    fn base_dict(v: i64, r: i64) -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter".to_string(), PdfObject::Name(PdfName::new("Standard")));
        dict.insert("V".to_string(), PdfObject::Integer(v));
        dict.insert("R".to_string(), PdfObject::Integer(r));
        dict.insert(
            "O".to_string(),
            PdfObject::String(PdfString::new(vec![0u8; 32])),
        );
        dict.insert(
            "U".to_string(),
            PdfObject::String(PdfString::new(vec![0u8; 32])),
        );
        dict.insert("P".to_string(), PdfObject::Integer(-44));
        dict
    }

    fn with_aes_cf(mut dict: PdfDictionary, cfm: &str) -> PdfDictionary {
        let mut stdcf = PdfDictionary::new();
        stdcf.insert("CFM".to_string(), PdfObject::Name(PdfName::new(cfm)));
        let mut cf = PdfDictionary::new();
        cf.insert("StdCF".to_string(), PdfObject::Dictionary(stdcf));
        dict.insert("CF".to_string(), PdfObject::Dictionary(cf));
        dict.insert("StmF".to_string(), PdfObject::Name(PdfName::new("StdCF")));
        dict.insert("StrF".to_string(), PdfObject::Name(PdfName::new("StdCF")));
        dict
    }

    #[test]
    fn test_v2_defaults_to_rc4() {
        let enc = EncryptionDictionary::from_dict(&base_dict(2, 3)).unwrap();
        assert_eq!(enc.stream_method().unwrap(), CryptMethod::Rc4);
        assert_eq!(enc.string_method().unwrap(), CryptMethod::Rc4);
        assert_eq!(enc.key_length_bytes(), 5);
        assert!(enc.encrypt_metadata);
    }

    #[test]
    fn test_v4_aesv2() {
        let dict = with_aes_cf(base_dict(4, 4), "AESV2");
        let enc = EncryptionDictionary::from_dict(&dict).unwrap();
        assert_eq!(enc.stream_method().unwrap(), CryptMethod::Aes128);
        assert_eq!(enc.string_method().unwrap(), CryptMethod::Aes128);
    }

    #[test]
    fn test_v4_without_filters_is_rc4() {
        let enc = EncryptionDictionary::from_dict(&base_dict(4, 4)).unwrap();
        assert_eq!(enc.stream_method().unwrap(), CryptMethod::Rc4);
    }

    #[test]
    fn test_aesv3_fails_loudly() {
        let dict = with_aes_cf(base_dict(4, 4), "AESV3");
        let enc = EncryptionDictionary::from_dict(&dict).unwrap();
        assert!(matches!(
            enc.stream_method(),
            Err(ParseError::UnsupportedEncryption(_))
        ));
    }

    #[test]
    fn test_v5_unsupported() {
        let enc = EncryptionDictionary::from_dict(&base_dict(5, 6)).unwrap();
        assert!(matches!(
            enc.string_method(),
            Err(ParseError::UnsupportedEncryption(_))
        ));
    }

    #[test]
    fn test_non_standard_handler_rejected() {
        let mut dict = base_dict(2, 3);
        dict.insert("Filter".to_string(), PdfObject::Name(PdfName::new("Custom")));
        assert!(matches!(
            EncryptionDictionary::from_dict(&dict),
            Err(ParseError::UnsupportedEncryption(_))
        ));
    }

    #[test]
    fn test_key_length() {
        let mut dict = base_dict(2, 3);
        dict.insert("Length".to_string(), PdfObject::Integer(128));
        let enc = EncryptionDictionary::from_dict(&dict).unwrap();
        assert_eq!(enc.key_length_bytes(), 16);

        let mut dict = base_dict(1, 2);
        dict.insert("Length".to_string(), PdfObject::Integer(128));
        let enc = EncryptionDictionary::from_dict(&dict).unwrap();
        assert_eq!(enc.key_length_bytes(), 5);
    }

    #[test]
    fn test_missing_required_key_fails() {
        let mut dict = base_dict(2, 3);
        dict.0.remove("O");
        assert!(matches!(
            EncryptionDictionary::from_dict(&dict),
            Err(ParseError::MissingKey(_))
        ));
    }
}
