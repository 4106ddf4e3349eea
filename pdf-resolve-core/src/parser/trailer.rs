//! Trailer dictionary
//!
//! Per-revision metadata: `/Size`, `/Root`, `/Prev`, `/Encrypt`, `/Info`,
//! `/ID` and the hybrid-file `/XRefStm` pointer. `/Prev` and `/XRefStm`
//! drive the incremental-update traversal.

use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

/// A parsed trailer dictionary with typed access to the keys the
/// resolution layer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Trailer {
    dict: PdfDictionary,
}

impl Trailer {
    pub fn new(dict: PdfDictionary) -> Self {
        Self { dict }
    }

    /// The underlying dictionary.
    pub fn dict(&self) -> &PdfDictionary {
        &self.dict
    }

    /// `/Size`: one greater than the highest object number in the file.
    pub fn size(&self) -> ParseResult<i64> {
        self.dict
            .get("Size")
            .and_then(|obj| obj.as_integer())
            .ok_or_else(|| ParseError::MissingKey("Size".to_string()))
    }

    /// `/Root`: reference to the document catalog. Required; a trailer
    /// chain without it makes the file unreadable.
    pub fn root(&self) -> ParseResult<ObjectId> {
        self.dict
            .get("Root")
            .and_then(|obj| obj.as_reference())
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))
    }

    /// `/Prev`: offset of the previous revision's xref section.
    pub fn prev(&self) -> Option<u64> {
        self.dict
            .get("Prev")
            .and_then(|obj| obj.as_integer())
            .filter(|offset| *offset >= 0)
            .map(|offset| offset as u64)
    }

    /// `/XRefStm`: offset of the shadowing xref stream in a hybrid file.
    pub fn xref_stm(&self) -> Option<u64> {
        self.dict
            .get("XRefStm")
            .and_then(|obj| obj.as_integer())
            .filter(|offset| *offset >= 0)
            .map(|offset| offset as u64)
    }

    /// `/Encrypt`: the encryption dictionary, direct or as a reference.
    pub fn encrypt(&self) -> Option<&PdfObject> {
        self.dict.get("Encrypt")
    }

    /// `/Info`: reference to the document information dictionary.
    pub fn info(&self) -> Option<ObjectId> {
        self.dict.get("Info").and_then(|obj| obj.as_reference())
    }

    /// `/ID`: the two file identifier byte strings. The first is an input
    /// to encryption key derivation.
    pub fn id(&self) -> Option<[&[u8]; 2]> {
        let array = self.dict.get("ID")?.as_array()?;
        let first = array.get(0)?.as_string()?;
        let second = array.get(1)?.as_string()?;
        Some([first.as_bytes(), second.as_bytes()])
    }

    /// Merge keys from an older revision's trailer: keys already present
    /// are kept, missing ones are filled in. `/Prev` and `/XRefStm` are
    /// never inherited across revisions.
    pub fn absorb_older(&mut self, older: &Trailer) {
        for (key, value) in older.dict.0.iter() {
            if key == "Prev" || key == "XRefStm" {
                continue;
            }
            if !self.dict.contains_key(key) {
                self.dict.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfString};

    fn trailer_from(entries: Vec<(&str, PdfObject)>) -> Trailer {
        let mut dict = PdfDictionary::new();
        for (key, value) in entries {
            dict.insert(key.to_string(), value);
        }
        Trailer::new(dict)
    }

    #[test]
    fn test_required_keys() {
        let trailer = trailer_from(vec![
            ("Size", PdfObject::Integer(42)),
            ("Root", PdfObject::Reference(ObjectId::new(1, 0))),
        ]);
        assert_eq!(trailer.size().unwrap(), 42);
        assert_eq!(trailer.root().unwrap(), ObjectId::new(1, 0));
    }

    #[test]
    fn test_missing_root_fails() {
        let trailer = trailer_from(vec![("Size", PdfObject::Integer(5))]);
        assert!(matches!(trailer.root(), Err(ParseError::MissingKey(_))));
    }

    #[test]
    fn test_optional_offsets() {
        let trailer = trailer_from(vec![
            ("Prev", PdfObject::Integer(100)),
            ("XRefStm", PdfObject::Integer(200)),
        ]);
        assert_eq!(trailer.prev(), Some(100));
        assert_eq!(trailer.xref_stm(), Some(200));

        let empty = trailer_from(vec![]);
        assert_eq!(empty.prev(), None);
        assert_eq!(empty.xref_stm(), None);
    }

    #[test]
    fn test_file_id() {
        let mut ids = PdfArray::new();
        ids.push(PdfObject::String(PdfString::new(vec![1, 2])));
        ids.push(PdfObject::String(PdfString::new(vec![3, 4])));
        let trailer = trailer_from(vec![("ID", PdfObject::Array(ids))]);
        assert_eq!(trailer.id().unwrap(), [&[1u8, 2][..], &[3u8, 4][..]]);
    }

    #[test]
    fn test_absorb_older_fills_gaps_only() {
        let mut newer = trailer_from(vec![("Size", PdfObject::Integer(10))]);
        let older = trailer_from(vec![
            ("Size", PdfObject::Integer(5)),
            ("Root", PdfObject::Reference(ObjectId::new(1, 0))),
            ("Prev", PdfObject::Integer(77)),
        ]);
        newer.absorb_older(&older);

        assert_eq!(newer.size().unwrap(), 10);
        assert_eq!(newer.root().unwrap(), ObjectId::new(1, 0));
        assert_eq!(newer.prev(), None);
    }
}
