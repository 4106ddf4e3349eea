//! PDF reader façade
//!
//! Ties the pieces together: header scan, startxref, incremental-update
//! merge, direct and compressed object extraction, and transparent
//! per-object decryption. Returned values are never auto-dereferenced;
//! nested references are resolved by further [`PdfReader::get_object`]
//! calls.

use super::header::{parse_header, Header, PdfVersion};
use super::incremental::{process_incremental_updates, ResolvedXRef};
use super::lexer::Lexer;
use super::object_stream::ObjectStream;
use super::objects::{parse_indirect_object, ObjectId, PdfObject, PdfStream};
use super::startxref::find_startxref;
use super::trailer::Trailer;
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use crate::encryption::{unlock, Decryptor, EncryptionDictionary};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, warn};

/// Reads typed objects out of one PDF document.
pub struct PdfReader<R: Read + Seek> {
    lexer: Lexer<R>,
    header: Header,
    xref: ResolvedXRef,
    options: ParseOptions,
    decryptor: Option<Decryptor>,
    /// Set when the empty password did not authenticate; object access
    /// fails until a password unlocks the file.
    locked: Option<LockedEncryption>,
    /// The encryption dictionary's own id; it is never decrypted.
    encrypt_dict_id: Option<ObjectId>,
    object_stream_cache: HashMap<u32, ObjectStream>,
    /// Containers currently being resolved, to break reference cycles.
    containers_in_progress: HashSet<u32>,
}

/// Parsed encryption context awaiting a password.
struct LockedEncryption {
    enc: EncryptionDictionary,
    file_id: Vec<u8>,
}

impl PdfReader<File> {
    /// Open a PDF file from disk with default (lenient) options.
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        options: ParseOptions,
    ) -> ParseResult<Self> {
        Self::new_with_options(File::open(path)?, options)
    }
}

impl<R: Read + Seek> PdfReader<R> {
    /// Read the structural skeleton of a document: header, startxref, the
    /// full `/Prev` chain, and the encryption setup (empty password).
    pub fn new(reader: R) -> ParseResult<Self> {
        Self::new_with_options(reader, ParseOptions::default())
    }

    pub fn new_with_options(reader: R, options: ParseOptions) -> ParseResult<Self> {
        let mut lexer = Lexer::new(reader);
        let header = parse_header(&mut lexer, &options)?;
        let startxref = find_startxref(&mut lexer, header.offset)?;
        debug!("startxref at {startxref}, header at {}", header.offset);
        let xref =
            process_incremental_updates(&mut lexer, header.offset, startxref, &options)?;

        let mut reader = Self {
            lexer,
            header,
            xref,
            options,
            decryptor: None,
            locked: None,
            encrypt_dict_id: None,
            object_stream_cache: HashMap::new(),
            containers_in_progress: HashSet::new(),
        };
        reader.setup_encryption()?;
        Ok(reader)
    }

    /// Derive the file key from a password. Needed only when the empty
    /// password tried at construction did not authenticate; a no-op on
    /// unencrypted or already-unlocked files.
    pub fn unlock_with_password(&mut self, password: &[u8]) -> ParseResult<()> {
        let locked = match &self.locked {
            Some(locked) => locked,
            None => return Ok(()),
        };
        let file_key = unlock(password, &locked.enc, &locked.file_id)?;
        self.decryptor = Some(Decryptor::new(&locked.enc, file_key)?);
        self.locked = None;
        Ok(())
    }

    pub fn version(&self) -> PdfVersion {
        self.header.version
    }

    pub fn trailer(&self) -> &Trailer {
        &self.xref.trailer
    }

    pub fn xref_table(&self) -> &XRefTable {
        &self.xref.table
    }

    pub fn is_encrypted(&self) -> bool {
        self.decryptor.is_some() || self.locked.is_some()
    }

    /// True while the file's password has not authenticated yet.
    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    /// Fetch one indirect object. Free or absent ids are errors; use
    /// [`try_get_object`](Self::try_get_object) for an optional view.
    pub fn get_object(&mut self, id: ObjectId) -> ParseResult<PdfObject> {
        let entry = *self
            .xref
            .table
            .get(id.number())
            .ok_or(ParseError::InvalidReference(id))?;

        match entry {
            XRefEntry::Free { .. } => Err(ParseError::FreeObject(id)),
            XRefEntry::InUse { offset, generation } => {
                if generation != id.generation() {
                    if self.options.strict {
                        return Err(ParseError::InvalidReference(id));
                    }
                    warn!(
                        "object {id}: table has generation {generation}, continuing"
                    );
                }
                self.read_at(offset, id)
            }
            XRefEntry::Compressed { container, index } => {
                self.read_compressed(id, container, index)
            }
        }
    }

    /// Fetch an object, mapping "does not exist" (absent or free entry) to
    /// None instead of an error.
    pub fn try_get_object(&mut self, id: ObjectId) -> ParseResult<Option<PdfObject>> {
        match self.get_object(id) {
            Ok(obj) => Ok(Some(obj)),
            Err(ParseError::InvalidReference(_)) | Err(ParseError::FreeObject(_)) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve one level of indirection: references are fetched, anything
    /// else is returned as-is.
    pub fn resolve(&mut self, object: &PdfObject) -> ParseResult<PdfObject> {
        match object {
            PdfObject::Reference(id) => self.get_object(*id),
            other => Ok(other.clone()),
        }
    }

    /// Parse the directly stored object at `offset` (relative to the
    /// header position).
    fn read_at(&mut self, offset: u64, id: ObjectId) -> ParseResult<PdfObject> {
        self.lexer.seek_to(self.header.offset + offset)?;
        let (parsed_id, mut object) = parse_indirect_object(&mut self.lexer, &self.options)?;

        if parsed_id != id {
            if self.options.strict {
                return Err(ParseError::InvalidReference(id));
            }
            warn!("object at offset {offset} declares id {parsed_id}, expected {id}");
        }

        if let PdfObject::Stream(ref mut stream) = object {
            self.fixup_stream_length(stream)?;
        }

        self.decrypt_if_needed(&mut object, id)?;
        Ok(object)
    }

    /// Resolve an indirect `/Length` and truncate the scanned body to it.
    fn fixup_stream_length(&mut self, stream: &mut PdfStream) -> ParseResult<()> {
        let length_id = match stream.dict.get("Length") {
            Some(PdfObject::Reference(length_id)) => *length_id,
            _ => return Ok(()),
        };

        match self.get_object(length_id)?.as_integer() {
            Some(length) if length >= 0 && (length as usize) <= stream.data.len() => {
                stream.data.truncate(length as usize);
                stream
                    .dict
                    .insert("Length".to_string(), PdfObject::Integer(length));
                Ok(())
            }
            Some(length) if !self.options.strict => {
                warn!(
                    "/Length {length} inconsistent with scanned body of {} bytes",
                    stream.data.len()
                );
                Ok(())
            }
            _ => Err(ParseError::StreamDecodeError(
                "indirect /Length does not resolve to a usable integer".to_string(),
            )),
        }
    }

    /// Extract a member of an object stream, resolving (and caching) the
    /// container first.
    fn read_compressed(
        &mut self,
        id: ObjectId,
        container: u32,
        index: u32,
    ) -> ParseResult<PdfObject> {
        if !self.object_stream_cache.contains_key(&container) {
            if !self.containers_in_progress.insert(container) {
                return Err(ParseError::InvalidXRef(format!(
                    "object stream {container} is its own ancestor"
                )));
            }
            let result = self.get_object(ObjectId::new(container, 0));
            self.containers_in_progress.remove(&container);

            let object = result?;
            let stream = object.as_stream().ok_or_else(|| {
                ParseError::InvalidXRef(format!(
                    "container {container} is {}, expected stream",
                    object.kind()
                ))
            })?;
            let object_stream = ObjectStream::parse(stream, &self.options)?;
            self.object_stream_cache.insert(container, object_stream);
        }

        // Container bodies were decrypted as streams; members are never
        // individually decrypted
        let object_stream = &self.object_stream_cache[&container];
        let (member_id, object) = object_stream.get_by_index(index, &self.options)?;

        if member_id.number() != id.number() {
            if self.options.strict {
                return Err(ParseError::InvalidReference(id));
            }
            warn!(
                "container {container}[{index}] holds object {member_id}, expected {id}"
            );
        }

        Ok(object)
    }

    /// Read the `/Encrypt` entry and try the empty password. A rejected
    /// empty password leaves the reader locked instead of failing, so the
    /// caller can supply a password before touching objects.
    fn setup_encryption(&mut self) -> ParseResult<()> {
        let encrypt = match self.xref.trailer.encrypt().cloned() {
            Some(obj) => obj,
            None => return Ok(()),
        };

        let (dict, dict_id) = match encrypt {
            PdfObject::Dictionary(dict) => (dict, None),
            PdfObject::Reference(id) => {
                let object = self.get_object(id)?;
                let dict = object.as_dict().cloned().ok_or_else(|| {
                    ParseError::InvalidTrailer(format!(
                        "/Encrypt reference {id} is {}, expected dictionary",
                        object.kind()
                    ))
                })?;
                (dict, Some(id))
            }
            other => {
                return Err(ParseError::InvalidTrailer(format!(
                    "/Encrypt is {}, expected dictionary or reference",
                    other.kind()
                )))
            }
        };

        let enc = EncryptionDictionary::from_dict(&dict)?;
        let file_id = self
            .xref
            .trailer
            .id()
            .map(|ids| ids[0].to_vec())
            .unwrap_or_default();
        self.encrypt_dict_id = dict_id;

        match unlock(b"", &enc, &file_id) {
            Ok(file_key) => self.decryptor = Some(Decryptor::new(&enc, file_key)?),
            Err(ParseError::DecryptionError(_)) => {
                debug!("empty password rejected, reader is locked");
                self.locked = Some(LockedEncryption { enc, file_id });
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn decrypt_if_needed(&self, object: &mut PdfObject, id: ObjectId) -> ParseResult<()> {
        if self.encrypt_dict_id == Some(id) {
            return Ok(());
        }
        if self.locked.is_some() {
            return Err(ParseError::DecryptionError(
                "file is password protected".to_string(),
            ));
        }
        let decryptor = match &self.decryptor {
            Some(decryptor) => decryptor,
            None => return Ok(()),
        };
        decrypt_object(decryptor, object, id)
    }
}

/// Decrypt every string and stream body inside `object`, which belongs to
/// indirect object `id`.
fn decrypt_object(
    decryptor: &Decryptor,
    object: &mut PdfObject,
    id: ObjectId,
) -> ParseResult<()> {
    match object {
        PdfObject::String(string) => {
            string.0 = decryptor.decrypt_string(&string.0, id)?;
        }
        PdfObject::Array(array) => {
            for item in array.0.iter_mut() {
                decrypt_object(decryptor, item, id)?;
            }
        }
        PdfObject::Dictionary(dict) => {
            for value in dict.0.values_mut() {
                decrypt_object(decryptor, value, id)?;
            }
        }
        PdfObject::Stream(stream) => {
            for value in stream.dict.0.values_mut() {
                decrypt_object(decryptor, value, id)?;
            }
            stream.data = decryptor.decrypt_stream(&stream.data, id)?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Classic single-revision file with a catalog, a pages node, a string
    /// object, and one free slot.
    fn classic_pdf() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");

        let mut offsets = Vec::new();
        for body in [
            "1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n",
            "2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n",
            "3 0 obj\n(hello)\nendobj\n",
        ] {
            offsets.push(out.len());
            out.extend_from_slice(body.as_bytes());
        }

        let xref_offset = out.len();
        out.extend_from_slice(b"xref\n0 4\n0000000000 65535 f \n");
        for offset in &offsets {
            out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(b"trailer\n<< /Size 4 /Root 1 0 R >>\n");
        out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());
        out
    }

    /// File whose objects 2 and 3 are packed in object stream 4, indexed
    /// by an xref stream (object 5).
    fn compressed_pdf() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.5\n");

        let off1 = out.len();
        out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

        let off4 = out.len();
        let objstm_body = b"2 0 3 10 << /B 7 >>42";
        out.extend_from_slice(
            format!(
                "4 0 obj\n<< /Type /ObjStm /N 2 /First 9 /Length {} >>\nstream\n",
                objstm_body.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(objstm_body);
        out.extend_from_slice(b"\nendstream\nendobj\n");

        let off5 = out.len();
        let mut records: Vec<u8> = Vec::new();
        let push = |records: &mut Vec<u8>, t: u8, f2: u64, f3: u8| {
            records.push(t);
            records.extend_from_slice(&(f2 as u16).to_be_bytes());
            records.push(f3);
        };
        push(&mut records, 0, 0, 255);
        push(&mut records, 1, off1 as u64, 0);
        push(&mut records, 2, 4, 0);
        push(&mut records, 2, 4, 1);
        push(&mut records, 1, off4 as u64, 0);
        push(&mut records, 1, off5 as u64, 0);
        out.extend_from_slice(
            format!(
                "5 0 obj\n<< /Type /XRef /W [1 2 1] /Size 6 /Root 1 0 R /Length {} >>\nstream\n",
                records.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(&records);
        out.extend_from_slice(b"\nendstream\nendobj\n");

        out.extend_from_slice(format!("startxref\n{off5}\n%%EOF\n").as_bytes());
        out
    }

    fn reader_for(bytes: Vec<u8>) -> PdfReader<Cursor<Vec<u8>>> {
        PdfReader::new(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_open_classic_file() {
        let mut reader = reader_for(classic_pdf());
        assert_eq!(reader.version(), PdfVersion { major: 1, minor: 4 });
        assert!(!reader.is_encrypted());

        let root = reader.trailer().root().unwrap();
        let catalog = reader.get_object(root).unwrap();
        let dict = catalog.as_dict().unwrap();
        assert_eq!(dict.get_type(), Some("Catalog"));

        // References are not auto-resolved
        let pages_ref = dict.get("Pages").unwrap().clone();
        assert_eq!(pages_ref.as_reference(), Some(ObjectId::new(2, 0)));
        let pages = reader.resolve(&pages_ref).unwrap();
        assert_eq!(pages.as_dict().unwrap().get_type(), Some("Pages"));
    }

    #[test]
    fn test_string_object() {
        let mut reader = reader_for(classic_pdf());
        let obj = reader.get_object(ObjectId::new(3, 0)).unwrap();
        assert_eq!(obj.as_string().unwrap().as_bytes(), b"hello");
    }

    #[test]
    fn test_free_object() {
        let mut reader = reader_for(classic_pdf());
        assert!(matches!(
            reader.get_object(ObjectId::new(0, 65535)),
            Err(ParseError::FreeObject(_))
        ));
        assert_eq!(
            reader.try_get_object(ObjectId::new(0, 65535)).unwrap(),
            None
        );
    }

    #[test]
    fn test_absent_object() {
        let mut reader = reader_for(classic_pdf());
        assert!(matches!(
            reader.get_object(ObjectId::new(42, 0)),
            Err(ParseError::InvalidReference(_))
        ));
        assert_eq!(reader.try_get_object(ObjectId::new(42, 0)).unwrap(), None);
    }

    #[test]
    fn test_compressed_objects() {
        let mut reader = reader_for(compressed_pdf());

        let obj2 = reader.get_object(ObjectId::new(2, 0)).unwrap();
        assert_eq!(
            obj2.as_dict().unwrap().get("B"),
            Some(&PdfObject::Integer(7))
        );

        let obj3 = reader.get_object(ObjectId::new(3, 0)).unwrap();
        assert_eq!(obj3, PdfObject::Integer(42));

        // Container is cached after the first member extraction
        assert!(reader.object_stream_cache.contains_key(&4));
    }

    #[test]
    fn test_extraction_order_independent() {
        let mut reader = reader_for(compressed_pdf());
        assert_eq!(
            reader.get_object(ObjectId::new(3, 0)).unwrap(),
            PdfObject::Integer(42)
        );
        assert!(reader.get_object(ObjectId::new(2, 0)).is_ok());
    }

    #[test]
    fn test_generation_mismatch_strict() {
        let mut reader =
            PdfReader::new_with_options(Cursor::new(classic_pdf()), ParseOptions::strict())
                .unwrap();
        assert!(matches!(
            reader.get_object(ObjectId::new(3, 9)),
            Err(ParseError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_indirect_length_fixup() {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        let off1 = out.len();
        out.extend_from_slice(
            b"1 0 obj\n<< /Length 2 0 R >>\nstream\nDATA\nendstream\nendobj\n",
        );
        let off2 = out.len();
        out.extend_from_slice(b"2 0 obj\n4\nendobj\n");
        let xref_offset = out.len();
        out.extend_from_slice(b"xref\n0 3\n0000000000 65535 f \n");
        out.extend_from_slice(format!("{off1:010} 00000 n \n").as_bytes());
        out.extend_from_slice(format!("{off2:010} 00000 n \n").as_bytes());
        out.extend_from_slice(b"trailer\n<< /Size 3 /Root 1 0 R >>\n");
        out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());

        let mut reader = reader_for(out);
        let obj = reader.get_object(ObjectId::new(1, 0)).unwrap();
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.raw_data(), b"DATA");
        assert_eq!(stream.dict.get("Length"), Some(&PdfObject::Integer(4)));
    }
}
