//! Object streams (`/Type /ObjStm`)
//!
//! A container stream packing several non-stream objects. The decoded body
//! starts with `/N` whitespace-separated integer pairs `(objectNumber,
//! relativeOffset)`; object data begins at byte `/First`. Members are
//! addressed either by object number or by their position in the header.

use super::lexer::{Lexer, Token};
use super::objects::{parse_object, ObjectId, PdfObject, PdfStream};
use super::{ParseError, ParseOptions, ParseResult};
use std::io::Cursor;
use tracing::warn;

/// A decoded object stream with its member offset table.
#[derive(Debug, Clone)]
pub struct ObjectStream {
    /// `(objectNumber, relativeOffset)` pairs in header order.
    pairs: Vec<(u32, u32)>,
    first: usize,
    data: Vec<u8>,
}

impl ObjectStream {
    /// Decode a `/Type /ObjStm` stream and read its member offset table.
    pub fn parse(stream: &PdfStream, options: &ParseOptions) -> ParseResult<Self> {
        if stream.dict.get_type() != Some("ObjStm") {
            if options.strict {
                return Err(ParseError::StreamDecodeError(
                    "object stream missing /Type /ObjStm".to_string(),
                ));
            }
            warn!("object stream missing /Type /ObjStm");
        }

        let n = require_count(stream, "N")?;
        let first = require_count(stream, "First")?;

        let data = stream.decoded_data()?;
        if first > data.len() {
            return Err(ParseError::StreamDecodeError(format!(
                "/First {first} exceeds decoded length {}",
                data.len()
            )));
        }

        let mut header = Lexer::new(Cursor::new(data[..first].to_vec()));
        let mut pairs = Vec::with_capacity(n);
        for _ in 0..n {
            let number = header_integer(&mut header)?;
            let rel_offset = header_integer(&mut header)?;
            pairs.push((number, rel_offset));
        }

        Ok(Self { pairs, first, data })
    }

    /// Object count (`/N`).
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Object numbers in header order.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.pairs.iter().map(|(number, _)| *number)
    }

    /// Extract a member by object number. Returns None for numbers not
    /// packed in this stream.
    pub fn try_get(
        &self,
        number: u32,
        options: &ParseOptions,
    ) -> ParseResult<Option<PdfObject>> {
        match self.pairs.iter().find(|(n, _)| *n == number) {
            Some((_, rel_offset)) => self.extract(*rel_offset, options).map(Some),
            None => Ok(None),
        }
    }

    /// Extract a member by its position in the header. The returned id has
    /// the recorded object number and generation 0, as compressed objects
    /// always do.
    pub fn get_by_index(
        &self,
        index: u32,
        options: &ParseOptions,
    ) -> ParseResult<(ObjectId, PdfObject)> {
        let (number, rel_offset) =
            self.pairs
                .get(index as usize)
                .copied()
                .ok_or_else(|| {
                    ParseError::StreamDecodeError(format!(
                        "object stream has {} members, index {index} out of range",
                        self.pairs.len()
                    ))
                })?;
        let object = self.extract(rel_offset, options)?;
        Ok((ObjectId::new(number, 0), object))
    }

    fn extract(&self, rel_offset: u32, options: &ParseOptions) -> ParseResult<PdfObject> {
        let offset = self.first + rel_offset as usize;
        if offset >= self.data.len() {
            return Err(ParseError::StreamDecodeError(format!(
                "member offset {offset} beyond decoded length {}",
                self.data.len()
            )));
        }
        let mut lexer = Lexer::new(Cursor::new(self.data.clone()));
        lexer.seek_to(offset as u64)?;
        parse_object(&mut lexer, options)
    }
}

fn require_count(stream: &PdfStream, key: &str) -> ParseResult<usize> {
    stream
        .dict
        .get(key)
        .and_then(|obj| obj.as_integer())
        .filter(|value| *value >= 0)
        .map(|value| value as usize)
        .ok_or_else(|| ParseError::MissingKey(key.to_string()))
}

fn header_integer(lexer: &mut Lexer<Cursor<Vec<u8>>>) -> ParseResult<u32> {
    match lexer.next_token()? {
        Token::Integer(n) if (0..=u32::MAX as i64).contains(&n) => Ok(n as u32),
        other => Err(ParseError::StreamDecodeError(format!(
            "object stream header: expected integer, found {}",
            other.kind()
        ))),
    }
}
