//! PDF object model and recursive-descent parser
//!
//! Builds typed values from the token stream, including the bounded
//! lookahead that disambiguates `N G R` references from plain integers.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::warn;

/// Maximum distance scanned for `endstream` when `/Length` cannot be
/// resolved at parse time.
const MAX_STREAM_SCAN: usize = 10 * 1024 * 1024;

/// Identity of an indirect object: object number and generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    number: u32,
    generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.number, self.generation)
    }
}

/// A PDF name object (without the leading slash)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A PDF string: raw bytes, already unescaped/decoded by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lossy UTF-8 view, for diagnostics.
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

/// A PDF array
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn push(&mut self, obj: PdfObject) {
        self.0.push(obj);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// A PDF dictionary. Keys are names without the leading slash.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub HashMap<String, PdfObject>);

impl PdfDictionary {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: String, value: PdfObject) -> Option<PdfObject> {
        self.0.insert(key, value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `/Type` entry as a name, if present.
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|obj| obj.as_name()).map(|n| n.as_str())
    }
}

/// A PDF stream: its dictionary and the raw, still-encoded body bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

impl PdfStream {
    pub fn new(dict: PdfDictionary, data: Vec<u8>) -> Self {
        Self { dict, data }
    }

    /// Raw bytes exactly as stored in the file.
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Body bytes after applying the `/Filter` chain.
    pub fn decoded_data(&self) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream_data(&self.dict, &self.data)
    }
}

/// A typed PDF value
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(ObjectId),
}

impl PdfObject {
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of either an integer or a real.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Integer(i) => Some(*i as f64),
            PdfObject::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Short description used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PdfObject::Null => "null",
            PdfObject::Boolean(_) => "boolean",
            PdfObject::Integer(_) => "integer",
            PdfObject::Real(_) => "real",
            PdfObject::String(_) => "string",
            PdfObject::Name(_) => "name",
            PdfObject::Array(_) => "array",
            PdfObject::Dictionary(_) => "dictionary",
            PdfObject::Stream(_) => "stream",
            PdfObject::Reference(_) => "reference",
        }
    }
}

/// Parse one object from the token stream.
///
/// On two consecutive integers, looks ahead one token: an `R` makes the
/// triple a [`PdfObject::Reference`], anything else un-consumes the extra
/// tokens and yields the first integer alone. A dictionary followed by the
/// `stream` keyword becomes a [`PdfObject::Stream`].
pub fn parse_object<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    options: &ParseOptions,
) -> ParseResult<PdfObject> {
    let token = lexer.next_token()?;
    parse_object_from_token(lexer, token, options)
}

fn parse_object_from_token<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    token: Token,
    options: &ParseOptions,
) -> ParseResult<PdfObject> {
    match token {
        Token::Null => Ok(PdfObject::Null),
        Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
        Token::Real(r) => Ok(PdfObject::Real(r)),
        Token::LiteralString(bytes) | Token::HexString(bytes) => {
            Ok(PdfObject::String(PdfString::new(bytes)))
        }
        Token::Name(name) => Ok(PdfObject::Name(PdfName::new(name))),
        Token::Integer(first) => parse_integer_or_reference(lexer, first),
        Token::ArrayStart => parse_array_body(lexer, options),
        Token::DictStart => {
            let dict = parse_dictionary_body(lexer, options)?;
            if lexer.peek_token()? == Token::Stream {
                lexer.next_token()?;
                let stream = parse_stream_body(lexer, dict, options)?;
                Ok(PdfObject::Stream(stream))
            } else {
                Ok(PdfObject::Dictionary(dict))
            }
        }
        other => Err(ParseError::UnexpectedToken {
            expected: "object".to_string(),
            found: other.kind().to_string(),
        }),
    }
}

/// Bounded two-token lookahead for the `N G R` reference form.
fn parse_integer_or_reference<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    first: i64,
) -> ParseResult<PdfObject> {
    let second = lexer.next_token()?;
    if let Token::Integer(gen) = second {
        let third = lexer.next_token()?;
        if third == Token::R {
            if first >= 0 && first <= u32::MAX as i64 && gen >= 0 && gen <= u16::MAX as i64 {
                return Ok(PdfObject::Reference(ObjectId::new(first as u32, gen as u16)));
            }
            return Err(ParseError::SyntaxError {
                position: lexer.position(),
                message: format!("Reference out of range: {first} {gen} R"),
            });
        }
        // Not a reference: un-consume in LIFO order
        lexer.push_token(third);
        lexer.push_token(Token::Integer(gen));
    } else {
        lexer.push_token(second);
    }
    Ok(PdfObject::Integer(first))
}

fn parse_array_body<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    options: &ParseOptions,
) -> ParseResult<PdfObject> {
    let mut array = PdfArray::new();
    loop {
        let token = lexer.next_token()?;
        match token {
            Token::ArrayEnd => return Ok(PdfObject::Array(array)),
            Token::Eof => {
                return Err(ParseError::UnexpectedEof {
                    position: lexer.position(),
                })
            }
            other => array.push(parse_object_from_token(lexer, other, options)?),
        }
    }
}

/// Parse dictionary entries after the `<<` has been consumed.
pub fn parse_dictionary_body<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    options: &ParseOptions,
) -> ParseResult<PdfDictionary> {
    let mut dict = PdfDictionary::new();
    loop {
        let token = lexer.next_token()?;
        match token {
            Token::DictEnd => return Ok(dict),
            Token::Name(key) => {
                let value = parse_object(lexer, options)?;
                dict.insert(key, value);
            }
            Token::Eof => {
                return Err(ParseError::UnexpectedEof {
                    position: lexer.position(),
                })
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "name".to_string(),
                    found: other.kind().to_string(),
                })
            }
        }
    }
}

/// Read the stream body after the `stream` keyword has been consumed.
///
/// With a direct integer `/Length` the body is copied verbatim; when the
/// length is an indirect reference (unresolvable this early) the body is
/// found by scanning ahead for `endstream` and the caller truncates it once
/// the reference can be resolved.
fn parse_stream_body<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    dict: PdfDictionary,
    options: &ParseOptions,
) -> ParseResult<PdfStream> {
    if let Err(e) = lexer.read_newline() {
        if options.strict {
            return Err(e);
        }
        warn!("stream keyword not followed by end-of-line marker: {e}");
        lexer.skip_whitespace()?;
    }

    let data = match dict.get("Length") {
        Some(PdfObject::Integer(len)) if *len >= 0 => {
            let data = lexer.read_bytes(*len as usize)?;
            lexer.skip_whitespace()?;
            lexer.expect_token(Token::EndStream)?;
            data
        }
        Some(PdfObject::Reference(_)) | None => {
            let distance = lexer
                .find_keyword_ahead("endstream", MAX_STREAM_SCAN)?
                .ok_or_else(|| ParseError::SyntaxError {
                    position: lexer.position(),
                    message: "endstream keyword not found".to_string(),
                })?;
            let mut data = lexer.read_bytes(distance)?;
            trim_trailing_eol(&mut data);
            lexer.expect_token(Token::EndStream)?;
            data
        }
        Some(other) => {
            return Err(ParseError::UnexpectedToken {
                expected: "integer or reference for /Length".to_string(),
                found: other.kind().to_string(),
            })
        }
    };

    Ok(PdfStream::new(dict, data))
}

/// Strip the single end-of-line marker the format requires before
/// `endstream`.
fn trim_trailing_eol(data: &mut Vec<u8>) {
    if data.ends_with(b"\r\n") {
        data.truncate(data.len() - 2);
    } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
        data.truncate(data.len() - 1);
    }
}

/// Parse one top-level indirect object: `N G obj <value> endobj`.
pub fn parse_indirect_object<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    options: &ParseOptions,
) -> ParseResult<(ObjectId, PdfObject)> {
    let number = match lexer.next_token()? {
        Token::Integer(n) if n >= 0 && n <= u32::MAX as i64 => n as u32,
        other => {
            return Err(ParseError::UnexpectedToken {
                expected: "object number".to_string(),
                found: other.kind().to_string(),
            })
        }
    };
    let generation = match lexer.next_token()? {
        Token::Integer(g) if g >= 0 && g <= u16::MAX as i64 => g as u16,
        other => {
            return Err(ParseError::UnexpectedToken {
                expected: "generation number".to_string(),
                found: other.kind().to_string(),
            })
        }
    };
    lexer.expect_token(Token::Obj)?;

    let id = ObjectId::new(number, generation);
    let value = parse_object(lexer, options)?;

    match lexer.next_token()? {
        Token::EndObj => {}
        other if !options.strict => {
            warn!("object {id}: expected endobj, found {}", other.kind());
            lexer.push_token(other);
        }
        other => {
            return Err(ParseError::UnexpectedToken {
                expected: "endobj".to_string(),
                found: other.kind().to_string(),
            })
        }
    }

    Ok((id, value))
}
