//! PDF structural parser.
//!
//! Tokenizer, object parser, cross-reference resolution and the reader
//! façade, following the file structure rules of ISO 32000-1 Section 7.

pub mod header;
pub mod incremental;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod filters;
pub mod reader;
pub mod startxref;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

pub use self::reader::PdfReader;

use self::objects::ObjectId;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Unexpected end of file at position {position}")]
    UnexpectedEof { position: usize },

    #[error("Unexpected byte at position {position}: expected {expected:#04x}, found {actual:#04x}")]
    UnexpectedByte {
        position: usize,
        expected: u8,
        actual: u8,
    },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid cross-reference section: {0}")]
    InvalidXRef(String),

    #[error("Invalid trailer: {0}")]
    InvalidTrailer(String),

    #[error("Invalid object reference: {0}")]
    InvalidReference(ObjectId),

    #[error("Object {0} is free")]
    FreeObject(ObjectId),

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),
}

/// Parsing options controlling strictness of the resolution layer.
///
/// In lenient mode (the default), recoverable structural issues are logged
/// as warnings and resolution continues with best-effort defaults. Strict
/// mode promotes those warnings to hard failures. Violations that make the
/// file unreadable (no `startxref`, missing `/Root`, no xref parser claims
/// an offset) fail in both modes.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Promote recoverable warnings to hard failures
    pub strict: bool,
}

impl ParseOptions {
    /// Strict parsing: every recoverable warning becomes an error.
    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Lenient parsing: tolerate recoverable deviations (default).
    pub fn lenient() -> Self {
        Self { strict: false }
    }
}
