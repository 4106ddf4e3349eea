//! Structural resolution layer for PDF files.
//!
//! A PDF file is not a stream: objects are scattered across the byte range
//! and located through a chain of cross-reference sections, each revision of
//! the file appending another section. This crate implements everything
//! between "raw bytes at an offset" and "a typed, decoded primitive value":
//!
//! - the byte-level tokenizer and recursive-descent object parser,
//! - the `startxref` tail scan,
//! - both cross-reference encodings (classic tables and xref streams) and
//!   the incremental-update merge that combines them,
//! - compressed object streams (`/Type /ObjStm`),
//! - per-object RC4 / AES-128-CBC decryption,
//! - the [`PdfReader`] façade that ties them together.
//!
//! Values returned by the reader are never auto-dereferenced: a dictionary
//! entry may be a [`PdfObject::Reference`] that the caller resolves with a
//! second [`PdfReader::get_object`] call. This keeps resolution depth
//! explicit and makes reference cycles a caller concern.
//!
//! ```no_run
//! use pdf_resolve::parser::PdfReader;
//!
//! let mut reader = PdfReader::open("document.pdf")?;
//! let root = reader.trailer().root()?;
//! let catalog = reader.get_object(root)?;
//! # Ok::<(), pdf_resolve::parser::ParseError>(())
//! ```

pub mod encryption;
pub mod parser;

pub use parser::objects::{
    ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString,
};
pub use parser::reader::PdfReader;
pub use parser::{ParseError, ParseOptions, ParseResult};
