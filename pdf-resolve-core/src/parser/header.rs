//! PDF header scan
//!
//! Locates the `%PDF-x.y` marker. The marker is not required to sit at byte
//! zero: files prefixed with junk are legal as long as the marker appears
//! within the first 1024 bytes, and every offset in the file is then
//! relative to it.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseOptions, ParseResult};
use std::io::{Read, Seek};
use tracing::warn;

/// How far into the file the `%PDF-` marker may legally appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF version from the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parsed file header: the version and the byte offset of `%PDF`, which
/// anchors all offsets in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: PdfVersion,
    pub offset: u64,
}

/// Locate and parse the file header. The lexer is left positioned just
/// after the header line.
pub fn parse_header<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    options: &ParseOptions,
) -> ParseResult<Header> {
    lexer.seek_to(0)?;
    let offset = lexer
        .find_keyword_ahead("%PDF-", HEADER_SEARCH_WINDOW)?
        .ok_or(ParseError::InvalidHeader)? as u64;
    lexer.seek_to(offset)?;

    let comment = match lexer.next_token_keep_comments()? {
        Token::Comment(bytes) => bytes,
        _ => return Err(ParseError::InvalidHeader),
    };

    let version = parse_version(&comment).ok_or(ParseError::InvalidHeader)?;
    if version.major != 1 && version.major != 2 {
        if options.strict {
            return Err(ParseError::InvalidHeader);
        }
        warn!("unusual PDF version in header: {version}");
    }

    Ok(Header { version, offset })
}

/// Parse "PDF-x.y" from the header comment body.
fn parse_version(comment: &[u8]) -> Option<PdfVersion> {
    let rest = comment.strip_prefix(b"PDF-")?;
    let text = std::str::from_utf8(rest).ok()?;
    let (major, minor) = text.trim_end().split_once('.')?;
    Some(PdfVersion {
        major: major.parse().ok()?,
        minor: minor.parse().ok()?,
    })
}
