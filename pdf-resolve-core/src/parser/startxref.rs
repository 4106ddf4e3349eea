//! startxref tail scan
//!
//! The last line group of a PDF file is `startxref\n<digits>\n%%EOF`. The
//! offset is found by scanning backward from end-of-file, so a decoy
//! `startxref` inside object content never wins over the true tail
//! occurrence. Candidates that are not followed by digits are skipped and
//! the scan continues backward.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseResult};
use std::io::{Read, Seek};

const KEYWORD: &[u8] = b"startxref";
const SCAN_BLOCK: usize = 4096;

/// Scan backward from end-of-file for the `startxref` keyword and return
/// the decimal offset that follows it. The returned offset is as stored in
/// the file, relative to the `%PDF` header position.
pub fn find_startxref<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    pdf_start: u64,
) -> ParseResult<u64> {
    let file_len = lexer.stream_length()?;
    let mut window_end = file_len;

    while window_end > pdf_start {
        let window_start = window_end
            .saturating_sub(SCAN_BLOCK as u64)
            .max(pdf_start);
        lexer.seek_to(window_start)?;
        let buf = lexer.read_bytes((window_end - window_start) as usize)?;

        if buf.len() >= KEYWORD.len() {
            for i in (0..=buf.len() - KEYWORD.len()).rev() {
                if &buf[i..i + KEYWORD.len()] != KEYWORD {
                    continue;
                }
                let digits_at = window_start + i as u64 + KEYWORD.len() as u64;
                if let Some(offset) = read_offset(lexer, digits_at)? {
                    return Ok(offset);
                }
            }
        }

        if window_start == pdf_start {
            break;
        }
        // Overlap blocks so a keyword spanning the boundary is still seen
        window_end = window_start + KEYWORD.len() as u64 - 1;
    }

    Err(ParseError::InvalidXRef(
        "startxref keyword not found".to_string(),
    ))
}

/// Try to read the decimal offset following a keyword candidate. Returns
/// None when no digits follow (a false candidate).
fn read_offset<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    position: u64,
) -> ParseResult<Option<u64>> {
    lexer.seek_to(position)?;
    lexer.skip_whitespace()?;
    match lexer.next_token() {
        Ok(Token::Integer(n)) if n >= 0 => Ok(Some(n as u64)),
        _ => Ok(None),
    }
}
