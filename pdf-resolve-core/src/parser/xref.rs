//! Cross-reference table model and the classic table parser
//!
//! A cross-reference section maps object numbers to byte offsets or
//! compressed-container slots. The classic encoding is the fixed-width
//! `xref` table; the stream encoding lives in [`super::xref_stream`]. Both
//! implement [`SectionParser`] so the update traversal can probe and pick
//! the right one per section.

use super::lexer::{Lexer, Token};
use super::objects::parse_dictionary_body;
use super::trailer::Trailer;
use super::xref_stream::StreamXRefParser;
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::warn;

/// One cross-reference entry for an object number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Object is free; `next_free` is the next free object number and
    /// `generation` the generation a reuse of this number must exceed.
    Free { next_free: u32, generation: u16 },

    /// Object stored directly at `offset` (relative to the `%PDF` marker).
    InUse { offset: u64, generation: u16 },

    /// Object packed inside object stream `container` at position `index`.
    /// Generation is implicitly 0.
    Compressed { container: u32, index: u32 },
}

/// Merged cross-reference table: object number to entry, last writer wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XRefTable {
    entries: HashMap<u32, XRefEntry>,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, number: u32, entry: XRefEntry) -> Option<XRefEntry> {
        self.entries.insert(number, entry)
    }

    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    pub fn contains(&self, number: u32) -> bool {
        self.entries.contains_key(&number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }

    /// Absorb entries from an older revision: object numbers already known
    /// keep their newer entry, numbers only in the older table pass
    /// through unchanged.
    pub fn merge_older(&mut self, older: XRefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
    }

    /// Overlay entries that shadow existing ones (hybrid-file xref stream
    /// over the classic section of the same revision).
    pub fn overlay(&mut self, newer: XRefTable) {
        self.entries.extend(newer.entries);
    }
}

/// One parsed cross-reference section: its table and trailer.
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub table: XRefTable,
    pub trailer: Trailer,
}

/// A strategy for one cross-reference encoding. `can_parse` is a cheap
/// speculative probe and must leave the byte position untouched.
pub trait SectionParser<R: Read + Seek> {
    fn can_parse(&self, lexer: &mut Lexer<R>, position: u64) -> ParseResult<bool>;

    fn parse(
        &self,
        lexer: &mut Lexer<R>,
        pdf_start: u64,
        offset: u64,
        options: &ParseOptions,
    ) -> ParseResult<XRefSection>;
}

/// Parser for the classic fixed-width `xref` table encoding.
pub struct ClassicXRefParser;

impl<R: Read + Seek> SectionParser<R> for ClassicXRefParser {
    fn can_parse(&self, lexer: &mut Lexer<R>, position: u64) -> ParseResult<bool> {
        let saved = lexer.save_position()?;
        lexer.seek_to(position)?;
        let matches = matches!(lexer.next_token(), Ok(Token::Xref));
        lexer.restore_position(saved)?;
        Ok(matches)
    }

    fn parse(
        &self,
        lexer: &mut Lexer<R>,
        pdf_start: u64,
        offset: u64,
        options: &ParseOptions,
    ) -> ParseResult<XRefSection> {
        lexer.seek_to(pdf_start + offset)?;
        lexer.expect_token(Token::Xref)?;

        let mut table = XRefTable::new();

        loop {
            match lexer.next_token()? {
                Token::Trailer => break,
                Token::Integer(first) if first >= 0 => {
                    let count = match lexer.next_token()? {
                        Token::Integer(count) if count >= 0 => count as u64,
                        other => {
                            return Err(ParseError::InvalidXRef(format!(
                                "subsection header: expected count, found {}",
                                other.kind()
                            )))
                        }
                    };
                    parse_subsection(lexer, &mut table, first as u64, count, options)?;
                }
                other => {
                    return Err(ParseError::InvalidXRef(format!(
                        "expected subsection header or trailer, found {}",
                        other.kind()
                    )))
                }
            }
        }

        lexer.expect_token(Token::DictStart)?;
        let trailer = Trailer::new(parse_dictionary_body(lexer, options)?);

        // Hybrid file: the stream section at /XRefStm shadows the classic
        // entries of this revision
        if let Some(stm_offset) = trailer.xref_stm() {
            match StreamXRefParser.parse(lexer, pdf_start, stm_offset, options) {
                Ok(stream_section) => table.overlay(stream_section.table),
                Err(e) if !options.strict => {
                    warn!("hybrid xref stream at {stm_offset} unreadable: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(XRefSection { table, trailer })
    }
}

fn parse_subsection<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    table: &mut XRefTable,
    first: u64,
    count: u64,
    options: &ParseOptions,
) -> ParseResult<()> {
    for i in 0..count {
        let number = (first + i) as u32;
        lexer.skip_whitespace()?;

        let saved = lexer.save_position()?;
        let bytes = lexer.read_bytes(18)?;
        let entry = match parse_fixed_entry(&bytes) {
            Some(entry) => entry,
            None if !options.strict => {
                warn!("malformed xref entry for object {number}, reparsing loosely");
                lexer.restore_position(saved)?;
                parse_loose_entry(lexer)?
            }
            None => {
                return Err(ParseError::InvalidXRef(format!(
                    "malformed 20-byte entry for object {number}"
                )))
            }
        };
        table.insert(number, entry);
    }
    Ok(())
}

/// Parse the fixed 18 significant bytes of a classic entry:
/// `"%010d %05d %c"` with `n` or `f` as the type character. The two
/// trailing separator bytes are absorbed by the next whitespace skip.
fn parse_fixed_entry(bytes: &[u8]) -> Option<XRefEntry> {
    if bytes.len() != 18 || bytes[10] != b' ' || bytes[16] != b' ' {
        return None;
    }
    let offset = ascii_decimal(&bytes[0..10])?;
    let generation = ascii_decimal(&bytes[11..16])?;
    if generation > u16::MAX as u64 {
        return None;
    }
    match bytes[17] {
        b'n' => Some(XRefEntry::InUse {
            offset,
            generation: generation as u16,
        }),
        b'f' => Some(XRefEntry::Free {
            next_free: offset as u32,
            generation: generation as u16,
        }),
        _ => None,
    }
}

/// Whitespace-separated fallback for writers that get the fixed widths
/// wrong.
fn parse_loose_entry<R: Read + Seek>(lexer: &mut Lexer<R>) -> ParseResult<XRefEntry> {
    let offset = match lexer.next_token()? {
        Token::Integer(n) if n >= 0 => n as u64,
        other => {
            return Err(ParseError::InvalidXRef(format!(
                "entry offset: found {}",
                other.kind()
            )))
        }
    };
    let generation = match lexer.next_token()? {
        Token::Integer(g) if (0..=u16::MAX as i64).contains(&g) => g as u16,
        other => {
            return Err(ParseError::InvalidXRef(format!(
                "entry generation: found {}",
                other.kind()
            )))
        }
    };
    lexer.skip_whitespace()?;
    match lexer.read_bytes(1)?[0] {
        b'n' => Ok(XRefEntry::InUse { offset, generation }),
        b'f' => Ok(XRefEntry::Free {
            next_free: offset as u32,
            generation,
        }),
        other => Err(ParseError::InvalidXRef(format!(
            "entry type: found {:#04x}",
            other
        ))),
    }
}

fn ascii_decimal(bytes: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }
    Some(value)
}
