//! Cross-reference stream parser
//!
//! The PDF 1.5+ encoding: the xref section is itself a stream object whose
//! decoded body holds fixed-width big-endian records described by `/W`,
//! partitioned into object-number ranges by `/Index`. The stream dictionary
//! doubles as the revision's trailer.

use super::lexer::{Lexer, Token};
use super::objects::{parse_indirect_object, PdfObject, PdfStream};
use super::trailer::Trailer;
use super::xref::{SectionParser, XRefEntry, XRefSection, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use std::io::{Read, Seek};
use tracing::warn;

/// Parser for the xref stream encoding.
pub struct StreamXRefParser;

impl<R: Read + Seek> SectionParser<R> for StreamXRefParser {
    /// Probe for the `N G obj` pattern that opens an indirect object.
    fn can_parse(&self, lexer: &mut Lexer<R>, position: u64) -> ParseResult<bool> {
        let saved = lexer.save_position()?;
        lexer.seek_to(position)?;
        let matches = matches!(
            (lexer.next_token(), lexer.next_token(), lexer.next_token()),
            (Ok(Token::Integer(_)), Ok(Token::Integer(_)), Ok(Token::Obj))
        );
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
        let (id, object) = parse_indirect_object(lexer, options)?;
        let stream = match object {
            PdfObject::Stream(stream) => stream,
            other => {
                return Err(ParseError::InvalidXRef(format!(
                    "object at xref offset {offset} is {}, expected stream",
                    other.kind()
                )))
            }
        };

        if stream.dict.get_type() != Some("XRef") {
            if options.strict {
                return Err(ParseError::InvalidXRef(
                    "xref stream missing /Type /XRef".to_string(),
                ));
            }
            warn!("xref stream at {offset} missing /Type /XRef");
        }

        let mut table = decode_entries(&stream, options)?;

        // The stream's own entry is never in-band; record it so the object
        // stays resolvable
        table.entry_or_insert(
            id.number(),
            XRefEntry::InUse {
                offset,
                generation: id.generation(),
            },
        );

        Ok(XRefSection {
            table,
            trailer: Trailer::new(stream.dict),
        })
    }
}

impl XRefTable {
    fn entry_or_insert(&mut self, number: u32, entry: XRefEntry) {
        if !self.contains(number) {
            self.insert(number, entry);
        }
    }
}

fn decode_entries(stream: &PdfStream, options: &ParseOptions) -> ParseResult<XRefTable> {
    let widths = field_widths(stream)?;
    let record_len: usize = widths.iter().sum();
    if record_len == 0 {
        return Err(ParseError::InvalidXRef("/W widths sum to zero".to_string()));
    }

    let size = stream
        .dict
        .get("Size")
        .and_then(|obj| obj.as_integer())
        .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;
    let ranges = index_ranges(stream, size)?;

    let data = stream.decoded_data()?;
    let mut records = data.chunks_exact(record_len);
    let mut table = XRefTable::new();

    for (first, count) in ranges {
        for i in 0..count {
            let number = (first + i) as u32;
            let record = records.next().ok_or_else(|| {
                ParseError::InvalidXRef(format!(
                    "xref stream data exhausted at object {number}"
                ))
            })?;

            let (type_field, rest) = record.split_at(widths[0]);
            let (field2, field3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to 1 (in-use)
            let entry_type = if widths[0] == 0 { 1 } else { big_endian(type_field) };
            let f2 = big_endian(field2);
            let f3 = big_endian(field3);

            let entry = match entry_type {
                0 => XRefEntry::Free {
                    next_free: f2 as u32,
                    generation: checked_generation(f3)?,
                },
                1 => XRefEntry::InUse {
                    offset: f2,
                    generation: checked_generation(f3)?,
                },
                2 => XRefEntry::Compressed {
                    container: f2 as u32,
                    index: f3 as u32,
                },
                other if !options.strict => {
                    warn!("object {number}: unknown xref entry type {other}, skipped");
                    continue;
                }
                other => {
                    return Err(ParseError::InvalidXRef(format!(
                        "object {number}: unknown xref entry type {other}"
                    )))
                }
            };
            table.insert(number, entry);
        }
    }

    Ok(table)
}

/// `/W [w1 w2 w3]`: big-endian byte width per record field.
fn field_widths(stream: &PdfStream) -> ParseResult<[usize; 3]> {
    let array = stream
        .dict
        .get("W")
        .and_then(|obj| obj.as_array())
        .ok_or_else(|| ParseError::MissingKey("W".to_string()))?;
    if array.len() != 3 {
        return Err(ParseError::InvalidXRef(format!(
            "/W has {} elements, expected 3",
            array.len()
        )));
    }

    let mut widths = [0usize; 3];
    for (i, slot) in widths.iter_mut().enumerate() {
        let w = array
            .get(i)
            .and_then(|obj| obj.as_integer())
            .ok_or_else(|| ParseError::InvalidXRef("/W element not an integer".to_string()))?;
        if !(0..=8).contains(&w) {
            return Err(ParseError::InvalidXRef(format!("/W width {w} out of range")));
        }
        *slot = w as usize;
    }
    Ok(widths)
}

/// `/Index` pairs `(firstObjNum, count)`; defaults to `[0, /Size]`.
fn index_ranges(stream: &PdfStream, size: i64) -> ParseResult<Vec<(u64, u64)>> {
    let array = match stream.dict.get("Index") {
        None => return Ok(vec![(0, size.max(0) as u64)]),
        Some(obj) => obj.as_array().ok_or_else(|| {
            ParseError::InvalidXRef("/Index is not an array".to_string())
        })?,
    };
    if array.len() % 2 != 0 {
        return Err(ParseError::InvalidXRef(
            "/Index has an odd number of elements".to_string(),
        ));
    }

    let mut ranges = Vec::with_capacity(array.len() / 2);
    for pair in array.0.chunks(2) {
        let first = pair[0].as_integer();
        let count = pair[1].as_integer();
        match (first, count) {
            (Some(first), Some(count)) if first >= 0 && count >= 0 => {
                ranges.push((first as u64, count as u64));
            }
            _ => {
                return Err(ParseError::InvalidXRef(
                    "/Index pair is not two non-negative integers".to_string(),
                ))
            }
        }
    }
    Ok(ranges)
}

fn big_endian(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn checked_generation(value: u64) -> ParseResult<u16> {
    u16::try_from(value)
        .map_err(|_| ParseError::InvalidXRef(format!("generation {value} out of range")))
}
