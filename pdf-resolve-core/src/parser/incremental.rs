//! Incremental update traversal
//!
//! Each appended revision contributes one xref section; trailers chain
//! backward through `/Prev`. The chain is resolved oldest-to-newest into a
//! single table where entries from newer revisions shadow older ones. The
//! encoding of every section is probed independently, since a file updated
//! by different writers may mix classic tables and xref streams.

use super::lexer::Lexer;
use super::trailer::Trailer;
use super::xref::{ClassicXRefParser, SectionParser, XRefSection, XRefTable};
use super::xref_stream::StreamXRefParser;
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::HashSet;
use std::io::{Read, Seek};
use tracing::warn;

/// The fully resolved cross-reference state of a document: the merged
/// table and the newest revision's trailer (with older keys absorbed).
#[derive(Debug, Clone)]
pub struct ResolvedXRef {
    pub table: XRefTable,
    pub trailer: Trailer,
}

/// Parse one xref section at `offset`, probing each encoding in turn.
/// Fails hard when no parser claims the position.
pub fn parse_section<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    pdf_start: u64,
    offset: u64,
    options: &ParseOptions,
) -> ParseResult<XRefSection> {
    let strategies: [&dyn SectionParser<R>; 2] = [&ClassicXRefParser, &StreamXRefParser];
    for strategy in strategies {
        if strategy.can_parse(lexer, pdf_start + offset)? {
            return strategy.parse(lexer, pdf_start, offset, options);
        }
    }
    Err(ParseError::InvalidXRef(format!(
        "no cross-reference section recognized at offset {offset}"
    )))
}

/// Follow the `/Prev` chain from `initial_offset` and merge every
/// revision's entries, newest winning.
pub fn process_incremental_updates<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    pdf_start: u64,
    initial_offset: u64,
    options: &ParseOptions,
) -> ParseResult<ResolvedXRef> {
    let mut visited = HashSet::new();
    let mut table = XRefTable::new();
    let mut trailer: Option<Trailer> = None;
    let mut next_offset = Some(initial_offset);

    while let Some(offset) = next_offset {
        if !visited.insert(offset) {
            if options.strict {
                return Err(ParseError::InvalidXRef(format!(
                    "/Prev chain revisits offset {offset}"
                )));
            }
            warn!("/Prev chain revisits offset {offset}, stopping traversal");
            break;
        }

        let section = parse_section(lexer, pdf_start, offset, options)?;
        next_offset = section.trailer.prev();

        // This section is older than everything accumulated so far
        table.merge_older(section.table);
        match trailer.as_mut() {
            None => trailer = Some(section.trailer),
            Some(newest) => newest.absorb_older(&section.trailer),
        }
    }

    let trailer = trailer.ok_or_else(|| {
        ParseError::InvalidTrailer("no trailer found in xref chain".to_string())
    })?;
    Ok(ResolvedXRef { table, trailer })
}

/// Follow the `/Prev` chain collecting only the trailer, for callers that
/// need `/Root` or `/Encrypt` without the cost of a merged table.
pub fn get_trailer<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    pdf_start: u64,
    initial_offset: u64,
    options: &ParseOptions,
) -> ParseResult<Trailer> {
    let mut visited = HashSet::new();
    let mut trailer: Option<Trailer> = None;
    let mut next_offset = Some(initial_offset);

    while let Some(offset) = next_offset {
        if !visited.insert(offset) {
            if options.strict {
                return Err(ParseError::InvalidXRef(format!(
                    "/Prev chain revisits offset {offset}"
                )));
            }
            warn!("/Prev chain revisits offset {offset}, stopping traversal");
            break;
        }
        let section = parse_section(lexer, pdf_start, offset, options)?;
        next_offset = section.trailer.prev();
        match trailer.as_mut() {
            None => trailer = Some(section.trailer),
            Some(newest) => newest.absorb_older(&section.trailer),
        }
    }

    trailer.ok_or_else(|| {
        ParseError::InvalidTrailer("no trailer found in xref chain".to_string())
    })
}
