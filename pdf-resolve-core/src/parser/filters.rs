//! Stream filter decoding
//!
//! Applies the `/Filter` chain of a stream dictionary to its raw body.
//! The registry covers the lossless text/structural filters (FlateDecode
//! with the PNG/TIFF predictors, ASCIIHexDecode, ASCII85Decode,
//! RunLengthDecode); unknown filter names fail rather than pass bytes
//! through silently.

use super::lexer::hex_digit_value;
use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Decode a stream body by applying its `/Filter` chain in order.
pub fn decode_stream_data(dict: &PdfDictionary, data: &[u8]) -> ParseResult<Vec<u8>> {
    let filters = filter_names(dict)?;
    if filters.is_empty() {
        return Ok(data.to_vec());
    }

    let parms = decode_parms(dict, filters.len());
    let mut out = data.to_vec();
    for (name, parm) in filters.iter().zip(parms.iter()) {
        out = apply_filter(name, &out, parm.as_ref())?;
    }
    Ok(out)
}

/// Collect filter names from `/Filter` (a name or an array of names).
fn filter_names(dict: &PdfDictionary) -> ParseResult<Vec<String>> {
    match dict.get("Filter") {
        None => Ok(Vec::new()),
        Some(PdfObject::Name(name)) => Ok(vec![name.as_str().to_string()]),
        Some(PdfObject::Array(array)) => {
            let mut names = Vec::with_capacity(array.len());
            for obj in array.iter() {
                match obj {
                    PdfObject::Name(name) => names.push(name.as_str().to_string()),
                    other => {
                        return Err(ParseError::StreamDecodeError(format!(
                            "filter array entry is {}, expected name",
                            other.kind()
                        )))
                    }
                }
            }
            Ok(names)
        }
        Some(other) => Err(ParseError::StreamDecodeError(format!(
            "/Filter is {}, expected name or array",
            other.kind()
        ))),
    }
}

/// Collect per-filter parameter dictionaries from `/DecodeParms` (or the
/// `/DP` abbreviation), padding with None to match the filter count.
fn decode_parms(dict: &PdfDictionary, count: usize) -> Vec<Option<PdfDictionary>> {
    let parms = dict.get("DecodeParms").or_else(|| dict.get("DP"));
    let mut result = vec![None; count];
    match parms {
        Some(PdfObject::Dictionary(d)) => {
            if count > 0 {
                result[0] = Some(d.clone());
            }
        }
        Some(PdfObject::Array(array)) => {
            for (i, obj) in array.iter().enumerate().take(count) {
                if let PdfObject::Dictionary(d) = obj {
                    result[i] = Some(d.clone());
                }
            }
        }
        _ => {}
    }
    result
}

fn apply_filter(
    name: &str,
    data: &[u8],
    parms: Option<&PdfDictionary>,
) -> ParseResult<Vec<u8>> {
    match name {
        "FlateDecode" | "Fl" => {
            let inflated = flate_decode(data)?;
            apply_predictor(inflated, parms)
        }
        "ASCIIHexDecode" | "AHx" => ascii_hex_decode(data),
        "ASCII85Decode" | "A85" => ascii_85_decode(data),
        "RunLengthDecode" | "RL" => run_length_decode(data),
        other => Err(ParseError::StreamDecodeError(format!(
            "unsupported filter: /{other}"
        ))),
    }
}

fn flate_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ParseError::StreamDecodeError(format!("flate decode failed: {e}")))?;
    Ok(out)
}

fn ascii_hex_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut nibbles = Vec::new();
    for &byte in data {
        if byte == b'>' {
            break;
        }
        if let Some(value) = hex_digit_value(byte) {
            nibbles.push(value);
        } else if !super::lexer::is_whitespace(byte) {
            return Err(ParseError::StreamDecodeError(format!(
                "invalid byte in hex data: {byte:#04x}"
            )));
        }
    }
    if nibbles.len() % 2 != 0 {
        nibbles.push(0);
    }
    Ok(nibbles.chunks(2).map(|p| (p[0] << 4) | p[1]).collect())
}

fn ascii_85_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut filled = 0usize;

    let mut bytes = data.iter().copied();
    while let Some(byte) = bytes.next() {
        match byte {
            b'~' => break,
            b'z' if filled == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[filled] = byte - b'!';
                filled += 1;
                if filled == 5 {
                    let value = group.iter().fold(0u32, |acc, &d| {
                        acc.wrapping_mul(85).wrapping_add(d as u32)
                    });
                    out.extend_from_slice(&value.to_be_bytes());
                    filled = 0;
                }
            }
            b if super::lexer::is_whitespace(b) => {}
            other => {
                return Err(ParseError::StreamDecodeError(format!(
                    "invalid byte in base-85 data: {other:#04x}"
                )))
            }
        }
    }

    // A partial final group of n digits encodes n-1 bytes; pad with the
    // maximum digit so truncation rounds the right way
    if filled == 1 {
        return Err(ParseError::StreamDecodeError(
            "truncated base-85 group".to_string(),
        ));
    }
    if filled > 1 {
        for slot in group.iter_mut().skip(filled) {
            *slot = 84;
        }
        let value = group
            .iter()
            .fold(0u32, |acc, &d| acc.wrapping_mul(85).wrapping_add(d as u32));
        out.extend_from_slice(&value.to_be_bytes()[..filled - 1]);
    }
    Ok(out)
}

fn run_length_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let length = data[pos];
        pos += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                let end = pos + count;
                if end > data.len() {
                    return Err(ParseError::StreamDecodeError(
                        "run-length literal extends past end of data".to_string(),
                    ));
                }
                out.extend_from_slice(&data[pos..end]);
                pos = end;
            }
            129..=255 => {
                let count = 257 - length as usize;
                let byte = *data.get(pos).ok_or_else(|| {
                    ParseError::StreamDecodeError(
                        "run-length repeat missing its byte".to_string(),
                    )
                })?;
                pos += 1;
                out.extend(std::iter::repeat(byte).take(count));
            }
        }
    }
    Ok(out)
}

/// Undo the `/Predictor` transform declared in the filter parameters.
fn apply_predictor(
    data: Vec<u8>,
    parms: Option<&PdfDictionary>,
) -> ParseResult<Vec<u8>> {
    let parms = match parms {
        Some(p) => p,
        None => return Ok(data),
    };

    let int_param = |key: &str, default: i64| -> i64 {
        parms.get(key).and_then(|o| o.as_integer()).unwrap_or(default)
    };

    let predictor = int_param("Predictor", 1);
    if predictor <= 1 {
        return Ok(data);
    }

    let colors = int_param("Colors", 1).max(1) as usize;
    let bits = int_param("BitsPerComponent", 8).max(1) as usize;
    let columns = int_param("Columns", 1).max(1) as usize;
    let bytes_per_pixel = ((colors * bits) / 8).max(1);
    let row_len = (columns * colors * bits + 7) / 8;

    match predictor {
        2 => tiff_predictor(data, row_len, bytes_per_pixel),
        10..=15 => png_predictor(data, row_len, bytes_per_pixel),
        other => Err(ParseError::StreamDecodeError(format!(
            "unsupported predictor: {other}"
        ))),
    }
}

/// TIFF horizontal differencing (predictor 2, 8-bit components).
fn tiff_predictor(
    mut data: Vec<u8>,
    row_len: usize,
    bytes_per_pixel: usize,
) -> ParseResult<Vec<u8>> {
    for row in data.chunks_mut(row_len) {
        for i in bytes_per_pixel..row.len() {
            row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
        }
    }
    Ok(data)
}

/// PNG row predictors (predictors 10-15): each row is prefixed by a filter
/// type byte selecting None/Sub/Up/Average/Paeth.
fn png_predictor(
    data: Vec<u8>,
    row_len: usize,
    bytes_per_pixel: usize,
) -> ParseResult<Vec<u8>> {
    let stride = row_len + 1;
    if stride == 1 || data.len() % stride != 0 {
        return Err(ParseError::StreamDecodeError(format!(
            "predicted data length {} is not a multiple of row stride {stride}",
            data.len()
        )));
    }

    let rows = data.len() / stride;
    let mut out = vec![0u8; rows * row_len];
    let mut prev_row = vec![0u8; row_len];

    for r in 0..rows {
        let filter_type = data[r * stride];
        let src = &data[r * stride + 1..(r + 1) * stride];
        let row = &mut out[r * row_len..(r + 1) * row_len];
        row.copy_from_slice(src);

        match filter_type {
            0 => {}
            1 => {
                for i in bytes_per_pixel..row_len {
                    row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bytes_per_pixel {
                        row[i - bytes_per_pixel] as u16
                    } else {
                        0
                    };
                    let up = prev_row[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bytes_per_pixel {
                        row[i - bytes_per_pixel]
                    } else {
                        0
                    };
                    let up = prev_row[i];
                    let up_left = if i >= bytes_per_pixel {
                        prev_row[i - bytes_per_pixel]
                    } else {
                        0
                    };
                    row[i] = row[i].wrapping_add(paeth(left, up, up_left));
                }
            }
            other => {
                return Err(ParseError::StreamDecodeError(format!(
                    "unknown PNG filter type: {other}"
                )))
            }
        }

        prev_row.copy_from_slice(row);
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
