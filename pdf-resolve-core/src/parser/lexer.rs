//! PDF lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2

use super::{ParseError, ParseResult};
use std::io::{BufReader, Read, Seek, SeekFrom};

/// PDF whitespace bytes (ISO 32000-1 Table 1). Note that NUL is whitespace
/// in PDF but not in `u8::is_ascii_whitespace`.
pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

/// PDF delimiter bytes (ISO 32000-1 Table 2).
pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// PDF token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Literal string `(...)` with escapes decoded
    LiteralString(Vec<u8>),

    /// Hexadecimal string `<...>` with nibbles decoded
    HexString(Vec<u8>),

    /// Name object (e.g., /Type) with `#xx` escapes decoded
    Name(String),

    /// Left square bracket [
    ArrayStart,

    /// Right square bracket ]
    ArrayEnd,

    /// Dictionary start <<
    DictStart,

    /// Dictionary end >>
    DictEnd,

    /// `stream` keyword
    Stream,

    /// `endstream` keyword
    EndStream,

    /// `obj` keyword
    Obj,

    /// `endobj` keyword
    EndObj,

    /// `R` keyword (indirect reference marker)
    R,

    /// `trailer` keyword
    Trailer,

    /// `xref` keyword
    Xref,

    /// `startxref` keyword
    StartXRef,

    /// Null object
    Null,

    /// Comment (`%` to end of line), raw bytes without the `%`
    Comment(Vec<u8>),

    /// End of input
    Eof,
}

impl Token {
    /// Short description used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Token::Boolean(_) => "boolean",
            Token::Integer(_) => "integer",
            Token::Real(_) => "real",
            Token::LiteralString(_) => "literal string",
            Token::HexString(_) => "hex string",
            Token::Name(_) => "name",
            Token::ArrayStart => "[",
            Token::ArrayEnd => "]",
            Token::DictStart => "<<",
            Token::DictEnd => ">>",
            Token::Stream => "stream",
            Token::EndStream => "endstream",
            Token::Obj => "obj",
            Token::EndObj => "endobj",
            Token::R => "R",
            Token::Trailer => "trailer",
            Token::Xref => "xref",
            Token::StartXRef => "startxref",
            Token::Null => "null",
            Token::Comment(_) => "comment",
            Token::Eof => "end of input",
        }
    }
}

/// Saved lexer position, restored with [`Lexer::restore_position`].
pub type SavedPosition = (u64, Option<u8>);

/// Tokenizer over a seekable byte source.
pub struct Lexer<R: Read + Seek> {
    reader: BufReader<R>,
    position: usize,
    peek_buffer: Option<u8>,
    token_buffer: Vec<Token>,
}

impl<R: Read + Seek> Lexer<R> {
    /// Create a new lexer from a seekable reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            position: 0,
            peek_buffer: None,
            token_buffer: Vec::new(),
        }
    }

    /// Get the next token, skipping comments.
    pub fn next_token(&mut self) -> ParseResult<Token> {
        loop {
            match self.next_token_keep_comments()? {
                Token::Comment(_) => continue,
                token => return Ok(token),
            }
        }
    }

    /// Get the next token, returning comments as tokens. Callers that need
    /// exact byte positions (header scanning) use this form.
    pub fn next_token_keep_comments(&mut self) -> ParseResult<Token> {
        if let Some(token) = self.token_buffer.pop() {
            return Ok(token);
        }

        self.skip_whitespace()?;

        let ch = match self.peek_char()? {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'%' => self.read_comment(),
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => self.read_angle_bracket(),
            b'>' => {
                self.consume_char()?;
                match self.peek_char()? {
                    Some(b'>') => {
                        self.consume_char()?;
                        Ok(Token::DictEnd)
                    }
                    Some(actual) => Err(ParseError::UnexpectedByte {
                        position: self.position,
                        expected: b'>',
                        actual,
                    }),
                    None => Err(ParseError::UnexpectedEof {
                        position: self.position,
                    }),
                }
            }
            b'[' => {
                self.consume_char()?;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.consume_char()?;
                Ok(Token::ArrayEnd)
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
            _ if ch.is_ascii_alphabetic() => self.read_keyword(),
            _ => Err(ParseError::SyntaxError {
                position: self.position,
                message: format!("Unexpected character: {:#04x}", ch),
            }),
        }
    }

    /// Peek at the next byte without consuming it.
    fn peek_char(&mut self) -> ParseResult<Option<u8>> {
        if let Some(ch) = self.peek_buffer {
            return Ok(Some(ch));
        }

        let mut buf = [0u8; 1];
        match self.reader.read_exact(&mut buf) {
            Ok(_) => {
                self.peek_buffer = Some(buf[0]);
                Ok(Some(buf[0]))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Consume the next byte.
    fn consume_char(&mut self) -> ParseResult<Option<u8>> {
        let ch = self.peek_char()?;
        if ch.is_some() {
            self.peek_buffer = None;
            self.position += 1;
        }
        Ok(ch)
    }

    /// Consume the next byte, failing on end of input.
    fn require_char(&mut self) -> ParseResult<u8> {
        self.consume_char()?.ok_or(ParseError::UnexpectedEof {
            position: self.position,
        })
    }

    /// Skip whitespace, returning the number of bytes skipped.
    pub fn skip_whitespace(&mut self) -> ParseResult<usize> {
        let mut count = 0;
        while let Some(ch) = self.peek_char()? {
            if is_whitespace(ch) {
                self.consume_char()?;
                count += 1;
            } else {
                break;
            }
        }
        Ok(count)
    }

    /// Read a comment (from % to end of line).
    fn read_comment(&mut self) -> ParseResult<Token> {
        self.consume_char()?; // consume '%'
        let mut comment = Vec::new();

        while let Some(ch) = self.peek_char()? {
            if ch == b'\n' || ch == b'\r' {
                break;
            }
            self.consume_char()?;
            comment.push(ch);
        }

        Ok(Token::Comment(comment))
    }

    /// Read a name object (e.g., /Type), decoding `#xx` hex escapes.
    fn read_name(&mut self) -> ParseResult<Token> {
        self.consume_char()?; // consume '/'
        let mut name = String::new();

        while let Some(ch) = self.peek_char()? {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.consume_char()?;

            if ch == b'#' {
                let hi = self.require_char()?;
                let lo = self.require_char()?;
                let value = hex_digit_value(hi)
                    .zip(hex_digit_value(lo))
                    .map(|(h, l)| (h << 4) | l)
                    .ok_or_else(|| ParseError::SyntaxError {
                        position: self.position,
                        message: "Invalid hex code in name".to_string(),
                    })?;
                name.push(value as char);
            } else {
                name.push(ch as char);
            }
        }

        Ok(Token::Name(name))
    }

    /// Read a literal string delimited by balanced parentheses.
    fn read_literal_string(&mut self) -> ParseResult<Token> {
        self.consume_char()?; // consume '('
        let mut string = Vec::new();
        let mut paren_depth = 1;

        while paren_depth > 0 {
            let ch = self.require_char()?;

            match ch {
                b'\\' => {
                    let escaped = self.require_char()?;
                    match escaped {
                        b'n' => string.push(b'\n'),
                        b'r' => string.push(b'\r'),
                        b't' => string.push(b'\t'),
                        b'b' => string.push(b'\x08'),
                        b'f' => string.push(b'\x0C'),
                        b'(' => string.push(b'('),
                        b')' => string.push(b')'),
                        b'\\' => string.push(b'\\'),
                        b'\r' => {
                            // Line continuation: backslash-EOL yields nothing
                            if self.peek_char()? == Some(b'\n') {
                                self.consume_char()?;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            // Octal escape, up to 3 digits, overflow
                            // truncated to the low 8 bits
                            let mut value = (escaped - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek_char()? {
                                    Some(next @ b'0'..=b'7') => {
                                        self.consume_char()?;
                                        value = value * 8 + (next - b'0') as u32;
                                    }
                                    _ => break,
                                }
                            }
                            string.push(value as u8);
                        }
                        other => string.push(other), // unknown escape: literal
                    }
                }
                b'(' => {
                    string.push(ch);
                    paren_depth += 1;
                }
                b')' => {
                    paren_depth -= 1;
                    if paren_depth > 0 {
                        string.push(ch);
                    }
                }
                _ => string.push(ch),
            }
        }

        Ok(Token::LiteralString(string))
    }

    /// Read `<<` or a hex string `<...>`.
    fn read_angle_bracket(&mut self) -> ParseResult<Token> {
        self.consume_char()?; // consume '<'

        if self.peek_char()? == Some(b'<') {
            self.consume_char()?;
            return Ok(Token::DictStart);
        }

        let mut nibbles = Vec::new();
        loop {
            let ch = self.require_char()?;
            if ch == b'>' {
                break;
            }
            if let Some(value) = hex_digit_value(ch) {
                nibbles.push(value);
            } else if !is_whitespace(ch) {
                return Err(ParseError::SyntaxError {
                    position: self.position,
                    message: format!("Invalid character in hex string: {:#04x}", ch),
                });
            }
        }

        // Odd trailing nibble is padded with 0
        if nibbles.len() % 2 != 0 {
            nibbles.push(0);
        }

        let bytes = nibbles
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair[1])
            .collect();

        Ok(Token::HexString(bytes))
    }

    /// Read a number (integer or real).
    fn read_number(&mut self) -> ParseResult<Token> {
        let mut number_str = String::new();
        let mut has_dot = false;

        if let Some(ch @ (b'+' | b'-')) = self.peek_char()? {
            self.consume_char()?;
            number_str.push(ch as char);
        }

        while let Some(ch) = self.peek_char()? {
            match ch {
                b'0'..=b'9' => {
                    self.consume_char()?;
                    number_str.push(ch as char);
                }
                b'.' if !has_dot => {
                    self.consume_char()?;
                    number_str.push(ch as char);
                    has_dot = true;
                }
                _ => break,
            }
        }

        if has_dot {
            let value = number_str
                .parse::<f64>()
                .map_err(|_| ParseError::SyntaxError {
                    position: self.position,
                    message: format!("Invalid real number: '{number_str}'"),
                })?;
            Ok(Token::Real(value))
        } else {
            let value = number_str
                .parse::<i64>()
                .map_err(|_| ParseError::SyntaxError {
                    position: self.position,
                    message: format!("Invalid integer: '{number_str}'"),
                })?;
            Ok(Token::Integer(value))
        }
    }

    /// Read a bare keyword.
    fn read_keyword(&mut self) -> ParseResult<Token> {
        let word = self.read_word()?;
        match word.as_str() {
            "true" => Ok(Token::Boolean(true)),
            "false" => Ok(Token::Boolean(false)),
            "null" => Ok(Token::Null),
            "R" => Ok(Token::R),
            "obj" => Ok(Token::Obj),
            "endobj" => Ok(Token::EndObj),
            "stream" => Ok(Token::Stream),
            "endstream" => Ok(Token::EndStream),
            "trailer" => Ok(Token::Trailer),
            "xref" => Ok(Token::Xref),
            "startxref" => Ok(Token::StartXRef),
            _ => Err(ParseError::SyntaxError {
                position: self.position,
                message: format!("Unknown keyword: {word}"),
            }),
        }
    }

    /// Read a word (sequence of non-whitespace, non-delimiter bytes).
    fn read_word(&mut self) -> ParseResult<String> {
        let mut word = String::new();

        while let Some(ch) = self.peek_char()? {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.consume_char()?;
            word.push(ch as char);
        }

        Ok(word)
    }

    /// Read exactly one end-of-line marker (CR, LF, or CRLF).
    pub fn read_newline(&mut self) -> ParseResult<()> {
        match self.peek_char()? {
            Some(b'\r') => {
                self.consume_char()?;
                if self.peek_char()? == Some(b'\n') {
                    self.consume_char()?;
                }
                Ok(())
            }
            Some(b'\n') => {
                self.consume_char()?;
                Ok(())
            }
            Some(actual) => Err(ParseError::UnexpectedByte {
                position: self.position,
                expected: b'\n',
                actual,
            }),
            None => Err(ParseError::UnexpectedEof {
                position: self.position,
            }),
        }
    }

    /// Read exactly n raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> ParseResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(n);
        if n > 0 {
            if let Some(ch) = self.peek_buffer.take() {
                bytes.push(ch);
            }
        }
        let remaining = n - bytes.len();
        let start = bytes.len();
        bytes.resize(n, 0);
        self.reader
            .read_exact(&mut bytes[start..start + remaining])
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    ParseError::UnexpectedEof {
                        position: self.position,
                    }
                } else {
                    ParseError::Io(e)
                }
            })?;
        self.position += n;
        Ok(bytes)
    }

    /// Current byte position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Seek the underlying reader to an absolute offset, discarding any
    /// buffered state.
    pub fn seek_to(&mut self, offset: u64) -> ParseResult<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.peek_buffer = None;
        self.token_buffer.clear();
        self.position = offset as usize;
        Ok(())
    }

    /// Total length of the underlying byte source. Position is preserved.
    pub fn stream_length(&mut self) -> ParseResult<u64> {
        let saved = self.save_position()?;
        let len = self.reader.seek(SeekFrom::End(0))?;
        self.restore_position(saved)?;
        Ok(len)
    }

    /// Push back a token to be returned by the next call to `next_token`.
    /// Tokens are returned in LIFO order.
    pub fn push_token(&mut self, token: Token) {
        self.token_buffer.push(token);
    }

    /// Peek the next token without consuming it.
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let token = self.next_token()?;
        self.push_token(token.clone());
        Ok(token)
    }

    /// Save the current position for later restoration. Every speculative
    /// probe must pair this with `restore_position` on all exit paths.
    pub fn save_position(&mut self) -> ParseResult<SavedPosition> {
        let pos = self.reader.stream_position()?;
        Ok((pos, self.peek_buffer))
    }

    /// Restore a previously saved position.
    pub fn restore_position(&mut self, saved: SavedPosition) -> ParseResult<()> {
        self.reader.seek(SeekFrom::Start(saved.0))?;
        self.peek_buffer = saved.1;
        self.position = saved.0 as usize;
        self.token_buffer.clear();
        Ok(())
    }

    /// Scan ahead for a keyword without consuming bytes. Returns the number
    /// of bytes before the keyword, or None if not found within `max_bytes`.
    pub fn find_keyword_ahead(
        &mut self,
        keyword: &str,
        max_bytes: usize,
    ) -> ParseResult<Option<usize>> {
        let saved = self.save_position()?;
        let keyword_bytes = keyword.as_bytes();
        let mut window: Vec<u8> = Vec::with_capacity(keyword_bytes.len());
        let mut bytes_read = 0usize;

        let result = loop {
            if bytes_read >= max_bytes {
                break None;
            }
            match self.consume_char()? {
                Some(ch) => {
                    bytes_read += 1;
                    window.push(ch);
                    if window.len() > keyword_bytes.len() {
                        window.remove(0);
                    }
                    if window == keyword_bytes {
                        break Some(bytes_read - keyword_bytes.len());
                    }
                }
                None => break None,
            }
        };

        self.restore_position(saved)?;
        Ok(result)
    }

    /// Expect a specific token, failing with `UnexpectedToken` otherwise.
    pub fn expect_token(&mut self, expected: Token) -> ParseResult<()> {
        let token = self.next_token()?;
        if token == expected {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: expected.kind().to_string(),
                found: token.kind().to_string(),
            })
        }
    }
}

/// Value of a hex digit, if `ch` is one.
pub(crate) fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}
