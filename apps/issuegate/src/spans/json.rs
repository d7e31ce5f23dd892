//! JSON span mapper.
//!
//! A dedicated recursive-descent scanner that validates the document and
//! records, for every object with an `id` member, the byte offsets of its
//! `{` and `}`. Offsets are converted to line/column through a line index
//! at the end, so the scan itself never counts newlines.

use super::ElementSpan;
use crate::models::Position;
use std::fmt;

const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonError {
    pub position: Position,
    pub message: String,
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {}: {}",
            self.position.line, self.position.column, self.message
        )
    }
}

impl std::error::Error for JsonError {}

/// Byte offset -> 1-based line/column, columns counted in characters.
pub struct LineIndex<'a> {
    src: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(src: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(src.match_indices('\n').map(|(i, _)| i + 1));
        Self { src, starts }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.src.len());
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.starts[line];
        let col = self.src[line_start..offset].chars().count() + 1;
        Position::new(line as u32 + 1, col as u32)
    }
}

struct RawSpan {
    open: usize,
    close: usize,
    id: String,
}

/// What a parsed value contributes when it is the value of an `id` key.
enum Scalar {
    /// A JSON string.
    Text(String),
    /// Numbers and literals.
    Other,
    Composite,
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    spans: Vec<RawSpan>,
}

type ScanResult<T> = Result<T, (usize, String)>;

impl<'a> Scanner<'a> {
    fn fail<T>(&self, message: impl Into<String>) -> ScanResult<T> {
        Err((self.pos, message.into()))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> ScanResult<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            self.fail(format!("expected '{}'", b as char))
        }
    }

    fn value(&mut self) -> ScanResult<Scalar> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.object().map(|_| Scalar::Composite),
            Some(b'[') => self.array().map(|_| Scalar::Composite),
            Some(b'"') => self.string().map(Scalar::Text),
            Some(b't') => self.literal("true"),
            Some(b'f') => self.literal("false"),
            Some(b'n') => self.literal("null"),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(_) => self.fail("unexpected character"),
            None => self.fail("unexpected end of input"),
        }
    }

    fn enter(&mut self) -> ScanResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return self.fail("nesting too deep");
        }
        Ok(())
    }

    fn object(&mut self) -> ScanResult<()> {
        self.enter()?;
        let open = self.pos;
        self.pos += 1;
        let mut id: Option<String> = None;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(());
        }
        loop {
            self.skip_ws();
            if self.peek() != Some(b'"') {
                return self.fail("expected object key");
            }
            let key = self.string()?;
            self.skip_ws();
            self.expect(b':')?;
            let v = self.value()?;
            if key == "id" {
                // Last duplicate wins, as in common decoders.
                id = match v {
                    Scalar::Text(t) => Some(t),
                    Scalar::Other | Scalar::Composite => None,
                };
            }
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => break,
                _ => return self.fail("expected ',' or '}'"),
            }
        }
        let close = self.pos;
        self.pos += 1;
        self.depth -= 1;
        if let Some(id) = id {
            self.spans.push(RawSpan { open, close, id });
        }
        Ok(())
    }

    fn array(&mut self) -> ScanResult<()> {
        self.enter()?;
        self.pos += 1;
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(());
        }
        loop {
            self.value()?;
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => break,
                _ => return self.fail("expected ',' or ']'"),
            }
        }
        self.pos += 1;
        self.depth -= 1;
        Ok(())
    }

    fn literal(&mut self, word: &'static str) -> ScanResult<Scalar> {
        if self.bytes[self.pos..].starts_with(word.as_bytes()) {
            self.pos += word.len();
            Ok(Scalar::Other)
        } else {
            self.fail("invalid literal")
        }
    }

    fn digits(&mut self) -> usize {
        let begin = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        self.pos - begin
    }

    fn number(&mut self) -> ScanResult<Scalar> {
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => {
                self.digits();
            }
            _ => return self.fail("invalid number"),
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            if self.digits() == 0 {
                return self.fail("invalid number fraction");
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.digits() == 0 {
                return self.fail("invalid number exponent");
            }
        }
        Ok(Scalar::Other)
    }

    fn hex4(&mut self) -> ScanResult<u32> {
        let end = self.pos + 4;
        let code = self
            .src
            .get(self.pos..end)
            .and_then(|h| u32::from_str_radix(h, 16).ok());
        match code {
            Some(c) => {
                self.pos = end;
                Ok(c)
            }
            None => self.fail("invalid unicode escape"),
        }
    }

    fn string(&mut self) -> ScanResult<String> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            let run = self.pos;
            while let Some(b) = self.peek() {
                if b == b'"' || b == b'\\' || b < 0x20 {
                    break;
                }
                self.pos += 1;
            }
            out.push_str(&self.src[run..self.pos]);
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let esc = match self.peek() {
                        Some(e) => e,
                        None => return self.fail("unterminated string"),
                    };
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            let hi = self.hex4()?;
                            let code = if (0xD800..0xDC00).contains(&hi)
                                && self.bytes[self.pos..].starts_with(b"\\u")
                            {
                                self.pos += 2;
                                let lo = self.hex4()?;
                                0x10000 + ((hi - 0xD800) << 10) + (lo.wrapping_sub(0xDC00) & 0x3FF)
                            } else {
                                hi
                            };
                            out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                        }
                        _ => {
                            self.pos -= 1;
                            return self.fail("invalid escape");
                        }
                    }
                }
                Some(_) => return self.fail("control character in string"),
                None => return self.fail("unterminated string"),
            }
        }
    }
}

pub fn map_spans(src: &str) -> Result<Vec<ElementSpan>, JsonError> {
    let index = LineIndex::new(src);
    let mut sc = Scanner {
        src,
        bytes: src.as_bytes(),
        pos: if src.starts_with('\u{feff}') { 3 } else { 0 },
        depth: 0,
        spans: Vec::new(),
    };
    let scanned = sc.value().and_then(|_| {
        sc.skip_ws();
        if sc.pos < sc.bytes.len() {
            sc.fail("trailing characters after document")
        } else {
            Ok(())
        }
    });
    if let Err((offset, message)) = scanned {
        return Err(JsonError {
            position: index.position(offset),
            message,
        });
    }
    let mut raw = sc.spans;
    raw.sort_by_key(|s| s.open);
    Ok(raw
        .into_iter()
        .map(|s| ElementSpan::new(index.position(s.open), index.position(s.close), s.id))
        .collect())
}
