//! Minimal streaming XML tokenizer with source positions.
//!
//! The reader walks the text once and yields start/end tag events carrying
//! the 1-based line/column of the tag's first (`<`) and last (`>`)
//! character. It enforces the well-formedness rules reconciliation depends
//! on: balanced and matching tags, a single root element, quoted and unique
//! attributes, and known entity references. DTDs are skipped, never
//! interpreted.
//!
//! [`parse_document`] builds a small element tree on top of the same events
//! for reading validator reports.

use crate::models::Position;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlError {
    pub position: Position,
    pub message: String,
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {}: {}",
            self.position.line, self.position.column, self.message
        )
    }
}

impl std::error::Error for XmlError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Opening tag. `empty` is true for `<x/>`, which yields no `End`.
    Start {
        name: String,
        attributes: Vec<Attribute>,
        start: Position,
        end: Position,
        empty: bool,
    },
    End {
        name: String,
        start: Position,
        end: Position,
    },
    Text(String),
}

/// Strip a namespace prefix: `f:issue` -> `issue`.
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

pub struct Reader<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    open: Vec<String>,
    seen_root: bool,
}

impl<'a> Reader<'a> {
    pub fn new(src: &'a str) -> Self {
        // A leading BOM is not part of the document.
        let skip = if src.starts_with('\u{feff}') { 3 } else { 0 };
        Self {
            src,
            bytes: src.as_bytes(),
            pos: skip,
            line: 1,
            col: 1,
            open: Vec::new(),
            seen_root: false,
        }
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn err<T>(&self, message: impl Into<String>) -> Result<T, XmlError> {
        Err(XmlError {
            position: self.here(),
            message: message.into(),
        })
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, pat: &str) -> bool {
        self.bytes[self.pos..].starts_with(pat.as_bytes())
    }

    /// Advance one byte, keeping line/column in characters.
    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if b & 0xC0 != 0x80 {
            // Count only the first byte of each UTF-8 sequence.
            self.col += 1;
        }
        Some(b)
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    /// Position of the byte just consumed.
    fn last_position(&self) -> Position {
        // Columns are only read back after `>` which is never a newline.
        Position::new(self.line, self.col.saturating_sub(1).max(1))
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.bump();
        }
    }

    /// Consume up to and including `terminator`.
    fn skip_past(&mut self, terminator: &str, what: &str) -> Result<usize, XmlError> {
        let begin = self.pos;
        match self.src[self.pos..].find(terminator) {
            Some(off) => {
                self.bump_n(off + terminator.len());
                Ok(begin + off)
            }
            None => self.err(format!("unterminated {}", what)),
        }
    }

    fn read_name(&mut self) -> Result<String, XmlError> {
        let begin = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'/' | b'>' | b'=' | b'<' | b'"' | b'\'') {
                break;
            }
            self.bump();
        }
        if self.pos == begin {
            return self.err("expected a name");
        }
        Ok(self.src[begin..self.pos].to_string())
    }

    /// Next event, or `None` once the document is complete.
    pub fn next_event(&mut self) -> Result<Option<Event>, XmlError> {
        loop {
            if self.pos >= self.bytes.len() {
                if let Some(name) = self.open.last() {
                    return self.err(format!("unclosed element <{}>", name));
                }
                if !self.seen_root {
                    return self.err("no root element");
                }
                return Ok(None);
            }
            if self.peek() != Some(b'<') {
                let text = self.read_text()?;
                if self.open.is_empty() {
                    if !text.trim().is_empty() {
                        return self.err("text outside of the root element");
                    }
                    continue;
                }
                return Ok(Some(Event::Text(text)));
            }
            if self.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
                continue;
            }
            if self.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
                continue;
            }
            if self.starts_with("<![CDATA[") {
                if self.open.is_empty() {
                    return self.err("CDATA outside of the root element");
                }
                self.bump_n("<![CDATA[".len());
                let begin = self.pos;
                let end = self.skip_past("]]>", "CDATA section")?;
                return Ok(Some(Event::Text(self.src[begin..end].to_string())));
            }
            if self.starts_with("<!DOCTYPE") {
                self.skip_doctype()?;
                continue;
            }
            if self.starts_with("</") {
                return self.read_end_tag().map(Some);
            }
            return self.read_start_tag().map(Some);
        }
    }

    fn skip_doctype(&mut self) -> Result<(), XmlError> {
        let mut depth = 0usize;
        while let Some(b) = self.bump() {
            match b {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'>' if depth == 0 => return Ok(()),
                _ => {}
            }
        }
        self.err("unterminated DOCTYPE")
    }

    fn read_start_tag(&mut self) -> Result<Event, XmlError> {
        let start = self.here();
        if self.open.is_empty() && self.seen_root {
            return self.err("more than one root element");
        }
        self.bump(); // '<'
        let name = self.read_name()?;
        let mut attributes: Vec<Attribute> = Vec::new();
        loop {
            let had_ws = matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n'));
            self.skip_ws();
            match self.peek() {
                None => return self.err(format!("unterminated tag <{}>", name)),
                Some(b'>') => {
                    self.bump();
                    let end = self.last_position();
                    self.seen_root = true;
                    self.open.push(name.clone());
                    return Ok(Event::Start {
                        name,
                        attributes,
                        start,
                        end,
                        empty: false,
                    });
                }
                Some(b'/') => {
                    self.bump();
                    if self.peek() != Some(b'>') {
                        return self.err("expected '>' after '/'");
                    }
                    self.bump();
                    let end = self.last_position();
                    self.seen_root = true;
                    return Ok(Event::Start {
                        name,
                        attributes,
                        start,
                        end,
                        empty: true,
                    });
                }
                Some(_) => {
                    if !had_ws {
                        return self.err("expected whitespace before attribute");
                    }
                    let attr = self.read_attribute()?;
                    if attributes.iter().any(|a| a.name == attr.name) {
                        return self.err(format!("duplicate attribute '{}'", attr.name));
                    }
                    attributes.push(attr);
                }
            }
        }
    }

    fn read_attribute(&mut self) -> Result<Attribute, XmlError> {
        let name = self.read_name()?;
        self.skip_ws();
        if self.peek() != Some(b'=') {
            return self.err(format!("attribute '{}' has no value", name));
        }
        self.bump();
        self.skip_ws();
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return self.err(format!("attribute '{}' value must be quoted", name)),
        };
        self.bump();
        let begin = self.pos;
        loop {
            match self.peek() {
                None => return self.err(format!("unterminated value of attribute '{}'", name)),
                Some(b'<') => return self.err("'<' not allowed in attribute value"),
                Some(b) if b == quote => break,
                Some(_) => {
                    self.bump();
                }
            }
        }
        let raw = &self.src[begin..self.pos];
        self.bump(); // closing quote
        let value = decode_entities(raw).map_err(|m| XmlError {
            position: self.here(),
            message: m,
        })?;
        Ok(Attribute { name, value })
    }

    fn read_end_tag(&mut self) -> Result<Event, XmlError> {
        let start = self.here();
        self.bump_n(2); // '</'
        let name = self.read_name()?;
        self.skip_ws();
        if self.peek() != Some(b'>') {
            return self.err(format!("malformed closing tag </{}>", name));
        }
        self.bump();
        let end = self.last_position();
        match self.open.pop() {
            Some(open) if open == name => Ok(Event::End { name, start, end }),
            Some(open) => Err(XmlError {
                position: start,
                message: format!("closing tag </{}> does not match <{}>", name, open),
            }),
            None => Err(XmlError {
                position: start,
                message: format!("unexpected closing tag </{}>", name),
            }),
        }
    }

    fn read_text(&mut self) -> Result<String, XmlError> {
        let begin = self.pos;
        let at = self.here();
        while let Some(b) = self.peek() {
            if b == b'<' {
                break;
            }
            self.bump();
        }
        decode_entities(&self.src[begin..self.pos]).map_err(|message| XmlError {
            position: at,
            message,
        })
    }
}

/// Replace the predefined and numeric entity references.
fn decode_entities(raw: &str) -> Result<String, String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| "unterminated entity reference".to_string())?;
        let entity = &after[..semi];
        let ch = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| format!("unknown entity '&{};'", entity))?
            }
        };
        out.push(ch);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Element>,
    pub text: String,
    pub start: Position,
}

impl Element {
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Direct children with the given local name.
    pub fn children_named<'s>(&'s self, name: &'s str) -> impl Iterator<Item = &'s Element> + 's {
        self.children.iter().filter(move |c| c.local_name() == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.local_name() == name)
    }

    /// First descendant (depth-first, document order) with the local name.
    pub fn find_descendant(&self, name: &str) -> Option<&Element> {
        for c in &self.children {
            if c.local_name() == name {
                return Some(c);
            }
            if let Some(found) = c.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants with the local name, in document order.
    pub fn descendants_named<'s>(&'s self, name: &str, out: &mut Vec<&'s Element>) {
        for c in &self.children {
            if c.local_name() == name {
                out.push(c);
            }
            c.descendants_named(name, out);
        }
    }

    /// `value` attribute of the first child named `name`, the FHIR
    /// primitive encoding.
    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.attr("value"))
    }
}

/// Parse a whole document into its root element.
pub fn parse_document(src: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::new(src);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    while let Some(ev) = reader.next_event()? {
        match ev {
            Event::Start {
                name,
                attributes,
                start,
                empty,
                ..
            } => {
                let el = Element {
                    name,
                    attributes,
                    children: Vec::new(),
                    text: String::new(),
                    start,
                };
                if empty {
                    attach(&mut stack, &mut root, el);
                } else {
                    stack.push(el);
                }
            }
            Event::End { .. } => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, el);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t);
                }
            }
        }
    }
    root.ok_or_else(|| XmlError {
        position: Position::new(1, 1),
        message: "no root element".into(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => *root = Some(el),
    }
}
