//! Incremental XML tokenizer
//!
//! Scans one construct at a time from the front of a window and reports it
//! as byte ranges into that window rather than borrowed slices, so a caller
//! that owns a refillable buffer can drop the borrow, refill and retry.
//!
//! The tokenizer is lenient. Comments, processing instructions, the XML
//! declaration and DOCTYPE are skipped. CDATA becomes text. Attributes are
//! scanned over but not reported. Whitespace-only text outside the document
//! element is dropped.

use super::entities::decode_text;
use super::scanner::{is_blank, Scanner};
use super::Token;
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::ops::Range;

/// A complete construct located in the window
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Span {
    Open(Range<usize>),
    Close(Range<usize>),
    /// Synthetic close following a self-closing tag
    EmptyClose,
    Text(Range<usize>),
    CData(Range<usize>),
}

impl Span {
    /// Turn the span into a token borrowing from the window it was scanned in
    pub fn resolve(self, window: &[u8]) -> Token<'_> {
        match self {
            Span::Open(name) => Token::Open(&window[name]),
            Span::Close(name) => Token::Close(Some(&window[name])),
            Span::EmptyClose => Token::Close(None),
            Span::Text(r) => Token::Text(decode_text(&window[r])),
            Span::CData(r) => Token::Text(Cow::Borrowed(&window[r])),
        }
    }
}

/// Outcome of one scan step
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Scan {
    /// A construct and the number of window bytes it used
    Token(Span, usize),
    /// Bytes of ignorable markup to drop
    Skip(usize),
    /// The window ends inside a construct
    NeedMore,
    /// Input exhausted
    End,
}

const COMMENT: &[u8] = b"<!--";
const CDATA: &[u8] = b"<![CDATA[";
const PI: &[u8] = b"<?";
const END_TAG: &[u8] = b"</";

#[derive(Debug, Default)]
pub(crate) struct Tokenizer {
    /// Bytes consumed before the current window
    offset: usize,
    /// Open elements, for dropping whitespace between top-level constructs
    depth: usize,
    pending_close: bool,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute input position of the current window start
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Scan the construct at the front of `window`. `eof` tells whether
    /// more bytes can ever follow the window.
    pub fn scan(&mut self, window: &[u8], eof: bool) -> Result<Scan> {
        if self.pending_close {
            self.pending_close = false;
            return Ok(Scan::Token(Span::EmptyClose, 0));
        }
        let result = self.scan_construct(window, eof)?;
        match &result {
            Scan::Token(span, used) => {
                match span {
                    Span::Open(_) if !self.pending_close => self.depth += 1,
                    Span::Close(_) => self.depth = self.depth.saturating_sub(1),
                    _ => {}
                }
                self.offset += used;
            }
            Scan::Skip(used) => self.offset += used,
            Scan::NeedMore | Scan::End => {}
        }
        Ok(result)
    }

    fn scan_construct(&mut self, window: &[u8], eof: bool) -> Result<Scan> {
        if window.is_empty() {
            return Ok(if eof { Scan::End } else { Scan::NeedMore });
        }
        if window[0] != b'<' {
            return Ok(self.scan_text(window, eof));
        }
        if !eof && is_ambiguous_prefix(window) {
            return Ok(Scan::NeedMore);
        }

        let scanner = Scanner::new(window);
        if scanner.starts_with(COMMENT) {
            self.skip_until(window, COMMENT.len(), b"-->", eof, "unterminated comment")
        } else if scanner.starts_with(CDATA) {
            let body = Scanner::at(window, CDATA.len());
            match body.find_seq(b"]]>") {
                Some(end) => Ok(Scan::Token(Span::CData(CDATA.len()..end), end + 3)),
                None => self.incomplete(eof, "unterminated CDATA section"),
            }
        } else if scanner.starts_with(PI) {
            self.skip_until(window, PI.len(), b"?>", eof, "unterminated processing instruction")
        } else if scanner.starts_with(b"<!") {
            match scanner.find_decl_end() {
                Some(end) => Ok(Scan::Skip(end + 1)),
                None => self.incomplete(eof, "unterminated declaration"),
            }
        } else if scanner.starts_with(END_TAG) {
            self.scan_end_tag(window, eof)
        } else {
            self.scan_start_tag(window, eof)
        }
    }

    fn scan_text(&self, window: &[u8], eof: bool) -> Scan {
        let end = match Scanner::new(window).find_byte(b'<') {
            Some(end) => end,
            None if eof => window.len(),
            None => return Scan::NeedMore,
        };
        if self.depth == 0 && is_blank(&window[..end]) {
            Scan::Skip(end)
        } else {
            Scan::Token(Span::Text(0..end), end)
        }
    }

    fn scan_start_tag(&mut self, window: &[u8], eof: bool) -> Result<Scan> {
        let Some(end) = Scanner::new(window).find_tag_end_quoted() else {
            return self.incomplete(eof, "unterminated start tag");
        };
        let mut scanner = Scanner::at(window, 1);
        let Some(name) = scanner.read_name() else {
            return Err(Error::syntax("invalid element name", self.offset + 1));
        };
        if window[end - 1] == b'/' && end > name.end {
            self.pending_close = true;
        }
        Ok(Scan::Token(Span::Open(name), end + 1))
    }

    fn scan_end_tag(&self, window: &[u8], eof: bool) -> Result<Scan> {
        let scanner = Scanner::at(window, END_TAG.len());
        let Some(end) = scanner.find_byte(b'>') else {
            return self.incomplete(eof, "unterminated end tag");
        };
        let mut scanner = Scanner::at(&window[..end], END_TAG.len());
        let Some(name) = scanner.read_name() else {
            return Err(Error::syntax("invalid end tag name", self.offset + END_TAG.len()));
        };
        scanner.skip_whitespace();
        if scanner.position() != end {
            return Err(Error::syntax("unexpected content in end tag", self.offset + scanner.position()));
        }
        Ok(Scan::Token(Span::Close(name), end + 1))
    }

    fn skip_until(&self, window: &[u8], from: usize, terminator: &[u8], eof: bool, what: &'static str) -> Result<Scan> {
        match Scanner::at(window, from).find_seq(terminator) {
            Some(end) => Ok(Scan::Skip(end + terminator.len())),
            None => self.incomplete(eof, what),
        }
    }

    fn incomplete(&self, eof: bool, what: &'static str) -> Result<Scan> {
        if eof {
            Err(Error::syntax(what, self.offset))
        } else {
            Ok(Scan::NeedMore)
        }
    }
}

/// The window is too short to tell which kind of markup starts here
fn is_ambiguous_prefix(window: &[u8]) -> bool {
    [COMMENT, CDATA, PI, END_TAG]
        .iter()
        .any(|p| window.len() < p.len() && p.starts_with(window))
}
