//! Streaming token source over `io::Read`
//!
//! Keeps a window of unconsumed bytes. When the tokenizer reports that the
//! window ends inside a construct, the window is compacted, grown if it is
//! already full, and refilled with one more read.

use super::tokenizer::{Scan, Tokenizer};
use super::{Token, TokenSource};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::Result;
use std::io::{ErrorKind, Read};
use tracing::trace;

pub struct ReaderSource<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    pos: usize,
    end: usize,
    eof: bool,
    chunk: usize,
    tokenizer: Tokenizer,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    /// Create a source reading `chunk` bytes at a time
    pub fn with_chunk_size(reader: R, chunk: usize) -> Self {
        let chunk = chunk.max(1);
        ReaderSource {
            reader,
            buffer: vec![0u8; chunk],
            pos: 0,
            end: 0,
            eof: false,
            chunk,
            tokenizer: Tokenizer::new(),
        }
    }

    /// Current window capacity
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn fill(&mut self) -> Result<()> {
        if self.eof {
            return Ok(());
        }
        // Compact: move the unconsumed tail to the front
        if self.pos > 0 {
            self.buffer.copy_within(self.pos..self.end, 0);
            self.end -= self.pos;
            self.pos = 0;
        }
        if self.end == self.buffer.len() {
            let grown = self.buffer.len() + self.chunk;
            self.buffer.resize(grown, 0);
        }
        loop {
            match self.reader.read(&mut self.buffer[self.end..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    trace!(bytes = n, window = self.end + n, "refilled reader window");
                    self.end += n;
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<R: Read> TokenSource for ReaderSource<R> {
    fn next_token(&mut self) -> Result<Option<Token<'_>>> {
        loop {
            let scan = self
                .tokenizer
                .scan(&self.buffer[self.pos..self.end], self.eof)?;
            match scan {
                Scan::End => return Ok(None),
                Scan::NeedMore => self.fill()?,
                Scan::Skip(used) => self.pos += used,
                Scan::Token(span, used) => {
                    let start = self.pos;
                    self.pos += used;
                    return Ok(Some(span.resolve(&self.buffer[start..start + used])));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Cursor;

    fn collect<R: Read>(source: &mut ReaderSource<R>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(token) = source.next_token().unwrap() {
            out.push(match token {
                Token::Open(n) => format!("<{}>", String::from_utf8_lossy(n)),
                Token::Close(_) => "</>".to_string(),
                Token::Text(t) => String::from_utf8_lossy(&t).into_owned(),
            });
        }
        out
    }

    #[test]
    fn test_tiny_chunks_match_slice() {
        let xml = b"<?xml version=\"1.0\"?><lib><book id=\"1\">A &amp; B</book><!-- x --><book/></lib>";
        let mut source = ReaderSource::with_chunk_size(Cursor::new(xml.to_vec()), 3);
        assert_eq!(
            collect(&mut source),
            vec!["<lib>", "<book>", "A & B", "</>", "<book>", "</>", "</>"]
        );
        assert!(source.next_token().unwrap().is_none());
    }

    #[test]
    fn test_window_grows_for_long_text() {
        let mut xml = b"<a>".to_vec();
        xml.extend(std::iter::repeat_n(b'x', 100));
        xml.extend_from_slice(b"</a>");
        let mut source = ReaderSource::with_chunk_size(Cursor::new(xml), 8);
        let tokens = collect(&mut source);
        assert_eq!(tokens[1].len(), 100);
        assert!(source.capacity() > 8);
    }

    #[test]
    fn test_truncated_input_is_syntax_error() {
        let mut source = ReaderSource::with_chunk_size(Cursor::new(b"<a><b".to_vec()), 2);
        assert!(source.next_token().unwrap().is_some());
        assert!(matches!(source.next_token(), Err(Error::Syntax { .. })));
    }
}
