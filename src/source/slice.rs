//! In-memory token source
//!
//! Tokens borrow directly from the input slice; only text with entity
//! references is copied.

use super::tokenizer::{Scan, Tokenizer};
use super::{Token, TokenSource};
use crate::error::{Error, Result};

/// Tokenizes a complete byte slice
pub struct SliceSource<'a> {
    input: &'a [u8],
    pos: usize,
    tokenizer: Tokenizer,
}

impl<'a> SliceSource<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        SliceSource {
            input,
            pos: 0,
            tokenizer: Tokenizer::new(),
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl TokenSource for SliceSource<'_> {
    fn next_token(&mut self) -> Result<Option<Token<'_>>> {
        let input = self.input;
        loop {
            match self.tokenizer.scan(&input[self.pos..], true)? {
                Scan::End => return Ok(None),
                Scan::NeedMore => return Err(Error::syntax("truncated input", self.pos)),
                Scan::Skip(used) => self.pos += used,
                Scan::Token(span, used) => {
                    let start = self.pos;
                    self.pos += used;
                    return Ok(Some(span.resolve(&input[start..start + used])));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_slice_tokens() {
        let mut source = SliceSource::new(b"<a>x<b/></a>");
        assert_eq!(source.next_token().unwrap(), Some(Token::Open(b"a")));
        assert_eq!(
            source.next_token().unwrap(),
            Some(Token::Text(Cow::Borrowed(&b"x"[..])))
        );
        assert_eq!(source.next_token().unwrap(), Some(Token::Open(b"b")));
        assert_eq!(source.next_token().unwrap(), Some(Token::Close(None)));
        assert_eq!(source.next_token().unwrap(), Some(Token::Close(Some(&b"a"[..]))));
        assert_eq!(source.next_token().unwrap(), None);
        assert_eq!(source.next_token().unwrap(), None);
        assert_eq!(source.position(), 12);
    }

    #[test]
    fn test_slice_syntax_error_position() {
        let mut source = SliceSource::new(b"<a><!-- open");
        source.next_token().unwrap();
        match source.next_token() {
            Err(Error::Syntax { position, .. }) => assert_eq!(position, 3),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}
