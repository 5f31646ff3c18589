//! Scripted token source
//!
//! Replays an owned token list. Useful for driving the buffer with token
//! sequences no XML text produces, such as mismatched or missing closes.

use super::{Token, TokenSource};
use crate::error::Result;
use std::borrow::Cow;

/// Owned form of a [`Token`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptToken {
    Open(String),
    Text(String),
    Close(Option<String>),
}

impl ScriptToken {
    pub fn open(name: &str) -> Self {
        ScriptToken::Open(name.to_string())
    }

    pub fn text(content: &str) -> Self {
        ScriptToken::Text(content.to_string())
    }

    /// Anonymous close of the innermost element
    pub fn close() -> Self {
        ScriptToken::Close(None)
    }

    pub fn close_named(name: &str) -> Self {
        ScriptToken::Close(Some(name.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptSource {
    tokens: Vec<ScriptToken>,
    pos: usize,
}

impl ScriptSource {
    pub fn new(tokens: Vec<ScriptToken>) -> Self {
        ScriptSource { tokens, pos: 0 }
    }

    /// Tokens not yet handed out
    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.pos
    }
}

impl FromIterator<ScriptToken> for ScriptSource {
    fn from_iter<I: IntoIterator<Item = ScriptToken>>(iter: I) -> Self {
        ScriptSource::new(iter.into_iter().collect())
    }
}

impl TokenSource for ScriptSource {
    fn next_token(&mut self) -> Result<Option<Token<'_>>> {
        let Some(token) = self.tokens.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        Ok(Some(match token {
            ScriptToken::Open(name) => Token::Open(name.as_bytes()),
            ScriptToken::Text(content) => Token::Text(Cow::Borrowed(content.as_bytes())),
            ScriptToken::Close(name) => Token::Close(name.as_deref().map(str::as_bytes)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_then_exhausts() {
        let mut source: ScriptSource = [ScriptToken::open("a"), ScriptToken::text("x"), ScriptToken::close()]
            .into_iter()
            .collect();
        assert_eq!(source.next_token().unwrap(), Some(Token::Open(b"a")));
        assert_eq!(source.remaining(), 2);
        source.next_token().unwrap();
        assert_eq!(source.next_token().unwrap(), Some(Token::Close(None)));
        assert_eq!(source.next_token().unwrap(), None);
        assert_eq!(source.next_token().unwrap(), None);
    }
}
