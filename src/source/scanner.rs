//! Byte scanning over a token window using memchr
//!
//! The scanner only ever looks at the bytes it was given; callers holding a
//! partial window get `None` back and decide whether to refill.

use memchr::{memchr, memmem};

/// Cursor over one window of input
pub(crate) struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    #[inline]
    pub fn new(input: &'a [u8]) -> Self {
        Scanner { input, pos: 0 }
    }

    #[inline]
    pub fn at(input: &'a [u8], pos: usize) -> Self {
        Scanner { input, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.input[self.pos..].starts_with(needle)
    }

    /// Absolute position of the next `byte`
    #[inline]
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr(byte, &self.input[self.pos..]).map(|i| self.pos + i)
    }

    /// Absolute position of the next occurrence of `needle`
    #[inline]
    pub fn find_seq(&self, needle: &[u8]) -> Option<usize> {
        memmem::find(&self.input[self.pos..], needle).map(|i| self.pos + i)
    }

    /// Position of the `>` closing a tag, skipping any inside quotes
    pub fn find_tag_end_quoted(&self) -> Option<usize> {
        let mut quote = None;
        for (i, &b) in self.input[self.pos..].iter().enumerate() {
            match (quote, b) {
                (None, b'"' | b'\'') => quote = Some(b),
                (Some(q), _) if q == b => quote = None,
                (None, b'>') => return Some(self.pos + i),
                _ => {}
            }
        }
        None
    }

    /// Position of the `>` closing a declaration, skipping a bracketed
    /// internal subset and quoted literals
    pub fn find_decl_end(&self) -> Option<usize> {
        let mut depth = 0usize;
        let mut quote = None;
        for (i, &b) in self.input[self.pos..].iter().enumerate() {
            match (quote, b) {
                (Some(q), _) if q == b => quote = None,
                (Some(_), _) => {}
                (None, b'"' | b'\'') => quote = Some(b),
                (None, b'[') => depth += 1,
                (None, b']') => depth = depth.saturating_sub(1),
                (None, b'>') if depth == 0 => return Some(self.pos + i),
                _ => {}
            }
        }
        None
    }

    /// Read an XML name, returning its absolute range
    pub fn read_name(&mut self) -> Option<std::ops::Range<usize>> {
        let start = self.pos;
        if !self.input.get(start).copied().is_some_and(is_name_start_char) {
            return None;
        }
        self.pos += 1;
        while self.input.get(self.pos).copied().is_some_and(is_name_char) {
            self.pos += 1;
        }
        Some(start..self.pos)
    }

    #[inline]
    pub fn skip_whitespace(&mut self) {
        while matches!(self.input.get(self.pos), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }
}

/// ASCII letters, underscore, colon and any non-ASCII byte
#[inline]
fn is_name_start_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_' | b':') || b >= 0x80
}

#[inline]
fn is_name_char(b: u8) -> bool {
    is_name_start_char(b) || matches!(b, b'0'..=b'9' | b'-' | b'.')
}

/// True if the bytes are only XML whitespace
#[inline]
pub(crate) fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_tag_end_quoted() {
        let scanner = Scanner::new(b"<a attr=\">test\">content");
        assert_eq!(scanner.find_tag_end_quoted(), Some(15));
    }

    #[test]
    fn test_find_decl_end_skips_subset() {
        let scanner = Scanner::new(b"<!DOCTYPE a [<!ENTITY x \"y>\">]>rest");
        assert_eq!(scanner.find_decl_end(), Some(30));
    }

    #[test]
    fn test_read_name() {
        let mut scanner = Scanner::at(b"<element-name>", 1);
        assert_eq!(scanner.read_name(), Some(1..13));
        assert_eq!(scanner.position(), 13);
        assert_eq!(Scanner::new(b"1abc").read_name(), None);
    }

    #[test]
    fn test_find_seq() {
        let scanner = Scanner::new(b"<!-- a -- b -->x");
        assert_eq!(scanner.find_seq(b"-->"), Some(12));
        assert!(is_blank(b" \n\t"));
        assert!(!is_blank(b" x "));
    }
}
