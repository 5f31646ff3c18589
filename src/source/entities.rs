//! Entity decoding for text tokens and escaping for serialized output
//!
//! Predefined entities (&lt; &gt; &amp; &quot; &apos;) and numeric character
//! references are decoded; anything else is kept verbatim. Both directions
//! return `Cow` so clean input is never copied.

use memchr::memchr;
use std::borrow::Cow;

/// Decode entity references in text content
#[inline]
pub fn decode_text(input: &[u8]) -> Cow<'_, [u8]> {
    if memchr(b'&', input).is_none() {
        return Cow::Borrowed(input);
    }
    Cow::Owned(decode_entities(input))
}

fn decode_entities(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = memchr(b'&', rest) {
        result.extend_from_slice(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = memchr(b';', rest)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                let mut utf8 = [0u8; 4];
                result.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                rest = &rest[semi + 1..];
            }
            None => {
                // Unknown or unterminated: keep the ampersand
                result.push(b'&');
                rest = &rest[1..];
            }
        }
    }
    result.extend_from_slice(rest);
    result
}

/// Decode one entity body (without `&` and `;`)
fn decode_entity(entity: &[u8]) -> Option<char> {
    match entity {
        b"lt" => Some('<'),
        b"gt" => Some('>'),
        b"amp" => Some('&'),
        b"quot" => Some('"'),
        b"apos" => Some('\''),
        [b'#', b'x' | b'X', hex @ ..] => parse_codepoint(hex, 16),
        [b'#', dec @ ..] => parse_codepoint(dec, 10),
        _ => None,
    }
}

fn parse_codepoint(digits: &[u8], radix: u32) -> Option<char> {
    if digits.is_empty() {
        return None;
    }
    let s = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(s, radix).ok().and_then(char::from_u32)
}

/// Escape text for XML output
pub fn encode_text(input: &str) -> Cow<'_, str> {
    if !input.bytes().any(|b| matches!(b, b'<' | b'>' | b'&' | b'"' | b'\'')) {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_entities_borrows() {
        let result = decode_text(b"Hello, World!");
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_predefined_entities() {
        let result = decode_text(b"&lt;hello&gt; &amp; &quot;world&apos;");
        assert_eq!(result.as_ref(), b"<hello> & \"world'");
    }

    #[test]
    fn test_numeric_references() {
        assert_eq!(decode_text(b"&#65;&#x42;&#X43;").as_ref(), b"ABC");
        assert_eq!(
            std::str::from_utf8(decode_text(b"&#x1F600;").as_ref()).unwrap(),
            "\u{1F600}"
        );
    }

    #[test]
    fn test_unknown_entity_kept() {
        assert_eq!(decode_text(b"&nbsp;").as_ref(), b"&nbsp;");
        assert_eq!(decode_text(b"a & b").as_ref(), b"a & b");
        assert_eq!(decode_text(b"&#;").as_ref(), b"&#;");
    }

    #[test]
    fn test_encode_text() {
        assert_eq!(
            encode_text("<hello> & \"world\"").as_ref(),
            "&lt;hello&gt; &amp; &quot;world&quot;"
        );
        assert!(matches!(encode_text("plain"), Cow::Borrowed(_)));
    }
}
