//! String escaping shared by the grammar loader, the matcher display
//! round-trip, and DOT label output.

/// Escapes control characters, quotes, and backslashes so a string can be
/// embedded in grammar syntax or a DOT label and read back unchanged.
pub fn escape_string(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\x07' => result.push_str("\\a"),
            '\x08' => result.push_str("\\b"),
            '\x1b' => result.push_str("\\e"),
            '\x0c' => result.push_str("\\f"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\x0b' => result.push_str("\\v"),
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            other => result.push(other),
        }
    }
    result
}

/// Decodes the body of an escape sequence (the text after the backslash).
///
/// `x41`-style bodies are hexadecimal character codes; single-character
/// bodies use the conventional short names. Returns `None` for anything
/// else so the caller can report the offending sequence with a position.
pub fn decode_escape(body: &str) -> Option<char> {
    if let Some(hex) = body.strip_prefix('x') {
        if hex.len() != 2 {
            return None;
        }
        let code = u32::from_str_radix(hex, 16).ok()?;
        return char::from_u32(code);
    }

    let mut chars = body.chars();
    let (first, rest) = (chars.next()?, chars.next());
    if rest.is_some() {
        return None;
    }
    match first {
        'a' => Some('\x07'),
        'b' => Some('\x08'),
        'e' => Some('\x1b'),
        'f' => Some('\x0c'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\x0b'),
        '\\' => Some('\\'),
        '\'' => Some('\''),
        '"' => Some('"'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trips_through_decode() {
        for original in ['\n', '\t', '\\', '"', '\x1b'] {
            let escaped = escape_string(&original.to_string());
            let body = escaped.strip_prefix('\\').expect("escaped form");
            assert_eq!(decode_escape(body), Some(original));
        }
    }

    #[test]
    fn hex_escapes_decode_to_the_coded_character() {
        assert_eq!(decode_escape("x41"), Some('A'));
        assert_eq!(decode_escape("x0a"), Some('\n'));
        assert_eq!(decode_escape("xzz"), None);
        assert_eq!(decode_escape("x4"), None);
    }

    #[test]
    fn unknown_escape_bodies_are_rejected() {
        assert_eq!(decode_escape("q"), None);
        assert_eq!(decode_escape("nn"), None);
        assert_eq!(decode_escape(""), None);
    }

    #[test]
    fn plain_text_is_left_untouched() {
        assert_eq!(escape_string("hello world"), "hello world");
    }
}
