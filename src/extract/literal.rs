//! Decoding and encoding of quoted string literal bodies.

/// Decodes the body of a quoted literal into the string it denotes.
///
/// Unknown escapes decode to the escaped character itself, and malformed
/// `\x` / `\u` sequences are kept verbatim.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.peek().is_some_and(char::is_ascii_digit) => out.push('\0'),
            'x' => {
                let hex: String = chars.clone().take(2).collect();
                match decode_hex(&hex, 2) {
                    Some(decoded) => {
                        out.push(decoded);
                        chars.nth(1);
                    }
                    None => out.push_str("\\x"),
                }
            }
            'u' => {
                let rest: String = chars.clone().collect();
                match decode_unicode(&rest) {
                    Some((decoded, consumed)) => {
                        out.push(decoded);
                        for _ in 0..consumed {
                            chars.next();
                        }
                    }
                    None => out.push_str("\\u"),
                }
            }
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Encodes `value` as a literal body delimited by `quote`.
///
/// Backslashes are escaped first, then the delimiting quote, so an already
/// escaped sequence is never escaped twice.
pub fn escape(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn decode_hex(hex: &str, len: usize) -> Option<char> {
    if hex.len() != len || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

/// Decodes the text following `\u`; returns the char and how many chars it used.
fn decode_unicode(rest: &str) -> Option<(char, usize)> {
    if let Some(braced) = rest.strip_prefix('{') {
        let close = braced.find('}')?;
        let digits = &braced[..close];
        if digits.is_empty() || digits.len() > 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let value = u32::from_str_radix(digits, 16).ok()?;
        return char::from_u32(value).map(|ch| (ch, close + 2));
    }

    let head: String = rest.chars().take(4).collect();
    if head.len() != 4 || !head.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let high = u32::from_str_radix(&head, 16).ok()?;
    if (0xD800..0xDC00).contains(&high) {
        let tail: String = rest.chars().skip(4).take(6).collect();
        let low = tail
            .strip_prefix("\\u")
            .filter(|digits| digits.len() == 4 && digits.chars().all(|c| c.is_ascii_hexdigit()))
            .and_then(|digits| u32::from_str_radix(digits, 16).ok())
            .filter(|low| (0xDC00..0xE000).contains(low))?;
        let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        return char::from_u32(combined).map(|ch| (ch, 10));
    }
    char::from_u32(high).map(|ch| (ch, 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescapes_quotes_and_backslashes() {
        assert_eq!(unescape(r#"Say \"hi\""#), "Say \"hi\"");
        assert_eq!(unescape(r"It\'s"), "It's");
        assert_eq!(unescape(r"C:\\dir"), "C:\\dir");
        assert_eq!(unescape(r#"\\""#), "\\\"");
    }

    #[test]
    fn unescapes_control_and_unicode_sequences() {
        assert_eq!(unescape(r"a\nb\tc"), "a\nb\tc");
        assert_eq!(unescape(r"\x41\u00e9\u{1F600}"), "Aé😀");
        assert_eq!(unescape(r"\uD83D\uDE00"), "😀");
        assert_eq!(unescape(r"\xZZ"), "\\xZZ");
        assert_eq!(unescape("trailing\\"), "trailing\\");
    }

    #[test]
    fn escapes_backslash_before_quote() {
        assert_eq!(escape("a\\\"b", '"'), r#"a\\\"b"#);
        assert_eq!(escape("It's \"x\"", '\''), r#"It\'s "x""#);
        assert_eq!(escape("line\nbreak", '"'), r"line\nbreak");
    }

    #[test]
    fn escape_inverts_unescape() {
        for raw in [r#"He said \"no\" \\ ok"#, r"tab\there", "plain 土块"] {
            let decoded = unescape(raw);
            assert_eq!(unescape(&escape(&decoded, '"')), decoded);
        }
    }
}
