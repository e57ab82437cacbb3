use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Normal,
    /// Inside a literal opened by the given quote byte.
    InString(u8),
    /// The previous byte was a backslash; holds the string to resume, if any.
    Escaped(Option<u8>),
    /// After `//`, up to the end of the line.
    LineComment,
    /// Between `/*` and `*/`.
    BlockComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Code(u8),
    OpenQuote(u8),
    CloseQuote(u8),
    StringByte(u8),
    Escape,
    EscapedByte(u8),
    Comment(u8),
}

/// Byte tokenizer over normal, in-string and escaped states, plus line and
/// block comments in which quotes are inert.
///
/// Only ASCII bytes drive transitions, so UTF-8 continuation bytes pass
/// through as plain `Code`/`StringByte` tokens and every position a caller
/// sees next to a structural token is a valid char boundary.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
    end: usize,
    state: ScanState,
}

impl<'a> Tokenizer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::over(text, 0..text.len())
    }

    pub fn over(text: &'a str, range: Range<usize>) -> Self {
        let end = range.end.min(text.len());
        Self {
            bytes: text.as_bytes(),
            pos: range.start.min(end),
            end,
            state: ScanState::Normal,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    fn peek(&self) -> Option<u8> {
        (self.pos < self.end).then(|| self.bytes[self.pos])
    }

    /// Continues scanning at `pos` in normal state.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.end);
        self.state = ScanState::Normal;
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = (usize, Token);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let pos = self.pos;
        let byte = self.bytes[pos];
        self.pos += 1;
        let token = match self.state {
            ScanState::Escaped(resume) => {
                self.state = match resume {
                    Some(quote) => ScanState::InString(quote),
                    None => ScanState::Normal,
                };
                Token::EscapedByte(byte)
            }
            ScanState::Normal => match byte {
                b'\\' => {
                    self.state = ScanState::Escaped(None);
                    Token::Escape
                }
                b'"' | b'\'' => {
                    self.state = ScanState::InString(byte);
                    Token::OpenQuote(byte)
                }
                b'/' if self.peek() == Some(b'/') => {
                    self.state = ScanState::LineComment;
                    Token::Comment(byte)
                }
                b'/' if self.peek() == Some(b'*') => {
                    // Consume the `*` too, so `/*/` does not close itself.
                    self.pos += 1;
                    self.state = ScanState::BlockComment;
                    Token::Comment(byte)
                }
                _ => Token::Code(byte),
            },
            ScanState::LineComment => {
                if byte == b'\n' {
                    self.state = ScanState::Normal;
                    Token::Code(byte)
                } else {
                    Token::Comment(byte)
                }
            }
            ScanState::BlockComment => {
                if byte == b'*' && self.peek() == Some(b'/') {
                    self.pos += 1;
                    self.state = ScanState::Normal;
                }
                Token::Comment(byte)
            }
            ScanState::InString(quote) => {
                if byte == b'\\' {
                    self.state = ScanState::Escaped(Some(quote));
                    Token::Escape
                } else if byte == quote {
                    self.state = ScanState::Normal;
                    Token::CloseQuote(byte)
                } else {
                    Token::StringByte(byte)
                }
            }
        };
        Some((pos, token))
    }
}

/// One `field: "value"` occurrence found in normal (code) context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub key_start: usize,
    /// Position of the opening quote.
    pub literal_start: usize,
    /// Raw literal body, quotes excluded.
    pub value: Range<usize>,
    pub quote: u8,
}

impl FieldMatch {
    /// Span of the literal including both quotes.
    pub fn literal(&self) -> Range<usize> {
        self.literal_start..self.value.end + 1
    }

    pub fn raw_value<'t>(&self, text: &'t str) -> &'t str {
        &text[self.value.clone()]
    }
}

pub(crate) fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$'
}

/// Finds the bracketed body of `key: [ ... ]`, excluding both brackets.
///
/// The closing bracket is found by depth tracking that ignores brackets
/// inside string literals and after an escape. An unterminated section runs
/// to the end of the text.
pub fn find_section_span(text: &str, key: &str) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    let mut tokens = Tokenizer::new(text);
    let mut open = None;
    while let Some((pos, token)) = tokens.next() {
        if !matches!(token, Token::Code(_)) || !key_at(bytes, pos, key) {
            continue;
        }
        let after_key = skip_whitespace(bytes, pos + key.len());
        if bytes.get(after_key) != Some(&b':') {
            continue;
        }
        let bracket = skip_whitespace(bytes, after_key + 1);
        if bytes.get(bracket) == Some(&b'[') {
            open = Some(bracket);
            break;
        }
    }

    let start = open? + 1;
    let mut depth = 1usize;
    for (pos, token) in Tokenizer::over(text, start..text.len()) {
        match token {
            Token::Code(b'[') => depth += 1,
            Token::Code(b']') => {
                depth -= 1;
                if depth == 0 {
                    return Some(start..pos);
                }
            }
            _ => {}
        }
    }
    Some(start..text.len())
}

/// Every `field: "..."` / `field: '...'` occurrence inside `range`.
///
/// Keys are only recognized in code context at identifier boundaries, so a
/// field name that appears inside another literal is never matched.
pub fn find_fields(text: &str, range: Range<usize>, field: &str) -> Vec<FieldMatch> {
    let bytes = text.as_bytes();
    let end = range.end.min(text.len());
    let mut matches = Vec::new();
    if field.is_empty() {
        return matches;
    }
    let mut tokens = Tokenizer::over(text, range.clone());
    while let Some((pos, token)) = tokens.next() {
        if !matches!(token, Token::Code(_))
            || (pos > range.start && is_ident_byte(bytes[pos - 1]))
            || !key_at(bytes, pos, field)
        {
            continue;
        }
        let after_key = skip_whitespace(bytes, pos + field.len());
        if bytes.get(after_key) != Some(&b':') {
            continue;
        }
        let quote_pos = skip_whitespace(bytes, after_key + 1);
        let Some(&quote) = bytes.get(quote_pos) else {
            continue;
        };
        if quote != b'"' && quote != b'\'' {
            continue;
        }
        let Some(close) = literal_end(bytes, quote_pos + 1, end, quote) else {
            break;
        };
        matches.push(FieldMatch {
            key_start: pos,
            literal_start: quote_pos,
            value: quote_pos + 1..close,
            quote,
        });
        tokens.seek(close + 1);
    }
    matches
}

/// Counts key occurrences of `field` (followed by a colon) in code context.
pub fn count_field_keys(text: &str, field: &str) -> usize {
    let bytes = text.as_bytes();
    if field.is_empty() {
        return 0;
    }
    Tokenizer::new(text)
        .filter(|(pos, token)| {
            matches!(token, Token::Code(_))
                && (*pos == 0 || !is_ident_byte(bytes[pos - 1]))
                && key_at(bytes, *pos, field)
                && bytes.get(skip_whitespace(bytes, pos + field.len())) == Some(&b':')
        })
        .count()
}

fn key_at(bytes: &[u8], pos: usize, key: &str) -> bool {
    let key = key.as_bytes();
    if !bytes[pos..].starts_with(key) {
        return false;
    }
    if pos > 0 && is_ident_byte(bytes[pos - 1]) {
        return false;
    }
    !bytes
        .get(pos + key.len())
        .copied()
        .is_some_and(is_ident_byte)
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Position of the unescaped closing `quote`, searching `start..end`.
fn literal_end(bytes: &[u8], start: usize, end: usize, quote: u8) -> Option<usize> {
    let mut pos = start;
    while pos < end {
        match bytes[pos] {
            b'\\' => pos += 2,
            byte if byte == quote => return Some(pos),
            _ => pos += 1,
        }
    }
    None
}
