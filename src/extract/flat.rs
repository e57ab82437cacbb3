use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::literal::{escape, unescape};

static ENTRY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\s*)(\w+)(:\s*)"((?:[^"\\]|\\.)*)"(,?)(.*)$"#).expect("valid entry regex")
});

/// One physical line of a flat `key: "value",` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatLine<'a> {
    Entry(FlatEntry<'a>),
    Other { raw: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatEntry<'a> {
    pub indent: &'a str,
    pub key: &'a str,
    pub separator: &'a str,
    pub raw_value: &'a str,
    pub comma: &'a str,
    pub trailing: &'a str,
    pub eol: &'a str,
    /// Whole line including its terminator.
    pub raw: &'a str,
}

impl FlatEntry<'_> {
    pub fn value(&self) -> String {
        unescape(self.raw_value)
    }
}

/// Splits `text` into lines, keeping each terminator so rendering is lossless.
pub fn parse_lines(text: &str) -> Vec<FlatLine<'_>> {
    text.split_inclusive('\n')
        .map(|raw| {
            let (body, eol) = split_eol(raw);
            match ENTRY_REGEX.captures(body) {
                Some(caps) => {
                    let part = |index: usize| caps.get(index).map_or("", |m| m.as_str());
                    FlatLine::Entry(FlatEntry {
                        indent: part(1),
                        key: part(2),
                        separator: part(3),
                        raw_value: part(4),
                        comma: part(5),
                        trailing: part(6),
                        eol,
                        raw,
                    })
                }
                None => FlatLine::Other { raw },
            }
        })
        .collect()
}

/// Rebuilds the document, substituting mapped values on entry lines.
pub fn render(lines: &[FlatLine<'_>], translations: &HashMap<String, String>) -> (String, usize) {
    let mut out = String::new();
    let mut replaced = 0usize;
    for line in lines {
        match line {
            FlatLine::Other { raw } => out.push_str(raw),
            FlatLine::Entry(entry) => {
                let source = entry.value();
                match translations.get(&source) {
                    Some(target) if *target != source => {
                        replaced += 1;
                        out.push_str(entry.indent);
                        out.push_str(entry.key);
                        out.push_str(entry.separator);
                        out.push('"');
                        out.push_str(&escape(target, '"'));
                        out.push('"');
                        out.push_str(entry.comma);
                        out.push_str(entry.trailing);
                        out.push_str(entry.eol);
                    }
                    _ => out.push_str(entry.raw),
                }
            }
        }
    }
    (out, replaced)
}

fn split_eol(raw: &str) -> (&str, &str) {
    if let Some(body) = raw.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = raw.strip_suffix('\n') {
        (body, "\n")
    } else {
        (raw, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "const names = {\r\n  BloodMoonMonolith: \"Blood Moon Monolith\",\r\n  Quote: \"Say \\\"hi\\\"\", // note\r\n  Empty: \"\",\r\n};";

    #[test]
    fn parses_entries_and_opaque_lines() {
        let lines = parse_lines(SAMPLE);
        assert_eq!(lines.len(), 5);
        assert!(matches!(lines[0], FlatLine::Other { .. }));
        let FlatLine::Entry(entry) = &lines[2] else {
            panic!("expected entry");
        };
        assert_eq!(entry.key, "Quote");
        assert_eq!(entry.value(), "Say \"hi\"");
        assert_eq!(entry.comma, ",");
        assert_eq!(entry.trailing, " // note");
        assert_eq!(entry.eol, "\r\n");
    }

    #[test]
    fn render_without_translations_is_byte_identical() {
        let lines = parse_lines(SAMPLE);
        let (out, replaced) = render(&lines, &HashMap::new());
        assert_eq!(out, SAMPLE);
        assert_eq!(replaced, 0);
    }

    #[test]
    fn render_substitutes_and_escapes() {
        let lines = parse_lines(SAMPLE);
        let map = HashMap::from([
            ("Blood Moon Monolith".to_string(), "血月天塔柱".to_string()),
            ("Say \"hi\"".to_string(), "说\"嗨\"".to_string()),
        ]);
        let (out, replaced) = render(&lines, &map);
        assert_eq!(replaced, 2);
        assert!(out.contains("  BloodMoonMonolith: \"血月天塔柱\",\r\n"));
        assert!(out.contains("  Quote: \"说\\\"嗨\\\"\", // note\r\n"));
        assert!(out.ends_with("  Empty: \"\",\r\n};"));
    }
}
