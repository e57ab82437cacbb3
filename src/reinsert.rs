//! Substitution of translated values back into the original text.

use std::collections::HashMap;
use std::ops::Range;

use crate::extract::flat;
use crate::extract::literal::{escape, unescape};
use crate::extract::scanner::find_fields;

/// `source -> translation` for one field name.
pub type FieldMap = HashMap<String, String>;

/// Replaces every quoted value of each field with its mapped translation.
///
/// Values without a mapping, or mapped to themselves, keep their original
/// bytes. Returns the new text and the number of replaced literals.
pub fn reinsert_fields(text: &str, maps: &[(String, FieldMap)]) -> (String, usize) {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for (field, map) in maps {
        if map.is_empty() {
            continue;
        }
        for found in find_fields(text, 0..text.len(), field) {
            let source = unescape(found.raw_value(text));
            let Some(target) = map.get(&source) else {
                continue;
            };
            if *target == source {
                continue;
            }
            let quote = char::from(found.quote);
            edits.push((
                found.literal(),
                format!("{}{}{}", quote, escape(target, quote), quote),
            ));
        }
    }
    edits.sort_by_key(|(span, _)| span.start);
    let count = edits.len();
    (apply_edits(text, edits), count)
}

/// Re-renders a flat document with `map` applied to every entry line.
pub fn reinsert_flat(text: &str, map: &FieldMap) -> (String, usize) {
    flat::render(&flat::parse_lines(text), map)
}

fn apply_edits(text: &str, edits: Vec<(Range<usize>, String)>) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 2);
    let mut cursor = 0usize;
    for (span, replacement) in edits {
        if span.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..span.start]);
        out.push_str(&replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}
