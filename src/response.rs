//! Recovery of a `source -> translation` mapping from free-form service replies.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub type Mapping = HashMap<String, String>;

const SOURCE_ALIASES: &[&str] = &["en", "original", "source", "name"];
const TRANSLATION_ALIASES: &[&str] = &["zh", "translation", "target", "cn"];
const WRAPPER_KEYS: &[&str] = &["results", "data", "output"];
const EXCERPT_CHARS: usize = 300;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)```").expect("valid fence regex")
});
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma regex"));
static TRANSLATIONS_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{[^{}]*"translations"[^{}]*\[[\s\S]*?\]\s*\}"#)
        .expect("valid fragment regex")
});
static LINE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[.)]\s*").expect("valid numbering regex"));

#[derive(Debug, thiserror::Error)]
#[error("no parsing strategy produced a mapping; reply starts with: {excerpt}")]
pub struct ResponseError {
    pub excerpt: String,
}

type Strategy = fn(&str) -> Option<Value>;

/// JSON strategies in the order they are tried.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("whole reply", whole_reply),
    ("fenced block", fenced_block),
    ("brace span", brace_span),
    ("repaired brace span", repaired_brace_span),
    ("translations fragment", translations_fragment),
];

/// Returns the first non-empty mapping produced by the strategy cascade,
/// falling back to `source|translation` lines.
pub fn parse_reply(reply: &str, requested: &[String]) -> Result<Mapping, ResponseError> {
    let text = reply.trim();
    for (index, (name, strategy)) in STRATEGIES.iter().enumerate() {
        let Some(mapping) = strategy(text).and_then(|value| normalize(&value)) else {
            continue;
        };
        if index == 0 && !covers_half(&mapping, requested) {
            debug!("whole reply parsed but covers too few requested strings");
            continue;
        }
        if index >= 3 {
            warn!("reply recovered by the {} strategy", name);
        }
        return Ok(mapping);
    }

    let pairs = line_pairs(text, requested);
    if !pairs.is_empty() {
        warn!("reply recovered from source|translation lines");
        return Ok(pairs);
    }

    Err(ResponseError {
        excerpt: text.chars().take(EXCERPT_CHARS).collect(),
    })
}

/// Reads a mapping out of a parsed JSON value.
pub fn normalize(value: &Value) -> Option<Mapping> {
    let object = value.as_object()?;

    if let Some(Value::Array(items)) = object.get("translations") {
        let mut mapping = Mapping::new();
        for item in items.iter().filter_map(Value::as_object) {
            let Some(source) = first_string(item, SOURCE_ALIASES).filter(|s| !s.is_empty()) else {
                continue;
            };
            let translation = first_string(item, TRANSLATION_ALIASES).unwrap_or_default();
            mapping.insert(source.to_string(), translation.to_string());
        }
        if !mapping.is_empty() {
            return Some(mapping);
        }
    }

    if let Some(mapping) = string_object(value) {
        return Some(mapping);
    }

    WRAPPER_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(string_object)
}

fn first_string<'a>(item: &'a serde_json::Map<String, Value>, aliases: &[&str]) -> Option<&'a str> {
    aliases
        .iter()
        .find_map(|alias| item.get(*alias).and_then(Value::as_str))
}

fn string_object(value: &Value) -> Option<Mapping> {
    let object = value.as_object()?;
    if object.is_empty() {
        return None;
    }
    object
        .iter()
        .map(|(key, value)| value.as_str().map(|value| (key.clone(), value.to_string())))
        .collect()
}

fn covers_half(mapping: &Mapping, requested: &[String]) -> bool {
    let present = requested
        .iter()
        .filter(|source| mapping.contains_key(source.as_str()))
        .count();
    present * 2 >= requested.len()
}

fn whole_reply(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn fenced_block(text: &str) -> Option<Value> {
    let captures = FENCED_BLOCK.captures(text)?;
    serde_json::from_str(captures.get(1)?.as_str().trim()).ok()
}

fn brace_span(text: &str) -> Option<Value> {
    serde_json::from_str(outer_braces(text)?).ok()
}

fn repaired_brace_span(text: &str) -> Option<Value> {
    let cleaned = TRAILING_COMMA.replace_all(text, "$1").replace('\'', "\"");
    serde_json::from_str(outer_braces(&cleaned)?).ok()
}

fn translations_fragment(text: &str) -> Option<Value> {
    TRANSLATIONS_FRAGMENT
        .find_iter(text)
        .filter_map(|found| serde_json::from_str::<Value>(found.as_str()).ok())
        .find(|value| normalize(value).is_some())
}

fn outer_braces(text: &str) -> Option<&str> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    (last > first).then(|| &text[first..=last])
}

/// `source|translation` per line, optionally numbered; only requested sources count.
fn line_pairs(text: &str, requested: &[String]) -> Mapping {
    let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let mut mapping = Mapping::new();
    for line in text.lines() {
        let Some((left, right)) = line.trim().split_once('|') else {
            continue;
        };
        let left = left.trim();
        let source = if wanted.contains(left) {
            left
        } else {
            let stripped = LINE_NUMBER.replace(left, "");
            match wanted.get(stripped.as_ref()) {
                Some(source) => *source,
                None => continue,
            }
        };
        let translation = right.trim().trim_matches('"').trim_matches('\'');
        mapping.insert(source.to_string(), translation.to_string());
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_translations_list_with_aliases() {
        let reply = r#"{"translations": [
            {"en": "Stone", "zh": "石块"},
            {"original": "Dirt Block", "translation": "土块"},
            {"source": "Wood", "cn": "木材"},
            {"zh": "orphan"}
        ]}"#;
        let mapping = parse_reply(reply, &requested(&["Stone", "Dirt Block", "Wood"])).expect("parse");
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping["Dirt Block"], "土块");
        assert_eq!(mapping["Wood"], "木材");
    }

    #[test]
    fn whole_reply_needs_half_coverage() {
        let reply = r#"{"Stone": "石块"}"#;
        let asked = requested(&["Stone", "Wood", "Gel"]);
        assert!(whole_reply(reply).and_then(|value| normalize(&value)).is_some());
        // falls through to the brace span, which carries no coverage requirement
        let mapping = parse_reply(reply, &asked).expect("parse");
        assert_eq!(mapping["Stone"], "石块");
    }

    #[test]
    fn extracts_fenced_block() {
        let reply = "Sure! Here you go:\n```json\n{\"Stone\": \"石块\"}\n```\nAnything else?";
        assert_eq!(
            fenced_block(reply).and_then(|value| normalize(&value)),
            Some(HashMap::from([("Stone".to_string(), "石块".to_string())]))
        );
    }

    #[test]
    fn extracts_brace_span_from_prose() {
        let reply = "Result: {\"results\": {\"Gel\": \"凝胶\"}} hope it helps";
        let mapping = parse_reply(reply, &requested(&["Gel"])).expect("parse");
        assert_eq!(mapping["Gel"], "凝胶");
    }

    #[test]
    fn repairs_trailing_commas_and_single_quotes() {
        let reply = "{'Stone': '石块', 'Gel': '凝胶',}";
        assert!(brace_span(reply).is_none());
        let mapping = parse_reply(reply, &requested(&["Stone", "Gel"])).expect("parse");
        assert_eq!(mapping["Gel"], "凝胶");
    }

    #[test]
    fn finds_translations_fragment_inside_reasoning() {
        let reply = r#"Let me think {about it}. Draft: {"translations": [{"en": "Stone", "zh": "石块"}]} done {"#;
        let value = translations_fragment(reply).expect("fragment");
        assert_eq!(normalize(&value).expect("mapping")["Stone"], "石块");
        let mapping = parse_reply(reply, &requested(&["Stone"])).expect("parse");
        assert_eq!(mapping["Stone"], "石块");
    }

    #[test]
    fn falls_back_to_pipe_lines() {
        let reply = "Stone|石块\n2. Dirt Block | \"土块\"\nUnrelated|ignored\nno pipe here";
        let mapping = parse_reply(reply, &requested(&["Stone", "Dirt Block"])).expect("parse");
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["Dirt Block"], "土块");
    }

    #[test]
    fn rejects_unusable_replies() {
        let err = parse_reply("I cannot help with that.", &requested(&["Stone"])).expect_err("fail");
        assert_eq!(err.excerpt, "I cannot help with that.");
        assert!(parse_reply("{\"a\": 1}", &requested(&["a"])).is_err());
        assert!(parse_reply("{}", &requested(&["a"])).is_err());
    }

    #[test]
    fn normalizes_wrapper_keys_only_when_string_valued() {
        let value: Value = serde_json::from_str(r#"{"data": {"A": 1}, "output": {"B": "乙"}}"#)
            .expect("json");
        assert_eq!(normalize(&value).expect("mapping")["B"], "乙");
    }
}
