use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::response::Mapping;

const DANGEROUS_CHARS: &[char] = &['\n', '\r', '\0'];
const LENGTH_BLOWUP_FACTOR: usize = 5;
const MAX_LOGGED_ISSUES: usize = 10;

static PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)").expect("valid parenthetical regex"));

/// How one requested string was resolved from a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Value taken from the reply, possibly repaired. May equal the source.
    Accepted(String),
    /// Reply unusable for this string; the source stands in and is not cached.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub source: String,
    pub resolution: Resolution,
}

impl Resolved {
    pub fn value(&self) -> &str {
        match &self.resolution {
            Resolution::Accepted(value) => value,
            Resolution::Fallback => &self.source,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(&self.resolution, Resolution::Accepted(value) if *value != self.source)
    }
}

/// Checks every requested string against `reply`, in request order.
pub fn validate(requested: &[String], reply: &Mapping) -> Vec<Resolved> {
    let mut issues = Vec::new();
    let resolved = requested
        .iter()
        .map(|source| Resolved {
            source: source.clone(),
            resolution: resolve(source, reply.get(source), &mut issues),
        })
        .collect();

    if !issues.is_empty() {
        warn!("validation found {} issue(s):", issues.len());
        for issue in issues.iter().take(MAX_LOGGED_ISSUES) {
            warn!("  - {}", issue);
        }
        if issues.len() > MAX_LOGGED_ISSUES {
            warn!("  ... {} in total", issues.len());
        }
    }
    resolved
}

fn resolve(source: &str, translated: Option<&String>, issues: &mut Vec<String>) -> Resolution {
    let Some(translated) = translated else {
        issues.push(format!("missing translation: '{}'", source));
        return Resolution::Fallback;
    };
    if source.is_empty() {
        return Resolution::Accepted(String::new());
    }
    if translated.is_empty() {
        issues.push(format!("empty translation: '{}'", source));
        return Resolution::Fallback;
    }
    if translated
        .chars()
        .any(|ch| DANGEROUS_CHARS.contains(&ch) && !source.contains(ch))
    {
        issues.push(format!(
            "control characters: '{}' -> '{}'",
            source,
            excerpt(translated)
        ));
        return Resolution::Fallback;
    }

    let source_len = source.chars().count();
    let translated_len = translated.chars().count();
    if source_len > 3 && translated_len > source_len * LENGTH_BLOWUP_FACTOR {
        issues.push(format!(
            "suspicious length: '{}'({}) -> '{}'({})",
            source,
            source_len,
            excerpt(translated),
            translated_len
        ));
    }

    Resolution::Accepted(restore_parenthetical(source, translated, issues))
}

/// Re-appends a dropped `(...)` segment in full-width form.
fn restore_parenthetical(source: &str, translated: &str, issues: &mut Vec<String>) -> String {
    if !source.contains('(') || translated.contains('(') || translated.contains('（') {
        return translated.to_string();
    }
    let Some(inner) = PARENTHETICAL
        .captures(source)
        .and_then(|captures| captures.get(1))
    else {
        return translated.to_string();
    };
    let repaired = format!("{}（{}）", translated, inner.as_str());
    issues.push(format!("restored parenthetical: '{}' -> '{}'", source, repaired));
    repaired
}

fn excerpt(value: &str) -> String {
    value.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(pairs: &[(&str, Option<&str>)]) -> Vec<Resolved> {
        let requested: Vec<String> = pairs.iter().map(|(source, _)| source.to_string()).collect();
        let reply: Mapping = pairs
            .iter()
            .filter_map(|(source, value)| value.map(|value| (source.to_string(), value.to_string())))
            .collect();
        validate(&requested, &reply)
    }

    #[test]
    fn missing_empty_and_control_characters_fall_back() {
        let resolved = run(&[
            ("Stone", None),
            ("Gel", Some("")),
            ("Wood", Some("木\n材")),
            ("", Some("")),
        ]);
        assert_eq!(resolved[0].resolution, Resolution::Fallback);
        assert_eq!(resolved[1].resolution, Resolution::Fallback);
        assert_eq!(resolved[2].resolution, Resolution::Fallback);
        assert_eq!(resolved[2].value(), "Wood");
        assert_eq!(resolved[3].resolution, Resolution::Accepted(String::new()));
        assert!(resolved.iter().all(|item| !item.is_changed()));
    }

    #[test]
    fn restores_dropped_parenthetical() {
        let resolved = run(&[
            ("Music Box (Overworld Day)", Some("音乐盒")),
            ("Music Box (Rain)", Some("音乐盒 (Rain)")),
            ("Torch (Blue)", Some("火把（蓝色）")),
        ]);
        assert_eq!(resolved[0].value(), "音乐盒（Overworld Day）");
        assert_eq!(resolved[1].value(), "音乐盒 (Rain)");
        assert_eq!(resolved[2].value(), "火把（蓝色）");
    }

    #[test]
    fn long_translations_are_kept_with_a_warning() {
        let resolved = run(&[("Gel", Some("x".repeat(40).as_str())), ("Ruby", Some("一".repeat(30).as_str()))]);
        assert_eq!(resolved[0].value().len(), 40);
        assert!(resolved[1].is_changed());
    }

    #[test]
    fn identity_replies_are_accepted_but_unchanged() {
        let resolved = run(&[("Guide", Some("Guide"))]);
        assert_eq!(resolved[0].resolution, Resolution::Accepted("Guide".to_string()));
        assert!(!resolved[0].is_changed());
    }
}
