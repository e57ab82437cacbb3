//! Structural comparison of the original and the localized text.

use std::fmt;
use tracing::{error, info};

use crate::extract::scanner::count_field_keys;

const MIN_LENGTH_RATIO: f64 = 0.5;
const MAX_LENGTH_RATIO: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    /// `{}` or `[]` counts changed; counts are `(open, close)`.
    DelimiterCount {
        pair: &'static str,
        original: (usize, usize),
        modified: (usize, usize),
    },
    ParenthesesAdded {
        original: (usize, usize),
        modified: (usize, usize),
    },
    KeywordLost(String),
    FieldCount {
        field: String,
        original: usize,
        modified: usize,
    },
    LengthRatio {
        original: usize,
        modified: usize,
        ratio: f64,
    },
    LineCount {
        original: usize,
        modified: usize,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::DelimiterCount {
                pair,
                original,
                modified,
            } => write!(
                f,
                "{} count changed: {}/{} -> {}/{}",
                pair, original.0, original.1, modified.0, modified.1
            ),
            Finding::ParenthesesAdded { original, modified } => write!(
                f,
                "half-width parentheses increased: {}/{} -> {}/{}",
                original.0, original.1, modified.0, modified.1
            ),
            Finding::KeywordLost(keyword) => write!(f, "keyword lost: {}", keyword),
            Finding::FieldCount {
                field,
                original,
                modified,
            } => write!(f, "{} field count changed: {} -> {}", field, original, modified),
            Finding::LengthRatio {
                original,
                modified,
                ratio,
            } => write!(
                f,
                "length out of range: {} -> {} chars (x{:.2})",
                original, modified, ratio
            ),
            Finding::LineCount { original, modified } => {
                write!(f, "line count changed: {} -> {}", original, modified)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub findings: Vec<Finding>,
    pub notes: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn log(&self) {
        for note in &self.notes {
            info!("  ok: {}", note);
        }
        if self.is_clean() {
            info!("integrity check passed");
            return;
        }
        error!("integrity check found {} problem(s):", self.findings.len());
        for finding in &self.findings {
            error!("  x {}", finding);
        }
    }
}

/// Compares `modified` against `original`.
///
/// `keywords` must survive when present in the original, and every name in
/// `fields` must keep its key count.
pub fn verify(
    original: &str,
    modified: &str,
    keywords: &[String],
    fields: &[String],
) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    for (pair, open, close) in [("{}", '{', '}'), ("[]", '[', ']')] {
        let before = (count_char(original, open), count_char(original, close));
        let after = (count_char(modified, open), count_char(modified, close));
        if before == after {
            report.notes.push(format!("{}: {}/{}", pair, before.0, before.1));
        } else {
            report.findings.push(Finding::DelimiterCount {
                pair,
                original: before,
                modified: after,
            });
        }
    }

    let before = (count_char(original, '('), count_char(original, ')'));
    let after = (count_char(modified, '('), count_char(modified, ')'));
    if after.0 > before.0 || after.1 > before.1 {
        report.findings.push(Finding::ParenthesesAdded {
            original: before,
            modified: after,
        });
    } else if after.0 < before.0 {
        report.notes.push(format!(
            "(): {} -> {} ({} became full-width)",
            before.0,
            after.0,
            before.0 - after.0
        ));
    } else {
        report.notes.push(format!("(): {}/{}", before.0, before.1));
    }

    let mut keywords_intact = true;
    for keyword in keywords {
        if original.contains(keyword.as_str()) && !modified.contains(keyword.as_str()) {
            keywords_intact = false;
            report.findings.push(Finding::KeywordLost(keyword.clone()));
        }
    }
    if keywords_intact && !keywords.is_empty() {
        report.notes.push("keywords intact".to_string());
    }

    for field in fields {
        let before = count_field_keys(original, field);
        let after = count_field_keys(modified, field);
        if before != after {
            report.findings.push(Finding::FieldCount {
                field: field.clone(),
                original: before,
                modified: after,
            });
        } else if before > 0 {
            report.notes.push(format!("{} fields: {}", field, before));
        }
    }

    let original_len = original.chars().count();
    let modified_len = modified.chars().count();
    let ratio = modified_len as f64 / original_len.max(1) as f64;
    if (MIN_LENGTH_RATIO..=MAX_LENGTH_RATIO).contains(&ratio) {
        report.notes.push(format!(
            "length: {} -> {} chars (x{:.2})",
            original_len, modified_len, ratio
        ));
    } else {
        report.findings.push(Finding::LengthRatio {
            original: original_len,
            modified: modified_len,
            ratio,
        });
    }

    let original_lines = original.lines().count();
    let modified_lines = modified.lines().count();
    if original_lines != modified_lines {
        report.findings.push(Finding::LineCount {
            original: original_lines,
            modified: modified_lines,
        });
    }

    report
}

fn count_char(text: &str, target: char) -> usize {
    text.chars().filter(|ch| *ch == target).count()
}
