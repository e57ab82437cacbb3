use tracing::info;

use crate::extract::flat::{FlatLine, parse_lines};
use crate::extract::literal::unescape;
use crate::extract::scanner::find_fields;
use crate::settings::{DocumentMode, DocumentSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldStats {
    pub field: String,
    pub total: usize,
    pub localized: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizationStats {
    pub fields: Vec<FieldStats>,
}

impl LocalizationStats {
    pub fn total(&self) -> usize {
        self.fields.iter().map(|field| field.total).sum()
    }

    pub fn localized(&self) -> usize {
        self.fields.iter().map(|field| field.localized).sum()
    }

    pub fn log(&self, integrity_ok: bool) {
        info!("localization statistics:");
        for field in &self.fields {
            info!(
                "  {}: {} values, {} localized ({:.1}%)",
                field.field,
                field.total,
                field.localized,
                rate(field.localized, field.total)
            );
        }
        info!(
            "  total: {} values, {} localized ({:.1}%)",
            self.total(),
            self.localized(),
            rate(self.localized(), self.total())
        );
        info!("  integrity: {}", if integrity_ok { "passed" } else { "FAILED" });
    }
}

/// Counts each translatable field's values in `text` and how many contain CJK.
pub fn localization_stats(text: &str, document: &DocumentSettings) -> LocalizationStats {
    let mut stats = LocalizationStats::default();
    match document.mode {
        DocumentMode::Flat => {
            let values: Vec<String> = parse_lines(text)
                .into_iter()
                .filter_map(|line| match line {
                    FlatLine::Entry(entry) => Some(entry.value()),
                    FlatLine::Other { .. } => None,
                })
                .collect();
            push_field(&mut stats, &document.flat_category, &values);
        }
        DocumentMode::Sections => {
            let names = std::iter::once(document.name_field.as_str())
                .chain(document.fields.iter().map(|field| field.name.as_str()));
            for name in names {
                let values: Vec<String> = find_fields(text, 0..text.len(), name)
                    .iter()
                    .map(|found| unescape(found.raw_value(text)))
                    .collect();
                push_field(&mut stats, name, &values);
            }
        }
    }
    stats
}

fn push_field(stats: &mut LocalizationStats, field: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    stats.fields.push(FieldStats {
        field: field.to_string(),
        total: values.len(),
        localized: values.iter().filter(|value| contains_cjk(value)).count(),
    });
}

pub fn contains_cjk(value: &str) -> bool {
    value
        .chars()
        .any(|ch| matches!(ch, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}'))
}

fn rate(part: usize, total: usize) -> f64 {
    part as f64 / total.max(1) as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn counts_localized_values_per_field() {
        let document = Settings::builtin().expect("builtin").document;
        let text = r#"Tiles: [{Name: "土块", Anchor: "底部"}, {Name: "Stone"}, {Name: ""}]"#;
        let stats = localization_stats(text, &document);
        assert_eq!(
            stats.fields,
            vec![
                FieldStats {
                    field: "Name".to_string(),
                    total: 3,
                    localized: 1,
                },
                FieldStats {
                    field: "Anchor".to_string(),
                    total: 1,
                    localized: 1,
                },
            ]
        );
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.localized(), 2);
    }

    #[test]
    fn flat_documents_count_entries() {
        let mut document = Settings::builtin().expect("builtin").document;
        document.mode = DocumentMode::Flat;
        let stats = localization_stats("  A: \"甲\",\n  B: \"Beta\",\n};\n", &document);
        assert_eq!(stats.fields[0].field, "Names");
        assert_eq!((stats.fields[0].total, stats.fields[0].localized), (2, 1));
    }

    #[test]
    fn detects_cjk() {
        assert!(contains_cjk("音乐盒 (Day)"));
        assert!(!contains_cjk("Music Box（Day）"));
    }
}
