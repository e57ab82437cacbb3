//! Extraction of translatable literals from settings-style script text.

use std::collections::HashSet;
use std::ops::Range;

use tracing::{info, warn};

use crate::settings::{DocumentMode, DocumentSettings};

pub mod flat;
pub mod literal;
pub mod scanner;

/// One occurrence of a translatable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceField {
    pub category: String,
    pub field: String,
    pub source: String,
    /// Literal span in the raw text, quotes included.
    pub span: Range<usize>,
    pub quote: char,
}

/// Unique values of one category in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub label: String,
    pub field: String,
    pub values: Vec<String>,
    /// Whether the static dictionary applies to this category.
    pub use_static: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub categories: Vec<Category>,
    pub fields: Vec<SourceField>,
}

impl Extraction {
    pub fn total_unique(&self) -> usize {
        self.categories.iter().map(|category| category.values.len()).sum()
    }

    pub fn category(&self, label: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.label == label)
    }
}

pub fn extract(text: &str, document: &DocumentSettings) -> Extraction {
    match document.mode {
        DocumentMode::Sections => extract_sections(text, document),
        DocumentMode::Flat => extract_flat(text, &document.flat_category),
    }
}

/// Names per configured section, then every extra field across the whole text.
pub fn extract_sections(text: &str, document: &DocumentSettings) -> Extraction {
    let mut extraction = Extraction::default();

    for section in &document.sections {
        let Some(span) = scanner::find_section_span(text, &section.key) else {
            warn!("section not found: {}", section.key);
            continue;
        };
        let mut collector = Collector::new(&section.category, &document.name_field, false);
        for found in scanner::find_fields(text, span, &document.name_field) {
            collector.push(text, &found, &mut extraction.fields);
        }
        let category = collector.finish();
        info!(
            "  {} ({}): {} unique names",
            category.label,
            section.key,
            category.values.len()
        );
        extraction.categories.push(category);
    }

    for field in &document.fields {
        let mut collector = Collector::new(&field.category, &field.name, true);
        for found in scanner::find_fields(text, 0..text.len(), &field.name) {
            collector.push(text, &found, &mut extraction.fields);
        }
        let category = collector.finish();
        info!(
            "  {} ({}): {} unique values",
            category.label,
            field.name,
            category.values.len()
        );
        extraction.categories.push(category);
    }

    extraction
}

pub fn extract_flat(text: &str, category_label: &str) -> Extraction {
    let mut unique = UniqueValues::default();
    let mut fields = Vec::new();
    let mut offset = 0usize;
    for line in flat::parse_lines(text) {
        match line {
            flat::FlatLine::Entry(entry) => {
                let value_start = offset
                    + entry.indent.len()
                    + entry.key.len()
                    + entry.separator.len();
                let source = entry.value();
                unique.insert(&source);
                fields.push(SourceField {
                    category: category_label.to_string(),
                    field: entry.key.to_string(),
                    source,
                    span: value_start..value_start + entry.raw_value.len() + 2,
                    quote: '"',
                });
                offset += entry.raw.len();
            }
            flat::FlatLine::Other { raw } => offset += raw.len(),
        }
    }
    let category = Category {
        label: category_label.to_string(),
        field: String::new(),
        values: unique.into_values(),
        use_static: false,
    };
    info!("  {}: {} entries, {} unique", category.label, fields.len(), category.values.len());
    Extraction {
        categories: vec![category],
        fields,
    }
}

struct Collector {
    label: String,
    field: String,
    use_static: bool,
    unique: UniqueValues,
}

impl Collector {
    fn new(label: &str, field: &str, use_static: bool) -> Self {
        Self {
            label: label.to_string(),
            field: field.to_string(),
            use_static,
            unique: UniqueValues::default(),
        }
    }

    fn push(&mut self, text: &str, found: &scanner::FieldMatch, fields: &mut Vec<SourceField>) {
        let source = literal::unescape(found.raw_value(text));
        self.unique.insert(&source);
        fields.push(SourceField {
            category: self.label.clone(),
            field: self.field.clone(),
            source,
            span: found.literal(),
            quote: char::from(found.quote),
        });
    }

    fn finish(self) -> Category {
        Category {
            label: self.label,
            field: self.field,
            values: self.unique.into_values(),
            use_static: self.use_static,
        }
    }
}

#[derive(Default)]
struct UniqueValues {
    seen: HashSet<String>,
    values: Vec<String>,
}

impl UniqueValues {
    fn insert(&mut self, value: &str) {
        if self.seen.insert(value.to_string()) {
            self.values.push(value.to_string());
        }
    }

    fn into_values(self) -> Vec<String> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    const DOC: &str = r##"var settings = {
  GlobalColors: [{Name: "Sky", Color: "#fff"}],
  Tiles: [
    {Name: "Dirt Block", Anchor: "Bottom", Frames: [{Name: "Dirt Block", Variety: "Corner A"}]},
    {Name: "Stone"},
    {Name: ""},
    {Name: 'Say \'hi\''},
  ],
  Items: [{Name: "Stone"}, {Name: "Copper \"Bar\""}],
};"##;

    fn document() -> DocumentSettings {
        Settings::builtin().expect("builtin").document
    }

    #[test]
    fn extracts_names_per_section_with_order_preserving_dedup() {
        let extraction = extract_sections(DOC, &document());
        let tiles = extraction.category("Tile names").expect("tiles");
        assert_eq!(tiles.values, vec!["Dirt Block", "Stone", "", "Say 'hi'"]);
        assert!(!tiles.use_static);
        let items = extraction.category("Item names").expect("items");
        assert_eq!(items.values, vec!["Stone", "Copper \"Bar\""]);
        assert_eq!(
            extraction.category("Global colors and environment names").map(|c| c.values.clone()),
            Some(vec!["Sky".to_string()])
        );
        assert!(extraction.category("Wall names").is_none());
    }

    #[test]
    fn every_occurrence_keeps_its_span() {
        let extraction = extract_sections(DOC, &document());
        let dirt: Vec<&SourceField> = extraction
            .fields
            .iter()
            .filter(|field| field.source == "Dirt Block")
            .collect();
        assert_eq!(dirt.len(), 2);
        for field in dirt {
            assert_eq!(&DOC[field.span.clone()], "\"Dirt Block\"");
        }
    }

    #[test]
    fn extra_fields_use_static_dictionary() {
        let extraction = extract_sections(DOC, &document());
        let anchors = extraction.category("Anchor positions").expect("anchor");
        assert_eq!(anchors.values, vec!["Bottom"]);
        assert!(anchors.use_static);
        let variety = extraction
            .category("Variant and style descriptions")
            .expect("variety");
        assert_eq!(variety.values, vec!["Corner A"]);
    }

    #[test]
    fn apostrophes_in_comments_do_not_hide_sections() {
        let text = "var settings = {\n  // don't edit by hand\n  Tiles: [{Name: \"Dirt Block\"}, {Name: \"Stone\"}],\n  /* Items can't be empty */\n  Items: [{Name: \"Gel\"}],\n};\n";
        let extraction = extract_sections(text, &document());
        assert_eq!(
            extraction.category("Tile names").map(|c| c.values.clone()),
            Some(vec!["Dirt Block".to_string(), "Stone".to_string()])
        );
        assert_eq!(
            extraction.category("Item names").map(|c| c.values.clone()),
            Some(vec!["Gel".to_string()])
        );
        assert_eq!(extraction.total_unique(), 3);
    }

    #[test]
    fn flat_extraction_records_value_spans() {
        let text = "const names = {\n  A: \"Alpha\",\n  B: \"Beta\",\n  C: \"Alpha\",\n};\n";
        let extraction = extract_flat(text, "Names");
        assert_eq!(extraction.categories[0].values, vec!["Alpha", "Beta"]);
        assert_eq!(extraction.fields.len(), 3);
        assert_eq!(&text[extraction.fields[1].span.clone()], "\"Beta\"");
        assert_eq!(extraction.fields[2].field, "C");
    }
}
