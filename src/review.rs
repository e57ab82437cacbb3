use anyhow::{Context, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fs;
use std::path::Path;

use crate::clock::now_rfc3339;
use crate::extract::Category;
use crate::reinsert::FieldMap;

const REVIEW_NOTE: &str = "Every extracted string with its final translation, for manual review.";
const UNTRANSLATED: &str = "untranslated";

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewDocument {
    pub note: String,
    pub generated_at: String,
    pub categories: ReviewCategories,
}

/// Categories in extraction order.
#[derive(Debug, Clone, Default)]
pub struct ReviewCategories(pub Vec<(String, CategoryReview)>);

impl Serialize for ReviewCategories {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, review) in &self.0 {
            map.serialize_entry(label, review)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CategoryReview {
    pub total: usize,
    pub translated: usize,
    pub items: Vec<ReviewItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReviewItem {
    pub source: String,
    pub translation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
}

impl ReviewDocument {
    /// Non-empty sources left equal to their translation.
    pub fn untranslated(&self) -> usize {
        self.categories
            .0
            .iter()
            .map(|(_, review)| review.total - review.translated)
            .sum()
    }
}

/// Builds the review from the per-field maps used for reinsertion, so each
/// item shows the text that was written; unmapped values count as
/// untranslated.
pub fn build_review(categories: &[Category], field_maps: &[(String, FieldMap)]) -> ReviewDocument {
    let empty = FieldMap::new();
    let reviews = categories
        .iter()
        .map(|category| {
            let mapping = field_maps
                .iter()
                .find(|(field, _)| *field == category.field)
                .map_or(&empty, |(_, map)| map);
            let items: Vec<ReviewItem> = category
                .values
                .iter()
                .map(|source| {
                    let translation = mapping.get(source).unwrap_or(source).clone();
                    let status =
                        (!source.is_empty() && *source == translation).then_some(UNTRANSLATED);
                    ReviewItem {
                        source: source.clone(),
                        translation,
                        status,
                    }
                })
                .collect();
            let translated = items.iter().filter(|item| item.status.is_none()).count();
            (
                category.label.clone(),
                CategoryReview {
                    total: items.len(),
                    translated,
                    items,
                },
            )
        })
        .collect();

    ReviewDocument {
        note: REVIEW_NOTE.to_string(),
        generated_at: now_rfc3339(),
        categories: ReviewCategories(reviews),
    }
}

pub fn write_review(path: &Path, review: &ReviewDocument) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create review dir: {}", dir.display()))?;
    }
    let content = serde_json::to_string_pretty(review)?;
    fs::write(path, content)
        .with_context(|| format!("failed to write review file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn category(label: &str, values: &[&str]) -> Category {
        Category {
            label: label.to_string(),
            field: "Name".to_string(),
            values: values.iter().map(|value| value.to_string()).collect(),
            use_static: false,
        }
    }

    #[test]
    fn marks_untranslated_items_and_keeps_category_order() {
        let categories = vec![
            category("Tile names", &["Dirt Block", "Stone", ""]),
            category("Item names", &["Gel"]),
        ];
        let maps = vec![(
            "Name".to_string(),
            FieldMap::from([
                ("Dirt Block".to_string(), "土块".to_string()),
                ("Stone".to_string(), "Stone".to_string()),
            ]),
        )];

        let review = build_review(&categories, &maps);
        assert_eq!(review.untranslated(), 2);
        let value: Value = serde_json::to_value(&review).expect("json");
        let keys: Vec<&String> = value["categories"]
            .as_object()
            .expect("object")
            .keys()
            .collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(review.categories.0[0].0, "Tile names");

        let tiles = &review.categories.0[0].1;
        assert_eq!(tiles.total, 3);
        assert_eq!(tiles.translated, 2);
        assert_eq!(
            tiles.items[1],
            ReviewItem {
                source: "Stone".to_string(),
                translation: "Stone".to_string(),
                status: Some("untranslated"),
            }
        );
        assert_eq!(
            value["categories"]["Tile names"]["items"][2],
            json!({"source": "", "translation": ""})
        );
        assert_eq!(
            value["categories"]["Item names"],
            json!({
                "total": 1,
                "translated": 0,
                "items": [{"source": "Gel", "translation": "Gel", "status": "untranslated"}]
            })
        );
    }

    #[test]
    fn writes_pretty_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("review.json");
        let review = build_review(&[category("Names", &["A"])], &[]);
        write_review(&path, &review).expect("write");
        let value: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value["categories"]["Names"]["total"], 1);
        assert!(value["generated_at"].as_str().is_some());
    }
}
