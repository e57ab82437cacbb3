//! End-to-end run: extract, resolve, translate, reinsert, verify, commit.

use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::backup::backup_input;
use crate::cache::TranslationCache;
use crate::extract::{Category, Extraction, extract};
use crate::providers::Provider;
use crate::reinsert::{FieldMap, reinsert_fields, reinsert_flat};
use crate::review::{build_review, write_review};
use crate::settings::{DocumentMode, Settings};
use crate::stats::{LocalizationStats, localization_stats};
use crate::translate::BatchTranslator;
use crate::verify::{IntegrityReport, verify};

const DRY_RUN_PREVIEW: usize = 10;

#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Where the localized text was written (canonical or quarantine path).
    pub written_to: PathBuf,
    pub committed: bool,
    pub backup: PathBuf,
    pub replacements: usize,
    pub unique_strings: usize,
    pub untranslated: usize,
    pub api_calls: usize,
    pub report: IntegrityReport,
    pub stats: LocalizationStats,
}

/// How one category's unique values were resolved before any remote call.
#[derive(Debug, Default)]
struct Resolution {
    mapping: HashMap<String, String>,
    pending: Vec<String>,
    static_hits: usize,
    cache_hits: usize,
}

pub struct Pipeline<P: Provider> {
    settings: Settings,
    translator: BatchTranslator<P>,
}

impl<P: Provider> Pipeline<P> {
    pub fn new(provider: P, settings: Settings) -> Self {
        let translator = BatchTranslator::new(provider, &settings);
        Self {
            settings,
            translator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run(&mut self, check_connectivity: bool) -> Result<RunSummary> {
        let paths = self.settings.paths.clone();
        let original = read_input(&paths.input)?;

        let backup = backup_input(&paths.input, &paths.backup_dir)?;
        info!("input MD5: {}", backup.md5);
        info!("input backed up to {}", backup.path.display());
        info!(
            "input size: {} chars, {} lines",
            original.chars().count(),
            original.lines().count()
        );

        info!("extracting translatable values...");
        let extraction = extract(&original, &self.settings.document);
        info!(
            "{} unique values in {} categories",
            extraction.total_unique(),
            extraction.categories.len()
        );

        let mut cache = TranslationCache::load(&paths.cache);
        info!("cache loaded: {} entries", cache.len());

        if check_connectivity {
            info!("checking service connectivity...");
            self.translator.check_connectivity().await?;
        }

        let mut category_maps: HashMap<String, HashMap<String, String>> = HashMap::new();
        for category in &extraction.categories {
            let mapping = self.translate_category(category, &mut cache).await?;
            category_maps.insert(category.label.clone(), mapping);
        }
        let merged = field_maps(&extraction.categories, &category_maps);

        info!("reinserting translations...");
        let (localized, replacements) = self.reinsert(&original, &merged);
        info!("{} values replaced", replacements);

        info!("verifying integrity...");
        let report = verify(
            &original,
            &localized,
            &self.settings.document.keywords,
            &self.settings.translatable_fields(),
        );
        report.log();

        let committed = report.is_clean();
        let written_to = if committed {
            paths.output.clone()
        } else {
            quarantine_path(&paths.output, &paths.quarantine_suffix)
        };
        write_text(&written_to, &localized)?;
        if committed {
            info!("output written: {}", written_to.display());
        } else {
            error!("integrity check failed; output not committed");
            error!("result saved to {} for manual review", written_to.display());
            warn!("original input backed up at {}", backup.path.display());
        }

        let review = build_review(&extraction.categories, &merged);
        let untranslated = review.untranslated();
        match write_review(&paths.review, &review) {
            Ok(()) => info!("review file written: {}", paths.review.display()),
            Err(err) => error!("failed to write review file: {:#}", err),
        }

        let stats = localization_stats(&localized, &self.settings.document);
        stats.log(committed);
        self.translator.ledger().log_summary();

        Ok(RunSummary {
            written_to,
            committed,
            backup: backup.path,
            replacements,
            unique_strings: extraction.total_unique(),
            untranslated,
            api_calls: self.translator.ledger().calls(),
            report,
            stats,
        })
    }

    async fn translate_category(
        &mut self,
        category: &Category,
        cache: &mut TranslationCache,
    ) -> Result<HashMap<String, String>> {
        if self
            .settings
            .document
            .skip_categories
            .iter()
            .any(|skip| *skip == category.label)
        {
            info!("skipping category: {}", category.label);
            return Ok(category
                .values
                .iter()
                .map(|value| (value.clone(), value.clone()))
                .collect());
        }

        info!(
            "category: {} ({} values)",
            category.label,
            category.values.len()
        );
        let mut resolution = self.resolve_known(category, cache);
        info!(
            "  static dictionary: {}, cache hits: {}, to translate: {}",
            resolution.static_hits,
            resolution.cache_hits,
            resolution.pending.len()
        );
        if resolution.pending.is_empty() {
            info!("  everything already translated");
            return Ok(resolution.mapping);
        }

        let outcome = self
            .translator
            .translate_category(&category.label, &resolution.pending, cache)
            .await?;
        for source in &resolution.pending {
            let value = outcome
                .mapping
                .get(source)
                .cloned()
                .unwrap_or_else(|| source.clone());
            resolution.mapping.insert(source.clone(), value);
        }
        for source in resolution.pending.iter().take(5) {
            let value = &resolution.mapping[source];
            let marker = if source == value { "o" } else { "+" };
            info!("    {} {} -> {}", marker, source, value);
        }
        Ok(resolution.mapping)
    }

    /// Empty values, static dictionary entries and cache hits; the rest is pending.
    fn resolve_known(&self, category: &Category, cache: &TranslationCache) -> Resolution {
        let mut resolution = Resolution::default();
        for value in &category.values {
            if value.is_empty() {
                resolution.mapping.insert(String::new(), String::new());
                continue;
            }
            if category.use_static
                && let Some(fixed) = self.settings.static_dictionary.get(value)
            {
                resolution.static_hits += 1;
                resolution.mapping.insert(value.clone(), fixed.clone());
                continue;
            }
            match cache.get(&category.label, value) {
                Some(cached) => {
                    resolution.cache_hits += 1;
                    resolution.mapping.insert(value.clone(), cached.to_string());
                }
                None => resolution.pending.push(value.clone()),
            }
        }
        resolution
    }

    fn reinsert(&self, original: &str, merged: &[(String, FieldMap)]) -> (String, usize) {
        match self.settings.document.mode {
            DocumentMode::Flat => {
                let empty = FieldMap::new();
                let map = merged.first().map_or(&empty, |(_, map)| map);
                reinsert_flat(original, map)
            }
            DocumentMode::Sections => reinsert_fields(original, merged),
        }
    }
}

/// Merges category mappings per field name, in category order.
///
/// When a source appears in several categories of the same field, a real
/// translation replaces an identity fallback; between two different
/// translations the first category wins.
pub fn field_maps(
    categories: &[Category],
    category_maps: &HashMap<String, HashMap<String, String>>,
) -> Vec<(String, FieldMap)> {
    let mut merged: Vec<(String, FieldMap)> = Vec::new();
    for category in categories {
        let Some(mapping) = category_maps.get(&category.label) else {
            continue;
        };
        let index = match merged.iter().position(|(field, _)| *field == category.field) {
            Some(index) => index,
            None => {
                merged.push((category.field.clone(), FieldMap::new()));
                merged.len() - 1
            }
        };
        let target = &mut merged[index].1;
        for source in &category.values {
            let Some(value) = mapping.get(source) else {
                continue;
            };
            let keep_existing = match target.get(source) {
                None => false,
                Some(existing) if existing == value || value == source => true,
                Some(existing) if existing == source => false,
                Some(existing) => {
                    warn!(
                        "'{}' has different translations across categories; keeping '{}'",
                        source, existing
                    );
                    true
                }
            };
            if !keep_existing {
                target.insert(source.clone(), value.clone());
            }
        }
    }
    merged
}

/// Extracts and logs every category without touching the cache or service.
pub fn dry_run(settings: &Settings) -> Result<Extraction> {
    let text = read_input(&settings.paths.input)?;
    let extraction = extract(&text, &settings.document);
    info!(
        "dry run: {} unique values in {} categories",
        extraction.total_unique(),
        extraction.categories.len()
    );
    for category in &extraction.categories {
        info!("  {}:", category.label);
        for value in category.values.iter().take(DRY_RUN_PREVIEW) {
            let fixed = category.use_static && settings.static_dictionary.contains_key(value);
            info!("    - {}{}", value, if fixed { " [static]" } else { "" });
        }
        if category.values.len() > DRY_RUN_PREVIEW {
            info!("    ... {} in total", category.values.len());
        }
    }
    Ok(extraction)
}

pub fn quarantine_path(output: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn read_input(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(anyhow!("input file not found: {}", path.display()));
    }
    fs::read_to_string(path).with_context(|| format!("failed to read input: {}", path.display()))
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir: {}", dir.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write output: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(label: &str, field: &str, values: &[&str]) -> Category {
        Category {
            label: label.to_string(),
            field: field.to_string(),
            values: values.iter().map(|value| value.to_string()).collect(),
            use_static: false,
        }
    }

    fn mapping(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(source, target)| (source.to_string(), target.to_string()))
            .collect()
    }

    #[test]
    fn field_maps_prefer_the_first_category() {
        let categories = vec![
            category("Tile names", "Name", &["Stone", "Dirt Block"]),
            category("Item names", "Name", &["Stone", "Gel"]),
            category("Anchor positions", "Anchor", &["Top"]),
        ];
        let maps = HashMap::from([
            ("Tile names".to_string(), mapping(&[("Stone", "石块"), ("Dirt Block", "土块")])),
            ("Item names".to_string(), mapping(&[("Stone", "石头"), ("Gel", "凝胶")])),
            ("Anchor positions".to_string(), mapping(&[("Top", "顶部")])),
        ]);

        let merged = field_maps(&categories, &maps);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].0, "Name");
        assert_eq!(merged[0].1["Stone"], "石块");
        assert_eq!(merged[0].1["Gel"], "凝胶");
        assert_eq!(merged[1].1["Top"], "顶部");
    }

    #[test]
    fn field_maps_prefer_translations_over_identity() {
        let categories = vec![
            category("Tile names", "Name", &["Stone"]),
            category("Item names", "Name", &["Stone"]),
        ];
        let maps = HashMap::from([
            ("Tile names".to_string(), mapping(&[("Stone", "Stone")])),
            ("Item names".to_string(), mapping(&[("Stone", "石块")])),
        ]);
        let merged = field_maps(&categories, &maps);
        assert_eq!(merged[0].1["Stone"], "石块");

        let reversed = HashMap::from([
            ("Tile names".to_string(), mapping(&[("Stone", "石块")])),
            ("Item names".to_string(), mapping(&[("Stone", "Stone")])),
        ]);
        assert_eq!(field_maps(&categories, &reversed)[0].1["Stone"], "石块");
    }

    #[test]
    fn quarantine_appends_suffix() {
        assert_eq!(
            quarantine_path(Path::new("out/settings_cn.js"), ".UNSAFE.js"),
            PathBuf::from("out/settings_cn.js.UNSAFE.js")
        );
    }

    #[test]
    fn dry_run_needs_an_input_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = Settings::builtin().expect("builtin");
        settings.paths.input = dir.path().join("missing.js");
        let err = dry_run(&settings).expect_err("missing input");
        assert!(err.to_string().contains("input file not found"));

        fs::write(&settings.paths.input, "Tiles: [{Name: \"Stone\", Anchor: \"Top\"}]")
            .expect("write");
        let extraction = dry_run(&settings).expect("dry run");
        assert_eq!(extraction.total_unique(), 2);
    }
}
