use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

/// Separator of the composite cache key; category labels may not contain it.
pub const CATEGORY_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DocumentMode {
    /// Named array sections holding object literals with a name field.
    Sections,
    /// One `key: "value",` entry per line.
    Flat,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceSettings,
    pub batch: BatchSettings,
    pub paths: PathSettings,
    pub document: DocumentSettings,
    pub static_dictionary: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub target_language: String,
    pub context: String,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub size: usize,
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub request_interval: Duration,
    /// Minimum share of strings a reply must change before it is trusted.
    pub min_coverage: f64,
    /// Chunks at or below this size are exempt from the coverage check.
    pub coverage_floor: usize,
    pub split_chunk_size: usize,
    pub max_split_depth: usize,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
    pub review: PathBuf,
    pub log: Option<PathBuf>,
    pub backup_dir: PathBuf,
    pub quarantine_suffix: String,
}

#[derive(Debug, Clone)]
pub struct DocumentSettings {
    pub mode: DocumentMode,
    pub flat_category: String,
    pub name_field: String,
    pub sections: Vec<SectionSpec>,
    pub fields: Vec<FieldSpec>,
    pub keywords: Vec<String>,
    pub skip_categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SectionSpec {
    pub key: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub category: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceSettings {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.1,
                max_tokens: 4096,
                timeout: Duration::from_secs(120),
                target_language: "Simplified Chinese".to_string(),
                context: String::new(),
            },
            batch: BatchSettings {
                size: 50,
                max_retries: 5,
                retry_base_delay: Duration::from_secs(3),
                retry_max_delay: Duration::from_secs(60),
                request_interval: Duration::from_millis(1500),
                min_coverage: 0.3,
                coverage_floor: 5,
                split_chunk_size: 10,
                max_split_depth: 2,
            },
            paths: PathSettings {
                input: PathBuf::from("settings.js"),
                output: PathBuf::from("settings_cn.js"),
                cache: PathBuf::from("translation_cache.json"),
                review: PathBuf::from("translation_review.json"),
                log: None,
                backup_dir: PathBuf::from("backups"),
                quarantine_suffix: ".UNSAFE.js".to_string(),
            },
            document: DocumentSettings {
                mode: DocumentMode::Sections,
                flat_category: "Names".to_string(),
                name_field: "Name".to_string(),
                sections: Vec::new(),
                fields: Vec::new(),
                keywords: Vec::new(),
                skip_categories: Vec::new(),
            },
            static_dictionary: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    service: Option<ServiceFile>,
    batch: Option<BatchFile>,
    paths: Option<PathsFile>,
    document: Option<DocumentFile>,
    static_dictionary: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceFile {
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    target_language: Option<String>,
    context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BatchFile {
    size: Option<usize>,
    max_retries: Option<usize>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    request_interval_ms: Option<u64>,
    min_coverage: Option<f64>,
    coverage_floor: Option<usize>,
    split_chunk_size: Option<usize>,
    max_split_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsFile {
    input: Option<String>,
    output: Option<String>,
    cache: Option<String>,
    review: Option<String>,
    log: Option<String>,
    backup_dir: Option<String>,
    quarantine_suffix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentFile {
    mode: Option<DocumentMode>,
    flat_category: Option<String>,
    name_field: Option<String>,
    sections: Option<Vec<SectionSpec>>,
    fields: Option<Vec<FieldSpec>>,
    keywords: Option<Vec<String>>,
    skip_categories: Option<Vec<String>>,
}

/// Loads the built-in defaults, then `localizer.toml` and `localizer.local.toml`
/// from the working directory, then `extra_path` when given.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::builtin()?;

    let mut ordered_paths = vec![
        PathBuf::from("localizer.toml"),
        PathBuf::from("localizer.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_toml(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    /// Defaults with the embedded `settings.toml` applied.
    pub fn builtin() -> Result<Self> {
        let mut settings = Self::default();
        settings
            .merge_toml(DEFAULT_SETTINGS_TOML)
            .with_context(|| "failed to parse built-in settings")?;
        Ok(settings)
    }

    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.size == 0 {
            return Err(anyhow!("batch.size must be greater than zero"));
        }
        if self.batch.max_retries == 0 {
            return Err(anyhow!("batch.max_retries must be greater than zero"));
        }
        if self.batch.split_chunk_size == 0 {
            return Err(anyhow!("batch.split_chunk_size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.batch.min_coverage) {
            return Err(anyhow!("batch.min_coverage must be between 0 and 1"));
        }
        for category in self.category_labels() {
            if category.trim().is_empty() {
                return Err(anyhow!("category labels must not be empty"));
            }
            if category.contains(CATEGORY_SEPARATOR) {
                return Err(anyhow!(
                    "category label '{}' must not contain '{}'",
                    category,
                    CATEGORY_SEPARATOR
                ));
            }
        }
        Ok(())
    }

    /// Every category label the current document mode can produce.
    pub fn category_labels(&self) -> Vec<&str> {
        match self.document.mode {
            DocumentMode::Flat => vec![self.document.flat_category.as_str()],
            DocumentMode::Sections => self
                .document
                .sections
                .iter()
                .map(|section| section.category.as_str())
                .chain(self.document.fields.iter().map(|field| field.category.as_str()))
                .collect(),
        }
    }

    /// Field names whose key counts the integrity check compares.
    pub fn translatable_fields(&self) -> Vec<String> {
        match self.document.mode {
            DocumentMode::Flat => Vec::new(),
            DocumentMode::Sections => std::iter::once(self.document.name_field.clone())
                .chain(self.document.fields.iter().map(|field| field.name.clone()))
                .collect(),
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(service) = incoming.service {
            set_text(&mut self.service.base_url, service.base_url);
            set_text(&mut self.service.model, service.model);
            if let Some(temperature) = service.temperature {
                self.service.temperature = temperature;
            }
            if let Some(max_tokens) = service.max_tokens {
                if max_tokens > 0 {
                    self.service.max_tokens = max_tokens;
                }
            }
            if let Some(secs) = service.timeout_secs {
                if secs > 0 {
                    self.service.timeout = Duration::from_secs(secs);
                }
            }
            set_text(&mut self.service.target_language, service.target_language);
            if let Some(context) = service.context {
                self.service.context = context.trim().to_string();
            }
        }
        if let Some(batch) = incoming.batch {
            if let Some(size) = batch.size {
                self.batch.size = size;
            }
            if let Some(retries) = batch.max_retries {
                self.batch.max_retries = retries;
            }
            if let Some(ms) = batch.retry_base_delay_ms {
                self.batch.retry_base_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = batch.retry_max_delay_ms {
                self.batch.retry_max_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = batch.request_interval_ms {
                self.batch.request_interval = Duration::from_millis(ms);
            }
            if let Some(coverage) = batch.min_coverage {
                self.batch.min_coverage = coverage;
            }
            if let Some(floor) = batch.coverage_floor {
                self.batch.coverage_floor = floor;
            }
            if let Some(size) = batch.split_chunk_size {
                self.batch.split_chunk_size = size;
            }
            if let Some(depth) = batch.max_split_depth {
                self.batch.max_split_depth = depth;
            }
        }
        if let Some(paths) = incoming.paths {
            set_path(&mut self.paths.input, paths.input);
            set_path(&mut self.paths.output, paths.output);
            set_path(&mut self.paths.cache, paths.cache);
            set_path(&mut self.paths.review, paths.review);
            if let Some(log) = paths.log {
                let log = log.trim();
                self.paths.log = if log.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(log))
                };
            }
            set_path(&mut self.paths.backup_dir, paths.backup_dir);
            set_text(&mut self.paths.quarantine_suffix, paths.quarantine_suffix);
        }
        if let Some(document) = incoming.document {
            if let Some(mode) = document.mode {
                self.document.mode = mode;
            }
            set_text(&mut self.document.flat_category, document.flat_category);
            set_text(&mut self.document.name_field, document.name_field);
            if let Some(sections) = document.sections {
                self.document.sections = sections;
            }
            if let Some(fields) = document.fields {
                self.document.fields = fields;
            }
            if let Some(keywords) = document.keywords {
                self.document.keywords = keywords;
            }
            if let Some(skip) = document.skip_categories {
                self.document.skip_categories = skip;
            }
        }
        if let Some(map) = incoming.static_dictionary {
            for (key, value) in map {
                self.static_dictionary.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(settings: &mut Settings) {
    if let Some(base_url) = get_env("OPENAI_BASE_URL") {
        settings.service.base_url = base_url;
    }
    if let Some(model) = get_env("MODEL") {
        settings.service.model = model;
    }
}

pub(crate) fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn set_text(slot: &mut String, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *slot = value;
        }
    }
}

fn set_path(slot: &mut PathBuf, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *slot = PathBuf::from(value.trim());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_settings_describe_the_map_viewer_document() {
        let settings = Settings::builtin().expect("builtin");
        assert_eq!(settings.document.mode, DocumentMode::Sections);
        assert_eq!(settings.document.sections.len(), 6);
        assert_eq!(settings.document.sections[1].key, "Tiles");
        assert_eq!(settings.batch.size, 50);
        assert_eq!(settings.batch.retry_base_delay, Duration::from_secs(3));
        assert_eq!(settings.static_dictionary.get("Top").map(String::as_str), Some("顶部"));
        assert_eq!(
            settings.translatable_fields(),
            vec!["Name".to_string(), "Anchor".to_string(), "Variety".to_string()]
        );
        settings.validate().expect("valid");
    }

    #[test]
    fn later_files_override_scalars_and_extend_dictionary() {
        let mut settings = Settings::builtin().expect("builtin");
        settings
            .merge_toml(
                r#"
[batch]
size = 20
request_interval_ms = 0

[document]
mode = "flat"

[static_dictionary]
Floor = "地板"
"#,
            )
            .expect("merge");
        assert_eq!(settings.batch.size, 20);
        assert_eq!(settings.batch.request_interval, Duration::ZERO);
        assert_eq!(settings.batch.max_retries, 5);
        assert_eq!(settings.document.mode, DocumentMode::Flat);
        assert_eq!(settings.category_labels(), vec!["Names"]);
        assert!(settings.translatable_fields().is_empty());
        assert!(settings.static_dictionary.contains_key("Floor"));
        assert!(settings.static_dictionary.contains_key("Bottom"));
    }

    #[test]
    fn category_labels_with_separator_are_rejected() {
        let mut settings = Settings::builtin().expect("builtin");
        settings.document.fields.push(FieldSpec {
            name: "Tooltip".to_string(),
            category: "bad::label".to_string(),
        });
        let err = settings.validate().expect_err("separator rejected");
        assert!(err.to_string().contains("bad::label"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut settings = Settings::builtin().expect("builtin");
        settings.batch.size = 0;
        assert!(settings.validate().is_err());
    }
}
