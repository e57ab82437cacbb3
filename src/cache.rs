use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::clock::now_rfc3339;
use crate::settings::CATEGORY_SEPARATOR;

pub const CACHE_VERSION: u32 = 3;
const LEGACY_CATEGORY: &str = "_legacy";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(rename = "_meta")]
    meta: CacheMeta,
    #[serde(default)]
    translations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheMeta {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    migrated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_saved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

impl CacheDocument {
    fn empty() -> Self {
        Self {
            meta: CacheMeta {
                version: CACHE_VERSION,
                created: Some(now_rfc3339()),
                ..CacheMeta::default()
            },
            translations: BTreeMap::new(),
        }
    }
}

/// Durable `category::source -> translation` store.
///
/// Writes go through a verified temporary file and an atomic rename, and the
/// previous file is kept as `<name>.bak`, so the file on disk is always a
/// complete document.
#[derive(Debug)]
pub struct TranslationCache {
    path: PathBuf,
    document: CacheDocument,
    dirty: bool,
}

impl TranslationCache {
    /// Loads the cache at `path`, recovering from `<path>.bak` when the file is
    /// corrupt and starting empty when neither is usable.
    pub fn load(path: &Path) -> Self {
        let document = if !path.exists() {
            CacheDocument::empty()
        } else {
            match read_document(path) {
                Ok(document) => document,
                Err(err) => {
                    error!("cache file is corrupt: {} ({:#})", path.display(), err);
                    recover_from_backup(path)
                }
            }
        };
        Self {
            path: path.to_path_buf(),
            document,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.document.translations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.translations.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Categorized entry first, then the pre-category entry for `source`.
    pub fn get(&self, category: &str, source: &str) -> Option<&str> {
        self.document
            .translations
            .get(&make_key(category, source))
            .or_else(|| {
                self.document
                    .translations
                    .get(&make_key(LEGACY_CATEGORY, source))
            })
            .map(String::as_str)
    }

    pub fn put(&mut self, category: &str, source: &str, translation: &str) {
        let key = make_key(category, source);
        if self.document.translations.get(&key).map(String::as_str) == Some(translation) {
            return;
        }
        self.document
            .translations
            .insert(key, translation.to_string());
        self.dirty = true;
    }

    /// Persists pending changes; returns `Ok(false)` when nothing changed.
    ///
    /// On error the durable file is left as it was and the temporary file is
    /// removed.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.document.meta.last_saved = Some(now_rfc3339());
        self.document.meta.count = Some(self.len());
        let content = serde_json::to_string_pretty(&self.document)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache dir: {}", dir.display()))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".translation_cache")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .with_context(|| "failed to create temporary cache file")?;
        temp.write_all(content.as_bytes())
            .with_context(|| "failed to write temporary cache file")?;
        temp.as_file()
            .sync_all()
            .with_context(|| "failed to sync temporary cache file")?;

        let written = fs::read_to_string(temp.path())
            .with_context(|| "failed to read back temporary cache file")?;
        decode_document(&written).with_context(|| "temporary cache file does not parse")?;

        if self.path.exists() {
            fs::copy(&self.path, backup_path(&self.path)).with_context(|| {
                format!("failed to back up cache file: {}", self.path.display())
            })?;
        }
        temp.persist(&self.path)
            .with_context(|| format!("failed to replace cache file: {}", self.path.display()))?;

        self.dirty = false;
        Ok(true)
    }
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

fn make_key(category: &str, source: &str) -> String {
    format!("{}{}{}", category, CATEGORY_SEPARATOR, source)
}

fn read_document(path: &Path) -> Result<CacheDocument> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read cache: {}", path.display()))?;
    decode_document(&content)
}

fn recover_from_backup(path: &Path) -> CacheDocument {
    let backup = backup_path(path);
    if backup.exists() {
        info!("recovering cache from backup: {}", backup.display());
        match read_document(&backup) {
            Ok(document) => return document,
            Err(err) => warn!("cache backup is unusable too: {:#}", err),
        }
    }
    warn!("starting a new cache");
    CacheDocument::empty()
}

/// Parses a current document, or migrates a flat `{source: translation}`
/// object from the format that predates categories.
///
/// Identifier-keyed progress files (`{BloodMoonMonolith: "..."}`) decode the
/// same way, but their keys never match a source string, so they only ever
/// miss.
fn decode_document(content: &str) -> Result<CacheDocument> {
    let value: Value = serde_json::from_str(content).with_context(|| "invalid cache JSON")?;
    let Value::Object(map) = value else {
        return Err(anyhow!("cache root is not an object"));
    };
    if map.contains_key("_meta") {
        let document: CacheDocument = serde_json::from_value(Value::Object(map))
            .with_context(|| "invalid cache document")?;
        return Ok(document);
    }

    warn!("found a cache without categories; migrating entries to the legacy key space");
    let mut translations = BTreeMap::new();
    for (source, translation) in map {
        let Value::String(translation) = translation else {
            return Err(anyhow!("legacy cache entry '{}' is not a string", source));
        };
        translations.insert(make_key(LEGACY_CATEGORY, &source), translation);
    }
    Ok(CacheDocument {
        meta: CacheMeta {
            version: CACHE_VERSION,
            migrated: Some(now_rfc3339()),
            ..CacheMeta::default()
        },
        translations,
    })
}
