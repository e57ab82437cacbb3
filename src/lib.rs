use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod backup;
pub mod cache;
mod clock;
pub mod extract;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod reinsert;
pub mod response;
pub mod review;
pub mod settings;
pub mod stats;
pub mod translate;
pub mod usage;
pub mod verify;

pub use pipeline::{Pipeline, RunSummary};
pub use providers::{OpenAI, Provider, ProviderFuture, ProviderResponse, ProviderUsage};
pub use settings::{DocumentMode, Settings};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input: Option<String>,
    pub output: Option<String>,
    pub cache: Option<String>,
    pub review: Option<String>,
    pub mode: Option<DocumentMode>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub base_url: Option<String>,
    pub batch_size: Option<usize>,
    pub settings_path: Option<String>,
    pub dry_run: bool,
    pub skip_connectivity_check: bool,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// Extraction only; carries the number of unique values found.
    DryRun(usize),
    Completed(RunSummary),
}

/// Layered settings with the command-line overrides applied on top.
pub fn load_settings(config: &Config) -> Result<Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, config);
    settings.validate()?;
    Ok(settings)
}

pub async fn run(config: Config, settings: Settings) -> Result<Outcome> {
    info!("{}", "=".repeat(60));
    info!("localization session started: {}", clock::now_rfc3339());
    info!(
        "model: {}, batch size: {}, mode: {:?}",
        settings.service.model, settings.batch.size, settings.document.mode
    );
    info!("{}", "=".repeat(60));

    if config.dry_run {
        let extraction = pipeline::dry_run(&settings)?;
        return Ok(Outcome::DryRun(extraction.total_unique()));
    }

    if !settings.paths.input.exists() {
        return Err(anyhow::anyhow!(
            "input file not found: {}",
            settings.paths.input.display()
        ));
    }
    let key = providers::resolve_key(config.key.as_deref())
        .with_context(|| "no API key configured")?;
    let provider = OpenAI::new(key, &settings.service);
    info!("service: {} ({})", provider.base_url(), provider.model());

    let mut pipeline = Pipeline::new(provider, settings);
    let summary = pipeline.run(!config.skip_connectivity_check).await?;
    info!("{}", "=".repeat(60));
    info!(
        "localization session ended: {} ({})",
        clock::now_rfc3339(),
        if summary.committed {
            "committed"
        } else {
            "quarantined"
        }
    );
    info!("{}", "=".repeat(60));
    Ok(Outcome::Completed(summary))
}

fn apply_overrides(settings: &mut Settings, config: &Config) {
    if let Some(input) = non_empty(&config.input) {
        settings.paths.input = PathBuf::from(input);
    }
    if let Some(output) = non_empty(&config.output) {
        settings.paths.output = PathBuf::from(output);
    }
    if let Some(cache) = non_empty(&config.cache) {
        settings.paths.cache = PathBuf::from(cache);
    }
    if let Some(review) = non_empty(&config.review) {
        settings.paths.review = PathBuf::from(review);
    }
    if let Some(mode) = config.mode {
        settings.document.mode = mode;
    }
    if let Some(model) = non_empty(&config.model) {
        settings.service.model = model.to_string();
    }
    if let Some(base_url) = non_empty(&config.base_url) {
        settings.service.base_url = base_url.to_string();
    }
    if let Some(size) = config.batch_size {
        settings.batch.size = size;
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_win() {
        let mut settings = Settings::builtin().expect("builtin");
        let config = Config {
            input: Some("names.js".to_string()),
            mode: Some(DocumentMode::Flat),
            model: Some("  ".to_string()),
            batch_size: Some(7),
            ..Config::default()
        };
        apply_overrides(&mut settings, &config);
        assert_eq!(settings.paths.input, PathBuf::from("names.js"));
        assert_eq!(settings.document.mode, DocumentMode::Flat);
        assert_eq!(settings.service.model, "deepseek-ai/DeepSeek-V3.2");
        assert_eq!(settings.batch.size, 7);
    }
}
