//! Batched, retrying translation of one category's pending strings.

use anyhow::{Context, Result, anyhow};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tera::{Context as TeraContext, Tera};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::cache::TranslationCache;
use crate::providers::retry::{backoff_delay, wait_before_retry};
use crate::providers::{Provider, is_rate_limit_error, retry_hint};
use crate::response::parse_reply;
use crate::settings::{BatchSettings, ServiceSettings, Settings};
use crate::usage::UsageLedger;

pub mod validate;

use validate::{Resolution, Resolved};

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("system_prompt.tera");

/// Result of translating one category.
#[derive(Debug, Clone, Default)]
pub struct CategoryOutcome {
    /// Every pending string mapped to its final value.
    pub mapping: HashMap<String, String>,
    /// Strings left untranslated because their chunk never succeeded.
    pub failed: usize,
    /// Strings that fell back to their source after validation.
    pub fallbacks: usize,
}

enum ChunkResult {
    Accepted(Vec<Resolved>),
    Exhausted(anyhow::Error),
}

pub struct BatchTranslator<P: Provider> {
    provider: P,
    service: ServiceSettings,
    batch: BatchSettings,
    ledger: UsageLedger,
}

impl<P: Provider> BatchTranslator<P> {
    pub fn new(provider: P, settings: &Settings) -> Self {
        Self {
            provider,
            service: settings.service.clone(),
            batch: settings.batch.clone(),
            ledger: UsageLedger::new(),
        }
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Sends one tiny request to confirm the service is reachable.
    pub async fn check_connectivity(&mut self) -> Result<()> {
        let response = self
            .provider
            .clone()
            .append_user_input("Reply with the single word OK.".to_string())
            .complete()
            .await;
        match response {
            Ok(response) => {
                self.ledger.record_success(response.usage);
                info!(
                    "service reachable (model: {})",
                    response.model.as_deref().unwrap_or("unknown")
                );
                Ok(())
            }
            Err(err) => {
                self.ledger.record_failure(None);
                Err(err).with_context(|| "connectivity check failed")
            }
        }
    }

    /// Translates `pending` (unique, non-empty, uncached strings) for `category`.
    ///
    /// Accepted results are written to `cache` and flushed after every chunk;
    /// fallbacks are returned as identity but never cached.
    pub async fn translate_category(
        &mut self,
        category: &str,
        pending: &[String],
        cache: &mut TranslationCache,
    ) -> Result<CategoryOutcome> {
        let mut outcome = CategoryOutcome::default();
        if pending.is_empty() {
            return Ok(outcome);
        }
        let system_prompt = render_system_prompt(&self.service, category)?;

        let mut queue: VecDeque<(Vec<String>, usize)> = pending
            .chunks(self.batch.size)
            .map(|chunk| (chunk.to_vec(), 0))
            .collect();
        let top_level = queue.len();
        let mut dispatched = 0usize;

        while let Some((chunk, depth)) = queue.pop_front() {
            dispatched += 1;
            if depth == 0 {
                info!(
                    "[{}] batch {} ({} strings, {} queued)",
                    category,
                    dispatched,
                    chunk.len(),
                    queue.len()
                );
            } else {
                info!(
                    "[{}] split batch at depth {} ({} strings)",
                    category,
                    depth,
                    chunk.len()
                );
            }

            match self.attempt_chunk(category, &system_prompt, &chunk).await {
                ChunkResult::Accepted(resolved) => {
                    for item in &resolved {
                        match &item.resolution {
                            Resolution::Accepted(value) => cache.put(category, &item.source, value),
                            Resolution::Fallback => outcome.fallbacks += 1,
                        }
                        outcome
                            .mapping
                            .insert(item.source.clone(), item.value().to_string());
                    }
                    if let Err(err) = cache.flush() {
                        error!("failed to save cache: {:#}", err);
                    }
                }
                ChunkResult::Exhausted(err) => {
                    error!(
                        "[{}] batch failed after {} attempts: {:#}",
                        category, self.batch.max_retries, err
                    );
                    let split = self.batch.split_chunk_size;
                    if chunk.len() > split && depth < self.batch.max_split_depth {
                        info!(
                            "[{}] splitting {} strings into batches of {}",
                            category,
                            chunk.len(),
                            split
                        );
                        for sub in chunk.chunks(split).rev() {
                            queue.push_front((sub.to_vec(), depth + 1));
                        }
                    } else {
                        error!(
                            "[{}] keeping {} strings untranslated: {}",
                            category,
                            chunk.len(),
                            preview(&chunk)
                        );
                        outcome.failed += chunk.len();
                        for source in chunk {
                            outcome.mapping.insert(source.clone(), source);
                        }
                    }
                }
            }

            if !queue.is_empty() && !self.batch.request_interval.is_zero() {
                sleep(self.batch.request_interval).await;
            }
        }

        info!(
            "[{}] done: {} strings in {} batches ({} dispatched), {} failed, {} fallbacks",
            category,
            pending.len(),
            top_level,
            dispatched,
            outcome.failed,
            outcome.fallbacks
        );
        Ok(outcome)
    }

    async fn attempt_chunk(
        &mut self,
        category: &str,
        system_prompt: &str,
        chunk: &[String],
    ) -> ChunkResult {
        let max_attempts = self.batch.max_retries;
        let mut last_error = anyhow!("no attempts made");
        for attempt in 0..max_attempts {
            let last = attempt + 1 == max_attempts;
            info!("  API call (attempt {}/{})", attempt + 1, max_attempts);
            let response = self
                .provider
                .clone()
                .append_system_input(system_prompt.to_string())
                .append_user_input(user_prompt(category, chunk))
                .complete()
                .await;

            let failure = match response {
                Ok(response) => {
                    info!("  received {} chars", response.text.chars().count());
                    match self.evaluate(chunk, &response.text, last) {
                        Ok(resolved) => {
                            self.ledger.record_success(response.usage);
                            return ChunkResult::Accepted(resolved);
                        }
                        Err(err) => {
                            self.ledger.record_failure(response.usage);
                            err
                        }
                    }
                }
                Err(err) => {
                    self.ledger.record_failure(None);
                    err
                }
            };

            warn!("  attempt {} failed: {:#}", attempt + 1, failure);
            if !last {
                let delay = self.retry_delay(attempt, &failure);
                wait_before_retry(
                    category,
                    attempt + 1,
                    max_attempts,
                    delay,
                    retry_hint(&failure),
                )
                .await;
            }
            last_error = failure;
        }
        ChunkResult::Exhausted(last_error)
    }

    /// Exponential backoff; a rate-limited service waits at least `retry_max_delay`.
    fn retry_delay(&self, attempt: usize, failure: &anyhow::Error) -> Duration {
        let delay = backoff_delay(
            self.batch.retry_base_delay,
            self.batch.retry_max_delay,
            attempt,
        );
        if is_rate_limit_error(failure) {
            warn!(
                "  rate limited; backing off for {:.1}s",
                self.batch.retry_max_delay.as_secs_f32()
            );
            return delay.max(self.batch.retry_max_delay);
        }
        delay
    }

    /// Parses and validates a reply; errors mean the attempt should be retried.
    fn evaluate(&self, chunk: &[String], reply: &str, last: bool) -> Result<Vec<Resolved>> {
        let mapping = parse_reply(reply, chunk)?;

        let missing = chunk
            .iter()
            .filter(|source| !mapping.contains_key(source.as_str()))
            .count();
        if missing > 0 && !last {
            return Err(anyhow!(
                "{} of {} strings missing from reply",
                missing,
                chunk.len()
            ));
        }

        let resolved = validate::validate(chunk, &mapping);
        let changed = resolved.iter().filter(|item| item.is_changed()).count();
        let coverage = changed as f64 / chunk.len().max(1) as f64;
        if coverage < self.batch.min_coverage && chunk.len() > self.batch.coverage_floor {
            if !last {
                return Err(anyhow!("translation coverage too low: {:.0}%", coverage * 100.0));
            }
            warn!("  translation coverage low: {:.0}%", coverage * 100.0);
        }
        Ok(resolved)
    }
}

pub fn render_system_prompt(service: &ServiceSettings, category: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("context", service.context.as_str());
    context.insert("target_language", service.target_language.as_str());
    context.insert("category", category);
    Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render system prompt")
}

pub fn user_prompt(category: &str, chunk: &[String]) -> String {
    let listed = chunk
        .iter()
        .enumerate()
        .map(|(index, source)| format!("{}. {}", index + 1, source))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Translate the following \"{}\" ({} strings):\n\n{}",
        category,
        chunk.len(),
        listed
    )
}

fn preview(chunk: &[String]) -> String {
    let head = chunk.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    if chunk.len() > 5 {
        format!("{}, ... ({} total)", head, chunk.len())
    } else {
        head
    }
}
