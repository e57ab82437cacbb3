use std::time::{Duration, Instant};
use tracing::info;

use crate::providers::ProviderUsage;

/// Per-run accounting of remote calls.
#[derive(Debug, Clone)]
pub struct UsageLedger {
    started: Instant,
    calls: usize,
    failures: usize,
    usage: ProviderUsage,
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageLedger {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            calls: 0,
            failures: 0,
            usage: ProviderUsage::default(),
        }
    }

    pub fn record_success(&mut self, usage: Option<ProviderUsage>) {
        self.calls += 1;
        self.usage = merge_usage(std::mem::take(&mut self.usage), usage);
    }

    /// A failed attempt may still have consumed tokens.
    pub fn record_failure(&mut self, usage: Option<ProviderUsage>) {
        self.calls += 1;
        self.failures += 1;
        self.usage = merge_usage(std::mem::take(&mut self.usage), usage);
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn usage(&self) -> &ProviderUsage {
        &self.usage
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn log_summary(&self) {
        info!(
            "session finished in {:.1}s: {} API calls, {} failed, tokens {} (prompt {}, completion {})",
            self.elapsed().as_secs_f64(),
            self.calls,
            self.failures,
            self.usage.total_tokens.unwrap_or(0),
            self.usage.prompt_tokens.unwrap_or(0),
            self.usage.completion_tokens.unwrap_or(0)
        );
    }
}

pub(crate) fn merge_usage(total: ProviderUsage, next: Option<ProviderUsage>) -> ProviderUsage {
    let Some(next) = next else {
        return total;
    };
    let total_tokens = next.total_tokens.or_else(|| {
        match (next.prompt_tokens, next.completion_tokens) {
            (None, None) => None,
            (prompt, completion) => Some(prompt.unwrap_or(0) + completion.unwrap_or(0)),
        }
    });
    ProviderUsage {
        prompt_tokens: Some(total.prompt_tokens.unwrap_or(0) + next.prompt_tokens.unwrap_or(0)),
        completion_tokens: Some(
            total.completion_tokens.unwrap_or(0) + next.completion_tokens.unwrap_or(0),
        ),
        total_tokens: Some(total.total_tokens.unwrap_or(0) + total_tokens.unwrap_or(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u64, completion: u64, total: Option<u64>) -> Option<ProviderUsage> {
        Some(ProviderUsage {
            prompt_tokens: Some(prompt),
            completion_tokens: Some(completion),
            total_tokens: total,
        })
    }

    #[test]
    fn accumulates_calls_failures_and_tokens() {
        let mut ledger = UsageLedger::new();
        ledger.record_success(usage(10, 5, Some(15)));
        ledger.record_failure(None);
        ledger.record_success(None);
        ledger.record_success(usage(4, 6, None));

        assert_eq!(ledger.calls(), 4);
        assert_eq!(ledger.failures(), 1);
        assert_eq!(ledger.usage().prompt_tokens, Some(14));
        assert_eq!(ledger.usage().completion_tokens, Some(11));
        assert_eq!(ledger.usage().total_tokens, Some(25));
    }
}
