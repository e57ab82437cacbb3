use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

pub(crate) fn is_rate_limited(status: u16, body: &str) -> bool {
    if status == 429 || status == 529 || status == 503 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("quota")
        || lower.contains("overloaded")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    None
}

/// `base * 2^attempt`, capped at `max`. `attempt` counts from zero.
pub(crate) fn backoff_delay(base: Duration, max: Duration, attempt: usize) -> Duration {
    let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Sleeps before the next attempt, honouring a longer server hint.
pub(crate) async fn wait_before_retry(
    label: &str,
    attempt: usize,
    max_attempts: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) {
    let mut wait = delay;
    if let Some(retry_after) = retry_after
        && retry_after > wait
    {
        wait = retry_after;
    }
    info!(
        "{} retrying in {:.1}s (attempt {}/{})",
        label,
        wait.as_secs_f32(),
        attempt + 1,
        max_attempts
    );
    sleep(wait).await;
}
