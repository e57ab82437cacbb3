use anyhow::{Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::settings::get_env;

mod openai;
pub(crate) mod retry;

pub use openai::OpenAI;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    /// Free-form reply text.
    pub text: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }
}

/// Failures reported by the remote translation service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} API error ({status}): {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("{service} returned an empty reply")]
    EmptyReply { service: &'static str },
}

impl ServiceError {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ServiceError::Status { retry_after, .. } => *retry_after,
            ServiceError::EmptyReply { .. } => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            ServiceError::Status {
                status, message, ..
            } => retry::is_rate_limited(*status, message),
            ServiceError::EmptyReply { .. } => false,
        }
    }
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;

pub trait Provider: Clone + Send + Sync {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    /// Sends the accumulated conversation and resolves to the reply text.
    fn complete(self) -> ProviderFuture;
}

/// The explicit key wins over `OPENAI_API_KEY`.
pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    get_env("OPENAI_API_KEY")
        .ok_or_else(|| anyhow!("API key not found (pass --key or set OPENAI_API_KEY)"))
}

/// Reads a retry hint from an error chain produced by a provider.
pub fn retry_hint(err: &anyhow::Error) -> Option<Duration> {
    err.downcast_ref::<ServiceError>()
        .and_then(ServiceError::retry_after)
}

pub fn is_rate_limit_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ServiceError>()
        .is_some_and(ServiceError::is_rate_limited)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_is_preferred() {
        assert_eq!(resolve_key(Some("  sk-test ")).expect("key"), "sk-test");
    }

    #[test]
    fn retry_hint_reads_service_errors_only() {
        let err: anyhow::Error = ServiceError::Status {
            service: "OpenAI",
            status: 429,
            message: "Too Many Requests".to_string(),
            retry_after: Some(Duration::from_secs(7)),
        }
        .into();
        assert_eq!(retry_hint(&err), Some(Duration::from_secs(7)));
        assert!(is_rate_limit_error(&err));
        assert_eq!(retry_hint(&anyhow!("connection reset")), None);
        assert!(!is_rate_limit_error(&anyhow!("connection reset")));
    }
}
