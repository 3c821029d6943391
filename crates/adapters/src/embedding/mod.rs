//! Embedding provider adapters and the batching decorator.

mod batching;
mod gemini;
mod ollama;
mod openai;
mod voyage;

pub use batching::BatchedEmbedding;
pub use gemini::GeminiEmbedding;
pub use ollama::OllamaEmbedding;
pub use openai::OpenAiEmbedding;
pub use voyage::VoyageEmbedding;

use semindex_shared::{ErrorClass, ErrorCode, ErrorEnvelope, Result};
use std::time::Duration;

/// Common HTTP configuration for provider adapters.
#[derive(Debug, Clone)]
pub struct ProviderHttpConfig {
    /// API key; required by every provider except Ollama.
    pub api_key: Option<Box<str>>,
    /// Model override.
    pub model: Option<Box<str>>,
    /// Base URL override.
    pub base_url: Option<Box<str>>,
    /// Output dimension override.
    pub dimension: Option<u32>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl ProviderHttpConfig {
    pub(crate) fn require_api_key(&self, provider: &str) -> Result<Box<str>> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_owned().into_boxed_str()),
            _ => Err(ErrorEnvelope::expected(
                ErrorCode::new("embedding", "authentication"),
                format!("{provider} api key must be set"),
            )),
        }
    }

    pub(crate) fn resolved_base_url(&self, default: &str) -> Box<str> {
        let raw = self.base_url.as_deref().unwrap_or(default).trim();
        raw.trim_end_matches('/').to_owned().into_boxed_str()
    }

    pub(crate) fn resolved_model(&self, default: &str) -> Box<str> {
        match self.model.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => model.to_owned().into_boxed_str(),
            _ => default.to_owned().into_boxed_str(),
        }
    }

    pub(crate) fn build_client(&self, provider: &str) -> Result<reqwest::Client> {
        if self.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "timeout must be greater than zero",
            ));
        }
        reqwest::Client::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "client_init_failed"),
                    format!("failed to build {provider} client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })
    }
}

/// Map transport-layer failures onto the embedding error taxonomy.
pub(crate) fn map_transport_error(provider: &str, error: &reqwest::Error) -> ErrorEnvelope {
    if error.is_timeout() {
        return ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "transport"),
            format!("{provider} request timed out"),
            ErrorClass::Retriable,
        );
    }
    if error.is_connect() {
        return ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "transport"),
            format!("{provider} connection failed: {error}"),
            ErrorClass::Retriable,
        );
    }
    ErrorEnvelope::unexpected(
        ErrorCode::new("embedding", "transport"),
        format!("{provider} request failed: {error}"),
        ErrorClass::NonRetriable,
    )
}

/// Map non-success HTTP statuses onto the embedding error taxonomy.
pub(crate) fn map_http_status(
    provider: &str,
    status: reqwest::StatusCode,
    detail: &str,
) -> ErrorEnvelope {
    let message = if detail.trim().is_empty() {
        format!("{provider} request failed with status {status}")
    } else {
        format!("{provider}: {detail}")
    };

    match status.as_u16() {
        401 | 403 => ErrorEnvelope::expected(
            ErrorCode::new("embedding", "authentication"),
            message,
        ),
        429 => ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "rate_limited"),
            message,
            ErrorClass::Retriable,
        ),
        408 => ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "transport"),
            message,
            ErrorClass::Retriable,
        ),
        _ if status.is_server_error() => ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "transport"),
            message,
            ErrorClass::Retriable,
        ),
        _ => ErrorEnvelope::expected(ErrorCode::new("embedding", "invalid_response"), message),
    }
    .with_metadata("status", status.as_u16().to_string())
}

/// Fail when the provider returned a different number of vectors than asked.
pub(crate) fn ensure_count(provider: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        return Ok(());
    }
    Err(ErrorEnvelope::unexpected(
        ErrorCode::new("embedding", "invalid_response"),
        format!("{provider} returned {actual} embeddings for {expected} inputs"),
        ErrorClass::NonRetriable,
    ))
}
