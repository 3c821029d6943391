//! Local Ollama embeddings adapter.

use super::{ensure_count, map_http_status, map_transport_error, ProviderHttpConfig};
use semindex_config::provider_max_batch_size;
use semindex_domain::ProviderId;
use semindex_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector};
use semindex_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "nomic-embed-text";
const PROBE_TEXT: &str = "dimension probe";

/// Ollama `/api/embed` client. No authentication.
pub struct OllamaEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    endpoint: Box<str>,
    model: Box<str>,
    dimension_override: Option<u32>,
}

impl OllamaEmbedding {
    /// Build the adapter from provider configuration.
    pub fn new(config: &ProviderHttpConfig) -> Result<Self> {
        let id = ProviderId::parse("ollama").map_err(ErrorEnvelope::from)?;
        let max_batch_size = provider_max_batch_size(&id);
        let base_url = config.resolved_base_url(DEFAULT_BASE_URL);

        Ok(Self {
            provider: EmbeddingProviderInfo {
                id,
                name: "Ollama".into(),
                max_batch_size,
            },
            client: config.build_client("ollama")?,
            endpoint: format!("{base_url}/api/embed").into_boxed_str(),
            model: config.resolved_model(DEFAULT_MODEL),
            dimension_override: config.dimension,
        })
    }

    async fn request_embeddings(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
    ) -> Result<Vec<EmbeddingVector>> {
        ctx.ensure_live("embedding.ollama")?;
        let expected = texts.len();
        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(
                ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", "embedding.ollama")
            ),
            result = self.client.post(self.endpoint.as_ref()).json(&request).send() => {
                result.map_err(|error| map_transport_error("ollama", &error))?
            }
        };

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| map_transport_error("ollama", &error))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorResponse>(&payload)
                .map(|parsed| parsed.error)
                .unwrap_or_default();
            return Err(map_http_status("ollama", status, &detail));
        }

        let decoded: EmbedResponse = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                format!("failed to decode Ollama response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;
        ensure_count("ollama", expected, decoded.embeddings.len())?;

        Ok(decoded
            .embeddings
            .into_iter()
            .map(|embedding| EmbeddingVector::new(Arc::from(embedding)))
            .collect())
    }
}

impl EmbeddingPort for OllamaEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Some(dimension) = self.dimension_override {
                return Ok(dimension);
            }
            let vectors = self
                .request_embeddings(&ctx, vec![PROBE_TEXT.into()])
                .await?;
            vectors
                .first()
                .map(EmbeddingVector::dimension)
                .ok_or_else(|| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::new("embedding", "invalid_response"),
                        "Ollama probe returned no embedding",
                        ErrorClass::NonRetriable,
                    )
                })
        })
    }

    fn embed(
        &self,
        ctx: &RequestContext,
        text: Box<str>,
    ) -> BoxFuture<'_, Result<EmbeddingVector>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let mut vectors = self.request_embeddings(&ctx, vec![text]).await?;
            vectors.pop().ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "invalid_response"),
                    "Ollama returned no embedding",
                    ErrorClass::NonRetriable,
                )
            })
        })
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        let ctx = ctx.clone();
        Box::pin(async move { self.request_embeddings(&ctx, texts).await })
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: Box<str>,
    input: Vec<Box<str>>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    error: String,
}
