//! OpenAI embeddings adapter.

use super::{ensure_count, map_http_status, map_transport_error, ProviderHttpConfig};
use semindex_config::provider_max_batch_size;
use semindex_domain::ProviderId;
use semindex_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector};
use semindex_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const PROBE_TEXT: &str = "dimension probe";

/// OpenAI `/embeddings` client.
#[derive(Debug)]
pub struct OpenAiEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    endpoint: Box<str>,
    api_key: Box<str>,
    model: Box<str>,
    dimension_override: Option<u32>,
}

impl OpenAiEmbedding {
    /// Build the adapter from provider configuration.
    pub fn new(config: &ProviderHttpConfig) -> Result<Self> {
        let api_key = config.require_api_key("openai")?;
        let id = ProviderId::parse("openai").map_err(ErrorEnvelope::from)?;
        let max_batch_size = provider_max_batch_size(&id);
        let base_url = config.resolved_base_url(DEFAULT_BASE_URL);

        Ok(Self {
            provider: EmbeddingProviderInfo {
                id,
                name: "OpenAI".into(),
                max_batch_size,
            },
            client: config.build_client("openai")?,
            endpoint: format!("{base_url}/embeddings").into_boxed_str(),
            api_key,
            model: config.resolved_model(DEFAULT_MODEL),
            dimension_override: config.dimension,
        })
    }

    async fn request_embeddings(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
    ) -> Result<Vec<EmbeddingVector>> {
        ctx.ensure_live("embedding.openai")?;
        let expected = texts.len();
        let request = EmbeddingsRequest {
            model: self.model.clone(),
            input: texts,
            dimensions: self.dimension_override,
        };

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(
                ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", "embedding.openai")
            ),
            result = self
                .client
                .post(self.endpoint.as_ref())
                .bearer_auth(self.api_key.as_ref())
                .json(&request)
                .send() => result.map_err(|error| map_transport_error("openai", &error))?,
        };

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| map_transport_error("openai", &error))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorResponse>(&payload)
                .map(|parsed| parsed.error.message)
                .unwrap_or_default();
            return Err(map_http_status("openai", status, &detail));
        }

        let decoded: EmbeddingsResponse = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                format!("failed to decode OpenAI response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;
        ensure_count("openai", expected, decoded.data.len())?;

        // Responses may arrive out of order; the index field is authoritative.
        let mut slots: Vec<Option<EmbeddingVector>> = vec![None; expected];
        for datum in decoded.data {
            let slot = slots.get_mut(datum.index).ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "invalid_response"),
                    "OpenAI response index out of range",
                    ErrorClass::NonRetriable,
                )
            })?;
            *slot = Some(EmbeddingVector::new(Arc::from(datum.embedding)));
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::new("embedding", "invalid_response"),
                        "OpenAI response missing an index",
                        ErrorClass::NonRetriable,
                    )
                })
            })
            .collect()
    }
}

impl EmbeddingPort for OpenAiEmbedding {
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
                        "OpenAI probe returned no embedding",
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
                    "OpenAI returned no embedding",
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
struct EmbeddingsRequest {
    model: Box<str>,
    input: Vec<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ProviderHttpConfig {
        ProviderHttpConfig {
            api_key: Some("sk-test".into()),
            model: None,
            base_url: Some("http://localhost:9".into()),
            dimension: Some(4),
            timeout_ms: 1_000,
        }
    }

    #[test]
    fn request_serializes_inputs_and_dimensions() {
        let request = EmbeddingsRequest {
            model: "text-embedding-3-small".into(),
            input: vec!["a".into(), "b".into()],
            dimensions: Some(4),
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            json!({
                "model": "text-embedding-3-small",
                "input": ["a", "b"],
                "dimensions": 4
            })
        );
    }

    #[tokio::test]
    async fn detect_dimension_prefers_the_override() -> Result<()> {
        let adapter = OpenAiEmbedding::new(&config())?;
        let ctx = RequestContext::for_request();
        assert_eq!(adapter.detect_dimension(&ctx).await?, 4);
        Ok(())
    }

    #[test]
    fn provider_info_carries_the_batch_ceiling() -> Result<()> {
        let adapter = OpenAiEmbedding::new(&config())?;
        assert_eq!(adapter.provider().max_batch_size, 2_048);
        assert_eq!(adapter.provider().id.as_str(), "openai");
        Ok(())
    }

    #[test]
    fn missing_key_fails_with_authentication() {
        let mut bad = config();
        bad.api_key = None;
        let error = OpenAiEmbedding::new(&bad).expect_err("must fail");
        assert_eq!(error.code, ErrorCode::new("embedding", "authentication"));
    }
}
