//! Google Gemini embeddings adapter.

use super::{ensure_count, map_http_status, map_transport_error, ProviderHttpConfig};
use semindex_config::provider_max_batch_size;
use semindex_domain::ProviderId;
use semindex_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector};
use semindex_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-embedding-001";
const PROBE_TEXT: &str = "dimension probe";

/// Gemini `batchEmbedContents` client.
pub struct GeminiEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    base_url: Box<str>,
    api_key: Box<str>,
    model: Box<str>,
    dimension_override: Option<u32>,
}

impl GeminiEmbedding {
    /// Build the adapter from provider configuration.
    pub fn new(config: &ProviderHttpConfig) -> Result<Self> {
        let api_key = config.require_api_key("gemini")?;
        let id = ProviderId::parse("gemini").map_err(ErrorEnvelope::from)?;
        let max_batch_size = provider_max_batch_size(&id);

        Ok(Self {
            provider: EmbeddingProviderInfo {
                id,
                name: "Gemini".into(),
                max_batch_size,
            },
            client: config.build_client("gemini")?,
            base_url: config.resolved_base_url(DEFAULT_BASE_URL),
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
        ctx.ensure_live("embedding.gemini")?;
        let expected = texts.len();
        let model_path = format!("models/{}", self.model);
        let request = BatchEmbedRequest {
            requests: texts
                .into_iter()
                .map(|text| EmbedContentRequest {
                    model: model_path.clone().into_boxed_str(),
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    output_dimensionality: self.dimension_override,
                })
                .collect(),
        };
        let endpoint = format!(
            "{}/{model_path}:batchEmbedContents?key={}",
            self.base_url, self.api_key
        );

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(
                ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", "embedding.gemini")
            ),
            result = self.client.post(&endpoint).json(&request).send() => {
                result.map_err(|error| map_transport_error("gemini", &error))?
            }
        };

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| map_transport_error("gemini", &error))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorResponse>(&payload)
                .map(|parsed| parsed.error.message)
                .unwrap_or_default();
            return Err(map_http_status("gemini", status, &detail));
        }

        let decoded: BatchEmbedResponse = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                format!("failed to decode Gemini response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;
        ensure_count("gemini", expected, decoded.embeddings.len())?;

        // Gemini preserves request order; there is no index field to check.
        Ok(decoded
            .embeddings
            .into_iter()
            .map(|embedding| EmbeddingVector::new(Arc::from(embedding.values)))
            .collect())
    }
}

impl EmbeddingPort for GeminiEmbedding {
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
                        "Gemini probe returned no embedding",
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
                    "Gemini returned no embedding",
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
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: Box<str>,
    content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: Box<str>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
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

    #[test]
    fn batch_request_shape_matches_the_api() {
        let request = BatchEmbedRequest {
            requests: vec![EmbedContentRequest {
                model: "models/gemini-embedding-001".into(),
                content: Content {
                    parts: vec![Part { text: "hello".into() }],
                },
                output_dimensionality: Some(8),
            }],
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            json!({
                "requests": [{
                    "model": "models/gemini-embedding-001",
                    "content": { "parts": [{ "text": "hello" }] },
                    "outputDimensionality": 8
                }]
            })
        );
    }

    #[test]
    fn provider_info_uses_the_gemini_ceiling() -> Result<()> {
        let adapter = GeminiEmbedding::new(&ProviderHttpConfig {
            api_key: Some("g-test".into()),
            model: None,
            base_url: None,
            dimension: None,
            timeout_ms: 1_000,
        })?;
        assert_eq!(adapter.provider().max_batch_size, 100);
        Ok(())
    }
}
