//! Voyage AI embeddings adapter.

use super::{ensure_count, map_http_status, map_transport_error, ProviderHttpConfig};
use semindex_config::provider_max_batch_size;
use semindex_domain::ProviderId;
use semindex_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector};
use semindex_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";
const DEFAULT_MODEL: &str = "voyage-code-3";
const PROBE_TEXT: &str = "dimension probe";

/// Voyage AI `/embeddings` client.
pub struct VoyageEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    endpoint: Box<str>,
    api_key: Box<str>,
    model: Box<str>,
    dimension_override: Option<u32>,
}

impl VoyageEmbedding {
    /// Build the adapter from provider configuration.
    pub fn new(config: &ProviderHttpConfig) -> Result<Self> {
        let api_key = config.require_api_key("voyageai")?;
        let id = ProviderId::parse("voyageai").map_err(ErrorEnvelope::from)?;
        let max_batch_size = provider_max_batch_size(&id);
        let base_url = config.resolved_base_url(DEFAULT_BASE_URL);

        Ok(Self {
            provider: EmbeddingProviderInfo {
                id,
                name: "Voyage AI".into(),
                max_batch_size,
            },
            client: config.build_client("voyageai")?,
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
        ctx.ensure_live("embedding.voyageai")?;
        let expected = texts.len();
        let request = EmbeddingsRequest {
            model: self.model.clone(),
            input: texts,
            output_dimension: self.dimension_override,
        };

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(
                ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", "embedding.voyageai")
            ),
            result = self
                .client
                .post(self.endpoint.as_ref())
                .bearer_auth(self.api_key.as_ref())
                .json(&request)
                .send() => result.map_err(|error| map_transport_error("voyageai", &error))?,
        };

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| map_transport_error("voyageai", &error))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorResponse>(&payload)
                .map(|parsed| parsed.detail)
                .unwrap_or_default();
            return Err(map_http_status("voyageai", status, &detail));
        }

        let decoded: EmbeddingsResponse = serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                format!("failed to decode Voyage response: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;
        ensure_count("voyageai", expected, decoded.data.len())?;

        let mut slots: Vec<Option<EmbeddingVector>> = vec![None; expected];
        for datum in decoded.data {
            let slot = slots.get_mut(datum.index).ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "invalid_response"),
                    "Voyage response index out of range",
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
                        "Voyage response missing an index",
                        ErrorClass::NonRetriable,
                    )
                })
            })
            .collect()
    }
}

impl EmbeddingPort for VoyageEmbedding {
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
                        "Voyage probe returned no embedding",
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
                    "Voyage returned no embedding",
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
    output_dimension: Option<u32>,
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
    #[serde(default)]
    detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_info_uses_the_voyage_ceiling() -> Result<()> {
        let adapter = VoyageEmbedding::new(&ProviderHttpConfig {
            api_key: Some("vk-test".into()),
            model: None,
            base_url: None,
            dimension: None,
            timeout_ms: 1_000,
        })?;
        assert_eq!(adapter.provider().max_batch_size, 128);
        assert_eq!(adapter.provider().id.as_str(), "voyageai");
        Ok(())
    }

    #[test]
    fn default_model_is_code_tuned() -> Result<()> {
        let adapter = VoyageEmbedding::new(&ProviderHttpConfig {
            api_key: Some("vk-test".into()),
            model: None,
            base_url: None,
            dimension: None,
            timeout_ms: 1_000,
        })?;
        assert_eq!(adapter.model.as_ref(), DEFAULT_MODEL);
        Ok(())
    }
}
