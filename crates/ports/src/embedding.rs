//! Embedding provider boundary contract.

use crate::BoxFuture;
use semindex_domain::ProviderId;
use semindex_shared::{RequestContext, Result};
use std::sync::Arc;

/// A dense embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    vector: Arc<[f32]>,
}

impl EmbeddingVector {
    /// Wrap a shared buffer.
    #[must_use]
    pub fn new(vector: Arc<[f32]>) -> Self {
        Self { vector }
    }

    /// Build from an owned vector.
    #[must_use]
    pub fn from_vec(vector: Vec<f32>) -> Self {
        Self::new(Arc::from(vector))
    }

    /// Borrow the components.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }

    /// Vector dimensionality.
    #[must_use]
    pub fn dimension(&self) -> u32 {
        u32::try_from(self.vector.len()).unwrap_or(0)
    }

    /// Consume into the shared buffer.
    #[must_use]
    pub fn into_vector(self) -> Arc<[f32]> {
        self.vector
    }
}

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingProviderInfo {
    /// Stable identifier (`openai`, `voyageai`, `gemini`, `ollama`).
    pub id: ProviderId,
    /// Human-readable name.
    pub name: Box<str>,
    /// The largest batch the provider accepts in one call.
    pub max_batch_size: usize,
}

/// Boundary contract for embedding generation.
///
/// `embed_batch` MUST preserve input order, splitting transparently when the
/// input exceeds `max_batch_size`. Authentication failures MUST surface with
/// the `embedding:authentication` code and never be retried.
pub trait EmbeddingPort: Send + Sync {
    /// Provider descriptor.
    fn provider(&self) -> &EmbeddingProviderInfo;

    /// Detect the vector dimension, probing with a short text if needed.
    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>>;

    /// Embed one text.
    fn embed(&self, ctx: &RequestContext, text: Box<str>) -> BoxFuture<'_, Result<EmbeddingVector>>;

    /// Embed a batch of texts, preserving order.
    fn embed_batch(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_reports_its_dimension() {
        let vector = EmbeddingVector::from_vec(vec![0.0, 0.5, 1.0]);
        assert_eq!(vector.dimension(), 3);
        assert_eq!(vector.as_slice().len(), 3);
    }
}
