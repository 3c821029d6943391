//! Provider factories: turn environment settings into adapter instances.

use semindex_adapters::embedding::{
    BatchedEmbedding, GeminiEmbedding, OllamaEmbedding, OpenAiEmbedding, ProviderHttpConfig,
    VoyageEmbedding,
};
use semindex_adapters::vectordb::milvus::{MilvusConfig, MilvusRestStore};
use semindex_config::{BackendEnv, EmbeddingProviderKind};
use semindex_ports::{EmbeddingPort, VectorStorePort};
use semindex_shared::Result;
use std::sync::Arc;

/// Build the configured embedding provider, wrapped in the batching
/// decorator that upholds the client contract.
pub fn build_embedding(env: &BackendEnv, target_batch_size: usize) -> Result<Arc<dyn EmbeddingPort>> {
    let config = ProviderHttpConfig {
        api_key: env.embedding.api_key.clone(),
        model: env.embedding.model.clone(),
        base_url: env.embedding.base_url.clone(),
        dimension: env.embedding.dimension,
        timeout_ms: env.embedding.timeout_ms,
    };

    let inner: Arc<dyn EmbeddingPort> = match env.embedding.kind {
        EmbeddingProviderKind::OpenAi => Arc::new(OpenAiEmbedding::new(&config)?),
        EmbeddingProviderKind::VoyageAi => Arc::new(VoyageEmbedding::new(&config)?),
        EmbeddingProviderKind::Gemini => Arc::new(GeminiEmbedding::new(&config)?),
        EmbeddingProviderKind::Ollama => Arc::new(OllamaEmbedding::new(&config)?),
    };

    Ok(Arc::new(BatchedEmbedding::new(inner, target_batch_size)))
}

/// Build the configured vector store adapter.
pub fn build_vector_store(env: &BackendEnv) -> Result<Arc<dyn VectorStorePort>> {
    let store = MilvusRestStore::new(&MilvusConfig {
        address: env.vector_store.address.clone(),
        token: env.vector_store.token.clone(),
        timeout_ms: env.vector_store.timeout_ms,
        collection_limit: None,
    })?;
    Ok(Arc::new(store))
}
