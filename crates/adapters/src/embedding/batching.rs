//! Batching decorator enforcing the embedding-client contract: transparent
//! order-preserving sub-batching, input preprocessing, and bounded retries
//! for transient failures.

use semindex_ports::{BoxFuture, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector};
use semindex_shared::{retry_async, RequestContext, Result, RetryPolicy};
use std::sync::Arc;

const DEFAULT_MAX_TOKENS: usize = 8_192;

/// Wraps any [`EmbeddingPort`], upholding the batch-size and preprocessing
/// contract so providers only ever see well-formed, ceiling-sized batches.
pub struct BatchedEmbedding {
    inner: Arc<dyn EmbeddingPort>,
    target_batch_size: usize,
    max_input_chars: usize,
    retry: RetryPolicy,
}

impl BatchedEmbedding {
    /// Wrap `inner`, honoring `target_batch_size` when below its ceiling.
    #[must_use]
    pub fn new(inner: Arc<dyn EmbeddingPort>, target_batch_size: usize) -> Self {
        let ceiling = inner.provider().max_batch_size.max(1);
        Self {
            inner,
            target_batch_size: target_batch_size.clamp(1, ceiling),
            // Token budget approximated as four characters per token.
            max_input_chars: DEFAULT_MAX_TOKENS * 4,
            retry: RetryPolicy::transient(),
        }
    }

    /// Override the provider token budget (in tokens, not characters).
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_input_chars = max_tokens * 4;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The effective per-call batch size.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.target_batch_size
    }

    fn preprocess(&self, text: Box<str>) -> Box<str> {
        if text.is_empty() {
            return " ".into();
        }
        if text.chars().count() <= self.max_input_chars {
            return text;
        }
        text.chars().take(self.max_input_chars).collect::<String>().into_boxed_str()
    }
}

impl EmbeddingPort for BatchedEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        self.inner.provider()
    }

    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let inner = Arc::clone(&self.inner);
            retry_async(&ctx, self.retry, "embedding.detect_dimension", || {
                let ctx = ctx.clone();
                let inner = Arc::clone(&inner);
                async move { inner.detect_dimension(&ctx).await }
            })
            .await
        })
    }

    fn embed(
        &self,
        ctx: &RequestContext,
        text: Box<str>,
    ) -> BoxFuture<'_, Result<EmbeddingVector>> {
        let ctx = ctx.clone();
        let text = self.preprocess(text);
        Box::pin(async move {
            let inner = Arc::clone(&self.inner);
            let ctx_for_retry = ctx.clone();
            retry_async(&ctx_for_retry, self.retry, "embedding.embed", move || {
                let ctx = ctx.clone();
                let inner = Arc::clone(&inner);
                let text = text.clone();
                async move { inner.embed(&ctx, text).await }
            })
            .await
        })
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        texts: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let prepared: Vec<Box<str>> = texts
                .into_iter()
                .map(|text| self.preprocess(text))
                .collect();

            let mut vectors = Vec::with_capacity(prepared.len());
            for sub_batch in prepared.chunks(self.target_batch_size) {
                ctx.ensure_live("embedding.embed_batch")?;

                let inner = Arc::clone(&self.inner);
                let batch: Vec<Box<str>> = sub_batch.to_vec();
                let ctx_for_closure = ctx.clone();
                let ctx_for_retry = ctx.clone();
                let sub_vectors =
                    retry_async(&ctx_for_retry, self.retry, "embedding.embed_batch", move || {
                        let ctx = ctx_for_closure.clone();
                        let inner = Arc::clone(&inner);
                        let batch = batch.clone();
                        async move { inner.embed_batch(&ctx, batch).await }
                    })
                    .await?;
                vectors.extend(sub_vectors);
            }
            Ok(vectors)
        })
    }
}
