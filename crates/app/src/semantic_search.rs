//! Semantic search against one collection (dense or hybrid).

use semindex_domain::{compare_hits, CollectionName, IndexMode, SearchHit, SearchHitKey};
use semindex_ports::{
    DenseSearchOptions, EmbeddingPort, HybridSearchOptions, HybridSubQuery, LoggerPort,
    ScoredDocument, VectorStorePort,
};
use semindex_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::sync::Arc;

/// RRF constant used for hybrid fusion.
pub const HYBRID_RRF_K: u32 = 100;

/// Score threshold applied when the caller provides none.
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// Input for one search.
#[derive(Debug, Clone)]
pub struct SemanticSearchInput {
    /// Target collection.
    pub collection_name: CollectionName,
    /// Dense or hybrid, matching how the collection was created.
    pub index_mode: IndexMode,
    /// Query text.
    pub query: Box<str>,
    /// Maximum hits to return.
    pub top_k: u32,
    /// Score threshold; defaults to [`DEFAULT_THRESHOLD`].
    pub threshold: Option<f32>,
    /// Optional scalar filter forwarded to the store.
    pub filter_expr: Option<Box<str>>,
}

/// Dependencies for search.
#[derive(Clone)]
pub struct SemanticSearchDeps {
    /// Embedding client.
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Vector store.
    pub store: Arc<dyn VectorStorePort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Execute a search, returning hits in deterministic order.
pub async fn semantic_search(
    ctx: &RequestContext,
    deps: &SemanticSearchDeps,
    input: SemanticSearchInput,
) -> Result<Vec<SearchHit>> {
    ctx.ensure_live("semantic_search")?;

    let exists = deps
        .store
        .has_collection(ctx, input.collection_name.clone())
        .await?;
    if !exists {
        return Err(ErrorEnvelope::expected(
            ErrorCode::collection_missing(),
            "collection does not exist; the codebase may need re-indexing",
        )
        .with_metadata("collection", input.collection_name.as_str().to_owned()));
    }

    let top_k = input.top_k.max(1);
    let threshold = input.threshold.unwrap_or(DEFAULT_THRESHOLD);

    let vector = deps
        .embedding
        .embed(ctx, input.query.clone())
        .await?
        .into_vector();

    let scored = match input.index_mode {
        IndexMode::Dense => {
            deps.store
                .search(
                    ctx,
                    input.collection_name.clone(),
                    vector,
                    DenseSearchOptions {
                        top_k,
                        threshold: Some(threshold),
                        filter_expr: input.filter_expr.clone(),
                    },
                )
                .await?
        }
        IndexMode::Hybrid => {
            let mut fused = deps
                .store
                .hybrid_search(
                    ctx,
                    input.collection_name.clone(),
                    vec![
                        HybridSubQuery::Dense {
                            vector,
                            limit: top_k,
                        },
                        HybridSubQuery::Sparse {
                            query: input.query.clone(),
                            limit: top_k,
                        },
                    ],
                    HybridSearchOptions {
                        rrf_k: HYBRID_RRF_K,
                        limit: top_k,
                        filter_expr: input.filter_expr.clone(),
                    },
                )
                .await?;
            // Same default threshold as dense; the fused score is what it
            // compares to.
            fused.retain(|hit| hit.score >= threshold);
            fused
        }
    };

    let mut hits: Vec<SearchHit> = scored.into_iter().map(to_hit).collect();
    hits.sort_by(compare_hits);
    hits.truncate(top_k as usize);

    if let Some(logger) = deps.logger.as_ref() {
        let mut fields = semindex_ports::LogFields::new();
        fields.insert(
            "collection".into(),
            serde_json::Value::String(input.collection_name.as_str().to_owned()),
        );
        fields.insert("results".into(), serde_json::Value::from(hits.len()));
        logger.info("search.completed", "Semantic search completed", Some(fields));
    }
    Ok(hits)
}

fn to_hit(scored: ScoredDocument) -> SearchHit {
    SearchHit {
        key: SearchHitKey {
            relative_path: scored.document.relative_path,
            span: scored.document.span,
        },
        content: Some(scored.document.content),
        language: scored.document.language,
        score: scored.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_codebase::test_support::{MemoryStore, StubEmbedding};

    fn input(mode: IndexMode) -> SemanticSearchInput {
        SemanticSearchInput {
            collection_name: CollectionName::parse("code_chunks_search").expect("name"),
            index_mode: mode,
            query: "find the resolver".into(),
            top_k: 5,
            threshold: None,
            filter_expr: None,
        }
    }

    async fn create_collection(store: &MemoryStore) {
        let ctx = RequestContext::for_request();
        store
            .create_collection(
                &ctx,
                CollectionName::parse("code_chunks_search").expect("name"),
                4,
                None,
            )
            .await
            .expect("create");
    }

    #[tokio::test]
    async fn missing_collection_is_a_distinct_error() {
        let store = MemoryStore::new();
        let deps = SemanticSearchDeps {
            embedding: StubEmbedding::new(),
            store,
            logger: None,
        };
        let ctx = RequestContext::for_request();

        let error = semantic_search(&ctx, &deps, input(IndexMode::Dense))
            .await
            .expect_err("must fail");
        assert_eq!(error.code, ErrorCode::collection_missing());
    }

    #[tokio::test]
    async fn dense_results_are_ordered_and_truncated() -> Result<()> {
        let store = MemoryStore::new();
        create_collection(&store).await;
        store.set_search_results(vec![
            semindex_ports::ScoredDocument {
                document: MemoryStore::stored_doc("b.rs", 1, 2),
                score: 0.9,
            },
            semindex_ports::ScoredDocument {
                document: MemoryStore::stored_doc("a.rs", 1, 2),
                score: 0.9,
            },
            semindex_ports::ScoredDocument {
                document: MemoryStore::stored_doc("c.rs", 1, 2),
                score: 0.95,
            },
        ]);

        let deps = SemanticSearchDeps {
            embedding: StubEmbedding::new(),
            store,
            logger: None,
        };
        let ctx = RequestContext::for_request();
        let hits = semantic_search(&ctx, &deps, input(IndexMode::Dense)).await?;

        let paths: Vec<&str> = hits
            .iter()
            .map(|hit| hit.key.relative_path.as_ref())
            .collect();
        assert_eq!(paths, vec!["c.rs", "a.rs", "b.rs"]);
        Ok(())
    }

    #[tokio::test]
    async fn hybrid_mode_applies_the_default_threshold_to_fused_scores() -> Result<()> {
        let store = MemoryStore::new();
        create_collection(&store).await;
        store.set_search_results(vec![
            semindex_ports::ScoredDocument {
                document: MemoryStore::stored_doc("fused.rs", 3, 9),
                score: 0.45,
            },
            semindex_ports::ScoredDocument {
                document: MemoryStore::stored_doc("weak.rs", 1, 2),
                score: 0.02,
            },
        ]);

        let deps = SemanticSearchDeps {
            embedding: StubEmbedding::new(),
            store,
            logger: None,
        };
        let ctx = RequestContext::for_request();

        // No explicit threshold: the 0.3 default drops the weak fused hit.
        let hits = semantic_search(&ctx, &deps, input(IndexMode::Hybrid)).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.relative_path.as_ref(), "fused.rs");
        Ok(())
    }

    #[tokio::test]
    async fn hybrid_mode_honors_an_explicit_lower_threshold() -> Result<()> {
        let store = MemoryStore::new();
        create_collection(&store).await;
        store.set_search_results(vec![semindex_ports::ScoredDocument {
            document: MemoryStore::stored_doc("weak.rs", 1, 2),
            score: 0.02,
        }]);

        let deps = SemanticSearchDeps {
            embedding: StubEmbedding::new(),
            store,
            logger: None,
        };
        let ctx = RequestContext::for_request();

        let mut request = input(IndexMode::Hybrid);
        request.threshold = Some(0.0);
        let hits = semantic_search(&ctx, &deps, request).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.relative_path.as_ref(), "weak.rs");
        Ok(())
    }
}
