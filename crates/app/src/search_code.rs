//! Query router: resolve a query path to its owning indexed collection, run
//! the search, and post-filter to the requested subtree.

use crate::registry::CodebaseRegistry;
use crate::semantic_search::{semantic_search, SemanticSearchDeps, SemanticSearchInput};
use semindex_domain::{IndexMode, SearchHit};
use semindex_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on `limit` accepted from callers.
pub const MAX_SEARCH_LIMIT: u32 = 50;

/// Input for a routed search.
#[derive(Debug, Clone)]
pub struct SearchCodeInput {
    /// Absolute canonical query path (a registered root or any path under
    /// one).
    pub path: PathBuf,
    /// Query text.
    pub query: Box<str>,
    /// Maximum hits (clamped to [`MAX_SEARCH_LIMIT`]).
    pub limit: u32,
    /// Restrict hits to these extensions (without leading dots).
    pub extension_filter: Vec<Box<str>>,
    /// Optional score threshold.
    pub threshold: Option<f32>,
}

/// Dependencies for routing.
#[derive(Clone)]
pub struct SearchCodeDeps {
    /// Registry for containment resolution.
    pub registry: Arc<CodebaseRegistry>,
    /// Search dependencies.
    pub search: SemanticSearchDeps,
    /// Mode the registry's collections were created with.
    pub index_mode: IndexMode,
}

/// Route and execute a search.
pub async fn search_code(
    ctx: &RequestContext,
    deps: &SearchCodeDeps,
    input: SearchCodeInput,
) -> Result<Vec<SearchHit>> {
    ctx.ensure_live("search_code")?;

    let record = deps
        .registry
        .find_containing_index(&input.path)
        .await
        .ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::not_indexed(),
                "no indexed codebase contains this path",
            )
            .with_metadata("path", input.path.to_string_lossy().to_string())
        })?;

    let limit = input.limit.clamp(1, MAX_SEARCH_LIMIT);
    let mut hits = semantic_search(
        ctx,
        &deps.search,
        SemanticSearchInput {
            collection_name: record.collection_name.clone(),
            index_mode: deps.index_mode,
            query: input.query.clone(),
            top_k: limit,
            threshold: input.threshold,
            filter_expr: None,
        },
    )
    .await?;

    let root = Path::new(record.root_path.as_ref());
    if root != input.path.as_path() {
        if let Some(prefix) = subtree_prefix(root, &input.path) {
            hits.retain(|hit| under_prefix(&hit.key.relative_path, &prefix));
        }
    }

    if !input.extension_filter.is_empty() {
        let allowed: Vec<String> = input
            .extension_filter
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        hits.retain(|hit| {
            hit.key
                .relative_path
                .rsplit_once('.')
                .is_some_and(|(_, ext)| allowed.iter().any(|allow| allow == &ext.to_ascii_lowercase()))
        });
    }

    hits.truncate(limit as usize);
    Ok(hits)
}

/// The query path relative to the owning root, `/`-separated.
fn subtree_prefix(root: &Path, query_path: &Path) -> Option<String> {
    let stripped = query_path.strip_prefix(root).ok()?;
    let raw = stripped.to_string_lossy().replace('\\', "/");
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn under_prefix(relative_path: &str, prefix: &str) -> bool {
    relative_path == prefix
        || relative_path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_codebase::test_support::{MemoryStore, StubEmbedding};
    use semindex_domain::IndexStats;
    use semindex_ports::{
        BoxFuture, RegistrySnapshot, RegistryStorePort, ScoredDocument, VectorStorePort,
    };

    struct NullRegistryStore;

    impl RegistryStorePort for NullRegistryStore {
        fn load(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<RegistrySnapshot>> {
            Box::pin(async move { Ok(RegistrySnapshot::default()) })
        }

        fn save(
            &self,
            _ctx: &RequestContext,
            _snapshot: RegistrySnapshot,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    async fn deps_with_indexed_root(root: &str) -> (Arc<MemoryStore>, SearchCodeDeps) {
        let ctx = RequestContext::for_request();
        let registry = Arc::new(
            CodebaseRegistry::load(&ctx, Arc::new(NullRegistryStore), IndexMode::Dense, None)
                .await
                .expect("registry"),
        );
        let record = registry.register(&ctx, Path::new(root)).await.expect("register");
        registry
            .set_indexed(&ctx, Path::new(root), IndexStats { files: 1, chunks: 3 })
            .await
            .expect("indexed");

        let store = MemoryStore::new();
        store
            .create_collection(&ctx, record.collection_name.clone(), 4, None)
            .await
            .expect("collection");

        let deps = SearchCodeDeps {
            registry,
            search: SemanticSearchDeps {
                embedding: StubEmbedding::new(),
                store: Arc::clone(&store) as Arc<dyn VectorStorePort>,
                logger: None,
            },
            index_mode: IndexMode::Dense,
        };
        (store, deps)
    }

    fn input(path: &str) -> SearchCodeInput {
        SearchCodeInput {
            path: PathBuf::from(path),
            query: "query".into(),
            limit: 10,
            extension_filter: Vec::new(),
            threshold: Some(0.0),
        }
    }

    #[tokio::test]
    async fn unregistered_paths_surface_not_indexed() {
        let (_store, deps) = deps_with_indexed_root("/repo").await;
        let ctx = RequestContext::for_request();

        let error = search_code(&ctx, &deps, input("/elsewhere"))
            .await
            .expect_err("must fail");
        assert_eq!(error.code, ErrorCode::not_indexed());
    }

    #[tokio::test]
    async fn subtree_queries_reuse_the_parent_collection() -> Result<()> {
        let (store, deps) = deps_with_indexed_root("/repo").await;
        store.set_search_results(vec![
            ScoredDocument {
                document: MemoryStore::stored_doc("pkg/inner.rs", 1, 2),
                score: 0.9,
            },
            ScoredDocument {
                document: MemoryStore::stored_doc("pkg2/other.rs", 1, 2),
                score: 0.8,
            },
            ScoredDocument {
                document: MemoryStore::stored_doc("top.rs", 1, 2),
                score: 0.7,
            },
        ]);

        let ctx = RequestContext::for_request();
        let hits = search_code(&ctx, &deps, input("/repo/pkg")).await?;

        let paths: Vec<&str> = hits
            .iter()
            .map(|hit| hit.key.relative_path.as_ref())
            .collect();
        assert_eq!(paths, vec!["pkg/inner.rs"], "pkg2 must not leak into pkg");
        Ok(())
    }

    #[tokio::test]
    async fn root_queries_return_everything() -> Result<()> {
        let (store, deps) = deps_with_indexed_root("/repo").await;
        store.set_search_results(vec![ScoredDocument {
            document: MemoryStore::stored_doc("src/lib.rs", 1, 2),
            score: 0.6,
        }]);

        let ctx = RequestContext::for_request();
        let hits = search_code(&ctx, &deps, input("/repo")).await?;
        assert_eq!(hits.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn extension_filter_keeps_matching_hits_only() -> Result<()> {
        let (store, deps) = deps_with_indexed_root("/repo").await;
        store.set_search_results(vec![
            ScoredDocument {
                document: MemoryStore::stored_doc("a.rs", 1, 2),
                score: 0.9,
            },
            ScoredDocument {
                document: MemoryStore::stored_doc("b.py", 1, 2),
                score: 0.8,
            },
        ]);

        let ctx = RequestContext::for_request();
        let mut request = input("/repo");
        request.extension_filter = vec![".py".into()];
        let hits = search_code(&ctx, &deps, request).await?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.relative_path.as_ref(), "b.py");
        Ok(())
    }

    #[tokio::test]
    async fn limit_is_clamped_to_the_contract_maximum() -> Result<()> {
        let (store, deps) = deps_with_indexed_root("/repo").await;
        store.set_search_results(
            (0..60)
                .map(|index| ScoredDocument {
                    document: MemoryStore::stored_doc(&format!("f{index}.rs"), 1, 2),
                    score: 1.0 - index as f32 / 100.0,
                })
                .collect(),
        );

        let ctx = RequestContext::for_request();
        let mut request = input("/repo");
        request.limit = 500;
        let hits = search_code(&ctx, &deps, request).await?;
        assert!(hits.len() <= MAX_SEARCH_LIMIT as usize);
        Ok(())
    }
}
