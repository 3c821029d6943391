//! Vector store boundary contract.

use crate::BoxFuture;
use semindex_domain::{CollectionName, Language, LineSpan, ProviderId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use semindex_shared::{RequestContext, Result};

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorStoreInfo {
    /// Stable identifier (e.g. `milvus_rest`).
    pub id: ProviderId,
    /// Human-readable name.
    pub name: Box<str>,
}

/// Metadata persisted with every chunk document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDocumentMetadata {
    /// Absolute canonical root of the owning codebase.
    pub codebase_path: Box<str>,
    /// Language hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Zero-based index of the chunk within its file.
    pub chunk_index: u32,
}

/// A chunk document prepared for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDocument {
    /// Deterministic `chunk_<hex16>` identifier.
    pub id: Box<str>,
    /// Dense embedding.
    pub vector: Arc<[f32]>,
    /// Raw chunk content.
    pub content: Box<str>,
    /// Path relative to the codebase root (`/` separators).
    pub relative_path: Box<str>,
    /// Line span of the chunk.
    pub span: LineSpan,
    /// File extension without the leading dot.
    pub file_extension: Option<Box<str>>,
    /// Additional metadata.
    pub metadata: ChunkDocumentMetadata,
}

/// A document returned from search (no embedding payload).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document identifier.
    pub id: Box<str>,
    /// Chunk content.
    pub content: Box<str>,
    /// Path relative to the codebase root.
    pub relative_path: Box<str>,
    /// Line span.
    pub span: LineSpan,
    /// File extension without the leading dot.
    pub file_extension: Option<Box<str>>,
    /// Language hint.
    pub language: Option<Language>,
}

/// A scored search result.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    /// The matching document.
    pub document: StoredDocument,
    /// Similarity (dense) or fused (hybrid) score.
    pub score: f32,
}

/// Options for dense search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseSearchOptions {
    /// Maximum results.
    pub top_k: u32,
    /// Drop hits scoring below this value.
    pub threshold: Option<f32>,
    /// Provider-specific scalar filter.
    pub filter_expr: Option<Box<str>>,
}

/// One sub-request of a hybrid search.
#[derive(Debug, Clone, PartialEq)]
pub enum HybridSubQuery {
    /// Dense nearest-neighbor over the `vector` field.
    Dense {
        /// Query embedding.
        vector: Arc<[f32]>,
        /// Result limit for this sub-query.
        limit: u32,
    },
    /// Sparse (text) search over the `sparse_vector` field.
    Sparse {
        /// Query text; the adapter derives the sparse representation.
        query: Box<str>,
        /// Result limit for this sub-query.
        limit: u32,
    },
}

/// Options for hybrid search.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridSearchOptions {
    /// RRF constant `k`.
    pub rrf_k: u32,
    /// Global result limit after fusion.
    pub limit: u32,
    /// Provider-specific scalar filter applied to both sub-queries.
    pub filter_expr: Option<Box<str>>,
}

/// A row returned from a scalar query.
pub type StoreRow = BTreeMap<Box<str>, Value>;

/// Boundary contract for vector storage and retrieval.
///
/// Implementations MUST be safe for concurrent use on different documents and
/// MUST surface the account collection ceiling via `check_collection_limit`
/// (false, without side effects) so callers can return the canonical
/// `store:collection_limit_reached` error instead of attempting a create.
pub trait VectorStorePort: Send + Sync {
    /// Provider descriptor.
    fn provider(&self) -> &VectorStoreInfo;

    /// True when the collection exists.
    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Create a dense-only collection. Fails if the name exists.
    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        dimension: u32,
        description: Option<Box<str>>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Create a hybrid (dense + sparse) collection. Fails if the name exists.
    fn create_hybrid_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        dimension: u32,
        description: Option<Box<str>>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Drop a collection (missing collections are not an error).
    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// List collection names.
    fn list_collections(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CollectionName>>>;

    /// Returns false when the backend refuses further collections.
    fn check_collection_limit(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<bool>>;

    /// Insert into a dense collection.
    fn insert(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        documents: Vec<ChunkDocument>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Insert into a hybrid collection; the adapter derives sparse vectors
    /// from content and splits oversized payloads into multiple RPCs.
    fn insert_hybrid(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        documents: Vec<ChunkDocument>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Scalar query by filter expression.
    fn query(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        filter: Box<str>,
        output_fields: Vec<Box<str>>,
        limit: Option<u32>,
    ) -> BoxFuture<'_, Result<Vec<StoreRow>>>;

    /// Dense nearest-neighbor search.
    fn search(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        vector: Arc<[f32]>,
        options: DenseSearchOptions,
    ) -> BoxFuture<'_, Result<Vec<ScoredDocument>>>;

    /// Hybrid search with RRF fusion; dense rank breaks ties.
    fn hybrid_search(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        sub_queries: Vec<HybridSubQuery>,
        options: HybridSearchOptions,
    ) -> BoxFuture<'_, Result<Vec<ScoredDocument>>>;

    /// Delete documents by id.
    fn delete(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        ids: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>>;
}

/// Escape a string literal for the store's scalar filter dialect.
#[must_use]
pub fn escape_filter_literal(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Build a `field == "value"` filter with proper escaping.
#[must_use]
pub fn eq_filter(field: &str, value: &str) -> Box<str> {
    format!("{field} == \"{}\"", escape_filter_literal(value)).into_boxed_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_literals_are_escaped() {
        assert_eq!(
            eq_filter("relativePath", "a\\b\"c.rs").as_ref(),
            "relativePath == \"a\\\\b\\\"c.rs\""
        );
    }
}
