//! Milvus REST vector store adapter.
//!
//! Collections carry an `id` primary key, a dense `vector` field, scalar
//! chunk fields, and a JSON `metadata` field; hybrid collections add a
//! `sparse_vector` field populated deterministically from content. Hybrid
//! queries run the dense and sparse sub-searches and fuse them locally with
//! Reciprocal Rank Fusion, breaking ties by dense rank.

mod error;
pub mod sparse;

use error::{response_error, transport_error};
use semindex_domain::{CollectionName, Language, LineSpan, ProviderId};
use semindex_ports::{
    BoxFuture, ChunkDocument, DenseSearchOptions, HybridSearchOptions, HybridSubQuery,
    ScoredDocument, StoreRow, StoredDocument, VectorStoreInfo, VectorStorePort,
};
use semindex_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const MAX_INSERT_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;
const MAX_INSERT_ROWS: usize = 1_000;
const OUTPUT_FIELDS: &[&str] = &[
    "id",
    "content",
    "relativePath",
    "startLine",
    "endLine",
    "fileExtension",
    "metadata",
];

/// Milvus connection configuration.
#[derive(Debug, Clone)]
pub struct MilvusConfig {
    /// HTTP endpoint, e.g. `http://localhost:19530`.
    pub address: Box<str>,
    /// Optional bearer token.
    pub token: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Account-level collection ceiling, when known.
    pub collection_limit: Option<usize>,
}

/// Milvus REST implementation of [`VectorStorePort`].
pub struct MilvusRestStore {
    provider: VectorStoreInfo,
    client: reqwest::Client,
    base_url: Box<str>,
    token: Option<Box<str>>,
    collection_limit: Option<usize>,
}

impl MilvusRestStore {
    /// Build the adapter from connection configuration.
    pub fn new(config: &MilvusConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("store", "connect"),
                    format!("failed to build milvus client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Self {
            provider: VectorStoreInfo {
                id: ProviderId::parse("milvus_rest").map_err(ErrorEnvelope::from)?,
                name: "Milvus (REST)".into(),
            },
            client,
            base_url: config.address.trim_end_matches('/').to_owned().into_boxed_str(),
            token: config.token.clone(),
            collection_limit: config.collection_limit,
        })
    }

    async fn post(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        path: &str,
        body: Value,
    ) -> Result<Value> {
        ctx.ensure_live(operation)?;

        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(
                ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", operation)
            ),
            result = request.send() => result.map_err(|error| transport_error(operation, &error))?,
        };

        let payload: Value = response
            .json()
            .await
            .map_err(|error| transport_error(operation, &error))?;

        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown backend error");
            return Err(response_error(operation, code, message));
        }
        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn create_with_schema(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        dimension: u32,
        description: Option<Box<str>>,
        hybrid: bool,
    ) -> Result<()> {
        if self
            .post(
                ctx,
                "has_collection",
                "/v2/vectordb/collections/has",
                json!({ "collectionName": collection.as_str() }),
            )
            .await?
            .get("has")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("store", "schema"),
                "collection already exists",
            )
            .with_metadata("collection", collection.as_str().to_owned()));
        }

        let mut fields = vec![
            json!({
                "fieldName": "id",
                "dataType": "VarChar",
                "isPrimary": true,
                "elementTypeParams": { "max_length": "64" }
            }),
            json!({
                "fieldName": "vector",
                "dataType": "FloatVector",
                "elementTypeParams": { "dim": dimension.to_string() }
            }),
            json!({
                "fieldName": "content",
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": "65535" }
            }),
            json!({
                "fieldName": "relativePath",
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": "1024" }
            }),
            json!({ "fieldName": "startLine", "dataType": "Int64" }),
            json!({ "fieldName": "endLine", "dataType": "Int64" }),
            json!({
                "fieldName": "fileExtension",
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": "32" }
            }),
            json!({ "fieldName": "metadata", "dataType": "JSON" }),
        ];
        let mut index_params = vec![json!({
            "fieldName": "vector",
            "indexName": "vector_index",
            "metricType": "COSINE",
            "indexType": "AUTOINDEX"
        })];
        if hybrid {
            fields.push(json!({
                "fieldName": "sparse_vector",
                "dataType": "SparseFloatVector"
            }));
            index_params.push(json!({
                "fieldName": "sparse_vector",
                "indexName": "sparse_index",
                "metricType": "IP",
                "indexType": "SPARSE_INVERTED_INDEX"
            }));
        }

        self.post(
            ctx,
            "create_collection",
            "/v2/vectordb/collections/create",
            json!({
                "collectionName": collection.as_str(),
                "description": description.as_deref().unwrap_or(""),
                "schema": {
                    "autoId": false,
                    "enableDynamicField": false,
                    "fields": fields
                },
                "indexParams": index_params
            }),
        )
        .await?;
        Ok(())
    }

    async fn insert_rows(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        documents: Vec<ChunkDocument>,
        hybrid: bool,
    ) -> Result<()> {
        for batch in split_for_insert(documents) {
            let rows: Vec<Value> = batch.iter().map(|doc| document_row(doc, hybrid)).collect();
            self.post(
                ctx,
                "insert",
                "/v2/vectordb/entities/insert",
                json!({
                    "collectionName": collection.as_str(),
                    "data": rows
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn search_ranked(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        anns_field: &str,
        data: Value,
        limit: u32,
        filter_expr: Option<&str>,
    ) -> Result<Vec<ScoredDocument>> {
        let mut body = json!({
            "collectionName": collection.as_str(),
            "data": [data],
            "annsField": anns_field,
            "limit": limit,
            "outputFields": OUTPUT_FIELDS,
        });
        if let Some(filter) = filter_expr {
            if let Some(object) = body.as_object_mut() {
                object.insert("filter".to_owned(), Value::String(filter.to_owned()));
            }
        }

        let data = self
            .post(ctx, "search", "/v2/vectordb/entities/search", body)
            .await?;
        let rows = data.as_array().cloned().unwrap_or_default();
        rows.into_iter()
            .map(|row| {
                let score = row
                    .get("distance")
                    .and_then(Value::as_f64)
                    .unwrap_or_default() as f32;
                Ok(ScoredDocument {
                    document: parse_document(&row)?,
                    score,
                })
            })
            .collect()
    }
}

impl VectorStorePort for MilvusRestStore {
    fn provider(&self) -> &VectorStoreInfo {
        &self.provider
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let data = self
                .post(
                    &ctx,
                    "has_collection",
                    "/v2/vectordb/collections/has",
                    json!({ "collectionName": collection.as_str() }),
                )
                .await?;
            Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
        })
    }

    fn create_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        dimension: u32,
        description: Option<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.create_with_schema(&ctx, collection, dimension, description, false)
                .await
        })
    }

    fn create_hybrid_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        dimension: u32,
        description: Option<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.create_with_schema(&ctx, collection, dimension, description, true)
                .await
        })
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.post(
                &ctx,
                "drop_collection",
                "/v2/vectordb/collections/drop",
                json!({ "collectionName": collection.as_str() }),
            )
            .await?;
            Ok(())
        })
    }

    fn list_collections(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<CollectionName>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let data = self
                .post(
                    &ctx,
                    "list_collections",
                    "/v2/vectordb/collections/list",
                    json!({}),
                )
                .await?;
            let names = data.as_array().cloned().unwrap_or_default();
            Ok(names
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|name| CollectionName::parse(name).ok())
                .collect())
        })
    }

    fn check_collection_limit(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let Some(limit) = self.collection_limit else {
                return Ok(true);
            };
            let existing = self.list_collections(&ctx).await?;
            Ok(existing.len() < limit)
        })
    }

    fn insert(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        documents: Vec<ChunkDocument>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move { self.insert_rows(&ctx, &collection, documents, false).await })
    }

    fn insert_hybrid(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        documents: Vec<ChunkDocument>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move { self.insert_rows(&ctx, &collection, documents, true).await })
    }

    fn query(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        filter: Box<str>,
        output_fields: Vec<Box<str>>,
        limit: Option<u32>,
    ) -> BoxFuture<'_, Result<Vec<StoreRow>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let mut body = json!({
                "collectionName": collection.as_str(),
                "filter": filter.as_ref(),
                "outputFields": output_fields
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<&str>>(),
            });
            if let Some(limit) = limit {
                if let Some(object) = body.as_object_mut() {
                    object.insert("limit".to_owned(), Value::from(limit));
                }
            }
            let data = self
                .post(&ctx, "query", "/v2/vectordb/entities/query", body)
                .await?;
            let rows = data.as_array().cloned().unwrap_or_default();
            Ok(rows
                .into_iter()
                .filter_map(|row| row.as_object().cloned())
                .map(object_to_store_row)
                .collect())
        })
    }

    fn search(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        vector: Arc<[f32]>,
        options: DenseSearchOptions,
    ) -> BoxFuture<'_, Result<Vec<ScoredDocument>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let data = Value::from(vector.iter().copied().collect::<Vec<f32>>());
            let mut hits = self
                .search_ranked(
                    &ctx,
                    &collection,
                    "vector",
                    data,
                    options.top_k.max(1),
                    options.filter_expr.as_deref(),
                )
                .await?;
            if let Some(threshold) = options.threshold {
                hits.retain(|hit| hit.score >= threshold);
            }
            Ok(hits)
        })
    }

    fn hybrid_search(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        sub_queries: Vec<HybridSubQuery>,
        options: HybridSearchOptions,
    ) -> BoxFuture<'_, Result<Vec<ScoredDocument>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let mut dense_hits = Vec::new();
            let mut sparse_hits = Vec::new();

            for sub_query in sub_queries {
                match sub_query {
                    HybridSubQuery::Dense { vector, limit } => {
                        let data = Value::from(vector.iter().copied().collect::<Vec<f32>>());
                        dense_hits = self
                            .search_ranked(
                                &ctx,
                                &collection,
                                "vector",
                                data,
                                limit.max(1),
                                options.filter_expr.as_deref(),
                            )
                            .await?;
                    }
                    HybridSubQuery::Sparse { query, limit } => {
                        let encoded = sparse::encode(&query);
                        sparse_hits = self
                            .search_ranked(
                                &ctx,
                                &collection,
                                "sparse_vector",
                                sparse_value(&encoded),
                                limit.max(1),
                                options.filter_expr.as_deref(),
                            )
                            .await?;
                    }
                }
            }

            Ok(rrf_fuse(dense_hits, sparse_hits, options.rrf_k, options.limit))
        })
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        ids: Vec<Box<str>>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(());
            }
            let quoted: Vec<String> = ids
                .iter()
                .map(|id| format!("\"{}\"", semindex_ports::escape_filter_literal(id)))
                .collect();
            self.post(
                &ctx,
                "delete",
                "/v2/vectordb/entities/delete",
                json!({
                    "collectionName": collection.as_str(),
                    "filter": format!("id in [{}]", quoted.join(", ")),
                }),
            )
            .await?;
            Ok(())
        })
    }
}

/// Fuse ranked dense and sparse lists with RRF(k); dense rank breaks ties.
fn rrf_fuse(
    dense: Vec<ScoredDocument>,
    sparse: Vec<ScoredDocument>,
    k: u32,
    limit: u32,
) -> Vec<ScoredDocument> {
    struct Fused {
        document: StoredDocument,
        score: f32,
        dense_rank: usize,
    }

    let k = f32::from(u16::try_from(k.clamp(1, u32::from(u16::MAX))).unwrap_or(100));
    let mut fused: BTreeMap<Box<str>, Fused> = BTreeMap::new();

    for (rank, hit) in dense.into_iter().enumerate() {
        let contribution = 1.0 / (k + rank as f32 + 1.0);
        fused.insert(
            hit.document.id.clone(),
            Fused {
                document: hit.document,
                score: contribution,
                dense_rank: rank,
            },
        );
    }
    for (rank, hit) in sparse.into_iter().enumerate() {
        let contribution = 1.0 / (k + rank as f32 + 1.0);
        fused
            .entry(hit.document.id.clone())
            .and_modify(|entry| entry.score += contribution)
            .or_insert(Fused {
                document: hit.document,
                score: contribution,
                dense_rank: usize::MAX,
            });
    }

    let mut results: Vec<Fused> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.dense_rank.cmp(&b.dense_rank))
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    results.truncate(limit as usize);
    results
        .into_iter()
        .map(|entry| ScoredDocument {
            document: entry.document,
            score: entry.score,
        })
        .collect()
}

/// Split documents so one insert RPC stays under the payload and row caps.
fn split_for_insert(documents: Vec<ChunkDocument>) -> Vec<Vec<ChunkDocument>> {
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes = 0usize;

    for document in documents {
        let estimate = document_payload_estimate(&document);
        let over_bytes = !current.is_empty() && current_bytes + estimate > MAX_INSERT_PAYLOAD_BYTES;
        if over_bytes || current.len() >= MAX_INSERT_ROWS {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += estimate;
        current.push(document);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn document_payload_estimate(document: &ChunkDocument) -> usize {
    document.content.len() + document.relative_path.len() + document.vector.len() * 12 + 256
}

fn document_row(document: &ChunkDocument, hybrid: bool) -> Value {
    let mut row = json!({
        "id": document.id.as_ref(),
        "vector": document.vector.iter().copied().collect::<Vec<f32>>(),
        "content": document.content.as_ref(),
        "relativePath": document.relative_path.as_ref(),
        "startLine": document.span.start_line(),
        "endLine": document.span.end_line(),
        "fileExtension": document.file_extension.as_deref().unwrap_or(""),
        "metadata": {
            "codebasePath": document.metadata.codebase_path.as_ref(),
            "language": document.metadata.language.map(|language| language.as_str()),
            "chunkIndex": document.metadata.chunk_index,
        },
    });
    if hybrid {
        if let Some(object) = row.as_object_mut() {
            object.insert(
                "sparse_vector".to_owned(),
                sparse_value(&sparse::encode(&document.content)),
            );
        }
    }
    row
}

fn sparse_value(encoded: &sparse::SparseVector) -> Value {
    Value::Object(
        encoded
            .iter()
            .map(|(index, weight)| (index.to_string(), Value::from(f64::from(*weight))))
            .collect(),
    )
}

fn object_to_store_row(object: Map<String, Value>) -> StoreRow {
    object
        .into_iter()
        .map(|(key, value)| (key.into_boxed_str(), value))
        .collect()
}

fn parse_document(row: &Value) -> Result<StoredDocument> {
    let field = |name: &str| row.get(name).and_then(Value::as_str).unwrap_or_default();
    let line = |name: &str| {
        u32::try_from(row.get(name).and_then(Value::as_u64).unwrap_or(1)).unwrap_or(1)
    };

    let start_line = line("startLine").max(1);
    let end_line = line("endLine").max(start_line);
    let span = LineSpan::new(start_line, end_line).map_err(ErrorEnvelope::from)?;

    let extension = field("fileExtension");
    let language = row
        .get("metadata")
        .and_then(|metadata| metadata.get("language"))
        .and_then(Value::as_str)
        .map(language_from_label)
        .or_else(|| (!extension.is_empty()).then(|| Language::from_extension(extension)));

    Ok(StoredDocument {
        id: field("id").into(),
        content: field("content").into(),
        relative_path: field("relativePath").into(),
        span,
        file_extension: (!extension.is_empty()).then(|| extension.into()),
        language,
    })
}

// Stored labels are canonical `Language::as_str` values; unknown labels
// degrade to the text fallback.
fn language_from_label(label: &str) -> Language {
    match label {
        "typescript" => Language::TypeScript,
        "javascript" => Language::JavaScript,
        "python" => Language::Python,
        "java" => Language::Java,
        "cpp" => Language::Cpp,
        "c" => Language::C,
        "csharp" => Language::CSharp,
        "go" => Language::Go,
        "rust" => Language::Rust,
        "php" => Language::Php,
        "ruby" => Language::Ruby,
        "swift" => Language::Swift,
        "kotlin" => Language::Kotlin,
        "scala" => Language::Scala,
        "objective-c" => Language::ObjectiveC,
        "jupyter" => Language::Jupyter,
        "markdown" => Language::Markdown,
        _ => Language::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semindex_ports::ChunkDocumentMetadata;

    fn document(id: &str, content_len: usize) -> ChunkDocument {
        ChunkDocument {
            id: id.into(),
            vector: Arc::from(vec![0.1f32, 0.2, 0.3]),
            content: "x".repeat(content_len).into_boxed_str(),
            relative_path: "src/lib.rs".into(),
            span: LineSpan::new(1, 5).expect("span"),
            file_extension: Some("rs".into()),
            metadata: ChunkDocumentMetadata {
                codebase_path: "/repo".into(),
                language: Some(Language::Rust),
                chunk_index: 0,
            },
        }
    }

    fn stored(id: &str) -> StoredDocument {
        StoredDocument {
            id: id.into(),
            content: "content".into(),
            relative_path: "src/lib.rs".into(),
            span: LineSpan::new(1, 2).expect("span"),
            file_extension: Some("rs".into()),
            language: Some(Language::Rust),
        }
    }

    fn scored(id: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            document: stored(id),
            score,
        }
    }

    #[test]
    fn rrf_combines_both_lists_and_breaks_ties_by_dense_rank() {
        let dense = vec![scored("a", 0.9), scored("b", 0.8), scored("c", 0.7)];
        let sparse = vec![scored("b", 12.0), scored("d", 11.0)];

        let fused = rrf_fuse(dense, sparse, 100, 10);
        let ids: Vec<&str> = fused.iter().map(|hit| hit.document.id.as_ref()).collect();

        // `b` appears in both lists, so it outranks everything.
        assert_eq!(ids[0], "b");
        // `a` (dense rank 0) and `d` (sparse rank 1) tie only if their sums
        // match; with k=100 `a` scores 1/101, `d` scores 1/102.
        assert_eq!(ids[1], "a");
        assert!(ids.contains(&"c") && ids.contains(&"d"));

        let expected_b = 1.0 / 102.0 + 1.0 / 101.0;
        assert!((fused[0].score - expected_b).abs() < 1e-6);
    }

    #[test]
    fn rrf_truncates_to_the_limit() {
        let dense = (0..10).map(|n| scored(&format!("d{n}"), 1.0)).collect();
        let fused = rrf_fuse(dense, Vec::new(), 100, 3);
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn equal_rrf_scores_prefer_the_dense_hit() {
        // One hit only in dense at rank 0, one only in sparse at rank 0:
        // identical contributions, dense must win.
        let fused = rrf_fuse(vec![scored("dense", 0.5)], vec![scored("sparse", 9.0)], 60, 10);
        assert_eq!(fused[0].document.id.as_ref(), "dense");
    }

    #[test]
    fn insert_batches_respect_row_and_byte_caps() {
        let documents: Vec<ChunkDocument> =
            (0..2_500).map(|n| document(&format!("chunk_{n}"), 10)).collect();
        let batches = split_for_insert(documents);
        assert!(batches.iter().all(|batch| batch.len() <= MAX_INSERT_ROWS));
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 2_500);

        let big: Vec<ChunkDocument> =
            (0..10).map(|n| document(&format!("big_{n}"), 3 * 1024 * 1024)).collect();
        let batches = split_for_insert(big);
        assert!(batches.len() >= 5, "oversized payloads must split");
    }

    #[test]
    fn hybrid_rows_carry_a_sparse_vector() {
        let row = document_row(&document("chunk_1", 64), true);
        assert!(row.get("sparse_vector").is_some());
        assert_eq!(row["metadata"]["codebasePath"], "/repo");
        assert_eq!(row["startLine"], 1);

        let dense_row = document_row(&document("chunk_1", 64), false);
        assert!(dense_row.get("sparse_vector").is_none());
    }

    #[test]
    fn parse_document_round_trips_row_fields() -> Result<()> {
        let row = json!({
            "id": "chunk_ab",
            "content": "fn x() {}",
            "relativePath": "src/x.rs",
            "startLine": 3,
            "endLine": 9,
            "fileExtension": "rs",
            "metadata": { "language": "rust", "codebasePath": "/repo", "chunkIndex": 2 },
            "distance": 0.42
        });
        let document = parse_document(&row)?;
        assert_eq!(document.id.as_ref(), "chunk_ab");
        assert_eq!(document.span.start_line(), 3);
        assert_eq!(document.language, Some(Language::Rust));
        Ok(())
    }
}
