//! Apply snapshot diffs to an existing collection: delete stale chunks,
//! reinsert added and modified files, then commit the snapshot.

use crate::index_codebase::{
    index_codebase, IndexCodebaseDeps, IndexCodebaseInput, ProgressCallback,
};
use semindex_config::BatchTuning;
use semindex_domain::{CollectionName, IndexMode};
use semindex_ports::{eq_filter, FileSyncPort, SyncInitOptions, VectorStorePort};
use semindex_shared::{RequestContext, Result, SnapshotDiff};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Input for an incremental reindex.
#[derive(Clone)]
pub struct ReindexByChangeInput {
    /// Absolute canonical codebase root.
    pub codebase_root: PathBuf,
    /// Collection owned by that root.
    pub collection_name: CollectionName,
    /// Dense or hybrid.
    pub index_mode: IndexMode,
    /// Extension allow-list (without leading dots).
    pub extensions: Vec<Box<str>>,
    /// Ignore patterns for the snapshot walk.
    pub ignore_patterns: Vec<Box<str>>,
    /// Batching knobs for the insert phase.
    pub tuning: BatchTuning,
    /// Chunk ceiling for the insert phase.
    pub chunk_limit: usize,
    /// Optional progress callback.
    pub on_progress: Option<ProgressCallback>,
}

/// Dependencies: the pipeline's plus the synchronizer.
#[derive(Clone)]
pub struct ReindexByChangeDeps {
    /// Snapshot synchronizer for this root.
    pub file_sync: Arc<dyn FileSyncPort>,
    /// Pipeline dependencies.
    pub index: IndexCodebaseDeps,
}

/// Detect changes and apply them. Returns the applied diff.
pub async fn reindex_by_change(
    ctx: &RequestContext,
    deps: &ReindexByChangeDeps,
    input: ReindexByChangeInput,
) -> Result<SnapshotDiff> {
    ctx.ensure_live("reindex_by_change")?;

    deps.file_sync
        .initialize(
            ctx,
            SyncInitOptions {
                ignore_patterns: input.ignore_patterns.clone(),
                extensions: input.extensions.clone(),
            },
        )
        .await?;
    let diff = deps.file_sync.check_for_changes(ctx).await?;
    if diff.is_empty() {
        emit(&input, "No changes detected", 100);
        return Ok(diff);
    }

    // Deleted first so a modified file never carries both generations.
    let stale: BTreeSet<Box<str>> = diff
        .removed
        .iter()
        .chain(diff.modified.iter())
        .cloned()
        .collect();
    for relative_path in &stale {
        ctx.ensure_live("reindex.delete_stale")?;
        delete_file_chunks(ctx, &deps.index.store, &input.collection_name, relative_path).await?;
    }

    let files_to_index: Vec<Box<str>> = diff
        .added
        .iter()
        .chain(diff.modified.iter())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if !files_to_index.is_empty() {
        let index_input = IndexCodebaseInput {
            codebase_root: input.codebase_root.clone(),
            collection_name: input.collection_name.clone(),
            index_mode: input.index_mode,
            extensions: input.extensions.clone(),
            file_list: Some(files_to_index),
            force_reindex: false,
            tuning: input.tuning,
            chunk_limit: input.chunk_limit,
            on_progress: input.on_progress.clone(),
        };
        index_codebase(ctx, &deps.index, index_input).await?;
    }

    // The snapshot becomes durable only after the collection reflects it.
    deps.file_sync.commit(ctx).await?;
    emit(&input, "Re-indexing complete", 100);
    Ok(diff)
}

/// Delete every chunk document belonging to one relative path.
pub async fn delete_file_chunks(
    ctx: &RequestContext,
    store: &Arc<dyn VectorStorePort>,
    collection: &CollectionName,
    relative_path: &str,
) -> Result<()> {
    let filter = eq_filter("relativePath", relative_path);
    let rows = store
        .query(ctx, collection.clone(), filter, vec!["id".into()], None)
        .await?;

    let ids: Vec<Box<str>> = rows
        .into_iter()
        .filter_map(|row| match row.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => {
                Some(id.clone().into_boxed_str())
            }
            _ => None,
        })
        .collect();
    if ids.is_empty() {
        return Ok(());
    }
    store.delete(ctx, collection.clone(), ids).await
}

fn emit(input: &ReindexByChangeInput, phase: &str, percent: u8) {
    if let Some(callback) = input.on_progress.as_ref() {
        callback(crate::index_codebase::IndexProgress {
            phase: phase.into(),
            current: u64::from(percent),
            total: 100,
            percent,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_codebase::test_support::{
        FixedSplitter, MemoryFs, MemoryStore, StubEmbedding, SubstringIgnore,
    };
    use semindex_ports::{BoxFuture, IgnorePort, SplitterPort};
    use semindex_shared::ErrorEnvelope;
    use std::sync::Mutex;

    /// Scripted synchronizer returning a fixed diff.
    struct ScriptedSync {
        diff: Mutex<SnapshotDiff>,
        committed: Mutex<bool>,
    }

    impl ScriptedSync {
        fn new(diff: SnapshotDiff) -> Arc<Self> {
            Arc::new(Self {
                diff: Mutex::new(diff),
                committed: Mutex::new(false),
            })
        }

        fn was_committed(&self) -> bool {
            *self.committed.lock().expect("committed lock")
        }
    }

    impl FileSyncPort for ScriptedSync {
        fn initialize(
            &self,
            _ctx: &RequestContext,
            _options: SyncInitOptions,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move { Ok(()) })
        }

        fn check_for_changes(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<SnapshotDiff>> {
            let diff = std::mem::take(&mut *self.diff.lock().expect("diff lock"));
            Box::pin(async move { Ok(diff) })
        }

        fn commit(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
            *self.committed.lock().expect("committed lock") = true;
            Box::pin(async move { Ok(()) })
        }

        fn delete_snapshot(
            &self,
            _ctx: &RequestContext,
            _codebase_root: PathBuf,
        ) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    async fn seeded_store(collection: &CollectionName, paths: &[&str]) -> Arc<MemoryStore> {
        let ctx = RequestContext::for_request();
        let store = MemoryStore::new();
        store
            .create_collection(&ctx, collection.clone(), 4, None)
            .await
            .expect("create");

        let fs = MemoryFs::default();
        for path in paths {
            fs.add_file(path, &format!("content of {path}\n"));
        }
        let deps = IndexCodebaseDeps {
            embedding: StubEmbedding::new(),
            store: Arc::clone(&store) as Arc<dyn VectorStorePort>,
            splitter: Arc::new(FixedSplitter { chunks_per_file: 1 }) as Arc<dyn SplitterPort>,
            filesystem: Arc::new(fs),
            ignore: Arc::new(SubstringIgnore::default()) as Arc<dyn IgnorePort>,
            logger: None,
        };
        index_codebase(
            &ctx,
            &deps,
            IndexCodebaseInput {
                codebase_root: PathBuf::from("/repo"),
                collection_name: collection.clone(),
                index_mode: IndexMode::Dense,
                extensions: vec!["py".into(), "rs".into()],
                file_list: None,
                force_reindex: false,
                tuning: BatchTuning {
                    embedding_batch_size: 4,
                    file_concurrency: 2,
                    api_concurrency: 2,
                    memory_limit_mb: 1024 * 1024,
                },
                chunk_limit: 450_000,
                on_progress: None,
            },
        )
        .await
        .expect("seed index");
        store
    }

    fn reindex_input(collection: &CollectionName) -> ReindexByChangeInput {
        ReindexByChangeInput {
            codebase_root: PathBuf::from("/repo"),
            collection_name: collection.clone(),
            index_mode: IndexMode::Dense,
            extensions: vec!["py".into(), "rs".into()],
            ignore_patterns: Vec::new(),
            tuning: BatchTuning {
                embedding_batch_size: 4,
                file_concurrency: 2,
                api_concurrency: 2,
                memory_limit_mb: 1024 * 1024,
            },
            chunk_limit: 450_000,
            on_progress: None,
        }
    }

    #[tokio::test]
    async fn modification_replaces_and_addition_inserts() -> Result<()> {
        let collection = CollectionName::parse("code_chunks_reindex").map_err(ErrorEnvelope::from)?;
        let store = seeded_store(&collection, &["a.py", "b.py"]).await;
        assert_eq!(store.document_count(collection.as_str()), 2);

        // After the seed run: a.py modified, c.py added.
        let fs = MemoryFs::default();
        fs.add_file("a.py", "changed content\n");
        fs.add_file("c.py", "new file\n");

        let sync = ScriptedSync::new(SnapshotDiff {
            added: vec!["c.py".into()],
            removed: Vec::new(),
            modified: vec!["a.py".into()],
        });
        let deps = ReindexByChangeDeps {
            file_sync: Arc::clone(&sync) as Arc<dyn FileSyncPort>,
            index: IndexCodebaseDeps {
                embedding: StubEmbedding::new(),
                store: Arc::clone(&store) as Arc<dyn VectorStorePort>,
                splitter: Arc::new(FixedSplitter { chunks_per_file: 1 }),
                filesystem: Arc::new(fs),
                ignore: Arc::new(SubstringIgnore::default()),
                logger: None,
            },
        };

        let ctx = RequestContext::for_request();
        let diff = reindex_by_change(&ctx, &deps, reindex_input(&collection)).await?;

        assert_eq!(diff.added, vec![Box::from("c.py")]);
        assert_eq!(diff.modified, vec![Box::from("a.py")]);
        assert_eq!(store.document_count(collection.as_str()), 3);
        assert!(sync.was_committed());

        let paths: BTreeSet<String> = store
            .documents(collection.as_str())
            .iter()
            .map(|document| document.relative_path.as_ref().to_owned())
            .collect();
        assert!(paths.contains("a.py") && paths.contains("b.py") && paths.contains("c.py"));
        Ok(())
    }

    #[tokio::test]
    async fn removal_deletes_documents() -> Result<()> {
        let collection = CollectionName::parse("code_chunks_remove").map_err(ErrorEnvelope::from)?;
        let store = seeded_store(&collection, &["a.py", "b.py"]).await;

        let sync = ScriptedSync::new(SnapshotDiff {
            added: Vec::new(),
            removed: vec!["b.py".into()],
            modified: Vec::new(),
        });
        let deps = ReindexByChangeDeps {
            file_sync: sync as Arc<dyn FileSyncPort>,
            index: IndexCodebaseDeps {
                embedding: StubEmbedding::new(),
                store: Arc::clone(&store) as Arc<dyn VectorStorePort>,
                splitter: Arc::new(FixedSplitter { chunks_per_file: 1 }),
                filesystem: Arc::new(MemoryFs::default()),
                ignore: Arc::new(SubstringIgnore::default()),
                logger: None,
            },
        };

        let ctx = RequestContext::for_request();
        reindex_by_change(&ctx, &deps, reindex_input(&collection)).await?;

        let paths: Vec<String> = store
            .documents(collection.as_str())
            .iter()
            .map(|document| document.relative_path.as_ref().to_owned())
            .collect();
        assert_eq!(paths, vec!["a.py"]);
        Ok(())
    }

    #[tokio::test]
    async fn empty_diff_is_a_no_op() -> Result<()> {
        let collection = CollectionName::parse("code_chunks_noop").map_err(ErrorEnvelope::from)?;
        let store = seeded_store(&collection, &["a.py"]).await;

        let sync = ScriptedSync::new(SnapshotDiff::default());
        let deps = ReindexByChangeDeps {
            file_sync: Arc::clone(&sync) as Arc<dyn FileSyncPort>,
            index: IndexCodebaseDeps {
                embedding: StubEmbedding::new(),
                store: Arc::clone(&store) as Arc<dyn VectorStorePort>,
                splitter: Arc::new(FixedSplitter { chunks_per_file: 1 }),
                filesystem: Arc::new(MemoryFs::default()),
                ignore: Arc::new(SubstringIgnore::default()),
                logger: None,
            },
        };

        let ctx = RequestContext::for_request();
        let diff = reindex_by_change(&ctx, &deps, reindex_input(&collection)).await?;
        assert!(diff.is_empty());
        assert_eq!(store.document_count(collection.as_str()), 1);
        assert!(!sync.was_committed(), "no changes, no snapshot write");
        Ok(())
    }
}
