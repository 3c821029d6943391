//! The operation facade: wires config, adapters, registry, locks, and the
//! reconciler behind the four public operations.

use crate::factories::{build_embedding, build_vector_store};
use semindex_adapters::{
    HeldLocks, IgnoreResolver, JsonRegistryStore, LocalFileSync, ProcessLock, TokioFileSystem,
};
use semindex_app::{
    clear_index, index_codebase, reindex_by_change, search_code, CodebaseRegistry,
    ClearIndexDeps, ClearIndexInput, IndexCodebaseDeps, IndexCodebaseInput, IndexCodebaseOutput,
    IndexCodebaseStatus, Reconciler, RegistryReport, ReindexByChangeDeps, ReindexByChangeInput,
    SearchCodeDeps, SearchCodeInput, SemanticSearchDeps,
};
use semindex_app::reconciler::{ReconcilerDeps, ReconcilerSettings};
use semindex_config::{
    BackendEnv, BatchTuning, DataDir, CHUNK_LIMIT, DEFAULT_IGNORE_PATTERNS,
    DEFAULT_SUPPORTED_EXTENSIONS,
};
use semindex_domain::{CodebaseRecord, IndexMode, IndexStats, SearchHit};
use semindex_ports::{
    EmbeddingPort, FileSyncPort, IgnorePort, LoggerPort, SplitterPort, VectorStorePort,
};
use semindex_shared::{
    CancellationToken, ErrorCode, ErrorEnvelope, RequestContext, Result,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Status answer for `get_indexing_status`.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    /// Status of one resolved codebase.
    Codebase(CodebaseRecord),
    /// Aggregate report over the registry.
    Aggregate(RegistryReport),
}

/// Composition root exposing the transport-agnostic operations.
pub struct ContextBackend {
    data_dir: DataDir,
    index_mode: IndexMode,
    tuning: BatchTuning,
    custom_extensions: Vec<Box<str>>,
    custom_ignore_patterns: Vec<Box<str>>,
    embedding: Arc<dyn EmbeddingPort>,
    store: Arc<dyn VectorStorePort>,
    splitter: Arc<dyn SplitterPort>,
    filesystem: Arc<dyn semindex_ports::FileSystemPort>,
    logger: Option<Arc<dyn LoggerPort>>,
    registry: Arc<CodebaseRegistry>,
    held_locks: HeldLocks,
    reconciler_cancel: Mutex<Option<CancellationToken>>,
}

impl ContextBackend {
    /// Compose a backend from environment settings.
    pub async fn new(env: BackendEnv, logger: Option<Arc<dyn LoggerPort>>) -> Result<Self> {
        let data_dir = DataDir::resolve()?;
        Self::with_data_dir(env, logger, data_dir).await
    }

    /// Compose against an explicit data dir (tests, custom layouts).
    pub async fn with_data_dir(
        env: BackendEnv,
        logger: Option<Arc<dyn LoggerPort>>,
        data_dir: DataDir,
    ) -> Result<Self> {
        let index_mode = if env.hybrid_mode {
            IndexMode::Hybrid
        } else {
            IndexMode::Dense
        };

        let embedding = build_embedding(&env, env.embedding_batch_size.unwrap_or(0).max(1))?;
        let tuning = BatchTuning::resolve(
            &embedding.provider().id,
            env.embedding_batch_size,
            env.api_concurrency,
            env.file_concurrency,
            env.memory_limit_mb,
        );
        // Rebuild with the resolved target so the decorator and the
        // pipeline agree on the batch size.
        let embedding = build_embedding(&env, tuning.embedding_batch_size)?;
        let store = build_vector_store(&env)?;

        let ctx = RequestContext::for_request();
        let registry_store = Arc::new(JsonRegistryStore::new(&data_dir));
        let registry = Arc::new(
            CodebaseRegistry::load(&ctx, registry_store, index_mode, logger.clone()).await?,
        );

        Ok(Self {
            data_dir,
            index_mode,
            tuning,
            custom_extensions: env.custom_extensions,
            custom_ignore_patterns: env.custom_ignore_patterns,
            embedding,
            store,
            splitter: Arc::new(semindex_adapters::CodeSplitter::default()),
            filesystem: Arc::new(TokioFileSystem::new()),
            logger,
            registry,
            held_locks: HeldLocks::new(),
            reconciler_cancel: Mutex::new(None),
        })
    }

    /// The index mode collections are created with.
    #[must_use]
    pub const fn index_mode(&self) -> IndexMode {
        self.index_mode
    }

    /// The registry (read access for status surfaces).
    #[must_use]
    pub fn registry(&self) -> Arc<CodebaseRegistry> {
        Arc::clone(&self.registry)
    }

    /// Index a codebase end to end.
    pub async fn index_codebase(
        &self,
        ctx: &RequestContext,
        path: &Path,
        force: bool,
    ) -> Result<IndexCodebaseOutput> {
        let root = resolve_existing_dir(path).await?;
        let record = self.registry.register(ctx, &root).await?;

        let lock = ProcessLock::new(
            &self.data_dir,
            &root.to_string_lossy(),
            self.held_locks.clone(),
        );
        let outcome = lock
            .with_lock(|| self.run_index(ctx, &root, &record, force))
            .await;

        match outcome {
            Ok(output) => {
                self.registry
                    .set_indexed(
                        ctx,
                        &root,
                        IndexStats {
                            files: output.indexed_files,
                            chunks: output.total_chunks,
                        },
                    )
                    .await?;
                self.ensure_reconciler();
                Ok(output)
            }
            Err(error) if error.is_cancelled() => {
                // The record stays `indexing` with the last observed percent
                // so a later registration resumes forward.
                Err(error)
            }
            Err(error) => {
                let _ = self
                    .registry
                    .set_indexfailed(ctx, &root, &error.message)
                    .await;
                Err(error)
            }
        }
    }

    async fn run_index(
        &self,
        ctx: &RequestContext,
        root: &Path,
        record: &CodebaseRecord,
        force: bool,
    ) -> Result<IndexCodebaseOutput> {
        let ignore = self.ignore_for(ctx, root).await?;
        let deps = self.index_deps(ignore);

        let registry = Arc::clone(&self.registry);
        let progress_root = root.to_path_buf();
        let progress_ctx = ctx.clone();
        let on_progress = Arc::new(move |progress: semindex_app::IndexProgress| {
            let registry = Arc::clone(&registry);
            let root = progress_root.clone();
            let ctx = progress_ctx.clone();
            tokio::spawn(async move {
                let _ = registry.set_indexing(&ctx, &root, progress.percent).await;
            });
        });

        let output = index_codebase(
            ctx,
            &deps,
            IndexCodebaseInput {
                codebase_root: root.to_path_buf(),
                collection_name: record.collection_name.clone(),
                index_mode: self.index_mode,
                extensions: self.effective_extensions(),
                file_list: None,
                force_reindex: force,
                tuning: self.tuning,
                chunk_limit: CHUNK_LIMIT,
                on_progress: Some(on_progress),
            },
        )
        .await?;

        // Snapshot only after a complete run. Committing after a chunk-limit
        // cutoff would record hashes for files that were never embedded, and
        // the reconciler would then see an empty diff for them forever.
        if output.status == IndexCodebaseStatus::Completed {
            let file_sync = self.file_sync_for(root);
            file_sync.initialize(ctx, self.sync_options()).await?;
            let _ = file_sync.check_for_changes(ctx).await?;
            file_sync.commit(ctx).await?;
        }

        Ok(output)
    }

    /// Search under any path contained by an indexed root.
    pub async fn search_code(
        &self,
        ctx: &RequestContext,
        path: &Path,
        query: &str,
        limit: u32,
        extension_filter: Vec<Box<str>>,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>> {
        let resolved = resolve_existing_path(path).await?;
        search_code(
            ctx,
            &SearchCodeDeps {
                registry: Arc::clone(&self.registry),
                search: SemanticSearchDeps {
                    embedding: Arc::clone(&self.embedding),
                    store: Arc::clone(&self.store),
                    logger: self.logger.clone(),
                },
                index_mode: self.index_mode,
            },
            SearchCodeInput {
                path: resolved,
                query: query.into(),
                limit,
                extension_filter,
                threshold,
            },
        )
        .await
    }

    /// Remove a codebase's collection, snapshot, and registry entry.
    pub async fn clear_index(&self, ctx: &RequestContext, path: &Path) -> Result<()> {
        let root = resolve_existing_dir(path).await?;
        let record = self.registry.info(&root).await.ok_or_else(|| {
            ErrorEnvelope::expected(ErrorCode::not_indexed(), "codebase is not registered")
                .with_metadata("path", root.to_string_lossy().to_string())
        })?;

        let lock = ProcessLock::new(
            &self.data_dir,
            &root.to_string_lossy(),
            self.held_locks.clone(),
        );
        lock.with_lock(|| async {
            clear_index(
                ctx,
                &ClearIndexDeps {
                    store: Arc::clone(&self.store),
                    file_sync: self.file_sync_for(&root),
                    logger: self.logger.clone(),
                },
                ClearIndexInput {
                    codebase_root: root.clone(),
                    collection_name: record.collection_name.clone(),
                },
            )
            .await?;
            self.registry.remove(ctx, &root).await
        })
        .await
    }

    /// Per-codebase status, or the aggregate report without a path.
    pub async fn get_indexing_status(&self, path: Option<&Path>) -> Result<StatusReport> {
        match path {
            None => Ok(StatusReport::Aggregate(self.registry.report().await)),
            Some(path) => {
                let resolved = resolve_existing_path(path).await?;
                let record = self
                    .registry
                    .find_containing_index(&resolved)
                    .await
                    .ok_or_else(|| {
                        ErrorEnvelope::expected(
                            ErrorCode::not_indexed(),
                            "no indexed codebase contains this path",
                        )
                        .with_metadata("path", resolved.to_string_lossy().to_string())
                    })?;
                Ok(StatusReport::Codebase(record))
            }
        }
    }

    /// Release all cross-process state held by this process.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.reconciler_cancel.lock() {
            if let Some(cancel) = guard.take() {
                cancel.cancel();
            }
        }
        self.held_locks.release_all();
    }

    /// Spawn handlers that release held locks on termination signals.
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let backend = Arc::clone(self);
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut terminate = match tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate(),
                ) {
                    Ok(signal) => signal,
                    Err(_) => {
                        let _ = ctrl_c.await;
                        backend.shutdown();
                        return;
                    }
                };
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            backend.shutdown();
        });
    }

    /// Start the reconcile loop if it is not already running.
    pub fn ensure_reconciler(&self) {
        let Ok(mut guard) = self.reconciler_cancel.lock() else {
            return;
        };
        if guard
            .as_ref()
            .is_some_and(|cancel| !cancel.is_cancelled())
        {
            return;
        }

        let cancel = CancellationToken::new();
        let reconciler = Reconciler::new(
            ReconcilerDeps {
                registry: Arc::clone(&self.registry),
                store: Arc::clone(&self.store),
                run_reindex: self.reconcile_runner(),
                clean_snapshot: self.snapshot_cleaner(),
                logger: self.logger.clone(),
            },
            ReconcilerSettings::default(),
        );
        let _handle = reconciler.spawn(cancel.clone());
        *guard = Some(cancel);
    }

    fn reconcile_runner(&self) -> semindex_app::reconciler::ReindexRunner {
        let backend = self.clone_parts();
        Arc::new(move |ctx, record| {
            let backend = backend.clone();
            Box::pin(async move {
                let root = PathBuf::from(record.root_path.as_ref());
                let ignore = backend.ignore_for(&ctx, &root).await?;
                let deps = ReindexByChangeDeps {
                    file_sync: backend.file_sync_for(&root),
                    index: backend.index_deps(ignore),
                };
                reindex_by_change(
                    &ctx,
                    &deps,
                    ReindexByChangeInput {
                        codebase_root: root,
                        collection_name: record.collection_name.clone(),
                        index_mode: backend.index_mode,
                        extensions: backend.effective_extensions(),
                        ignore_patterns: layered_ignore_patterns(&backend.custom_ignore_patterns),
                        tuning: backend.tuning,
                        chunk_limit: CHUNK_LIMIT,
                        on_progress: None,
                    },
                )
                .await
            })
        })
    }

    fn snapshot_cleaner(&self) -> semindex_app::reconciler::SnapshotCleaner {
        let backend = self.clone_parts();
        Arc::new(move |ctx, root| {
            let backend = backend.clone();
            Box::pin(async move {
                backend
                    .file_sync_for(&root)
                    .delete_snapshot(&ctx, root.clone())
                    .await
            })
        })
    }

    fn index_deps(&self, ignore: Arc<dyn IgnorePort>) -> IndexCodebaseDeps {
        IndexCodebaseDeps {
            embedding: Arc::clone(&self.embedding),
            store: Arc::clone(&self.store),
            splitter: Arc::clone(&self.splitter),
            filesystem: Arc::clone(&self.filesystem),
            ignore,
            logger: self.logger.clone(),
        }
    }

    async fn ignore_for(&self, ctx: &RequestContext, root: &Path) -> Result<Arc<dyn IgnorePort>> {
        let resolver = IgnoreResolver::resolve(
            ctx,
            root,
            &self.data_dir,
            &self.custom_ignore_patterns,
            &[],
            self.logger.as_ref(),
        )
        .await?;
        Ok(Arc::new(resolver))
    }

    fn file_sync_for(&self, root: &Path) -> Arc<dyn FileSyncPort> {
        Arc::new(LocalFileSync::new(
            root.to_path_buf(),
            &self.data_dir,
            self.logger.clone(),
        ))
    }

    fn effective_extensions(&self) -> Vec<Box<str>> {
        if self.custom_extensions.is_empty() {
            DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).into())
                .collect()
        } else {
            self.custom_extensions.clone()
        }
    }

    fn sync_options(&self) -> semindex_ports::SyncInitOptions {
        semindex_ports::SyncInitOptions {
            ignore_patterns: layered_ignore_patterns(&self.custom_ignore_patterns),
            extensions: self.effective_extensions(),
        }
    }

    /// The subset of fields the reconciler closures need.
    fn clone_parts(&self) -> BackendParts {
        BackendParts {
            data_dir: self.data_dir.clone(),
            index_mode: self.index_mode,
            tuning: self.tuning,
            custom_extensions: self.custom_extensions.clone(),
            custom_ignore_patterns: self.custom_ignore_patterns.clone(),
            embedding: Arc::clone(&self.embedding),
            store: Arc::clone(&self.store),
            splitter: Arc::clone(&self.splitter),
            filesystem: Arc::clone(&self.filesystem),
            logger: self.logger.clone(),
        }
    }
}

#[derive(Clone)]
struct BackendParts {
    data_dir: DataDir,
    index_mode: IndexMode,
    tuning: BatchTuning,
    custom_extensions: Vec<Box<str>>,
    custom_ignore_patterns: Vec<Box<str>>,
    embedding: Arc<dyn EmbeddingPort>,
    store: Arc<dyn VectorStorePort>,
    splitter: Arc<dyn SplitterPort>,
    filesystem: Arc<dyn semindex_ports::FileSystemPort>,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl BackendParts {
    fn index_deps(&self, ignore: Arc<dyn IgnorePort>) -> IndexCodebaseDeps {
        IndexCodebaseDeps {
            embedding: Arc::clone(&self.embedding),
            store: Arc::clone(&self.store),
            splitter: Arc::clone(&self.splitter),
            filesystem: Arc::clone(&self.filesystem),
            ignore,
            logger: self.logger.clone(),
        }
    }

    async fn ignore_for(&self, ctx: &RequestContext, root: &Path) -> Result<Arc<dyn IgnorePort>> {
        let resolver = IgnoreResolver::resolve(
            ctx,
            root,
            &self.data_dir,
            &self.custom_ignore_patterns,
            &[],
            self.logger.as_ref(),
        )
        .await?;
        Ok(Arc::new(resolver))
    }

    fn file_sync_for(&self, root: &Path) -> Arc<dyn FileSyncPort> {
        Arc::new(LocalFileSync::new(
            root.to_path_buf(),
            &self.data_dir,
            self.logger.clone(),
        ))
    }

    fn effective_extensions(&self) -> Vec<Box<str>> {
        if self.custom_extensions.is_empty() {
            DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).into())
                .collect()
        } else {
            self.custom_extensions.clone()
        }
    }
}

/// Defaults merged below the caller's patterns, mirroring the resolver's
/// layering for snapshot walks.
fn layered_ignore_patterns(custom: &[Box<str>]) -> Vec<Box<str>> {
    let mut patterns: Vec<Box<str>> = DEFAULT_IGNORE_PATTERNS
        .iter()
        .map(|pattern| (*pattern).into())
        .collect();
    for pattern in custom {
        if !patterns.contains(pattern) {
            patterns.push(pattern.clone());
        }
    }
    patterns
}

/// Canonicalize a path that must exist and be a directory.
async fn resolve_existing_dir(path: &Path) -> Result<PathBuf> {
    let metadata = tokio::fs::metadata(path).await.map_err(|_| {
        ErrorEnvelope::expected(ErrorCode::path_not_found(), "path does not exist")
            .with_metadata("path", path.to_string_lossy().to_string())
    })?;
    if !metadata.is_dir() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::path_not_a_directory(),
            "path is not a directory",
        )
        .with_metadata("path", path.to_string_lossy().to_string()));
    }
    Ok(tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf()))
}

/// Canonicalize a path that must exist (file or directory).
async fn resolve_existing_path(path: &Path) -> Result<PathBuf> {
    tokio::fs::metadata(path).await.map_err(|_| {
        ErrorEnvelope::expected(ErrorCode::path_not_found(), "path does not exist")
            .with_metadata("path", path.to_string_lossy().to_string())
    })?;
    Ok(tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf()))
}

/// Shape a terminal result for the outer boundary: the collection-limit
/// error is a success-shaped refusal, not a crash.
#[must_use]
pub fn is_terminal_refusal(error: &ErrorEnvelope) -> bool {
    error.code == ErrorCode::collection_limit_reached()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_paths_surface_path_errors() {
        let error = resolve_existing_dir(Path::new("/definitely/not/here"))
            .await
            .expect_err("must fail");
        assert_eq!(error.code, ErrorCode::path_not_found());
    }

    #[tokio::test]
    async fn files_are_not_directories() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let file = std::env::temp_dir().join(format!("backend-file-{nanos}"));
        tokio::fs::write(&file, "x").await.expect("write");

        let error = resolve_existing_dir(&file).await.expect_err("must fail");
        assert_eq!(error.code, ErrorCode::path_not_a_directory());

        let resolved = resolve_existing_path(&file).await.expect("file is fine");
        assert!(resolved.is_absolute());
    }

    #[test]
    fn collection_limit_is_a_terminal_refusal() {
        let error = ErrorEnvelope::expected(
            ErrorCode::collection_limit_reached(),
            "exceeded the limit number of collections",
        );
        assert!(is_terminal_refusal(&error));
        assert!(!is_terminal_refusal(&ErrorEnvelope::expected(
            ErrorCode::io(),
            "io"
        )));
    }
}
