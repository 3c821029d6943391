//! Codebase registry: lifecycle bookkeeping with crash-safe persistence and
//! parent-subtree containment resolution.

use semindex_domain::{
    derive_collection_name, root_contains, CodebaseRecord, CodebaseStatus, IndexMode, IndexStats,
};
use semindex_ports::{LoggerPort, RegistrySnapshot, RegistryStorePort};
use semindex_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

const REGISTRY_VERSION: u32 = 1;

/// Aggregate report over every registered codebase.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegistryReport {
    /// Records in the `indexed` state.
    pub indexed: Vec<CodebaseRecord>,
    /// Records currently `indexing`.
    pub indexing: Vec<CodebaseRecord>,
    /// Records in the `indexfailed` state.
    pub failed: Vec<CodebaseRecord>,
}

/// In-process registry service. A single mutex serializes mutations; durable
/// writes replace the registry file atomically.
pub struct CodebaseRegistry {
    store: Arc<dyn RegistryStorePort>,
    logger: Option<Arc<dyn LoggerPort>>,
    index_mode: IndexMode,
    records: Mutex<BTreeMap<Box<str>, CodebaseRecord>>,
}

impl CodebaseRegistry {
    /// Load the registry from its store.
    pub async fn load(
        ctx: &RequestContext,
        store: Arc<dyn RegistryStorePort>,
        index_mode: IndexMode,
        logger: Option<Arc<dyn LoggerPort>>,
    ) -> Result<Self> {
        let snapshot = store.load(ctx).await?;
        let mut records = BTreeMap::new();
        for record in snapshot.indexes.into_iter().chain(snapshot.active_indexing) {
            records.insert(record.root_path.clone(), record);
        }
        Ok(Self {
            store,
            logger,
            index_mode,
            records: Mutex::new(records),
        })
    }

    /// Register a root, entering the `indexing` state.
    ///
    /// Re-registering an `indexed` root is a force reindex; re-registering a
    /// failed root is a retry. A root strictly inside an existing root is
    /// rejected with `registry:subtree_covered`, and two distinct roots
    /// deriving the same collection name are rejected rather than silently
    /// sharing a collection.
    pub async fn register(&self, ctx: &RequestContext, root: &Path) -> Result<CodebaseRecord> {
        ctx.ensure_live("registry.register")?;
        let key = root_key(root);
        let now = now_epoch_ms();

        let mut records = self.records.lock().await;

        if let Some(record) = records.get_mut(key.as_ref()) {
            match &record.status {
                // A record stuck in `indexing` (crash, cancellation) resumes
                // with its last percent; a live concurrent run is excluded by
                // the cross-process lock, not by registry state.
                CodebaseStatus::Indexing { .. } => {
                    return Ok(record.clone());
                }
                CodebaseStatus::Indexed { .. } | CodebaseStatus::IndexFailed { .. } => {
                    record.reenter_indexing(now).map_err(lifecycle_error)?;
                    let registered = record.clone();
                    self.persist(ctx, &records).await;
                    return Ok(registered);
                }
            }
        }

        for existing in records.keys() {
            if existing.as_ref() != key.as_ref()
                && root_contains(Path::new(existing.as_ref()), root)
            {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::subtree_covered(),
                    "an ancestor of this path is already registered; search through it instead",
                )
                .with_metadata("ancestorRoot", existing.to_string())
                .with_metadata("requested", key.to_string()));
            }
        }

        let collection_name =
            derive_collection_name(root, self.index_mode).map_err(ErrorEnvelope::from)?;
        if let Some(colliding) = records
            .values()
            .find(|record| record.collection_name == collection_name)
        {
            return Err(ErrorEnvelope::invariant(
                ErrorCode::collection_name_collision(),
                "two distinct roots derived the same collection name",
            )
            .with_metadata("existingRoot", colliding.root_path.to_string())
            .with_metadata("requested", key.to_string()));
        }

        let record = CodebaseRecord::registered(key.clone(), collection_name, now);
        records.insert(key, record.clone());
        self.persist(ctx, &records).await;
        Ok(record)
    }

    /// Record indexing progress (percent is monotone per record).
    pub async fn set_indexing(&self, ctx: &RequestContext, root: &Path, percent: u8) -> Result<()> {
        let key = root_key(root);
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(key.as_ref())
            .ok_or_else(|| not_indexed(&key))?;
        record
            .set_progress(percent, now_epoch_ms())
            .map_err(lifecycle_error)?;
        self.persist(ctx, &records).await;
        Ok(())
    }

    /// Transition a codebase to `indexed`.
    pub async fn set_indexed(
        &self,
        ctx: &RequestContext,
        root: &Path,
        stats: IndexStats,
    ) -> Result<()> {
        let key = root_key(root);
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(key.as_ref())
            .ok_or_else(|| not_indexed(&key))?;
        record
            .mark_indexed(stats, now_epoch_ms())
            .map_err(lifecycle_error)?;
        self.persist(ctx, &records).await;
        Ok(())
    }

    /// Transition a codebase to `indexfailed`, retaining the last percent.
    pub async fn set_indexfailed(
        &self,
        ctx: &RequestContext,
        root: &Path,
        error_message: &str,
    ) -> Result<()> {
        let key = root_key(root);
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(key.as_ref())
            .ok_or_else(|| not_indexed(&key))?;
        record
            .mark_failed(error_message.into(), now_epoch_ms())
            .map_err(lifecycle_error)?;
        self.persist(ctx, &records).await;
        Ok(())
    }

    /// Remove a codebase entirely.
    pub async fn remove(&self, ctx: &RequestContext, root: &Path) -> Result<()> {
        let key = root_key(root);
        let mut records = self.records.lock().await;
        if records.remove(key.as_ref()).is_none() {
            return Err(not_indexed(&key));
        }
        self.persist(ctx, &records).await;
        Ok(())
    }

    /// Current record for a root, if registered.
    pub async fn info(&self, root: &Path) -> Option<CodebaseRecord> {
        let key = root_key(root);
        let records = self.records.lock().await;
        records.get(key.as_ref()).cloned()
    }

    /// All records in the `indexed` state.
    pub async fn all_indexed(&self) -> Vec<CodebaseRecord> {
        let records = self.records.lock().await;
        records
            .values()
            .filter(|record| matches!(record.status, CodebaseStatus::Indexed { .. }))
            .cloned()
            .collect()
    }

    /// All records currently `indexing`.
    pub async fn all_indexing(&self) -> Vec<CodebaseRecord> {
        let records = self.records.lock().await;
        records
            .values()
            .filter(|record| matches!(record.status, CodebaseStatus::Indexing { .. }))
            .cloned()
            .collect()
    }

    /// True when nothing is registered.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Longest registered root containing `path`, if any.
    pub async fn find_containing_index(&self, path: &Path) -> Option<CodebaseRecord> {
        let records = self.records.lock().await;
        records
            .values()
            .filter(|record| root_contains(Path::new(record.root_path.as_ref()), path))
            .max_by_key(|record| record.root_path.len())
            .cloned()
    }

    /// Aggregate report grouped by state.
    pub async fn report(&self) -> RegistryReport {
        let records = self.records.lock().await;
        let mut report = RegistryReport::default();
        for record in records.values() {
            match record.status {
                CodebaseStatus::Indexed { .. } => report.indexed.push(record.clone()),
                CodebaseStatus::Indexing { .. } => report.indexing.push(record.clone()),
                CodebaseStatus::IndexFailed { .. } => report.failed.push(record.clone()),
            }
        }
        report
    }

    /// Persist the current state; one retry, then log and keep going (the
    /// in-memory state stays authoritative).
    async fn persist(&self, ctx: &RequestContext, records: &BTreeMap<Box<str>, CodebaseRecord>) {
        let snapshot = build_snapshot(records);
        if self.store.save(ctx, snapshot.clone()).await.is_ok() {
            return;
        }
        if let Err(error) = self.store.save(ctx, snapshot).await {
            if let Some(logger) = self.logger.as_ref() {
                let mut fields = semindex_ports::LogFields::new();
                fields.insert("error".into(), serde_json::Value::String(error.to_string()));
                logger.error(
                    "registry.persist_failed",
                    "Registry write failed twice; in-memory state retained",
                    Some(fields),
                );
            }
        }
    }
}

fn build_snapshot(records: &BTreeMap<Box<str>, CodebaseRecord>) -> RegistrySnapshot {
    let mut snapshot = RegistrySnapshot {
        version: REGISTRY_VERSION,
        last_updated_ms: now_epoch_ms(),
        indexes: Vec::new(),
        active_indexing: Vec::new(),
    };
    for record in records.values() {
        match record.status {
            CodebaseStatus::Indexing { .. } => snapshot.active_indexing.push(record.clone()),
            _ => snapshot.indexes.push(record.clone()),
        }
    }
    snapshot
}

fn root_key(root: &Path) -> Box<str> {
    let normalized: PathBuf = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    normalized.to_string_lossy().into_owned().into_boxed_str()
}

fn not_indexed(key: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::not_indexed(), "codebase is not registered")
        .with_metadata("rootPath", key.to_owned())
}

fn lifecycle_error(error: semindex_domain::LifecycleError) -> ErrorEnvelope {
    ErrorEnvelope::invariant(ErrorCode::new("registry", "invalid_transition"), error.to_string())
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semindex_ports::BoxFuture;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MemoryRegistryStore {
        saved: StdMutex<Option<RegistrySnapshot>>,
        fail_saves: StdMutex<usize>,
    }

    impl MemoryRegistryStore {
        fn last_saved(&self) -> Option<RegistrySnapshot> {
            self.saved.lock().expect("saved lock").clone()
        }
    }

    impl RegistryStorePort for MemoryRegistryStore {
        fn load(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<RegistrySnapshot>> {
            let snapshot = self.last_saved().unwrap_or_default();
            Box::pin(async move { Ok(snapshot) })
        }

        fn save(
            &self,
            _ctx: &RequestContext,
            snapshot: RegistrySnapshot,
        ) -> BoxFuture<'_, Result<()>> {
            let fail = {
                let mut failures = self.fail_saves.lock().expect("failures lock");
                if *failures > 0 {
                    *failures -= 1;
                    true
                } else {
                    false
                }
            };
            if !fail {
                *self.saved.lock().expect("saved lock") = Some(snapshot);
            }
            Box::pin(async move {
                if fail {
                    Err(ErrorEnvelope::expected(
                        ErrorCode::io(),
                        "scripted save failure",
                    ))
                } else {
                    Ok(())
                }
            })
        }
    }

    async fn registry() -> (Arc<MemoryRegistryStore>, CodebaseRegistry) {
        let store = Arc::new(MemoryRegistryStore::default());
        let ctx = RequestContext::for_request();
        let registry = CodebaseRegistry::load(
            &ctx,
            Arc::clone(&store) as Arc<dyn RegistryStorePort>,
            IndexMode::Hybrid,
            None,
        )
        .await
        .expect("load registry");
        (store, registry)
    }

    #[tokio::test]
    async fn lifecycle_walks_the_state_machine() -> Result<()> {
        let (_store, registry) = registry().await;
        let ctx = RequestContext::for_request();
        let root = Path::new("/repo");

        let record = registry.register(&ctx, root).await?;
        assert_eq!(record.status, CodebaseStatus::Indexing { percent: 0 });

        registry.set_indexing(&ctx, root, 25).await?;
        // Re-registering an in-flight record resumes with its percent.
        let resumed = registry.register(&ctx, root).await?;
        assert_eq!(resumed.status, CodebaseStatus::Indexing { percent: 25 });

        registry.set_indexing(&ctx, root, 40).await?;
        registry
            .set_indexed(&ctx, root, IndexStats { files: 2, chunks: 9 })
            .await?;
        let info = registry.info(root).await.expect("registered");
        assert_eq!(
            info.status,
            CodebaseStatus::Indexed {
                stats: IndexStats { files: 2, chunks: 9 }
            }
        );

        // Force reindex from indexed.
        let record = registry.register(&ctx, root).await?;
        assert_eq!(record.status, CodebaseStatus::Indexing { percent: 0 });

        registry.set_indexing(&ctx, root, 55).await?;
        registry.set_indexfailed(&ctx, root, "embed blew up").await?;
        let info = registry.info(root).await.expect("registered");
        assert_eq!(
            info.status,
            CodebaseStatus::IndexFailed {
                error_message: "embed blew up".into(),
                last_attempted_percent: 55,
            }
        );

        // Retry from failed.
        let record = registry.register(&ctx, root).await?;
        assert_eq!(record.status.label(), "indexing");

        registry.remove(&ctx, root).await?;
        assert!(registry.info(root).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn subtree_registration_is_rejected() -> Result<()> {
        let (_store, registry) = registry().await;
        let ctx = RequestContext::for_request();

        registry.register(&ctx, Path::new("/repo")).await?;
        let error = registry
            .register(&ctx, Path::new("/repo/packages/core"))
            .await
            .expect_err("subtree must be rejected");
        assert_eq!(error.code, ErrorCode::subtree_covered());
        Ok(())
    }

    #[tokio::test]
    async fn containment_picks_the_longest_root() -> Result<()> {
        let (_store, registry) = registry().await;
        let ctx = RequestContext::for_request();

        registry.register(&ctx, Path::new("/repo")).await?;
        registry.register(&ctx, Path::new("/repo2")).await?;

        let owner = registry
            .find_containing_index(Path::new("/repo/pkg/src/lib.rs"))
            .await
            .expect("containing root");
        assert_eq!(owner.root_path.as_ref(), "/repo");

        assert!(registry
            .find_containing_index(Path::new("/elsewhere"))
            .await
            .is_none());

        // `/repo2` is not under `/repo` despite the shared prefix.
        let owner = registry
            .find_containing_index(Path::new("/repo2/file.rs"))
            .await
            .expect("containing root");
        assert_eq!(owner.root_path.as_ref(), "/repo2");
        Ok(())
    }

    #[tokio::test]
    async fn persisted_lists_stay_disjoint() -> Result<()> {
        let (store, registry) = registry().await;
        let ctx = RequestContext::for_request();

        registry.register(&ctx, Path::new("/a")).await?;
        registry.register(&ctx, Path::new("/b")).await?;
        registry
            .set_indexed(&ctx, Path::new("/a"), IndexStats { files: 1, chunks: 1 })
            .await?;

        let snapshot = store.last_saved().expect("saved snapshot");
        assert_eq!(snapshot.indexes.len(), 1);
        assert_eq!(snapshot.active_indexing.len(), 1);
        assert_eq!(snapshot.indexes[0].root_path.as_ref(), "/a");
        assert_eq!(snapshot.active_indexing[0].root_path.as_ref(), "/b");
        Ok(())
    }

    #[tokio::test]
    async fn registry_reloads_from_its_store() -> Result<()> {
        let (store, registry) = registry().await;
        let ctx = RequestContext::for_request();
        registry.register(&ctx, Path::new("/repo")).await?;
        registry
            .set_indexed(&ctx, Path::new("/repo"), IndexStats { files: 3, chunks: 7 })
            .await?;

        let reloaded = CodebaseRegistry::load(
            &ctx,
            Arc::clone(&store) as Arc<dyn RegistryStorePort>,
            IndexMode::Hybrid,
            None,
        )
        .await?;
        let info = reloaded.info(Path::new("/repo")).await.expect("reloaded");
        assert_eq!(info.status.label(), "indexed");
        Ok(())
    }

    #[tokio::test]
    async fn save_failures_keep_memory_consistent() -> Result<()> {
        let (store, registry) = registry().await;
        let ctx = RequestContext::for_request();

        *store.fail_saves.lock().expect("failures lock") = 2;
        registry.register(&ctx, Path::new("/repo")).await?;

        // Both save attempts failed, but the record is still visible.
        assert!(registry.info(Path::new("/repo")).await.is_some());
        assert!(store.last_saved().is_none());
        Ok(())
    }
}
