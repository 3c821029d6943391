//! Local snapshot synchronizer: hashes the tree, diffs against the persisted
//! snapshot, and commits atomically.

use crate::ignore::IgnoreResolver;
use semindex_config::DataDir;
use semindex_ports::{BoxFuture, FileSyncPort, IgnorePort, LoggerPort, SyncInitOptions};
use semindex_shared::snapshot::hash_bytes;
use semindex_shared::{
    ErrorCode, ErrorEnvelope, FileSnapshot, RequestContext, Result, SnapshotDiff,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Filesystem-backed implementation of [`FileSyncPort`] for one codebase.
#[derive(Clone)]
pub struct LocalFileSync {
    codebase_root: PathBuf,
    snapshot_path: PathBuf,
    logger: Option<Arc<dyn LoggerPort>>,
    state: Arc<RwLock<SyncState>>,
}

#[derive(Default)]
struct SyncState {
    resolver: IgnoreResolver,
    extensions: HashSet<Box<str>>,
    baseline: FileSnapshot,
}

impl LocalFileSync {
    /// Create a synchronizer scoped to `codebase_root`.
    #[must_use]
    pub fn new(
        codebase_root: PathBuf,
        data_dir: &DataDir,
        logger: Option<Arc<dyn LoggerPort>>,
    ) -> Self {
        let snapshot_path = data_dir.snapshot_file(&codebase_root);
        Self {
            codebase_root,
            snapshot_path,
            logger,
            state: Arc::new(RwLock::new(SyncState::default())),
        }
    }

    /// Snapshot file location for an arbitrary root (for `delete_snapshot`).
    #[must_use]
    pub fn snapshot_path_for(data_dir: &DataDir, codebase_root: &Path) -> PathBuf {
        data_dir.snapshot_file(codebase_root)
    }

    async fn load_persisted(&self) -> Result<FileSnapshot> {
        match tokio::fs::read(&self.snapshot_path).await {
            Ok(payload) => serde_json::from_slice(&payload).map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("sync", "snapshot_parse_failed"),
                    format!("failed to parse snapshot: {error}"),
                    semindex_shared::ErrorClass::NonRetriable,
                )
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(FileSnapshot::default())
            }
            Err(error) => Err(ErrorEnvelope::from(error)),
        }
    }

    async fn scan_tree(
        &self,
        ctx: &RequestContext,
        resolver: &IgnoreResolver,
        extensions: &HashSet<Box<str>>,
    ) -> Result<BTreeMap<Box<str>, Box<str>>> {
        let root = tokio::fs::canonicalize(&self.codebase_root)
            .await
            .unwrap_or_else(|_| self.codebase_root.clone());

        let mut entries = BTreeMap::new();
        let mut visited_dirs: HashSet<PathBuf> = HashSet::from([root.clone()]);
        let mut pending: VecDeque<(PathBuf, String)> = VecDeque::from([(root.clone(), String::new())]);

        while let Some((dir, rel_prefix)) = pending.pop_front() {
            ctx.ensure_live("file_sync.scan")?;

            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(_) => {
                    self.warn("sync.scan.dir_read_failed", "Cannot read directory during scan");
                    continue;
                }
            };

            while let Some(entry) = reader.next_entry().await.map_err(ErrorEnvelope::from)? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let rel = if rel_prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{rel_prefix}/{name}")
                };

                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(_) => continue,
                };

                if file_type.is_dir() {
                    if resolver.is_ignored(&rel, true) {
                        continue;
                    }
                    pending.push_back((entry.path(), rel));
                } else if file_type.is_file() {
                    if resolver.is_ignored(&rel, false) || !extension_allowed(&rel, extensions) {
                        continue;
                    }
                    match tokio::fs::read(entry.path()).await {
                        Ok(bytes) => {
                            entries.insert(
                                rel.into_boxed_str(),
                                hash_bytes(&bytes).into_boxed_str(),
                            );
                        }
                        Err(_) => {
                            self.warn("sync.scan.file_read_failed", "Cannot hash file; skipping");
                        }
                    }
                } else if file_type.is_symlink() {
                    // Follow directory symlinks only while they stay inside
                    // the root; never follow file symlinks.
                    let Ok(target) = tokio::fs::canonicalize(entry.path()).await else {
                        continue;
                    };
                    let is_dir = tokio::fs::metadata(&target)
                        .await
                        .map_or(false, |metadata| metadata.is_dir());
                    if is_dir
                        && target.starts_with(&root)
                        && visited_dirs.insert(target.clone())
                        && !resolver.is_ignored(&rel, true)
                    {
                        pending.push_back((target, rel));
                    }
                }
            }
        }
        Ok(entries)
    }

    fn warn(&self, event: &str, message: &str) {
        if let Some(logger) = self.logger.as_ref() {
            logger.warn(event, message, None);
        }
    }
}

impl FileSyncPort for LocalFileSync {
    fn initialize(
        &self,
        ctx: &RequestContext,
        options: SyncInitOptions,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move {
            ctx.ensure_live("file_sync.initialize")?;

            let baseline = sync.load_persisted().await?;
            let mut state = sync.state.write().await;
            state.resolver = IgnoreResolver::from_patterns(
                options.ignore_patterns.iter().map(AsRef::as_ref),
            );
            state.extensions = options
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase().into_boxed_str())
                .collect();
            state.baseline = baseline;
            drop(state);
            Ok(())
        })
    }

    fn check_for_changes(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<SnapshotDiff>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move {
            ctx.ensure_live("file_sync.check_for_changes")?;

            let (resolver, extensions, baseline) = {
                let state = sync.state.read().await;
                (
                    state.resolver.clone(),
                    state.extensions.clone(),
                    state.baseline.clone(),
                )
            };

            let entries = sync.scan_tree(&ctx, &resolver, &extensions).await?;
            let current = FileSnapshot::from_entries(entries);
            let diff = baseline.diff(&current);

            let mut state = sync.state.write().await;
            state.baseline = current;
            drop(state);

            Ok(diff)
        })
    }

    fn commit(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move {
            ctx.ensure_live("file_sync.commit")?;

            let baseline = {
                let state = sync.state.read().await;
                state.baseline.clone()
            };

            if let Some(parent) = sync.snapshot_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(ErrorEnvelope::from)?;
            }
            let payload = serde_json::to_vec_pretty(&baseline).map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("sync", "snapshot_serialize_failed"),
                    format!("failed to serialize snapshot: {error}"),
                    semindex_shared::ErrorClass::NonRetriable,
                )
            })?;

            let temp_path = sync.snapshot_path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, payload)
                .await
                .map_err(ErrorEnvelope::from)?;
            tokio::fs::rename(&temp_path, &sync.snapshot_path)
                .await
                .map_err(ErrorEnvelope::from)?;
            Ok(())
        })
    }

    fn delete_snapshot(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let sync = self.clone();
        Box::pin(async move {
            ctx.ensure_live("file_sync.delete_snapshot")?;

            let expected = std::path::absolute(&sync.codebase_root)
                .unwrap_or_else(|_| sync.codebase_root.clone());
            let provided =
                std::path::absolute(&codebase_root).unwrap_or_else(|_| codebase_root.clone());
            if expected != provided {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "codebase root mismatch",
                )
                .with_metadata("expected", expected.to_string_lossy().to_string())
                .with_metadata("provided", provided.to_string_lossy().to_string()));
            }

            match tokio::fs::remove_file(&sync.snapshot_path).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(error) => Err(ErrorEnvelope::from(error)),
            }
        })
    }
}

fn extension_allowed(relative_path: &str, extensions: &HashSet<Box<str>>) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let file = relative_path.rsplit('/').next().unwrap_or(relative_path);
    let Some((_, ext)) = file.rsplit_once('.') else {
        return false;
    };
    extensions.contains(ext.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}-{nanos}"))
    }

    async fn setup(prefix: &str) -> Result<(PathBuf, DataDir)> {
        let base = temp_dir(prefix);
        let root = base.join("repo");
        tokio::fs::create_dir_all(&root).await.map_err(ErrorEnvelope::from)?;
        let data_dir = DataDir::at(base.join("data"));
        Ok((root, data_dir))
    }

    fn options() -> SyncInitOptions {
        SyncInitOptions {
            ignore_patterns: vec!["ignored/".into()],
            extensions: vec!["py".into(), "rs".into()],
        }
    }

    #[tokio::test]
    async fn detects_added_modified_and_removed_files() -> Result<()> {
        let (root, data_dir) = setup("sync-diff").await?;
        tokio::fs::write(root.join("a.py"), "print('a')\n").await.map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("b.py"), "print('b')\n").await.map_err(ErrorEnvelope::from)?;

        let sync = LocalFileSync::new(root.clone(), &data_dir, None);
        let ctx = RequestContext::for_request();
        sync.initialize(&ctx, options()).await?;

        let first = sync.check_for_changes(&ctx).await?;
        assert_eq!(first.added.len(), 2);
        assert!(first.removed.is_empty() && first.modified.is_empty());
        sync.commit(&ctx).await?;

        tokio::fs::write(root.join("a.py"), "print('changed')\n")
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::remove_file(root.join("b.py")).await.map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("c.py"), "print('c')\n").await.map_err(ErrorEnvelope::from)?;

        let second = sync.check_for_changes(&ctx).await?;
        assert_eq!(second.added, vec![Box::from("c.py")]);
        assert_eq!(second.removed, vec![Box::from("b.py")]);
        assert_eq!(second.modified, vec![Box::from("a.py")]);
        Ok(())
    }

    #[tokio::test]
    async fn diff_is_idempotent_without_mutation() -> Result<()> {
        let (root, data_dir) = setup("sync-idempotent").await?;
        tokio::fs::write(root.join("a.rs"), "fn a() {}\n").await.map_err(ErrorEnvelope::from)?;

        let sync = LocalFileSync::new(root, &data_dir, None);
        let ctx = RequestContext::for_request();
        sync.initialize(&ctx, options()).await?;

        let first = sync.check_for_changes(&ctx).await?;
        assert_eq!(first.len(), 1);
        let second = sync.check_for_changes(&ctx).await?;
        assert!(second.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn commit_persists_across_instances() -> Result<()> {
        let (root, data_dir) = setup("sync-persist").await?;
        tokio::fs::write(root.join("a.rs"), "fn a() {}\n").await.map_err(ErrorEnvelope::from)?;

        let ctx = RequestContext::for_request();
        {
            let sync = LocalFileSync::new(root.clone(), &data_dir, None);
            sync.initialize(&ctx, options()).await?;
            sync.check_for_changes(&ctx).await?;
            sync.commit(&ctx).await?;
        }

        let sync = LocalFileSync::new(root, &data_dir, None);
        sync.initialize(&ctx, options()).await?;
        let diff = sync.check_for_changes(&ctx).await?;
        assert!(diff.is_empty(), "committed snapshot should carry over");
        Ok(())
    }

    #[tokio::test]
    async fn ignored_and_unsupported_files_are_invisible() -> Result<()> {
        let (root, data_dir) = setup("sync-ignore").await?;
        tokio::fs::create_dir_all(root.join("ignored")).await.map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("ignored/x.py"), "hidden\n").await.map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("image.png"), [0u8, 1, 2]).await.map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("kept.rs"), "fn kept() {}\n").await.map_err(ErrorEnvelope::from)?;

        let sync = LocalFileSync::new(root, &data_dir, None);
        let ctx = RequestContext::for_request();
        sync.initialize(&ctx, options()).await?;

        let diff = sync.check_for_changes(&ctx).await?;
        assert_eq!(diff.added, vec![Box::from("kept.rs")]);
        Ok(())
    }

    #[tokio::test]
    async fn delete_snapshot_requires_matching_root() -> Result<()> {
        let (root, data_dir) = setup("sync-delete").await?;
        let sync = LocalFileSync::new(root.clone(), &data_dir, None);
        let ctx = RequestContext::for_request();

        assert!(sync
            .delete_snapshot(&ctx, PathBuf::from("/somewhere/else"))
            .await
            .is_err());
        sync.delete_snapshot(&ctx, root).await?;
        Ok(())
    }
}
