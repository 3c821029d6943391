//! Background reconciler: periodically applies filesystem diffs to every
//! indexed codebase.

use crate::registry::CodebaseRegistry;
use semindex_domain::CodebaseRecord;
use semindex_ports::{BoxFuture, LoggerPort, VectorStorePort};
use semindex_shared::{CancellationToken, RequestContext, Result, SnapshotDiff};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Applies one codebase's diff; composed by the backend so the reconciler
/// stays free of per-root adapter wiring.
pub type ReindexRunner = Arc<
    dyn Fn(RequestContext, CodebaseRecord) -> BoxFuture<'static, Result<SnapshotDiff>>
        + Send
        + Sync,
>;

/// Deletes the persisted snapshot for a root.
pub type SnapshotCleaner =
    Arc<dyn Fn(RequestContext, PathBuf) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Reconciler cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Delay before the first pass.
    pub initial_delay: Duration,
    /// Interval between passes.
    pub interval: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Dependencies of the reconcile loop.
#[derive(Clone)]
pub struct ReconcilerDeps {
    /// Registry listing the codebases to keep current.
    pub registry: Arc<CodebaseRegistry>,
    /// Vector store, for detecting externally deleted collections.
    pub store: Arc<dyn VectorStorePort>,
    /// Runs the incremental reindex for one codebase.
    pub run_reindex: ReindexRunner,
    /// Deletes a codebase's snapshot.
    pub clean_snapshot: SnapshotCleaner,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Periodic, single-flight reconciliation driver.
pub struct Reconciler {
    deps: ReconcilerDeps,
    settings: ReconcilerSettings,
}

impl Reconciler {
    /// Create a reconciler.
    #[must_use]
    pub const fn new(deps: ReconcilerDeps, settings: ReconcilerSettings) -> Self {
        Self { deps, settings }
    }

    /// Spawn the loop. It stops on cancellation or once the registry is
    /// empty (a later `register` restarts it from the composition root).
    pub fn spawn(self, cancellation: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                () = cancellation.cancelled() => return,
                () = tokio::time::sleep(self.settings.initial_delay) => {}
            }

            // Ticks never overlap: each pass runs to completion before the
            // next sleep starts, so a tick elapsing mid-pass is skipped.
            loop {
                if cancellation.is_cancelled() {
                    return;
                }
                if self.deps.registry.is_empty().await {
                    return;
                }

                self.reconcile_pass().await;

                tokio::select! {
                    () = cancellation.cancelled() => return,
                    () = tokio::time::sleep(self.settings.interval) => {}
                }
            }
        })
    }

    /// One pass over every indexed codebase. Per-codebase failures are
    /// isolated; the pass always visits everything.
    pub async fn reconcile_pass(&self) {
        let indexed = self.deps.registry.all_indexed().await;
        for record in indexed {
            let ctx = RequestContext::for_request();
            if let Err(error) = self.reconcile_one(&ctx, &record).await {
                self.warn_for(&record, &error);
            }
        }
    }

    async fn reconcile_one(&self, ctx: &RequestContext, record: &CodebaseRecord) -> Result<()> {
        let root = Path::new(record.root_path.as_ref());
        if tokio::fs::metadata(root).await.is_err() {
            if let Some(logger) = self.deps.logger.as_ref() {
                let mut fields = semindex_ports::LogFields::new();
                fields.insert(
                    "rootPath".into(),
                    serde_json::Value::String(record.root_path.to_string()),
                );
                logger.warn(
                    "reconcile.root_missing",
                    "Codebase root no longer exists; skipping",
                    Some(fields),
                );
            }
            return Ok(());
        }

        let has_collection = self
            .deps
            .store
            .has_collection(ctx, record.collection_name.clone())
            .await?;
        if !has_collection {
            // The collection vanished externally: drop the snapshot so the
            // next index run starts from scratch.
            (self.deps.clean_snapshot)(ctx.clone(), root.to_path_buf()).await?;
            if let Some(logger) = self.deps.logger.as_ref() {
                logger.warn(
                    "reconcile.collection_missing",
                    "Collection disappeared; snapshot deleted",
                    None,
                );
            }
            return Ok(());
        }

        let diff = (self.deps.run_reindex)(ctx.clone(), record.clone()).await?;
        if !diff.is_empty() {
            if let Some(logger) = self.deps.logger.as_ref() {
                let mut fields = semindex_ports::LogFields::new();
                fields.insert("added".into(), serde_json::Value::from(diff.added.len()));
                fields.insert("removed".into(), serde_json::Value::from(diff.removed.len()));
                fields.insert(
                    "modified".into(),
                    serde_json::Value::from(diff.modified.len()),
                );
                logger.info("reconcile.applied", "Applied filesystem diff", Some(fields));
            }
        }
        Ok(())
    }

    fn warn_for(&self, record: &CodebaseRecord, error: &semindex_shared::ErrorEnvelope) {
        if let Some(logger) = self.deps.logger.as_ref() {
            let mut fields = semindex_ports::LogFields::new();
            fields.insert(
                "rootPath".into(),
                serde_json::Value::String(record.root_path.to_string()),
            );
            fields.insert("error".into(), serde_json::Value::String(error.to_string()));
            logger.warn(
                "reconcile.codebase_failed",
                "Reconcile failed for one codebase; continuing",
                Some(fields),
            );
        }
    }
}
