//! Change-detection boundary contract (snapshot + diff).

use crate::BoxFuture;
use semindex_shared::{RequestContext, Result, SnapshotDiff};
use std::path::PathBuf;

/// Options for snapshot initialization.
#[derive(Debug, Clone, Default)]
pub struct SyncInitOptions {
    /// Ignore patterns applied while walking.
    pub ignore_patterns: Vec<Box<str>>,
    /// Extension allow-list (without leading dots); empty means all.
    pub extensions: Vec<Box<str>>,
}

/// Boundary contract for per-codebase snapshot synchronization.
///
/// `check_for_changes` only updates in-memory state; durability requires an
/// explicit `commit`, so a cancelled run never leaves a half-written
/// snapshot behind.
pub trait FileSyncPort: Send + Sync {
    /// Load the persisted snapshot for the root, or start empty.
    fn initialize(
        &self,
        ctx: &RequestContext,
        options: SyncInitOptions,
    ) -> BoxFuture<'_, Result<()>>;

    /// Walk the root, hash files, and diff against the loaded snapshot.
    ///
    /// Running twice without filesystem mutation (and a `commit` in between)
    /// yields an empty diff the second time.
    fn check_for_changes(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<SnapshotDiff>>;

    /// Atomically persist the current in-memory snapshot.
    fn commit(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;

    /// Remove the persisted snapshot for a root (missing files are fine).
    fn delete_snapshot(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
    ) -> BoxFuture<'_, Result<()>>;
}
