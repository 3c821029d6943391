//! Data-directory layout under `${home}/.context`.

use semindex_shared::{ErrorCode, ErrorEnvelope, Result};
use std::path::{Path, PathBuf};

const DATA_DIR_NAME: &str = ".context";
const SYNC_DIR: &str = "sync";
const LOCKS_DIR: &str = "locks";
const REGISTRY_FILE: &str = "registry.json";
const GLOBAL_IGNORE_FILE: &str = ".contextignore";

/// Resolved per-user data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve from the user's home directory.
    pub fn resolve() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::not_found(),
                "cannot resolve a home directory for persistent state",
            )
        })?;
        Ok(Self::at(home.join(DATA_DIR_NAME)))
    }

    /// Use an explicit root (tests, custom layouts).
    #[must_use]
    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    /// The data-dir root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The shared registry file.
    #[must_use]
    pub fn registry_file(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    /// Snapshot file for a codebase root, named by `md5(normalized root)`.
    #[must_use]
    pub fn snapshot_file(&self, codebase_root: &Path) -> PathBuf {
        let normalized = normalize(codebase_root);
        let digest = md5::compute(normalized.to_string_lossy().as_bytes());
        self.root.join(SYNC_DIR).join(format!("{digest:x}.json"))
    }

    /// Lock file for a named resource.
    #[must_use]
    pub fn lock_file(&self, name: &str) -> PathBuf {
        let digest = md5::compute(name.as_bytes());
        self.root.join(LOCKS_DIR).join(format!("{digest:x}.lock"))
    }

    /// Slot file for a named counting semaphore.
    #[must_use]
    pub fn semaphore_slot_file(&self, name: &str, slot: usize) -> PathBuf {
        let digest = md5::compute(name.as_bytes());
        self.root
            .join(LOCKS_DIR)
            .join(format!("{digest:x}"))
            .join(format!("slot-{slot}.lock"))
    }

    /// The optional global ignore file.
    #[must_use]
    pub fn global_ignore_file(&self) -> PathBuf {
        self.root.join(GLOBAL_IGNORE_FILE)
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
