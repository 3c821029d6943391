//! Per-codebase lifecycle: the `indexing -> indexed | indexfailed` machine.

use crate::CollectionName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Counts recorded when a codebase reaches `indexed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Files indexed.
    pub files: usize,
    /// Chunks persisted.
    pub chunks: usize,
}

/// Lifecycle status of a registered codebase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CodebaseStatus {
    /// An indexing run is in progress.
    Indexing {
        /// Completion percentage (0-100), monotone within a run.
        percent: u8,
    },
    /// The last run completed.
    Indexed {
        /// Final counts.
        stats: IndexStats,
    },
    /// The last run failed.
    IndexFailed {
        /// Human-readable failure reason.
        error_message: Box<str>,
        /// Percent observed when the run failed.
        last_attempted_percent: u8,
    },
}

impl CodebaseStatus {
    /// Short label used in reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Indexing { .. } => "indexing",
            Self::Indexed { .. } => "indexed",
            Self::IndexFailed { .. } => "indexfailed",
        }
    }
}

/// Invalid lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleError {
    /// Label of the state the transition started from.
    pub from: &'static str,
    /// Name of the attempted transition.
    pub attempted: &'static str,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "invalid lifecycle transition: {} from {}",
            self.attempted, self.from
        )
    }
}

impl std::error::Error for LifecycleError {}

/// One registry record: a codebase root plus its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodebaseRecord {
    /// Absolute canonical root path (`/` separators as stored).
    pub root_path: Box<str>,
    /// Deterministic collection name for this root.
    pub collection_name: CollectionName,
    /// Lifecycle status.
    #[serde(flatten)]
    pub status: CodebaseStatus,
    /// Last mutation time, milliseconds since the epoch.
    pub last_updated_ms: u64,
}

impl CodebaseRecord {
    /// Create a record in the initial `indexing` state.
    #[must_use]
    pub fn registered(root_path: Box<str>, collection_name: CollectionName, now_ms: u64) -> Self {
        Self {
            root_path,
            collection_name,
            status: CodebaseStatus::Indexing { percent: 0 },
            last_updated_ms: now_ms,
        }
    }

    /// Record indexing progress; percent is clamped monotone non-decreasing.
    pub fn set_progress(&mut self, percent: u8, now_ms: u64) -> Result<(), LifecycleError> {
        match &mut self.status {
            CodebaseStatus::Indexing { percent: current } => {
                *current = (*current).max(percent.min(100));
                self.last_updated_ms = now_ms;
                Ok(())
            }
            other => Err(LifecycleError {
                from: other.label(),
                attempted: "set_progress",
            }),
        }
    }

    /// Transition `indexing -> indexed`.
    pub fn mark_indexed(&mut self, stats: IndexStats, now_ms: u64) -> Result<(), LifecycleError> {
        match &self.status {
            CodebaseStatus::Indexing { .. } => {
                self.status = CodebaseStatus::Indexed { stats };
                self.last_updated_ms = now_ms;
                Ok(())
            }
            other => Err(LifecycleError {
                from: other.label(),
                attempted: "mark_indexed",
            }),
        }
    }

    /// Transition `indexing -> indexfailed`, retaining the last percent.
    pub fn mark_failed(
        &mut self,
        error_message: Box<str>,
        now_ms: u64,
    ) -> Result<(), LifecycleError> {
        match &self.status {
            CodebaseStatus::Indexing { percent } => {
                self.status = CodebaseStatus::IndexFailed {
                    error_message,
                    last_attempted_percent: *percent,
                };
                self.last_updated_ms = now_ms;
                Ok(())
            }
            other => Err(LifecycleError {
                from: other.label(),
                attempted: "mark_failed",
            }),
        }
    }

    /// Re-enter `indexing` from `indexed` (force) or `indexfailed` (retry).
    pub fn reenter_indexing(&mut self, now_ms: u64) -> Result<(), LifecycleError> {
        match &self.status {
            CodebaseStatus::Indexed { .. } | CodebaseStatus::IndexFailed { .. } => {
                self.status = CodebaseStatus::Indexing { percent: 0 };
                self.last_updated_ms = now_ms;
                Ok(())
            }
            other => Err(LifecycleError {
                from: other.label(),
                attempted: "reenter_indexing",
            }),
        }
    }
}

/// Containment test: `root` owns `path` iff they are equal or `path` lies
/// strictly under `root`.
#[must_use]
pub fn root_contains(root: &Path, path: &Path) -> bool {
    if root == path {
        return true;
    }
    path.strip_prefix(root).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexMode;
    use std::path::PathBuf;

    fn record() -> CodebaseRecord {
        let collection = crate::derive_collection_name("/repo", IndexMode::Hybrid)
            .expect("derived collection name");
        CodebaseRecord::registered("/repo".into(), collection, 1_000)
    }

    #[test]
    fn progress_is_monotone_and_capped() {
        let mut record = record();
        record.set_progress(40, 1_001).expect("progress");
        record.set_progress(20, 1_002).expect("progress");
        assert_eq!(record.status, CodebaseStatus::Indexing { percent: 40 });

        record.set_progress(200, 1_003).expect("progress");
        assert_eq!(record.status, CodebaseStatus::Indexing { percent: 100 });
    }

    #[test]
    fn failure_retains_last_percent_and_allows_retry() {
        let mut record = record();
        record.set_progress(62, 1_001).expect("progress");
        record.mark_failed("embed failed".into(), 1_002).expect("fail");

        assert_eq!(
            record.status,
            CodebaseStatus::IndexFailed {
                error_message: "embed failed".into(),
                last_attempted_percent: 62,
            }
        );

        record.reenter_indexing(1_003).expect("retry");
        assert_eq!(record.status, CodebaseStatus::Indexing { percent: 0 });
    }

    #[test]
    fn indexed_rejects_progress_but_allows_force_reindex() {
        let mut record = record();
        record
            .mark_indexed(IndexStats { files: 2, chunks: 5 }, 1_001)
            .expect("indexed");

        assert!(record.set_progress(10, 1_002).is_err());
        assert!(record.mark_indexed(IndexStats::default(), 1_003).is_err());

        record.reenter_indexing(1_004).expect("force");
        assert_eq!(record.status.label(), "indexing");
    }

    #[test]
    fn containment_requires_a_component_boundary() {
        let root = PathBuf::from("/repo");
        assert!(root_contains(&root, &PathBuf::from("/repo")));
        assert!(root_contains(&root, &PathBuf::from("/repo/src/lib.rs")));
        assert!(!root_contains(&root, &PathBuf::from("/repo2")));
        assert!(!root_contains(&root, &PathBuf::from("/other")));
    }
}
