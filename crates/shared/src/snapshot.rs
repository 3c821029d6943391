//! Merkle-style file snapshot: per-file content hashes plus an aggregate
//! root hash over the sorted entries.
//!
//! The root hash is not required for diff correctness; it is a cheap
//! short-circuit when two trees are identical.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Mapping from relative path to content hash, with a derived root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileSnapshot {
    /// Aggregate root hash over the sorted entries.
    pub merkle_root: Box<str>,
    /// `relative path -> sha256(content)` in sorted order.
    pub entries: BTreeMap<Box<str>, Box<str>>,
}

/// Diff between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotDiff {
    /// Present now, absent before.
    pub added: Vec<Box<str>>,
    /// Absent now, present before.
    pub removed: Vec<Box<str>>,
    /// Present in both with differing hashes.
    pub modified: Vec<Box<str>>,
}

impl SnapshotDiff {
    /// Returns true when no changes were detected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of changed paths.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

impl FileSnapshot {
    /// Build a snapshot from entries, deriving the root hash.
    #[must_use]
    pub fn from_entries(entries: BTreeMap<Box<str>, Box<str>>) -> Self {
        let merkle_root = compute_root(&entries);
        Self {
            merkle_root,
            entries,
        }
    }

    /// Returns true when the snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute the root hash from the current entries.
    #[must_use]
    pub fn computed_root(&self) -> Box<str> {
        compute_root(&self.entries)
    }

    /// Compare `self` (previous state) against `current`.
    ///
    /// The three result sets are pairwise disjoint by construction and each
    /// is sorted because the underlying maps iterate in key order.
    #[must_use]
    pub fn diff(&self, current: &Self) -> SnapshotDiff {
        if self.merkle_root == current.merkle_root {
            return SnapshotDiff::default();
        }

        let mut diff = SnapshotDiff::default();
        for (path, hash) in &current.entries {
            match self.entries.get(path) {
                None => diff.added.push(path.clone()),
                Some(previous) if previous != hash => diff.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in self.entries.keys() {
            if !current.entries.contains_key(path) {
                diff.removed.push(path.clone());
            }
        }
        diff
    }
}

/// Hash arbitrary bytes to lowercase hex sha256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn compute_root(entries: &BTreeMap<Box<str>, Box<str>>) -> Box<str> {
    let mut hasher = Sha256::new();
    for (path, hash) in entries {
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize()).into_boxed_str()
}
