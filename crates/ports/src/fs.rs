//! Filesystem boundary contract.

use crate::BoxFuture;
use semindex_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::PathBuf;

/// A normalized path relative to a codebase root.
///
/// Always `/`-separated, never absolute, never containing `..` segments; `.`
/// denotes the root itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelPath(Box<str>);

impl RelPath {
    /// The codebase root.
    #[must_use]
    pub fn root() -> Self {
        Self(".".into())
    }

    /// Validate and normalize untrusted relative-path input.
    pub fn new(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let replaced = trimmed.replace('\\', "/");
        if replaced.starts_with('/') || looks_like_drive(&replaced) {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "absolute paths are not allowed",
            ));
        }

        let mut segments = Vec::new();
        for segment in replaced.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(ErrorEnvelope::expected(
                        ErrorCode::invalid_input(),
                        "path traversal is not allowed",
                    ));
                }
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Ok(Self::root());
        }
        Ok(Self(segments.join("/").into_boxed_str()))
    }

    /// Join a child segment.
    #[must_use]
    pub fn join(&self, child: &str) -> Self {
        if self.0.as_ref() == "." {
            Self(child.to_owned().into_boxed_str())
        } else {
            Self(format!("{}/{child}", self.0).into_boxed_str())
        }
    }

    /// Borrow the path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelPath {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Directory entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symlink (not yet resolved).
    Symlink,
    /// Anything else.
    Other,
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Single path segment.
    pub name: Box<str>,
    /// Entry kind.
    pub kind: EntryKind,
}

/// File metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Entry kind after following the path.
    pub kind: EntryKind,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// Boundary contract for filesystem access under a codebase root.
pub trait FileSystemPort: Send + Sync {
    /// List entries of a directory.
    fn read_dir(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        dir: RelPath,
    ) -> BoxFuture<'_, Result<Vec<DirEntry>>>;

    /// Read a UTF-8 text file.
    fn read_file_text(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        file: RelPath,
    ) -> BoxFuture<'_, Result<Box<str>>>;

    /// Stat a path.
    fn stat(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        path: RelPath,
    ) -> BoxFuture<'_, Result<FileStat>>;

    /// Resolve a symlinked directory, returning its canonical target when the
    /// target stays inside `codebase_root` and `None` when it escapes.
    fn resolve_dir_symlink(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        path: RelPath,
    ) -> BoxFuture<'_, Result<Option<PathBuf>>>;
}

fn looks_like_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    matches!(bytes, [drive, b':', ..] if drive.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel_path_normalizes_separators_and_dots() -> Result<()> {
        assert_eq!(RelPath::new("src\\a//b/./c.rs")?.as_str(), "src/a/b/c.rs");
        assert_eq!(RelPath::new("")?.as_str(), ".");
        assert_eq!(RelPath::new("./")?.as_str(), ".");
        Ok(())
    }

    #[test]
    fn rel_path_rejects_absolute_and_traversal() {
        assert!(RelPath::new("/etc/passwd").is_err());
        assert!(RelPath::new("C:/windows").is_err());
        assert!(RelPath::new("a/../b").is_err());
    }

    #[test]
    fn join_handles_the_root() -> Result<()> {
        assert_eq!(RelPath::root().join("src").as_str(), "src");
        assert_eq!(RelPath::new("src")?.join("a.rs").as_str(), "src/a.rs");
        Ok(())
    }
}
