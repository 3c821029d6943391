//! tokio-backed filesystem adapter.

use semindex_ports::{
    BoxFuture, DirEntry, EntryKind, FileStat, FileSystemPort, RelPath,
};
use semindex_shared::{ErrorEnvelope, RequestContext, Result};
use std::path::{Path, PathBuf};

/// Local filesystem adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Create the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn resolve(codebase_root: &Path, rel: &RelPath) -> PathBuf {
    if rel.as_str() == "." {
        codebase_root.to_path_buf()
    } else {
        codebase_root.join(rel.as_str())
    }
}

impl FileSystemPort for TokioFileSystem {
    fn read_dir(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        dir: RelPath,
    ) -> BoxFuture<'_, Result<Vec<DirEntry>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_live("fs.read_dir")?;
            let path = resolve(&codebase_root, &dir);
            let mut reader = tokio::fs::read_dir(&path).await.map_err(ErrorEnvelope::from)?;
            let mut entries = Vec::new();
            while let Some(entry) = reader.next_entry().await.map_err(ErrorEnvelope::from)? {
                let file_type = entry.file_type().await.map_err(ErrorEnvelope::from)?;
                let kind = if file_type.is_symlink() {
                    EntryKind::Symlink
                } else if file_type.is_dir() {
                    EntryKind::Directory
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    EntryKind::Other
                };
                entries.push(DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned().into_boxed_str(),
                    kind,
                });
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })
    }

    fn read_file_text(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        file: RelPath,
    ) -> BoxFuture<'_, Result<Box<str>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_live("fs.read_file_text")?;
            let path = resolve(&codebase_root, &file);
            let bytes = tokio::fs::read(&path).await.map_err(ErrorEnvelope::from)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned().into_boxed_str())
        })
    }

    fn stat(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        path: RelPath,
    ) -> BoxFuture<'_, Result<FileStat>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_live("fs.stat")?;
            let resolved = resolve(&codebase_root, &path);
            let metadata = tokio::fs::metadata(&resolved).await.map_err(ErrorEnvelope::from)?;
            let kind = if metadata.is_dir() {
                EntryKind::Directory
            } else if metadata.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            Ok(FileStat {
                kind,
                size_bytes: metadata.len(),
            })
        })
    }

    fn resolve_dir_symlink(
        &self,
        ctx: &RequestContext,
        codebase_root: PathBuf,
        path: RelPath,
    ) -> BoxFuture<'_, Result<Option<PathBuf>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_live("fs.resolve_dir_symlink")?;
            let resolved = resolve(&codebase_root, &path);
            let target = match tokio::fs::canonicalize(&resolved).await {
                Ok(target) => target,
                // Dangling links resolve to nothing rather than an error.
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(error) => return Err(ErrorEnvelope::from(error)),
            };
            let canonical_root = tokio::fs::canonicalize(&codebase_root)
                .await
                .unwrap_or(codebase_root);
            if target.starts_with(&canonical_root) && tokio::fs::metadata(&target).await.map_or(false, |m| m.is_dir()) {
                Ok(Some(target))
            } else {
                Ok(None)
            }
        })
    }
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

    #[tokio::test]
    async fn read_dir_sorts_entries_and_tags_kinds() -> Result<()> {
        let root = temp_dir("fs-read-dir");
        tokio::fs::create_dir_all(root.join("sub")).await.map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("b.rs"), "fn b() {}\n").await.map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("a.rs"), "fn a() {}\n").await.map_err(ErrorEnvelope::from)?;

        let fs = TokioFileSystem::new();
        let ctx = RequestContext::for_request();
        let entries = fs.read_dir(&ctx, root.clone(), RelPath::root()).await?;

        let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_ref()).collect();
        assert_eq!(names, vec!["a.rs", "b.rs", "sub"]);
        assert_eq!(entries[2].kind, EntryKind::Directory);
        Ok(())
    }

    #[tokio::test]
    async fn read_file_text_tolerates_invalid_utf8() -> Result<()> {
        let root = temp_dir("fs-read-text");
        tokio::fs::create_dir_all(&root).await.map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("mixed.txt"), b"ok\xFFbytes")
            .await
            .map_err(ErrorEnvelope::from)?;

        let fs = TokioFileSystem::new();
        let ctx = RequestContext::for_request();
        let text = fs
            .read_file_text(&ctx, root, RelPath::new("mixed.txt")?)
            .await?;
        assert!(text.contains("ok"));
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dir_symlinks_escaping_the_root_are_rejected() -> Result<()> {
        let root = temp_dir("fs-symlink-root");
        let outside = temp_dir("fs-symlink-outside");
        tokio::fs::create_dir_all(&root).await.map_err(ErrorEnvelope::from)?;
        tokio::fs::create_dir_all(&outside).await.map_err(ErrorEnvelope::from)?;
        tokio::fs::create_dir_all(root.join("inner")).await.map_err(ErrorEnvelope::from)?;
        tokio::fs::symlink(&outside, root.join("escape"))
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::symlink(root.join("inner"), root.join("alias"))
            .await
            .map_err(ErrorEnvelope::from)?;

        let fs = TokioFileSystem::new();
        let ctx = RequestContext::for_request();
        assert_eq!(
            fs.resolve_dir_symlink(&ctx, root.clone(), RelPath::new("escape")?)
                .await?,
            None
        );
        assert!(fs
            .resolve_dir_symlink(&ctx, root, RelPath::new("alias")?)
            .await?
            .is_some());
        Ok(())
    }
}
