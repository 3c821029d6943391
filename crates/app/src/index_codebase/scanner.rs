//! File discovery for the pipeline: walk the root under the ignore set,
//! keeping supported extensions only.

use super::types::{IndexCodebaseDeps, IndexCodebaseInput};
use semindex_ports::{EntryKind, RelPath};
use semindex_shared::{RequestContext, Result};
use std::collections::{HashSet, VecDeque};

/// Discover the relative paths to index, sorted for determinism.
pub(crate) async fn discover_files(
    ctx: &RequestContext,
    deps: &IndexCodebaseDeps,
    input: &IndexCodebaseInput,
) -> Result<Vec<Box<str>>> {
    let extensions = normalized_extensions(&input.extensions);

    if let Some(file_list) = input.file_list.as_ref() {
        let mut files: Vec<Box<str>> = file_list
            .iter()
            .filter_map(|path| RelPath::new(path).ok())
            .map(|path| path.as_str().to_owned().into_boxed_str())
            .filter(|path| !deps.ignore.is_ignored(path, false))
            .filter(|path| extension_allowed(path, &extensions))
            .collect();
        files.sort();
        files.dedup();
        return Ok(files);
    }

    let mut files = Vec::new();
    let mut pending = VecDeque::from([RelPath::root()]);

    while let Some(dir) = pending.pop_front() {
        ctx.ensure_live("index.scan")?;

        let entries = match deps
            .filesystem
            .read_dir(ctx, input.codebase_root.clone(), dir.clone())
            .await
        {
            Ok(entries) => entries,
            Err(error) => {
                if error.is_cancelled() {
                    return Err(error);
                }
                if let Some(logger) = deps.logger.as_ref() {
                    logger.warn(
                        "index.scan.dir_read_failed",
                        "Cannot read directory during scan",
                        None,
                    );
                }
                continue;
            }
        };

        for entry in entries {
            ctx.ensure_live("index.scan_entry")?;
            let rel = dir.join(entry.name.as_ref());

            match entry.kind {
                EntryKind::Directory => {
                    if !deps.ignore.is_ignored(rel.as_str(), true) {
                        pending.push_back(rel);
                    }
                }
                EntryKind::File => {
                    if deps.ignore.is_ignored(rel.as_str(), false) {
                        continue;
                    }
                    if extension_allowed(rel.as_str(), &extensions) {
                        files.push(rel.as_str().to_owned().into_boxed_str());
                    }
                }
                EntryKind::Symlink => {
                    // Directory symlinks are followed only while contained in
                    // the root; file symlinks are never followed.
                    let resolved = deps
                        .filesystem
                        .resolve_dir_symlink(ctx, input.codebase_root.clone(), rel.clone())
                        .await;
                    if matches!(resolved, Ok(Some(_)))
                        && !deps.ignore.is_ignored(rel.as_str(), true)
                    {
                        pending.push_back(rel);
                    }
                }
                EntryKind::Other => {}
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Extension of a relative path, lowercased, without the dot.
pub(crate) fn file_extension_of(path: &str) -> Option<Box<str>> {
    let file = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = file.rsplit_once('.')?;
    if ext.is_empty() || stem.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase().into_boxed_str())
}

fn normalized_extensions(extensions: &[Box<str>]) -> HashSet<Box<str>> {
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(String::into_boxed_str)
        .collect()
}

fn extension_allowed(path: &str, extensions: &HashSet<Box<str>>) -> bool {
    if extensions.is_empty() {
        return true;
    }
    file_extension_of(path).is_some_and(|ext| extensions.contains(&ext))
}
