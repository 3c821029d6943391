//! Layered ignore resolver with gitignore-style matching.
//!
//! Pattern sources, merged in order with first-occurrence dedup: built-in
//! defaults, caller-supplied patterns, environment patterns, any `.*ignore`
//! file at the codebase root (excluding `.npmignore`), and the global
//! `~/.context/.contextignore`. Matching uses `/` separators regardless of
//! host; the last matching pattern wins, honoring `!` negation and
//! trailing-slash directory scope.

use globset::{GlobBuilder, GlobMatcher};
use semindex_config::{DataDir, DEFAULT_IGNORE_PATTERNS};
use semindex_ports::{IgnorePort, LoggerPort};
use semindex_shared::{RequestContext, Result};
use std::path::Path;
use std::sync::Arc;

const NPM_IGNORE_FILE: &str = ".npmignore";

#[derive(Debug, Clone)]
struct CompiledPattern {
    raw: Box<str>,
    negated: bool,
    dir_only: bool,
    matcher: GlobMatcher,
}

/// Ordered gitignore-style pattern set for one codebase root.
#[derive(Debug, Clone, Default)]
pub struct IgnoreResolver {
    patterns: Vec<CompiledPattern>,
    raw_seen: Vec<Box<str>>,
}

impl IgnoreResolver {
    /// Build from explicit patterns only (tests, callers with a fixed set).
    #[must_use]
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolver = Self::default();
        for pattern in patterns {
            resolver.add_one(pattern.as_ref());
        }
        resolver
    }

    /// Load and merge every pattern source for a codebase root.
    pub async fn resolve(
        ctx: &RequestContext,
        codebase_root: &Path,
        data_dir: &DataDir,
        custom_patterns: &[Box<str>],
        env_patterns: &[Box<str>],
        logger: Option<&Arc<dyn LoggerPort>>,
    ) -> Result<Self> {
        ctx.ensure_live("ignore.resolve")?;

        let mut resolver = Self::default();
        for pattern in DEFAULT_IGNORE_PATTERNS {
            resolver.add_one(pattern);
        }
        for pattern in custom_patterns {
            resolver.add_one(pattern);
        }
        for pattern in env_patterns {
            resolver.add_one(pattern);
        }

        for file in ignore_files_at_root(codebase_root).await {
            match tokio::fs::read_to_string(&file).await {
                Ok(contents) => resolver.add_file_contents(&contents),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(_) => {
                    if let Some(logger) = logger {
                        logger.warn(
                            "ignore.source_unreadable",
                            "Cannot read ignore file; continuing without it",
                            None,
                        );
                    }
                }
            }
        }

        match tokio::fs::read_to_string(data_dir.global_ignore_file()).await {
            Ok(contents) => resolver.add_file_contents(&contents),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(_) => {
                if let Some(logger) = logger {
                    logger.warn(
                        "ignore.global_unreadable",
                        "Cannot read global ignore file; continuing without it",
                        None,
                    );
                }
            }
        }

        Ok(resolver)
    }

    /// Append patterns, deduplicating against everything already loaded.
    pub fn add<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            self.add_one(pattern.as_ref());
        }
    }

    /// Number of accepted patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no patterns are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn add_file_contents(&mut self, contents: &str) {
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.add_one(trimmed);
        }
    }

    fn add_one(&mut self, raw: &str) {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.raw_seen.iter().any(|seen| seen.as_ref() == trimmed) {
            return;
        }
        self.raw_seen.push(trimmed.into());
        if let Some(compiled) = compile_pattern(trimmed) {
            self.patterns.push(compiled);
        }
    }

    fn decide(&self, relative_path: &str, is_dir: bool) -> bool {
        let normalized = normalize(relative_path);
        if normalized.is_empty() || normalized == "." {
            return false;
        }

        let mut ignored = false;
        for pattern in &self.patterns {
            if matches_path(pattern, &normalized, is_dir) {
                ignored = !pattern.negated;
            }
        }
        ignored
    }
}

impl IgnorePort for IgnoreResolver {
    fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        self.decide(relative_path, is_dir)
    }
}

fn compile_pattern(raw: &str) -> Option<CompiledPattern> {
    let mut body = raw;
    let negated = body.starts_with('!');
    if negated {
        body = &body[1..];
    }
    let dir_only = body.ends_with('/');
    let body = body.trim_end_matches('/');
    if body.is_empty() {
        return None;
    }

    // Patterns with an interior slash are anchored to the root; bare names
    // match at any depth.
    let anchored = body.starts_with('/') || body.trim_start_matches('/').contains('/');
    let body = body.trim_start_matches('/');
    let glob = if anchored {
        body.to_owned()
    } else {
        format!("**/{body}")
    };

    // A broken glob never fails matching; it just contributes nothing.
    let matcher = GlobBuilder::new(&glob)
        .literal_separator(true)
        .build()
        .ok()?
        .compile_matcher();

    Some(CompiledPattern {
        raw: raw.into(),
        negated,
        dir_only,
        matcher,
    })
}

fn matches_path(pattern: &CompiledPattern, path: &str, is_dir: bool) -> bool {
    if pattern.matcher.is_match(path) {
        // A directory-only pattern may match a file path directly only when
        // the candidate itself is a directory.
        if !pattern.dir_only || is_dir {
            return true;
        }
    }
    // Anything under a matching directory is covered too.
    ancestors(path).any(|ancestor| pattern.matcher.is_match(ancestor))
}

fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.char_indices()
        .filter(|(_, ch)| *ch == '/')
        .map(move |(idx, _)| &path[..idx])
}

fn normalize(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut out = String::with_capacity(replaced.len());
    let mut prev_slash = false;
    for ch in replaced.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }
    out.trim_start_matches("./").trim_matches('/').to_owned()
}

async fn ignore_files_at_root(codebase_root: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let Ok(mut reader) = tokio::fs::read_dir(codebase_root).await else {
        return files;
    };
    while let Ok(Some(entry)) = reader.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') && name.ends_with("ignore") && name != NPM_IGNORE_FILE {
            files.push(entry.path());
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_patterns_cover_contents() {
        let resolver = IgnoreResolver::from_patterns(["node_modules/", "target/"]);
        assert!(resolver.is_ignored("node_modules", true));
        assert!(resolver.is_ignored("node_modules/pkg/index.js", false));
        assert!(resolver.is_ignored("src/node_modules/pkg/index.js", false));
        assert!(!resolver.is_ignored("src/main.rs", false));
        // A file named like the directory pattern is not pruned.
        assert!(!resolver.is_ignored("docs/node_modules", false));
    }

    #[test]
    fn unanchored_globs_match_at_any_depth() {
        let resolver = IgnoreResolver::from_patterns(["*.min.js", "*.log"]);
        assert!(resolver.is_ignored("bundle.min.js", false));
        assert!(resolver.is_ignored("static/js/bundle.min.js", false));
        assert!(!resolver.is_ignored("bundle.js", false));
    }

    #[test]
    fn anchored_patterns_stay_at_the_root() {
        let resolver = IgnoreResolver::from_patterns(["/generated", "docs/internal/"]);
        assert!(resolver.is_ignored("generated", true));
        assert!(resolver.is_ignored("docs/internal/guide.md", false));
        assert!(!resolver.is_ignored("src/generated", true));
    }

    #[test]
    fn negation_reincludes_later_matches() {
        let resolver = IgnoreResolver::from_patterns(["*.log", "!keep.log"]);
        assert!(resolver.is_ignored("debug.log", false));
        assert!(!resolver.is_ignored("keep.log", false));
        assert!(!resolver.is_ignored("logs/keep.log", false));
    }

    #[test]
    fn add_preserves_first_occurrence_and_dedups() {
        let mut resolver = IgnoreResolver::from_patterns(["target/"]);
        let before = resolver.len();
        resolver.add(["target/", "dist/"]);
        assert_eq!(resolver.len(), before + 1);
    }

    #[test]
    fn windows_separators_are_normalized() {
        let resolver = IgnoreResolver::from_patterns(["target/"]);
        assert!(resolver.is_ignored("target\\debug\\app.exe", false));
    }

    #[test]
    fn broken_globs_are_never_fatal() {
        let resolver = IgnoreResolver::from_patterns(["[unclosed"]);
        assert!(!resolver.is_ignored("anything.rs", false));
    }

    #[tokio::test]
    async fn resolve_merges_root_ignore_files() -> Result<()> {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("ignore-resolve-{nanos}"));
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(semindex_shared::ErrorEnvelope::from)?;
        tokio::fs::write(root.join(".gitignore"), "secret/\n# comment\n")
            .await
            .map_err(semindex_shared::ErrorEnvelope::from)?;
        tokio::fs::write(root.join(".npmignore"), "published-only/\n")
            .await
            .map_err(semindex_shared::ErrorEnvelope::from)?;

        let ctx = RequestContext::for_request();
        let data_dir = DataDir::at(root.join("no-such-data-dir"));
        let resolver = IgnoreResolver::resolve(
            &ctx,
            &root,
            &data_dir,
            &["custom/".into()],
            &[],
            None,
        )
        .await?;

        assert!(resolver.is_ignored("secret/key.pem", false));
        assert!(resolver.is_ignored("custom/file.rs", false));
        assert!(resolver.is_ignored("node_modules/x.js", false));
        assert!(!resolver.is_ignored("published-only/file.rs", false));
        Ok(())
    }
}
