//! Code splitter: tree-sitter declaration boundaries when a grammar exists,
//! byte-window fallback otherwise.
//!
//! The window strategy targets ~2500 bytes per chunk with ~300 bytes of
//! overlap between neighbors. The syntax-aware strategy cuts at top-level
//! declarations, concatenating small siblings toward the target without
//! exceeding it; oversized declarations fall back to the window strategy
//! internally.

use semindex_domain::{Language, LineSpan};
use semindex_ports::{BoxFuture, CodeChunk, SplitterPort};
use semindex_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use tree_sitter::{Parser, Tree};

const DEFAULT_MAX_CHUNK_BYTES: usize = 2_500;
const DEFAULT_OVERLAP_BYTES: usize = 300;

/// Syntax-aware splitter with a byte-window fallback.
#[derive(Debug, Clone, Copy)]
pub struct CodeSplitter {
    max_chunk_bytes: usize,
    overlap_bytes: usize,
}

impl Default for CodeSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_BYTES, DEFAULT_OVERLAP_BYTES)
    }
}

impl CodeSplitter {
    /// Create a splitter with explicit window sizing.
    #[must_use]
    pub const fn new(max_chunk_bytes: usize, overlap_bytes: usize) -> Self {
        Self {
            max_chunk_bytes,
            overlap_bytes,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_chunk_bytes == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "chunk size must be greater than zero",
            ));
        }
        if self.overlap_bytes >= self.max_chunk_bytes {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "chunk overlap must be smaller than chunk size",
            ));
        }
        Ok(())
    }
}

impl SplitterPort for CodeSplitter {
    fn split(
        &self,
        ctx: &RequestContext,
        content: Box<str>,
        language: Language,
        file_path: &str,
    ) -> BoxFuture<'_, Result<Vec<CodeChunk>>> {
        let splitter = *self;
        let ctx = ctx.clone();
        let file_path = file_path.to_owned();
        Box::pin(async move {
            ctx.ensure_live("splitter.split")?;
            splitter.validate()?;

            if content.trim().is_empty() {
                return Ok(Vec::new());
            }

            let lines: Vec<&str> = content.split_inclusive('\n').collect();
            let total_lines = lines.len();

            let ranges = parse_tree(&content, language, &file_path).map_or_else(
                || window_ranges(&lines, 0, total_lines, splitter),
                |tree| declaration_ranges(&tree, &lines, splitter),
            );

            build_chunks(&lines, &ranges, language)
        })
    }
}

/// Half-open line-index range `[start, end)` into the lines slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineRange {
    start: usize,
    end: usize,
}

impl LineRange {
    fn byte_len(self, lines: &[&str]) -> usize {
        lines[self.start..self.end].iter().map(|line| line.len()).sum()
    }
}

fn parse_tree(content: &str, language: Language, file_path: &str) -> Option<Tree> {
    let grammar = grammar_for(language, file_path)?;
    let mut parser = Parser::new();
    parser.set_language(&grammar).ok()?;
    parser.parse(content, None)
}

fn grammar_for(language: Language, file_path: &str) -> Option<tree_sitter::Language> {
    match language {
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::TypeScript => {
            if file_path
                .rsplit_once('.')
                .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("tsx"))
            {
                Some(tree_sitter_typescript::LANGUAGE_TSX.into())
            } else {
                Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            }
        }
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::C => Some(tree_sitter_c::LANGUAGE.into()),
        Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        _ => None,
    }
}

fn declaration_ranges(tree: &Tree, lines: &[&str], splitter: CodeSplitter) -> Vec<LineRange> {
    let total_lines = lines.len();
    let root = tree.root_node();
    let mut cursor = root.walk();

    let mut spans = Vec::new();
    for child in root.named_children(&mut cursor) {
        let start = child.start_position().row.min(total_lines.saturating_sub(1));
        let mut end = child.end_position().row;
        if child.end_position().column > 0 {
            end += 1;
        }
        let end = end.clamp(start + 1, total_lines);
        spans.push(LineRange { start, end });
    }

    if spans.is_empty() {
        return window_ranges(lines, 0, total_lines, splitter);
    }

    // Merge small neighbors toward the byte target; split oversized spans.
    let mut merged: Vec<LineRange> = Vec::new();
    let mut current: Option<LineRange> = None;
    for span in spans {
        if span.byte_len(lines) > splitter.max_chunk_bytes {
            if let Some(open) = current.take() {
                merged.push(open);
            }
            merged.extend(window_ranges(lines, span.start, span.end, splitter));
            continue;
        }
        current = match current {
            None => Some(span),
            Some(open) => {
                let candidate = LineRange {
                    start: open.start,
                    end: span.end.max(open.end),
                };
                if candidate.byte_len(lines) > splitter.max_chunk_bytes {
                    merged.push(open);
                    Some(span)
                } else {
                    Some(candidate)
                }
            }
        };
    }
    if let Some(open) = current {
        merged.push(open);
    }
    merged
}

fn window_ranges(
    lines: &[&str],
    start: usize,
    end: usize,
    splitter: CodeSplitter,
) -> Vec<LineRange> {
    let mut ranges = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let mut line = cursor;
        let mut bytes = 0usize;
        while line < end {
            let len = lines[line].len();
            if bytes > 0 && bytes + len > splitter.max_chunk_bytes {
                break;
            }
            bytes += len;
            line += 1;
            if bytes >= splitter.max_chunk_bytes {
                break;
            }
        }
        ranges.push(LineRange { start: cursor, end: line });
        if line >= end {
            break;
        }
        cursor = rewind_for_overlap(lines, line, cursor, splitter.overlap_bytes);
    }
    ranges
}

// Step back whole lines until ~overlap_bytes of context is replayed, never
// rewinding past the start of the chunk just emitted.
fn rewind_for_overlap(lines: &[&str], next: usize, previous_start: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return next;
    }
    let mut start = next;
    let mut replayed = 0usize;
    while start > previous_start + 1 {
        let candidate = lines[start - 1].len();
        if replayed + candidate > overlap {
            break;
        }
        replayed += candidate;
        start -= 1;
    }
    start
}

fn build_chunks(lines: &[&str], ranges: &[LineRange], language: Language) -> Result<Vec<CodeChunk>> {
    let mut chunks = Vec::with_capacity(ranges.len());
    for range in ranges {
        let content: String = lines[range.start..range.end].concat();
        if content.trim().is_empty() {
            continue;
        }
        let start_line = u32::try_from(range.start + 1).map_err(overflow)?;
        let end_line = u32::try_from(range.end).map_err(overflow)?;
        let span = LineSpan::new(start_line, end_line).map_err(ErrorEnvelope::from)?;
        chunks.push(CodeChunk {
            content: content.into_boxed_str(),
            span,
            language,
        });
    }
    Ok(chunks)
}

fn overflow(_: std::num::TryFromIntError) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::internal(),
        "line index overflow",
        semindex_shared::ErrorClass::NonRetriable,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn split(content: &str, language: Language, path: &str) -> Result<Vec<CodeChunk>> {
        let splitter = CodeSplitter::default();
        let ctx = RequestContext::for_request();
        splitter.split(&ctx, content.into(), language, path).await
    }

    #[tokio::test]
    async fn empty_files_yield_zero_chunks() -> Result<()> {
        assert!(split("", Language::Rust, "a.rs").await?.is_empty());
        assert!(split("  \n\n", Language::Text, "a.txt").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn chunks_respect_span_invariants() -> Result<()> {
        let code = "fn a() {}\n\nfn b() {}\n\nstruct C;\n";
        let chunks = split(code, Language::Rust, "a.rs").await?;
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.span.start_line() >= 1);
            assert!(chunk.span.end_line() >= chunk.span.start_line());
            assert!(!chunk.content.trim().is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn small_declarations_are_concatenated() -> Result<()> {
        let code = "fn a() {}\nfn b() {}\nfn c() {}\n";
        let chunks = split(code, Language::Rust, "a.rs").await?;
        assert_eq!(chunks.len(), 1, "tiny siblings should merge");
        assert_eq!(chunks[0].span.start_line(), 1);
        assert_eq!(chunks[0].span.end_line(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn window_fallback_bounds_chunk_size_with_overlap() -> Result<()> {
        let line = "x".repeat(100) + "\n";
        let code = line.repeat(100);
        let chunks = split(&code, Language::Text, "notes.txt").await?;

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.len() <= DEFAULT_MAX_CHUNK_BYTES + 101);
        }
        for window in chunks.windows(2) {
            assert!(
                window[1].span.start_line() <= window[0].span.end_line(),
                "adjacent windows should overlap"
            );
            assert!(window[1].span.start_line() > window[0].span.start_line());
        }
        Ok(())
    }

    #[tokio::test]
    async fn crlf_line_endings_count_as_single_lines() -> Result<()> {
        let code = "alpha\r\nbeta\r\ngamma\n";
        let chunks = split(code, Language::Text, "mixed.txt").await?;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].span.start_line(), 1);
        assert_eq!(chunks[0].span.end_line(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_single_line_is_emitted_alone() -> Result<()> {
        let code = format!("short\n{}\nshort\n", "y".repeat(5_000));
        let chunks = split(&code, Language::Text, "big.txt").await?;
        assert!(chunks.iter().any(|chunk| chunk.content.len() >= 5_000));
        for chunk in &chunks {
            assert!(chunk.span.end_line() >= chunk.span.start_line());
        }
        Ok(())
    }

    #[tokio::test]
    async fn invalid_configuration_is_rejected() {
        let splitter = CodeSplitter::new(100, 100);
        let ctx = RequestContext::for_request();
        let result = splitter
            .split(&ctx, "a\n".into(), Language::Text, "a.txt")
            .await;
        assert!(result.is_err());
    }
}
