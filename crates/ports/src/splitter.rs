//! Splitter boundary contract.

use crate::BoxFuture;
use semindex_domain::{Language, LineSpan};
use semindex_shared::{RequestContext, Result};

/// A chunk produced by the splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    /// Non-empty chunk content.
    pub content: Box<str>,
    /// 1-indexed line span.
    pub span: LineSpan,
    /// Language of the source file.
    pub language: Language,
}

/// Boundary contract for chunking file contents.
///
/// Implementations prefer syntax-aware splitting when a grammar is available
/// and fall back to a byte-window strategy otherwise. Empty files yield zero
/// chunks; every returned chunk has non-empty content.
pub trait SplitterPort: Send + Sync {
    /// Split `content` into chunks. `file_path` is a hint for grammar
    /// dialect selection only and is not stored.
    fn split(
        &self,
        ctx: &RequestContext,
        content: Box<str>,
        language: Language,
        file_path: &str,
    ) -> BoxFuture<'_, Result<Vec<CodeChunk>>>;
}
