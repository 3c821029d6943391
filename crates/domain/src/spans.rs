//! Line spans and language identification.

use crate::primitives::PrimitiveError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive, 1-indexed line span.
///
/// Line numbering counts logical lines: `\n` and `\r\n` each terminate one
/// line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSpan {
    start_line: u32,
    end_line: u32,
}

impl LineSpan {
    /// Construct a validated span.
    pub const fn new(start_line: u32, end_line: u32) -> Result<Self, PrimitiveError> {
        if start_line == 0 || end_line == 0 || start_line > end_line {
            return Err(PrimitiveError::InvalidLineSpan {
                start_line,
                end_line,
            });
        }
        Ok(Self {
            start_line,
            end_line,
        })
    }

    /// Starting line (1-indexed).
    #[must_use]
    pub const fn start_line(&self) -> u32 {
        self.start_line
    }

    /// Ending line (1-indexed, inclusive).
    #[must_use]
    pub const fn end_line(&self) -> u32 {
        self.end_line
    }

    /// Number of lines covered.
    #[must_use]
    pub const fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

/// Languages recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// TypeScript (`.ts`, `.tsx`).
    TypeScript,
    /// JavaScript (`.js`, `.jsx`, `.mjs`).
    JavaScript,
    /// Python (`.py`).
    Python,
    /// Java (`.java`).
    Java,
    /// C++ (`.cpp`, `.cc`, `.hpp`).
    Cpp,
    /// C (`.c`, `.h`).
    C,
    /// C# (`.cs`).
    CSharp,
    /// Go (`.go`).
    Go,
    /// Rust (`.rs`).
    Rust,
    /// PHP (`.php`).
    Php,
    /// Ruby (`.rb`).
    Ruby,
    /// Swift (`.swift`).
    Swift,
    /// Kotlin (`.kt`).
    Kotlin,
    /// Scala (`.scala`).
    Scala,
    /// Objective-C (`.m`, `.mm`).
    #[serde(rename = "objective-c")]
    ObjectiveC,
    /// Jupyter notebooks (`.ipynb`).
    Jupyter,
    /// Markdown (`.md`, `.markdown`).
    Markdown,
    /// Plain-text fallback.
    Text,
}

impl Language {
    /// Canonical string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::CSharp => "csharp",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Php => "php",
            Self::Ruby => "ruby",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Scala => "scala",
            Self::ObjectiveC => "objective-c",
            Self::Jupyter => "jupyter",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }

    /// Map a file extension (with or without a leading dot) to a language.
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        let trimmed = extension.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Self::Text;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "ts" | "tsx" => Self::TypeScript,
            "js" | "jsx" | "mjs" => Self::JavaScript,
            "py" => Self::Python,
            "java" => Self::Java,
            "cpp" | "cc" | "hpp" => Self::Cpp,
            "c" | "h" => Self::C,
            "cs" => Self::CSharp,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "php" => Self::Php,
            "rb" => Self::Ruby,
            "swift" => Self::Swift,
            "kt" => Self::Kotlin,
            "scala" => Self::Scala,
            "m" | "mm" => Self::ObjectiveC,
            "ipynb" => Self::Jupyter,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn span_rejects_zero_and_inverted_bounds() {
        assert!(matches!(
            LineSpan::new(0, 3),
            Err(PrimitiveError::InvalidLineSpan { .. })
        ));
        assert!(matches!(
            LineSpan::new(5, 4),
            Err(PrimitiveError::InvalidLineSpan { .. })
        ));
    }

    #[test]
    fn span_counts_inclusive_lines() -> Result<(), PrimitiveError> {
        assert_eq!(LineSpan::new(3, 3)?.line_count(), 1);
        assert_eq!(LineSpan::new(1, 10)?.line_count(), 10);
        Ok(())
    }

    #[test]
    fn extension_mapping_covers_defaults() {
        assert_eq!(Language::from_extension(".rs"), Language::Rust);
        assert_eq!(Language::from_extension("TSX"), Language::TypeScript);
        assert_eq!(Language::from_extension("ipynb"), Language::Jupyter);
        assert_eq!(Language::from_extension("md"), Language::Markdown);
        assert_eq!(Language::from_extension("unknown"), Language::Text);
        assert_eq!(Language::from_extension(""), Language::Text);
    }

    proptest! {
        #[test]
        fn valid_spans_construct((start, len) in (1u32..5_000, 0u32..5_000)) {
            let span = LineSpan::new(start, start + len);
            prop_assert!(span.is_ok());
        }
    }
}
