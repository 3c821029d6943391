//! Search hits and their deterministic ordering contract.

use crate::{Language, LineSpan};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Stable key identifying a hit within a codebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHitKey {
    /// Path relative to the codebase root (`/` separators).
    pub relative_path: Box<str>,
    /// Line span of the chunk.
    pub span: LineSpan,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Ordering key.
    pub key: SearchHitKey,
    /// Chunk content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Box<str>>,
    /// Language hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Similarity (or fused) score.
    pub score: f32,
}

/// Deterministic ordering: score descending, then relative path, then start
/// line, then end line.
#[must_use]
pub fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.key.relative_path.cmp(&b.key.relative_path))
        .then_with(|| a.key.span.start_line().cmp(&b.key.span.start_line()))
        .then_with(|| a.key.span.end_line().cmp(&b.key.span.end_line()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrimitiveError;

    fn hit(path: &str, start: u32, end: u32, score: f32) -> Result<SearchHit, PrimitiveError> {
        Ok(SearchHit {
            key: SearchHitKey {
                relative_path: path.into(),
                span: LineSpan::new(start, end)?,
            },
            content: None,
            language: None,
            score,
        })
    }

    #[test]
    fn ordering_applies_tiebreakers_in_sequence() -> Result<(), PrimitiveError> {
        let mut hits = vec![
            hit("b.rs", 1, 2, 0.9)?,
            hit("a.rs", 5, 6, 0.9)?,
            hit("a.rs", 1, 2, 0.9)?,
            hit("a.rs", 1, 2, 0.95)?,
        ];
        hits.sort_by(compare_hits);

        let order: Vec<(f32, &str, u32)> = hits
            .iter()
            .map(|hit| {
                (
                    hit.score,
                    hit.key.relative_path.as_ref(),
                    hit.key.span.start_line(),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![
                (0.95, "a.rs", 1),
                (0.9, "a.rs", 1),
                (0.9, "a.rs", 5),
                (0.9, "b.rs", 1),
            ]
        );
        Ok(())
    }

    #[test]
    fn serialization_uses_camel_case_keys() -> Result<(), PrimitiveError> {
        let value = serde_json::to_value(hit("src/a.rs", 1, 3, 0.5)?)
            .map_err(|_| PrimitiveError::EmptyChunkId)?;
        assert!(value["key"]["relativePath"].is_string());
        assert!(value["key"]["span"]["startLine"].is_number());
        Ok(())
    }
}
