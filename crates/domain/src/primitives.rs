//! Validated primitives and deterministic derivations.

use crate::LineSpan;
use semindex_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Hex length of the collection-name hash suffix.
pub const COLLECTION_HASH_HEX_LEN: usize = 8;

/// Hex length of the chunk-id hash suffix.
pub const CHUNK_ID_HEX_LEN: usize = 16;

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// Collection name empty after trimming.
    EmptyCollectionName,
    /// Collection name violates `/^[a-zA-Z][a-zA-Z0-9_]*$/`.
    InvalidCollectionName {
        /// The offending input.
        input: String,
    },
    /// Chunk id empty after trimming.
    EmptyChunkId,
    /// Provider id empty after trimming.
    EmptyProviderId,
    /// Line span bounds invalid.
    InvalidLineSpan {
        /// Starting line (1-indexed).
        start_line: u32,
        /// Ending line (1-indexed).
        end_line: u32,
    },
    /// A derived value failed its own validation (a bug).
    DerivationFailed {
        /// The candidate value that failed.
        candidate: String,
    },
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCollectionName => formatter.write_str("collection name must be non-empty"),
            Self::InvalidCollectionName { .. } => {
                formatter.write_str("collection name must match /^[a-zA-Z][a-zA-Z0-9_]*$/")
            }
            Self::EmptyChunkId => formatter.write_str("chunk id must be non-empty"),
            Self::EmptyProviderId => formatter.write_str("provider id must be non-empty"),
            Self::InvalidLineSpan { .. } => {
                formatter.write_str("line span must be 1-indexed with start <= end")
            }
            Self::DerivationFailed { .. } => {
                formatter.write_str("derived identifier is invalid (this is a bug)")
            }
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let code = match &error {
            PrimitiveError::EmptyCollectionName | PrimitiveError::InvalidCollectionName { .. } => {
                ErrorCode::new("domain", "invalid_collection_name")
            }
            PrimitiveError::EmptyChunkId => ErrorCode::new("domain", "invalid_chunk_id"),
            PrimitiveError::EmptyProviderId => ErrorCode::new("domain", "invalid_provider_id"),
            PrimitiveError::InvalidLineSpan { .. } => ErrorCode::new("domain", "invalid_line_span"),
            PrimitiveError::DerivationFailed { .. } => ErrorCode::internal(),
        };

        let mut envelope = if matches!(error, PrimitiveError::DerivationFailed { .. }) {
            Self::invariant(code, error.to_string())
        } else {
            Self::expected(code, error.to_string())
        };

        match error {
            PrimitiveError::InvalidCollectionName { input } => {
                envelope = envelope.with_metadata("input", input);
            }
            PrimitiveError::InvalidLineSpan {
                start_line,
                end_line,
            } => {
                envelope = envelope
                    .with_metadata("startLine", start_line.to_string())
                    .with_metadata("endLine", end_line.to_string());
            }
            PrimitiveError::DerivationFailed { candidate } => {
                envelope = envelope.with_metadata("candidate", candidate);
            }
            _ => {}
        }
        envelope
    }
}

/// Indexing mode, which also selects the collection-name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Dense-only vectors.
    Dense,
    /// Dense + sparse vectors fused at query time.
    Hybrid,
}

impl IndexMode {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Hybrid => "hybrid",
        }
    }

    /// Collection-name prefix for this mode.
    #[must_use]
    pub const fn collection_prefix(self) -> &'static str {
        match self {
            Self::Dense => "code_chunks",
            Self::Hybrid => "hybrid_code_chunks",
        }
    }
}

impl fmt::Display for IndexMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Name of a collection in the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(Box<str>);

impl CollectionName {
    /// Parse a collection name against the allowlist pattern.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyCollectionName);
        }
        if !is_valid_collection_name(trimmed) {
            return Err(PrimitiveError::InvalidCollectionName {
                input: trimmed.to_owned(),
            });
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Borrow the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Derive the deterministic collection name for a codebase root and mode:
/// `<prefix>_<first 8 hex of md5(normalized root)>`.
///
/// The mapping must stay stable across runs; callers detect collisions
/// between distinct roots at registration time rather than lengthening the
/// hash here.
pub fn derive_collection_name(
    codebase_root: impl AsRef<Path>,
    index_mode: IndexMode,
) -> Result<CollectionName, PrimitiveError> {
    let normalized = normalize_root(codebase_root.as_ref());
    let digest = md5::compute(normalized.to_string_lossy().as_bytes());
    let hash = format!("{digest:x}");
    let suffix: String = hash.chars().take(COLLECTION_HASH_HEX_LEN).collect();
    let candidate = format!("{}_{suffix}", index_mode.collection_prefix());

    CollectionName::parse(&candidate).map_err(|_| PrimitiveError::DerivationFailed { candidate })
}

/// Identifier of a persisted chunk document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(Box<str>);

impl ChunkId {
    /// Parse a chunk id from stored input.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyChunkId);
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Borrow the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the underlying string.
    #[must_use]
    pub fn into_inner(self) -> Box<str> {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Inputs that determine a chunk id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkIdInput<'a> {
    /// Path relative to the codebase root.
    pub relative_path: &'a str,
    /// Chunk line span.
    pub span: LineSpan,
    /// Chunk content.
    pub content: &'a str,
}

/// Derive the deterministic chunk id:
/// `chunk_<first 16 hex of sha256(relative_path:start:end:content)>`.
///
/// Identical inputs always produce identical ids, which is what makes
/// re-insertion of an unchanged chunk a no-op on the collection.
pub fn derive_chunk_id(input: &ChunkIdInput<'_>) -> Result<ChunkId, PrimitiveError> {
    let mut hasher = Sha256::new();
    hasher.update(input.relative_path.as_bytes());
    hasher.update(b":");
    hasher.update(input.span.start_line().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(input.span.end_line().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(input.content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    let suffix: String = hash.chars().take(CHUNK_ID_HEX_LEN).collect();
    let candidate = format!("chunk_{suffix}");

    ChunkId::parse(&candidate).map_err(|_| PrimitiveError::DerivationFailed { candidate })
}

/// Identifier of an embedding or vector-store provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(Box<str>);

impl ProviderId {
    /// Parse a provider id.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyProviderId);
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Borrow the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn is_valid_collection_name(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic() && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn normalize_root(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
