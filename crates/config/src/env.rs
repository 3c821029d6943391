//! Environment overrides that shape core behavior.

use semindex_shared::{ErrorCode, ErrorEnvelope, Result};
use std::collections::BTreeMap;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MILVUS_ADDRESS: &str = "http://localhost:19530";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Embedding provider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    /// OpenAI embeddings API.
    OpenAi,
    /// Voyage AI embeddings API.
    VoyageAi,
    /// Google Gemini embeddings API.
    Gemini,
    /// Local Ollama server.
    Ollama,
}

impl EmbeddingProviderKind {
    /// Stable identifier matching the provider tables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::VoyageAi => "voyageai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "voyageai" | "voyage" => Ok(Self::VoyageAi),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!("unknown embedding provider: {other}"),
            )),
        }
    }
}

/// Resolved embedding provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSettings {
    /// Selected provider.
    pub kind: EmbeddingProviderKind,
    /// API key (unused by Ollama).
    pub api_key: Option<Box<str>>,
    /// Model override.
    pub model: Option<Box<str>>,
    /// Base URL override (Ollama host, proxy endpoints).
    pub base_url: Option<Box<str>>,
    /// Output dimension override.
    pub dimension: Option<u32>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Resolved vector store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorStoreSettings {
    /// Milvus HTTP endpoint.
    pub address: Box<str>,
    /// Optional auth token.
    pub token: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Environment snapshot driving backend composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEnv {
    /// Hybrid (dense + sparse) mode; switches collection prefixes.
    pub hybrid_mode: bool,
    /// `EMBEDDING_BATCH_SIZE` override.
    pub embedding_batch_size: Option<usize>,
    /// `API_CONCURRENCY` override.
    pub api_concurrency: Option<usize>,
    /// `FILE_CONCURRENCY` override.
    pub file_concurrency: Option<usize>,
    /// `MEMORY_LIMIT_MB` override.
    pub memory_limit_mb: Option<u64>,
    /// `CUSTOM_EXTENSIONS`, comma-separated, dots optional.
    pub custom_extensions: Vec<Box<str>>,
    /// `CUSTOM_IGNORE_PATTERNS`, comma-separated.
    pub custom_ignore_patterns: Vec<Box<str>>,
    /// Embedding provider settings.
    pub embedding: EmbeddingSettings,
    /// Vector store settings.
    pub vector_store: VectorStoreSettings,
}

impl BackendEnv {
    /// Read from the process environment.
    pub fn from_std_env() -> Result<Self> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Read from an explicit map (tests).
    pub fn from_map(vars: &BTreeMap<String, String>) -> Result<Self> {
        let hybrid_mode = match lookup(vars, "HYBRID_MODE") {
            Some(value) => parse_bool("HYBRID_MODE", value)?,
            None => crate::DEFAULT_HYBRID_MODE,
        };

        let kind = match lookup(vars, "EMBEDDING_PROVIDER") {
            Some(value) => EmbeddingProviderKind::parse(value)?,
            None => EmbeddingProviderKind::OpenAi,
        };

        let api_key = match kind {
            EmbeddingProviderKind::OpenAi => lookup(vars, "OPENAI_API_KEY"),
            EmbeddingProviderKind::VoyageAi => lookup(vars, "VOYAGEAI_API_KEY"),
            EmbeddingProviderKind::Gemini => lookup(vars, "GEMINI_API_KEY"),
            EmbeddingProviderKind::Ollama => None,
        }
        .map(|value| value.to_owned().into_boxed_str());

        let base_url = match kind {
            EmbeddingProviderKind::Ollama => Some(
                lookup(vars, "OLLAMA_HOST")
                    .unwrap_or(DEFAULT_OLLAMA_HOST)
                    .to_owned()
                    .into_boxed_str(),
            ),
            _ => lookup(vars, "EMBEDDING_BASE_URL").map(|value| value.to_owned().into_boxed_str()),
        };

        let embedding = EmbeddingSettings {
            kind,
            api_key,
            model: lookup(vars, "EMBEDDING_MODEL").map(|value| value.to_owned().into_boxed_str()),
            base_url,
            dimension: parse_optional(vars, "EMBEDDING_DIMENSION")?,
            timeout_ms: parse_optional(vars, "EMBEDDING_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        };

        let vector_store = VectorStoreSettings {
            address: lookup(vars, "MILVUS_ADDRESS")
                .unwrap_or(DEFAULT_MILVUS_ADDRESS)
                .to_owned()
                .into_boxed_str(),
            token: lookup(vars, "MILVUS_TOKEN").map(|value| value.to_owned().into_boxed_str()),
            timeout_ms: parse_optional(vars, "MILVUS_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        };

        Ok(Self {
            hybrid_mode,
            embedding_batch_size: parse_optional(vars, "EMBEDDING_BATCH_SIZE")?,
            api_concurrency: parse_optional(vars, "API_CONCURRENCY")?,
            file_concurrency: parse_optional(vars, "FILE_CONCURRENCY")?,
            memory_limit_mb: parse_optional(vars, "MEMORY_LIMIT_MB")?,
            custom_extensions: parse_list(lookup(vars, "CUSTOM_EXTENSIONS")),
            custom_ignore_patterns: parse_list(lookup(vars, "CUSTOM_IGNORE_PATTERNS")),
            embedding,
            vector_store,
        })
    }
}

fn lookup<'a>(vars: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(String::as_str).filter(|value| !value.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("{key} must be a boolean, got {other}"),
        )),
    }
}

fn parse_optional<T: std::str::FromStr>(
    vars: &BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(vars, key) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| {
        ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("{key} must be a number, got {raw}"),
        )
    })
}

fn parse_list(raw: Option<&str>) -> Vec<Box<str>> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let mut values: Vec<Box<str>> = raw
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_owned().into_boxed_str())
        .collect();
    values.dedup();
    values
}
