//! Built-in defaults: extensions, ignore patterns, provider tables, limits.

use semindex_domain::ProviderId;

/// Hybrid mode is on unless `HYBRID_MODE=false`.
pub const DEFAULT_HYBRID_MODE: bool = true;

/// Hard per-run ceiling on persisted chunks per codebase.
pub const CHUNK_LIMIT: usize = 450_000;

/// Default chunks per embedding batch before provider capping.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 100;

/// Upper bound on concurrent embedding batches regardless of provider.
pub const MAX_API_CONCURRENCY: usize = 10;

/// Memory limit floor in megabytes.
pub const MIN_MEMORY_LIMIT_MB: u64 = 1_536;

/// Extensions indexed when the caller supplies none (without leading dots).
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "py", "java", "cpp", "cc", "hpp", "c", "h", "cs", "go", "rs",
    "php", "rb", "swift", "kt", "scala", "m", "mm", "ipynb", "md", "markdown",
];

/// Ignore patterns merged below every other source.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules/",
    "target/",
    "dist/",
    "build/",
    "out/",
    "vendor/",
    "coverage/",
    "__pycache__/",
    ".git/",
    ".svn/",
    ".hg/",
    ".context/",
    ".idea/",
    ".vscode/",
    "*.min.js",
    "*.map",
    "*.lock",
    "*.log",
];

/// Per-provider maximum texts per embedding call.
#[must_use]
pub fn provider_max_batch_size(provider: &ProviderId) -> usize {
    match provider.as_str() {
        "openai" => 2_048,
        "voyageai" => 128,
        "gemini" => 100,
        "ollama" => 50,
        _ => 64,
    }
}

/// Per-provider default concurrent embedding batches.
#[must_use]
pub fn default_api_concurrency(provider: &ProviderId) -> usize {
    let default = match provider.as_str() {
        "openai" => 5,
        "voyageai" => 3,
        "gemini" => 2,
        "ollama" => 10,
        _ => 2,
    };
    default.min(MAX_API_CONCURRENCY)
}

/// Resolved batching and concurrency knobs for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTuning {
    /// Chunks per embedding batch (already capped by the provider ceiling).
    pub embedding_batch_size: usize,
    /// Concurrent file read+split tasks.
    pub file_concurrency: usize,
    /// Concurrent embedding batches in flight.
    pub api_concurrency: usize,
    /// Memory budget in megabytes.
    pub memory_limit_mb: u64,
}

impl BatchTuning {
    /// Resolve tuning from provider capability, host shape, and overrides.
    #[must_use]
    pub fn resolve(
        provider: &ProviderId,
        batch_size_override: Option<usize>,
        api_concurrency_override: Option<usize>,
        file_concurrency_override: Option<usize>,
        memory_limit_override: Option<u64>,
    ) -> Self {
        let ceiling = provider_max_batch_size(provider);
        let embedding_batch_size = batch_size_override
            .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE)
            .clamp(1, ceiling);

        let api_concurrency = api_concurrency_override
            .unwrap_or_else(|| default_api_concurrency(provider))
            .clamp(1, MAX_API_CONCURRENCY);

        let cpus = num_cpus::get().max(1);
        let file_concurrency = file_concurrency_override
            .unwrap_or_else(|| (cpus * 2).min(20))
            .max(1);

        let memory_limit_mb = memory_limit_override
            .unwrap_or(MIN_MEMORY_LIMIT_MB)
            .max(MIN_MEMORY_LIMIT_MB);

        Self {
            embedding_batch_size,
            file_concurrency,
            api_concurrency,
            memory_limit_mb,
        }
    }

    /// Bound of the insert queue: producers block past this depth.
    #[must_use]
    pub const fn insert_queue_depth(&self) -> usize {
        self.api_concurrency * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str) -> ProviderId {
        ProviderId::parse(id).expect("provider id")
    }

    #[test]
    fn provider_tables_match_the_contract() {
        assert_eq!(provider_max_batch_size(&provider("openai")), 2_048);
        assert_eq!(provider_max_batch_size(&provider("voyageai")), 128);
        assert_eq!(default_api_concurrency(&provider("openai")), 5);
        assert_eq!(default_api_concurrency(&provider("gemini")), 2);
        assert_eq!(default_api_concurrency(&provider("ollama")), 10);
    }

    #[test]
    fn tuning_caps_batch_size_at_the_provider_ceiling() {
        let tuning = BatchTuning::resolve(&provider("voyageai"), Some(4_000), None, None, None);
        assert_eq!(tuning.embedding_batch_size, 128);
        assert_eq!(tuning.insert_queue_depth(), tuning.api_concurrency * 2);
    }

    #[test]
    fn tuning_enforces_the_memory_floor() {
        let tuning = BatchTuning::resolve(&provider("openai"), None, None, None, Some(256));
        assert_eq!(tuning.memory_limit_mb, MIN_MEMORY_LIMIT_MB);
    }

    #[test]
    fn api_concurrency_is_capped() {
        let tuning = BatchTuning::resolve(&provider("ollama"), None, Some(99), None, None);
        assert_eq!(tuning.api_concurrency, MAX_API_CONCURRENCY);
    }
}
