//! # semindex-config
//!
//! Environment-driven configuration: provider selection and credentials,
//! batching and concurrency knobs, default extensions and ignore patterns,
//! and the `~/.context` data-directory layout.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod defaults;
pub mod env;
pub mod storage;

pub use defaults::{
    default_api_concurrency, provider_max_batch_size, BatchTuning, CHUNK_LIMIT,
    DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_HYBRID_MODE, DEFAULT_IGNORE_PATTERNS,
    DEFAULT_SUPPORTED_EXTENSIONS, MAX_API_CONCURRENCY, MIN_MEMORY_LIMIT_MB,
};
pub use env::{BackendEnv, EmbeddingProviderKind, EmbeddingSettings, VectorStoreSettings};
pub use storage::DataDir;

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
