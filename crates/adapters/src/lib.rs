//! # semindex-adapters
//!
//! Concrete implementations of the semindex ports: local filesystem access,
//! the layered ignore resolver, the tree-sitter splitter, snapshot sync,
//! registry persistence, embedding providers, the Milvus REST vector store,
//! structured logging, and the cross-process lock/semaphore primitives.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod embedding;
pub mod file_sync;
pub mod fs;
pub mod ignore;
pub mod locks;
pub mod logger;
pub mod registry_store;
pub mod splitter;
pub mod vectordb;

pub use embedding::{
    BatchedEmbedding, GeminiEmbedding, OllamaEmbedding, OpenAiEmbedding, ProviderHttpConfig,
    VoyageEmbedding,
};
pub use file_sync::LocalFileSync;
pub use fs::TokioFileSystem;
pub use ignore::IgnoreResolver;
pub use locks::{HeldLocks, ProcessLock, ProcessSemaphore};
pub use logger::JsonLineLogger;
pub use registry_store::JsonRegistryStore;
pub use splitter::CodeSplitter;
pub use vectordb::milvus::MilvusRestStore;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
