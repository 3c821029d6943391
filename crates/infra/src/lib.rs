//! # semindex-infra
//!
//! Composition root: provider factories and the [`ContextBackend`] facade
//! that exposes the four public operations (`index_codebase`, `search_code`,
//! `clear_index`, `get_indexing_status`) over the assembled adapters.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod backend;
pub mod factories;

pub use backend::{is_terminal_refusal, ContextBackend, StatusReport};
pub use factories::{build_embedding, build_vector_store};
pub use semindex_app::{IndexCodebaseOutput, IndexCodebaseStatus};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
