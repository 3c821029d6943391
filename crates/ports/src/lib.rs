//! # semindex-ports
//!
//! Boundary traits between the domain and infrastructure layers. Each port
//! takes a [`semindex_shared::RequestContext`] and returns a boxed future so
//! adapters stay object-safe behind `Arc<dyn ...>`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod embedding;
pub mod fs;
pub mod ignore;
pub mod logger;
pub mod registry_store;
pub mod splitter;
pub mod sync;
pub mod vectordb;

pub use embedding::*;
pub use fs::*;
pub use ignore::*;
pub use logger::*;
pub use registry_store::*;
pub use splitter::*;
pub use sync::*;
pub use vectordb::*;

// Re-export the domain types that appear in port signatures so adapters can
// implement ports without a direct domain dependency.
pub use semindex_domain::{CollectionName, Language, LineSpan, ProviderId};

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
