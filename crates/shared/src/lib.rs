//! # semindex-shared
//!
//! Foundational types shared by every crate in the workspace: the error
//! envelope and `Result` alias, request-scoped context with cancellation,
//! bounded concurrency, retry helpers, and the Merkle file snapshot.
//!
//! This crate depends only on external crates.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod context;
pub mod errors;
pub mod result;
pub mod retry;
pub mod snapshot;

pub use context::{CancellationToken, CorrelationId, RequestContext, TaskLimiter, TaskPermit};
pub use errors::{ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata};
pub use result::Result;
pub use retry::{retry_async, RetryPolicy};
pub use snapshot::{FileSnapshot, SnapshotDiff};

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_crate_exports_are_usable() {
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad");
        assert_eq!(error.kind, ErrorKind::Expected);

        let value: Result<u32> = Ok(7);
        assert!(matches!(value, Ok(7)));
    }
}
