//! Structured error envelope shared across the workspace.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, io};

/// Diagnostic metadata attached to errors.
pub type ErrorMetadata = BTreeMap<String, String>;

/// High-level classification of where an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Expected failures: validation, state conflicts, cancellation.
    Expected,
    /// Invariant violations in domain logic.
    Invariant,
    /// Unexpected failures: I/O, external dependencies.
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected => formatter.write_str("expected"),
            Self::Invariant => formatter.write_str("invariant"),
            Self::Unexpected => formatter.write_str("unexpected"),
        }
    }
}

/// Retry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Safe to retry.
    Retriable,
    /// Must not be retried.
    NonRetriable,
}

impl ErrorClass {
    /// Returns true when the error may be retried.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Retriable)
    }
}

/// Stable, namespaced error code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode {
    namespace: String,
    code: String,
}

impl ErrorCode {
    /// Create a code with an explicit namespace.
    pub fn new(namespace: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            code: code.into(),
        }
    }

    /// Cooperative cancellation.
    pub fn cancelled() -> Self {
        Self::new("core", "cancelled")
    }

    /// Invalid caller input.
    pub fn invalid_input() -> Self {
        Self::new("core", "invalid_input")
    }

    /// Missing resource.
    pub fn not_found() -> Self {
        Self::new("core", "not_found")
    }

    /// Permission denied.
    pub fn permission_denied() -> Self {
        Self::new("core", "permission_denied")
    }

    /// Operation timed out.
    pub fn timeout() -> Self {
        Self::new("core", "timeout")
    }

    /// Generic I/O failure.
    pub fn io() -> Self {
        Self::new("core", "io")
    }

    /// Internal failure (a bug).
    pub fn internal() -> Self {
        Self::new("core", "internal")
    }

    /// Upstream rate limiting.
    pub fn rate_limited() -> Self {
        Self::new("core", "rate_limited")
    }

    /// Path is missing on disk.
    pub fn path_not_found() -> Self {
        Self::new("path", "not_found")
    }

    /// Path exists but is not a directory.
    pub fn path_not_a_directory() -> Self {
        Self::new("path", "not_a_directory")
    }

    /// An indexing run is already active for the codebase.
    pub fn already_indexing() -> Self {
        Self::new("registry", "already_indexing")
    }

    /// The codebase is not registered.
    pub fn not_indexed() -> Self {
        Self::new("registry", "not_indexed")
    }

    /// An ancestor of the path is already registered.
    pub fn subtree_covered() -> Self {
        Self::new("registry", "subtree_covered")
    }

    /// Two distinct roots derived the same collection name.
    pub fn collection_name_collision() -> Self {
        Self::new("registry", "collection_name_collision")
    }

    /// The backing store refused a new collection at its account ceiling.
    pub fn collection_limit_reached() -> Self {
        Self::new("store", "collection_limit_reached")
    }

    /// The registry says indexed but the store has no collection.
    pub fn collection_missing() -> Self {
        Self::new("store", "collection_missing")
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the identifier within the namespace.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.namespace, self.code)
    }
}

/// The error envelope carried through every `Result` in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Origin category.
    pub kind: ErrorKind,
    /// Retry classification.
    pub class: ErrorClass,
    /// Stable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Diagnostic metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: ErrorMetadata,
}

impl ErrorEnvelope {
    /// Expected, non-retriable error.
    pub fn expected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Expected,
            class: ErrorClass::NonRetriable,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Invariant violation (always non-retriable).
    pub fn invariant(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Invariant,
            class: ErrorClass::NonRetriable,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Unexpected error with explicit retry classification.
    pub fn unexpected(code: ErrorCode, message: impl Into<String>, class: ErrorClass) -> Self {
        Self {
            kind: ErrorKind::Unexpected,
            class,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::cancelled(), message)
    }

    /// Returns true when the envelope represents a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::cancelled()
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {} {}: {}",
            self.kind,
            match self.class {
                ErrorClass::Retriable => "retriable",
                ErrorClass::NonRetriable => "non-retriable",
            },
            self.code,
            self.message
        )
    }
}

impl std::error::Error for ErrorEnvelope {}

impl From<io::Error> for ErrorEnvelope {
    fn from(error: io::Error) -> Self {
        let code = match error.kind() {
            io::ErrorKind::NotFound => ErrorCode::not_found(),
            io::ErrorKind::PermissionDenied => ErrorCode::permission_denied(),
            io::ErrorKind::TimedOut => ErrorCode::timeout(),
            io::ErrorKind::Interrupted => ErrorCode::cancelled(),
            _ => ErrorCode::io(),
        };
        let class = if is_retriable_io(error.kind()) {
            ErrorClass::Retriable
        } else {
            ErrorClass::NonRetriable
        };
        Self::unexpected(code, error.to_string(), class)
    }
}

const fn is_retriable_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind_and_class() {
        let expected = ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid");
        assert_eq!(expected.kind, ErrorKind::Expected);
        assert_eq!(expected.class, ErrorClass::NonRetriable);

        let unexpected =
            ErrorEnvelope::unexpected(ErrorCode::timeout(), "timeout", ErrorClass::Retriable);
        assert!(unexpected.class.is_retriable());

        let invariant = ErrorEnvelope::invariant(ErrorCode::internal(), "bug");
        assert_eq!(invariant.kind, ErrorKind::Invariant);
    }

    #[test]
    fn io_errors_map_to_core_codes() {
        let envelope = ErrorEnvelope::from(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert_eq!(envelope.code, ErrorCode::not_found());

        let envelope = ErrorEnvelope::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(envelope.class.is_retriable());
    }

    #[test]
    fn cancellation_is_detectable() {
        let envelope = ErrorEnvelope::cancelled("stopped");
        assert!(envelope.is_cancelled());
        assert!(!ErrorEnvelope::expected(ErrorCode::io(), "io").is_cancelled());
    }

    #[test]
    fn metadata_round_trips_through_serde() {
        let envelope = ErrorEnvelope::expected(ErrorCode::subtree_covered(), "covered")
            .with_metadata("root", "/repo");
        let json = serde_json::to_string(&envelope).expect("serialize");
        let decoded: ErrorEnvelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.metadata.get("root").map(String::as_str), Some("/repo"));
    }
}
