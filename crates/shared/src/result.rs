//! Workspace result alias.

use crate::errors::ErrorEnvelope;

/// Result type carried across every crate boundary.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;
