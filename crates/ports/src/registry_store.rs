//! Registry persistence boundary contract.

use crate::BoxFuture;
use semindex_domain::CodebaseRecord;
use semindex_shared::{RequestContext, Result};

/// Serialized registry state: indexed and in-flight records kept disjoint.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Format version.
    pub version: u32,
    /// Last mutation time, milliseconds since the epoch.
    pub last_updated_ms: u64,
    /// Records in the `indexed` or `indexfailed` states.
    pub indexes: Vec<CodebaseRecord>,
    /// Records currently `indexing`.
    pub active_indexing: Vec<CodebaseRecord>,
}

/// Boundary contract for durable registry state.
///
/// Writes replace the whole snapshot atomically (write-temp + rename).
pub trait RegistryStorePort: Send + Sync {
    /// Load the persisted snapshot, or an empty one when absent.
    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<RegistrySnapshot>>;

    /// Atomically replace the persisted snapshot.
    fn save(
        &self,
        ctx: &RequestContext,
        snapshot: RegistrySnapshot,
    ) -> BoxFuture<'_, Result<()>>;
}
