//! Clear an index: drop the collection and delete the sync snapshot.

use semindex_domain::CollectionName;
use semindex_ports::{FileSyncPort, LoggerPort, VectorStorePort};
use semindex_shared::{RequestContext, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Input for clearing.
#[derive(Debug, Clone)]
pub struct ClearIndexInput {
    /// Absolute canonical codebase root.
    pub codebase_root: PathBuf,
    /// Collection owned by that root.
    pub collection_name: CollectionName,
}

/// Dependencies for clearing.
#[derive(Clone)]
pub struct ClearIndexDeps {
    /// Vector store.
    pub store: Arc<dyn VectorStorePort>,
    /// Snapshot synchronizer for the root.
    pub file_sync: Arc<dyn FileSyncPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Drop the collection (when present) and delete the snapshot. Registry
/// removal is the caller's responsibility.
pub async fn clear_index(
    ctx: &RequestContext,
    deps: &ClearIndexDeps,
    input: ClearIndexInput,
) -> Result<()> {
    ctx.ensure_live("clear_index")?;

    let exists = deps
        .store
        .has_collection(ctx, input.collection_name.clone())
        .await?;
    if exists {
        ctx.ensure_live("clear_index.drop")?;
        deps.store
            .drop_collection(ctx, input.collection_name.clone())
            .await?;
    }

    ctx.ensure_live("clear_index.snapshot")?;
    deps.file_sync
        .delete_snapshot(ctx, input.codebase_root.clone())
        .await?;

    if let Some(logger) = deps.logger.as_ref() {
        let mut fields = semindex_ports::LogFields::new();
        fields.insert(
            "collection".into(),
            serde_json::Value::String(input.collection_name.as_str().to_owned()),
        );
        logger.info("clear_index.completed", "Index cleared", Some(fields));
    }
    Ok(())
}
