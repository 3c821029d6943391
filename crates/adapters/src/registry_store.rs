//! Atomic JSON persistence for the codebase registry.

use semindex_config::DataDir;
use semindex_ports::{BoxFuture, RegistrySnapshot, RegistryStorePort};
use semindex_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::PathBuf;

/// Registry format version written by this build.
pub const REGISTRY_VERSION: u32 = 1;

/// JSON-file registry store, rewritten atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonRegistryStore {
    path: PathBuf,
}

impl JsonRegistryStore {
    /// Store at the data dir's registry file.
    #[must_use]
    pub fn new(data_dir: &DataDir) -> Self {
        Self {
            path: data_dir.registry_file(),
        }
    }

    /// Store at an explicit path (tests).
    #[must_use]
    pub const fn at(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RegistryStorePort for JsonRegistryStore {
    fn load(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<RegistrySnapshot>> {
        let ctx = ctx.clone();
        let path = self.path.clone();
        Box::pin(async move {
            ctx.ensure_live("registry_store.load")?;
            match tokio::fs::read(&path).await {
                Ok(payload) => serde_json::from_slice(&payload).map_err(|error| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::new("registry", "parse_failed"),
                        format!("failed to parse registry file: {error}"),
                        semindex_shared::ErrorClass::NonRetriable,
                    )
                }),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    Ok(RegistrySnapshot {
                        version: REGISTRY_VERSION,
                        ..RegistrySnapshot::default()
                    })
                }
                Err(error) => Err(ErrorEnvelope::from(error)),
            }
        })
    }

    fn save(
        &self,
        ctx: &RequestContext,
        snapshot: RegistrySnapshot,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        let path = self.path.clone();
        Box::pin(async move {
            ctx.ensure_live("registry_store.save")?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(ErrorEnvelope::from)?;
            }
            let mut payload = serde_json::to_vec_pretty(&snapshot).map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("registry", "serialize_failed"),
                    format!("failed to serialize registry: {error}"),
                    semindex_shared::ErrorClass::NonRetriable,
                )
            })?;
            payload.push(b'\n');

            // Unique temp name so concurrent processes never clobber each
            // other's in-progress writes; rename keeps readers consistent.
            let temp_path = path.with_extension(format!("tmp-{}", std::process::id()));
            tokio::fs::write(&temp_path, payload)
                .await
                .map_err(ErrorEnvelope::from)?;
            tokio::fs::rename(&temp_path, &path)
                .await
                .map_err(ErrorEnvelope::from)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semindex_domain::{derive_collection_name, CodebaseRecord, IndexMode, IndexStats};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}-{nanos}")).join("registry.json")
    }

    fn record(root: &str) -> CodebaseRecord {
        let collection =
            derive_collection_name(root, IndexMode::Hybrid).expect("collection name");
        let mut record = CodebaseRecord::registered(root.into(), collection, 10);
        record
            .mark_indexed(IndexStats { files: 1, chunks: 2 }, 20)
            .expect("indexed");
        record
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty_snapshot() -> Result<()> {
        let store = JsonRegistryStore::at(temp_path("registry-missing"));
        let ctx = RequestContext::for_request();
        let snapshot = store.load(&ctx).await?;
        assert_eq!(snapshot.version, REGISTRY_VERSION);
        assert!(snapshot.indexes.is_empty());
        assert!(snapshot.active_indexing.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn save_then_load_round_trips() -> Result<()> {
        let store = JsonRegistryStore::at(temp_path("registry-roundtrip"));
        let ctx = RequestContext::for_request();

        let snapshot = RegistrySnapshot {
            version: REGISTRY_VERSION,
            last_updated_ms: 123,
            indexes: vec![record("/repo")],
            active_indexing: Vec::new(),
        };
        store.save(&ctx, snapshot.clone()).await?;

        let loaded = store.load(&ctx).await?;
        assert_eq!(loaded, snapshot);
        Ok(())
    }

    #[tokio::test]
    async fn registry_file_shape_uses_camel_case() -> Result<()> {
        let path = temp_path("registry-shape");
        let store = JsonRegistryStore::at(path.clone());
        let ctx = RequestContext::for_request();
        store
            .save(
                &ctx,
                RegistrySnapshot {
                    version: REGISTRY_VERSION,
                    last_updated_ms: 5,
                    indexes: vec![record("/repo")],
                    active_indexing: Vec::new(),
                },
            )
            .await?;

        let raw = tokio::fs::read_to_string(&path).await.map_err(ErrorEnvelope::from)?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|_| ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "invalid json",
            ))?;
        assert!(value.get("lastUpdatedMs").is_some());
        assert!(value.get("activeIndexing").is_some());
        assert_eq!(value["indexes"][0]["status"], "indexed");
        assert!(value["indexes"][0].get("rootPath").is_some());
        Ok(())
    }
}
