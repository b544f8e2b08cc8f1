//! Snapshot Store
//!
//! Key-value store of captured snapshots keyed by snapshot id.
//! Values are never mutated in place: `replace_with` builds a new snapshot
//! from the current one under the write lock and swaps it in (last write wins).
//! When a directory is configured every stored value is mirrored to
//! `<dir>/<id>.json` and reloaded on startup.

use crate::error::AppError;
use crate::model::{EngineKind, Snapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Metadata about a snapshot (lightweight, used for listing)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub engine: EngineKind,
    pub database: String,
    pub checksum: String,
    pub table_count: usize,
    pub relationship_count: usize,
    pub index_count: usize,
    pub interface_count: usize,
    pub warning_count: usize,
}

impl From<&Snapshot> for SnapshotMetadata {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id,
            generated_at: snapshot.generated_at,
            engine: snapshot.engine.kind,
            database: snapshot.engine.database.clone(),
            checksum: snapshot.checksum.clone(),
            table_count: snapshot.tables.len(),
            relationship_count: snapshot.relationships.len(),
            index_count: snapshot.indexes.len(),
            interface_count: snapshot.interfaces.len(),
            warning_count: snapshot.warnings.len(),
        }
    }
}

/// Store for managing snapshots
pub struct SnapshotStore {
    snapshots: Arc<RwLock<HashMap<Uuid, Arc<Snapshot>>>>,
    dir: Option<PathBuf>,
}

impl SnapshotStore {
    /// In-memory only store
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            dir: None,
        }
    }

    /// Store mirrored to a directory; existing `*.json` files are loaded
    pub async fn with_dir(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Storage(format!("Cannot create {}: {}", dir.display(), e)))?;

        let store = Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            dir: Some(dir.clone()),
        };
        let loaded = store.load(&dir).await?;
        info!("Loaded {} snapshots from {}", loaded, dir.display());
        Ok(store)
    }

    async fn load(&self, dir: &Path) -> Result<usize, AppError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| AppError::Storage(format!("Cannot read {}: {}", dir.display(), e)))?;

        let mut snapshots = self.snapshots.write().await;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<Snapshot>(&bytes).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(snapshot) => {
                    snapshots.insert(snapshot.id, Arc::new(snapshot));
                }
                Err(e) => warn!("Skipping unreadable snapshot file {}: {}", path.display(), e),
            }
        }
        Ok(snapshots.len())
    }

    /// Store a snapshot under its own id, replacing any previous value
    pub async fn put(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, AppError> {
        let snapshot = Arc::new(snapshot);
        self.persist(&snapshot).await?;

        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.id, snapshot.clone());

        info!(
            "Stored snapshot {}: {} tables, {} relationships",
            snapshot.id,
            snapshot.tables.len(),
            snapshot.relationships.len()
        );
        Ok(snapshot)
    }

    /// Get snapshot by id
    pub async fn get(&self, id: Uuid) -> Option<Arc<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        snapshots.get(&id).cloned()
    }

    /// Remove a snapshot; returns whether it existed
    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut snapshots = self.snapshots.write().await;
        let existed = snapshots.remove(&id).is_some();

        if existed {
            if let Some(path) = self.path_for(id) {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
            }
            debug!("Deleted snapshot {}", id);
        }
        Ok(existed)
    }

    /// List metadata for every snapshot, newest first
    pub async fn list(&self) -> Vec<SnapshotMetadata> {
        let snapshots = self.snapshots.read().await;
        let mut list: Vec<SnapshotMetadata> = snapshots
            .values()
            .map(|s| SnapshotMetadata::from(s.as_ref()))
            .collect();
        list.sort_by(|a, b| b.generated_at.cmp(&a.generated_at).then(a.id.cmp(&b.id)));
        list
    }

    /// Atomically replace a snapshot with a value derived from the current one
    pub async fn replace_with<F>(&self, id: Uuid, f: F) -> Result<Arc<Snapshot>, AppError>
    where
        F: FnOnce(&Snapshot) -> Snapshot,
    {
        let mut snapshots = self.snapshots.write().await;
        let current = snapshots
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Snapshot {} not found", id)))?;

        let mut next = f(current);
        next.id = id;
        let next = Arc::new(next);
        self.persist(&next).await?;
        snapshots.insert(id, next.clone());

        debug!("Replaced snapshot {}", id);
        Ok(next)
    }

    fn path_for(&self, id: Uuid) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(format!("{}.json", id)))
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        let Some(path) = self.path_for(snapshot.id) else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| AppError::Internal(format!("Failed to serialize snapshot: {}", e)))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Cannot write {}: {}", path.display(), e)))
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaptureFilters, EngineInfo, InterfaceMapping, Warning, WarningKind};
    use pretty_assertions::assert_eq;

    fn snapshot() -> Snapshot {
        Snapshot {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            engine: EngineInfo {
                kind: EngineKind::Postgres,
                version: "16".to_string(),
                host: "localhost".to_string(),
                database: "app".to_string(),
            },
            filters: CaptureFilters::default(),
            enums: vec![],
            tables: vec![],
            views: vec![],
            relationships: vec![],
            indexes: vec![],
            interfaces: vec![],
            warnings: vec![],
            checksum: "abc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = SnapshotStore::new();
        let s = snapshot();
        let id = s.id;

        store.put(s).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().checksum, "abc");
        assert_eq!(store.list().await.len(), 1);

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_replace_with_keeps_old_value_intact() {
        let store = SnapshotStore::new();
        let s = snapshot();
        let id = s.id;
        store.put(s).await.unwrap();

        let before = store.get(id).await.unwrap();
        let after = store
            .replace_with(id, |current| {
                current.with_interfaces(InterfaceMapping {
                    interfaces: vec![],
                    warnings: vec![Warning {
                        kind: WarningKind::InterfaceUnmapped,
                        message: "Widget".to_string(),
                        source: None,
                    }],
                })
            })
            .await
            .unwrap();

        assert!(before.warnings.is_empty());
        assert_eq!(after.warnings.len(), 1);
        assert_eq!(store.get(id).await.unwrap().warnings.len(), 1);
    }

    #[test]
    fn test_replace_missing_is_not_found() {
        let store = SnapshotStore::new();
        let result = tokio_test::block_on(store.replace_with(Uuid::new_v4(), |s| s.clone()));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_directory_round_trip() {
        let dir = std::env::temp_dir().join(format!("schemascope-store-{}", Uuid::new_v4()));
        let s = snapshot();
        let id = s.id;

        {
            let store = SnapshotStore::with_dir(&dir).await.unwrap();
            store.put(s).await.unwrap();
        }

        tokio::fs::write(dir.join("garbage.json"), b"{not json").await.unwrap();

        let reopened = SnapshotStore::with_dir(&dir).await.unwrap();
        assert_eq!(reopened.get(id).await.unwrap().checksum, "abc");
        assert_eq!(reopened.list().await.len(), 1);

        assert!(reopened.delete(id).await.unwrap());
        assert!(!dir.join(format!("{}.json", id)).exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
