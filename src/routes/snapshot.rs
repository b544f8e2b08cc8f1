//! Snapshot API Routes
//!
//! Capture from the configured database, import, list, fetch and delete.

use crate::error::{not_found_error, validation_error, ApiResult, AppError};
use crate::model::{CaptureFilters, Snapshot};
use crate::snapshot::{Normalizer, SnapshotMetadata};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern is valid"));

// ==================== Request/Response Types ====================

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    /// Schemas to capture; the configured default when absent
    #[validate(length(max = 64, message = "At most 64 schemas per capture"))]
    #[validate(custom(function = "validate_names"))]
    pub schemas: Option<Vec<String>>,

    /// Table names to leave out; the configured default when absent
    #[validate(custom(function = "validate_names"))]
    pub exclude_tables: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub success: bool,
    pub message: String,
    pub snapshot: Snapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotListResponse {
    pub success: bool,
    pub snapshots: Vec<SnapshotMetadata>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

fn validate_names(names: &[String]) -> Result<(), validator::ValidationError> {
    if names.iter().all(|n| IDENTIFIER.is_match(n)) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_identifier")
            .with_message("Names must be plain identifiers".into()))
    }
}

// ==================== Handlers ====================

/// Capture a snapshot of the configured database
pub async fn capture_snapshot(
    State(state): State<SharedState>,
    Json(payload): Json<CaptureRequest>,
) -> ApiResult<Json<SnapshotResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let catalog = state.catalog.as_ref().ok_or_else(|| {
        AppError::NotConnected("No database configured. Set DATABASE_URL to enable capture.".to_string())
    })?;

    let filters = CaptureFilters {
        schemas: payload
            .schemas
            .unwrap_or_else(|| state.settings.capture.schemas.clone()),
        exclude_tables: payload
            .exclude_tables
            .unwrap_or_else(|| state.settings.capture.exclude_tables.clone()),
    };
    debug!("Capturing snapshot with filters {:?}", filters);

    let rows = catalog.fetch(&filters).await?;
    let snapshot = Normalizer::normalize(rows, &filters)?;
    let stored = state.snapshots.put(snapshot).await?;

    info!(
        "Captured snapshot {} of {} ({} tables, {} indexes)",
        stored.id,
        stored.engine.database,
        stored.tables.len(),
        stored.indexes.len()
    );

    Ok(Json(SnapshotResponse {
        success: true,
        message: "Snapshot captured.".to_string(),
        snapshot: stored.as_ref().clone(),
    }))
}

/// Store a snapshot produced elsewhere
pub async fn import_snapshot(
    State(state): State<SharedState>,
    Json(mut snapshot): Json<Snapshot>,
) -> ApiResult<Json<SnapshotResponse>> {
    check_unique_keys(&snapshot)?;

    if snapshot.id.is_nil() {
        snapshot.id = Uuid::new_v4();
    }
    snapshot.checksum = Snapshot::compute_checksum(
        &snapshot.tables,
        &snapshot.indexes,
        &snapshot.enums,
        &snapshot.views,
    );

    let stored = state.snapshots.put(snapshot).await?;
    info!("Imported snapshot {} ({} tables)", stored.id, stored.tables.len());

    Ok(Json(SnapshotResponse {
        success: true,
        message: "Snapshot imported.".to_string(),
        snapshot: stored.as_ref().clone(),
    }))
}

/// List stored snapshots, newest first
pub async fn list_snapshots(State(state): State<SharedState>) -> Json<SnapshotListResponse> {
    let snapshots = state.snapshots.list().await;
    debug!("Listing {} snapshots", snapshots.len());

    Json(SnapshotListResponse {
        success: true,
        snapshots,
    })
}

/// Fetch one snapshot
pub async fn get_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SnapshotResponse>> {
    let snapshot = state
        .snapshots
        .get(id)
        .await
        .ok_or_else(|| not_found_error(format!("Snapshot {} not found", id)))?;

    Ok(Json(SnapshotResponse {
        success: true,
        message: "Snapshot fetched.".to_string(),
        snapshot: snapshot.as_ref().clone(),
    }))
}

/// Delete one snapshot
pub async fn delete_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.snapshots.delete(id).await? {
        return Err(not_found_error(format!("Snapshot {} not found", id)));
    }
    info!("Deleted snapshot {}", id);

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Snapshot {} deleted.", id),
    }))
}

/// Reject imported snapshots whose identity keys collide
fn check_unique_keys(snapshot: &Snapshot) -> Result<(), AppError> {
    let mut tables = HashSet::new();
    for table in &snapshot.tables {
        if !tables.insert(table.key()) {
            return Err(validation_error(format!("Duplicate table {}", table.key())));
        }
        let mut columns = HashSet::new();
        for column in &table.columns {
            if !columns.insert(column.name.as_str()) {
                return Err(validation_error(format!(
                    "Duplicate column {} in table {}",
                    column.name,
                    table.key()
                )));
            }
        }
    }

    let mut indexes = HashSet::new();
    if let Some(index) = snapshot.indexes.iter().find(|i| !indexes.insert(i.key())) {
        return Err(validation_error(format!("Duplicate index {}", index.key())));
    }

    let mut enums = HashSet::new();
    if let Some(e) = snapshot.enums.iter().find(|e| !enums.insert(e.key())) {
        return Err(validation_error(format!("Duplicate enum {}", e.key())));
    }

    Ok(())
}
