//! Interface API Routes
//!
//! Mapping posted or scanned field-list declarations onto a stored snapshot.
//! Archives are sent as the raw request body (`application/zip`).

use crate::error::{ApiResult, AppError};
use crate::interfaces::{map_interfaces, scan_archive};
use crate::model::{InterfaceDef, Warning};
use crate::state::SharedState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapInterfacesRequest {
    pub interfaces: Vec<InterfaceDef>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingResponse {
    pub success: bool,
    pub snapshot_id: Uuid,
    pub interfaces: Vec<InterfaceDef>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    pub interfaces: Vec<InterfaceDef>,
}

/// Map a posted interface list onto a snapshot
pub async fn map_snapshot_interfaces(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MapInterfacesRequest>,
) -> ApiResult<Json<MappingResponse>> {
    apply_mapping(&state, id, payload.interfaces).await.map(Json)
}

/// Scan an uploaded archive and map the result onto a snapshot
pub async fn scan_zip_into_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<MappingResponse>> {
    // fail before scanning when the target is gone
    if state.snapshots.get(id).await.is_none() {
        return Err(AppError::NotFound(format!("Snapshot {} not found", id)));
    }
    let interfaces = scan_upload(body, state.settings.storage.max_source_file_bytes).await?;
    apply_mapping(&state, id, interfaces).await.map(Json)
}

/// Scan an uploaded archive without mapping
pub async fn scan_zip(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<ScanResponse>> {
    let interfaces = scan_upload(body, state.settings.storage.max_source_file_bytes).await?;

    Ok(Json(ScanResponse {
        success: true,
        interfaces,
    }))
}

async fn apply_mapping(
    state: &SharedState,
    id: Uuid,
    interfaces: Vec<InterfaceDef>,
) -> Result<MappingResponse, AppError> {
    let updated = state
        .snapshots
        .replace_with(id, |current| {
            current.with_interfaces(map_interfaces(&current.tables, &interfaces))
        })
        .await?;

    let mapped = updated
        .interfaces
        .iter()
        .filter(|i| i.mapped_to.is_some())
        .count();
    info!(
        "Mapped {}/{} interfaces onto snapshot {}",
        mapped,
        updated.interfaces.len(),
        id
    );

    Ok(MappingResponse {
        success: true,
        snapshot_id: id,
        interfaces: updated.interfaces.clone(),
        warnings: updated
            .warnings
            .iter()
            .filter(|w| w.kind.is_mapping_related())
            .cloned()
            .collect(),
    })
}

/// Archive scanning is CPU-bound; keep it off the async workers
async fn scan_upload(body: Bytes, max_file_bytes: u64) -> Result<Vec<InterfaceDef>, AppError> {
    tokio::task::spawn_blocking(move || scan_archive(&body, max_file_bytes))
        .await
        .map_err(|e| AppError::Internal(format!("Scan task failed: {}", e)))?
        .map_err(AppError::from)
}
