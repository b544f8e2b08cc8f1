//! Diff API Route

use crate::error::{not_found_error, ApiResult};
use crate::snapshot::{DiffEngine, DiffReport};
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    /// Base snapshot
    pub from: Uuid,
    /// Snapshot compared against the base
    pub to: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    pub success: bool,
    pub has_breaking_changes: bool,
    pub diff: DiffReport,
}

/// Compare two stored snapshots
pub async fn diff_snapshots(
    State(state): State<SharedState>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<Json<DiffResponse>> {
    let from = state
        .snapshots
        .get(query.from)
        .await
        .ok_or_else(|| not_found_error(format!("Snapshot {} not found", query.from)))?;
    let to = state
        .snapshots
        .get(query.to)
        .await
        .ok_or_else(|| not_found_error(format!("Snapshot {} not found", query.to)))?;

    let diff = DiffEngine::diff(&from, &to);
    if diff.is_empty() {
        debug!("Snapshots {} and {} are structurally identical", query.from, query.to);
    }
    info!(
        "Diffed {} -> {}: {} breaking changes",
        query.from,
        query.to,
        diff.breaking.len()
    );

    Ok(Json(DiffResponse {
        success: true,
        has_breaking_changes: diff.has_breaking_changes(),
        diff,
    }))
}
