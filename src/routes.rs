//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod diff;
mod interfaces;
mod snapshot;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(health_check))
        // Snapshots
        .route(
            "/api/snapshots",
            post(snapshot::capture_snapshot).get(snapshot::list_snapshots),
        )
        .route("/api/snapshots/import", post(snapshot::import_snapshot))
        .route(
            "/api/snapshots/{id}",
            get(snapshot::get_snapshot).delete(snapshot::delete_snapshot),
        )
        // Interfaces
        .route(
            "/api/snapshots/{id}/interfaces",
            post(interfaces::map_snapshot_interfaces),
        )
        .route("/api/snapshots/{id}/scan-zip", post(interfaces::scan_zip_into_snapshot))
        .route("/api/interfaces/scan", post(interfaces::scan_zip))
        // Diff
        .route("/api/diff", get(diff::diff_snapshots))
        .layer(DefaultBodyLimit::max(settings.storage.max_upload_bytes))
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
