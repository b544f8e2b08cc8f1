//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::catalog::CatalogSource;
use crate::config::Settings;
use crate::snapshot::SnapshotStore;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,

    /// Catalog reader; `None` when no database is configured
    pub catalog: Option<Arc<dyn CatalogSource>>,

    pub snapshots: SnapshotStore,
}

impl AppState {
    pub fn new(
        settings: Settings,
        catalog: Option<Arc<dyn CatalogSource>>,
        snapshots: SnapshotStore,
    ) -> Self {
        Self {
            settings,
            catalog,
            snapshots,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
