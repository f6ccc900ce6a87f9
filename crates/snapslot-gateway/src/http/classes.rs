use axum::{extract::State, Json};
use std::sync::Arc;

use snapslot_core::classes::ClassEntry;

use crate::app::AppState;

/// GET /api/classes
pub async fn list_classes(State(state): State<Arc<AppState>>) -> Json<Vec<ClassEntry>> {
    Json(state.catalog.active().into_iter().cloned().collect())
}
