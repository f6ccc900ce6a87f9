use axum::{
    routing::{get, post},
    Router,
};
use snapslot_core::{classes::ClassCatalog, config::SnapslotConfig};
use snapslot_scheduler::Orchestrator;
use std::sync::Arc;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: SnapslotConfig,
    pub orchestrator: Orchestrator,
    pub catalog: ClassCatalog,
}

impl AppState {
    pub fn new(config: SnapslotConfig, orchestrator: Orchestrator) -> Self {
        let catalog = ClassCatalog::new(config.classes.clone());
        Self {
            config,
            orchestrator,
            catalog,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/classes", get(crate::http::classes::list_classes))
        .route("/api/reservations", get(crate::http::reservations::list))
        .route(
            "/api/reservations/scheduled",
            post(crate::http::reservations::schedule),
        )
        .route(
            "/api/reservations/immediate",
            post(crate::http::reservations::book_now),
        )
        .route(
            "/api/reservations/{id}",
            get(crate::http::reservations::get_one).delete(crate::http::reservations::cancel),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
