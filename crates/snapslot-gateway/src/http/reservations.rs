//! Reservation endpoints.
//!
//! `POST /api/reservations/scheduled` answers as soon as the run is admitted;
//! the booking itself happens later in the orchestrator's run task and is
//! observed through `GET /api/reservations/{id}`. `POST /api/reservations/immediate`
//! books on the spot and answers with the finished run's report.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use snapslot_core::types::RunId;
use snapslot_scheduler::{Acknowledgement, RunReport, ScheduleRun, SubmitRequest};

use super::ApiError;
use crate::app::AppState;

/// POST /api/reservations/scheduled
pub async fn schedule(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Acknowledgement>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let resource_id = req.resource_id.clone();
    let ack = state.orchestrator.submit(req)?;
    info!(run_id = %ack.run_id, resource_id = %resource_id, "scheduled reservation accepted");
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

#[derive(Debug, Deserialize)]
pub struct ImmediateRequest {
    /// Catalog name or id; anything else is passed to the site as-is.
    pub class_name: String,
}

/// POST /api/reservations/immediate
pub async fn book_now(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ImmediateRequest>, JsonRejection>,
) -> Result<Json<RunReport>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let requested = req.class_name.trim();

    let resource_id = match state
        .catalog
        .by_name(requested)
        .or_else(|| state.catalog.by_id(requested))
    {
        Some(class) => class.name.clone(),
        None => {
            warn!(class_name = requested, "class not in catalog; booking by name");
            requested.to_string()
        }
    };

    let report = state.orchestrator.book_now(&resource_id).await?;
    info!(
        run_id = %report.run_id,
        resource_id = %resource_id,
        success = report.outcome.is_success(),
        "immediate reservation finished"
    );
    Ok(Json(report))
}

/// GET /api/reservations
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<ScheduleRun>> {
    Json(state.orchestrator.list())
}

/// GET /api/reservations/{id}
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScheduleRun>, ApiError> {
    let run_id = RunId::from(id);
    state
        .orchestrator
        .get(&run_id)
        .map(Json)
        .ok_or_else(|| {
            snapslot_scheduler::SchedulerError::RunNotFound {
                id: run_id.to_string(),
            }
            .into()
        })
}

/// DELETE /api/reservations/{id}
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let run_id = RunId::from(id);
    state.orchestrator.cancel(&run_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "status": "cancelling" })),
    ))
}
