use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::job::JobStatusResponse;

/// GET /api/v1/jobs/{job_id}: current status of a print job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, StatusCode> {
    let job = queries::get_job(&state.db, job_id).await.map_err(|e| {
        tracing::error!(%job_id, error = %e, "Failed to load print job");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    job.map(|job| Json(job.into())).ok_or(StatusCode::NOT_FOUND)
}
