use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use stoodio_booking::models::{JobBoard, OpenJobRequest};
use stoodio_core::Booking;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/jobs", post(post_job).get(job_board))
        .route("/v1/jobs/{id}/accept", post(accept_job))
}

async fn post_job(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<OpenJobRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let job = state.manager.post_open_job(user_id, req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// Jobs the calling engineer can see right now, given their ranking tier
async fn job_board(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<JobBoard>, AppError> {
    Ok(Json(state.manager.job_board(user_id).await?))
}

async fn accept_job(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.manager.accept_job(user_id, id).await?))
}
