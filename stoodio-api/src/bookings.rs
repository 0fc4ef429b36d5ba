use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use stoodio_booking::models::DirectBookingRequest;
use stoodio_booking::SessionState;
use stoodio_core::Booking;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;
use crate::wallet::CheckoutResponse;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/approve", post(approve_booking))
        .route("/v1/bookings/{id}/deny", post(deny_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/complete", post(complete_booking))
        .route("/v1/bookings/{id}/session", get(session_status))
        .route("/v1/bookings/{id}/session/start", post(start_session))
        .route("/v1/bookings/{id}/session/end", post(end_session))
        .route("/v1/bookings/{id}/tips", post(start_tip))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<DirectBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.manager.create_direct_booking(user_id, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.manager.bookings_for_user(user_id).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.manager.get_booking(id).await?;
    // Open jobs are public on the board; everything else is for participants
    if !booking.is_open_job() && !booking.is_participant(user_id) {
        return Err(AppError::AuthorizationError("not a participant of this booking".to_string()));
    }
    Ok(Json(booking))
}

async fn approve_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.manager.approve_request(user_id, id).await?))
}

async fn deny_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.manager.deny_request(user_id, id).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.manager.cancel_booking(user_id, id).await?))
}

async fn complete_booking(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.manager.complete_booking(user_id, id).await?))
}

#[derive(Debug, Serialize)]
struct SessionStatusResponse {
    booking_id: Uuid,
    /// Absent when the booking is not in a runnable state
    session: Option<SessionState>,
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatusResponse>, AppError> {
    let session = state.manager.session_state(id).await?;
    Ok(Json(SessionStatusResponse { booking_id: id, session }))
}

async fn start_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionState>, AppError> {
    Ok(Json(state.manager.start_session(user_id, id).await?))
}

#[derive(Debug, Deserialize)]
struct EndSessionRequest {
    /// The client asks the user before ending; unconfirmed requests are rejected
    #[serde(default)]
    confirmed: bool,
}

async fn end_session(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<EndSessionRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.manager.end_session(user_id, id, req.confirmed).await?))
}

#[derive(Debug, Deserialize)]
struct TipRequest {
    amount_cents: i64,
}

async fn start_tip(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<TipRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let session = state.checkout.start_tip(user_id, id, req.amount_cents).await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}
