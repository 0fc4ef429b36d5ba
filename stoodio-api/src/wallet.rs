use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use stoodio_booking::models::WalletSummary;
use stoodio_core::payment::{CheckoutPurpose, CheckoutSession, CheckoutStatus};

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/wallet", get(wallet))
        .route("/v1/wallet/top-up", post(start_top_up))
}

/// Where the client sends the user to pay
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub purpose: CheckoutPurpose,
    pub status: CheckoutStatus,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id,
            checkout_url: session.checkout_url,
            amount_cents: session.amount_cents,
            currency: session.currency,
            purpose: session.purpose,
            status: session.status,
        }
    }
}

/// Balance, history and whether the balance matches the ledger
async fn wallet(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<WalletSummary>, AppError> {
    Ok(Json(state.manager.wallet(user_id).await?))
}

#[derive(Debug, Deserialize)]
struct TopUpRequest {
    amount_cents: i64,
}

async fn start_top_up(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<TopUpRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let session = state.checkout.start_top_up(user_id, req.amount_cents).await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}
