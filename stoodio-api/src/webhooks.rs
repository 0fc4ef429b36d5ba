use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use stoodio_booking::CheckoutOutcome;
use stoodio_core::payment::CheckoutStatus;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/checkout", post(checkout_completed))
}

/// Provider callback. Only the id is trusted; the session itself is
/// re-fetched from the provider.
#[derive(Debug, Deserialize)]
pub struct CheckoutWebhookPayload {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_status: Option<CheckoutStatus>,
}

impl From<CheckoutOutcome> for WebhookAck {
    fn from(outcome: CheckoutOutcome) -> Self {
        match outcome {
            CheckoutOutcome::Credited => WebhookAck { outcome: "CREDITED", session_status: None },
            CheckoutOutcome::AlreadyApplied => WebhookAck { outcome: "ALREADY_APPLIED", session_status: None },
            CheckoutOutcome::Ignored(status) => WebhookAck { outcome: "IGNORED", session_status: Some(status) },
        }
    }
}

/// Always 2xx once the callback is understood, so the provider stops
/// redelivering; redeliveries are absorbed by the ledger's idempotency keys.
async fn checkout_completed(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutWebhookPayload>,
) -> Result<Json<WebhookAck>, AppError> {
    tracing::info!("Received checkout webhook for session {}", payload.session_id);
    let outcome = state.checkout.handle_checkout_completed(&payload.session_id).await?;
    Ok(Json(outcome.into()))
}
