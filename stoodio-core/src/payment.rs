use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
    Open,
    Succeeded,
    Failed,
    Expired,
}

/// What the money is for once the checkout succeeds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutPurpose {
    TopUp,
    Tip { booking_id: Uuid, recipient_id: Uuid },
}

/// The external checkout's session, as far as the core cares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String, // Provider's ID (e.g., cs_123)
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub purpose: CheckoutPurpose,
    pub status: CheckoutStatus,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Checkout provider error: {0}")]
    Provider(String),
    #[error("Unknown checkout session: {0}")]
    UnknownSession(String),
}

#[async_trait]
pub trait CheckoutAdapter: Send + Sync {
    /// Open a hosted checkout the user is redirected to
    async fn create_session(
        &self,
        user_id: Uuid,
        amount_cents: i64,
        currency: &str,
        purpose: CheckoutPurpose,
    ) -> Result<CheckoutSession, CheckoutError>;

    /// Retrieve session status
    async fn get_session(&self, session_id: &str) -> Result<CheckoutSession, CheckoutError>;
}
