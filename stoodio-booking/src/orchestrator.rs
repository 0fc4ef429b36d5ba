use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stoodio_core::payment::{
    CheckoutAdapter, CheckoutError, CheckoutPurpose, CheckoutSession, CheckoutStatus,
};
use stoodio_core::{BookingError, BookingResult};
use tracing::info;
use uuid::Uuid;

use crate::manager::{BookingManager, CreditOutcome};

/// What a checkout callback did to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Credited,
    /// Redelivered callback for money already on the ledger
    AlreadyApplied,
    /// The session has not succeeded; nothing to credit
    Ignored(CheckoutStatus),
}

impl From<CreditOutcome> for CheckoutOutcome {
    fn from(outcome: CreditOutcome) -> Self {
        match outcome {
            CreditOutcome::Credited => CheckoutOutcome::Credited,
            CreditOutcome::AlreadyApplied => CheckoutOutcome::AlreadyApplied,
        }
    }
}

/// Opens checkout sessions for top-ups and tips, and turns succeeded
/// sessions into ledger credits.
pub struct CheckoutOrchestrator {
    adapter: Arc<dyn CheckoutAdapter>,
    manager: Arc<BookingManager>,
}

impl CheckoutOrchestrator {
    pub fn new(adapter: Arc<dyn CheckoutAdapter>, manager: Arc<BookingManager>) -> Self {
        Self { adapter, manager }
    }

    pub async fn start_top_up(&self, user_id: Uuid, amount_cents: i64) -> BookingResult<CheckoutSession> {
        if amount_cents <= 0 {
            return Err(BookingError::Validation("top-up amount must be positive".to_string()));
        }
        self.manager.get_user(user_id).await?;

        let currency = self.manager.rules().currency.clone();
        let session = self
            .adapter
            .create_session(user_id, amount_cents, &currency, CheckoutPurpose::TopUp)
            .await?;
        info!("Checkout {} opened for top-up of {} by {}", session.id, amount_cents, user_id);
        Ok(session)
    }

    pub async fn start_tip(&self, tipper_id: Uuid, booking_id: Uuid, amount_cents: i64) -> BookingResult<CheckoutSession> {
        let recipient_id = self.manager.validate_tip(tipper_id, booking_id, amount_cents).await?;

        let currency = self.manager.rules().currency.clone();
        let session = self
            .adapter
            .create_session(
                tipper_id,
                amount_cents,
                &currency,
                CheckoutPurpose::Tip { booking_id, recipient_id },
            )
            .await?;
        info!("Checkout {} opened for tip on booking {}", session.id, booking_id);
        Ok(session)
    }

    /// Webhook entry point. The session is re-fetched from the provider
    /// rather than trusting the callback body.
    pub async fn handle_checkout_completed(&self, session_id: &str) -> BookingResult<CheckoutOutcome> {
        let session = self.adapter.get_session(session_id).await?;
        if session.status != CheckoutStatus::Succeeded {
            info!("Checkout {} is {:?}, nothing to credit", session.id, session.status);
            return Ok(CheckoutOutcome::Ignored(session.status));
        }

        let outcome = match session.purpose {
            CheckoutPurpose::TopUp => self.manager.credit_top_up(&session).await?,
            CheckoutPurpose::Tip { .. } => self.manager.confirm_tip(&session).await?,
        };
        Ok(outcome.into())
    }
}

/// In-process checkout provider for development and tests. Sessions stay
/// OPEN until [`MockCheckoutAdapter::complete`] is called.
#[derive(Debug, Default)]
pub struct MockCheckoutAdapter {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
}

impl MockCheckoutAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the user finishing (or abandoning) the hosted checkout
    pub fn complete(&self, session_id: &str, status: CheckoutStatus) -> Result<(), CheckoutError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| CheckoutError::Provider("mock checkout lock poisoned".to_string()))?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CheckoutError::UnknownSession(session_id.to_string()))?;
        session.status = status;
        Ok(())
    }
}

#[async_trait]
impl CheckoutAdapter for MockCheckoutAdapter {
    async fn create_session(
        &self,
        user_id: Uuid,
        amount_cents: i64,
        currency: &str,
        purpose: CheckoutPurpose,
    ) -> Result<CheckoutSession, CheckoutError> {
        let id = format!("cs_mock_{}", Uuid::new_v4().simple());
        let session = CheckoutSession {
            checkout_url: Some(format!("https://checkout.invalid/pay/{}", id)),
            id: id.clone(),
            user_id,
            amount_cents,
            currency: currency.to_string(),
            purpose,
            status: CheckoutStatus::Open,
            created_at: Utc::now(),
        };

        self.sessions
            .lock()
            .map_err(|_| CheckoutError::Provider("mock checkout lock poisoned".to_string()))?
            .insert(id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<CheckoutSession, CheckoutError> {
        self.sessions
            .lock()
            .map_err(|_| CheckoutError::Provider("mock checkout lock poisoned".to_string()))?
            .get(session_id)
            .cloned()
            .ok_or_else(|| CheckoutError::UnknownSession(session_id.to_string()))
    }
}
