pub mod booking;
pub mod user;
pub mod ledger;
pub mod rules;
pub mod repository;
pub mod payment;
pub mod events;
pub mod clock;

use uuid::Uuid;

pub use booking::{Assignment, Booking, BookingStatus, RequestType, SessionSlot};
pub use user::{RankingTier, Role, UserAccount};
pub use ledger::{LedgerPosting, Transaction, TransactionCategory};

/// Failure taxonomy for booking commands. Every variant is a synchronous
/// rejection: nothing was written when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Slot unavailable: {0}")]
    Conflict(String),
    #[error("Job {0} is no longer available")]
    AlreadyClaimed(Uuid),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Ledger drift for user {user_id}: balance {balance_cents} != ledger sum {ledger_sum_cents}")]
    LedgerDrift {
        user_id: Uuid,
        balance_cents: i64,
        ledger_sum_cents: i64,
    },
    #[error(transparent)]
    Store(#[from] repository::StoreError),
    #[error(transparent)]
    Checkout(#[from] payment::CheckoutError),
}

pub type BookingResult<T> = Result<T, BookingError>;
