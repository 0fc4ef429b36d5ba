use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Assignment, Booking, BookingStatus};
use crate::ledger::{LedgerPosting, Transaction};
use crate::user::UserAccount;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// "No CONFIRMED booking other than the one being changed may hold this user
/// in this window." Checked inside the same atomic unit as the write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotGuard {
    pub user_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// One all-or-nothing change to a booking: a conditional status update plus
/// the ledger and counter side effects that go with it.
#[derive(Debug, Clone)]
pub struct Transition {
    pub booking_id: Uuid,
    /// Applied only while the booking is in one of these statuses
    pub expected: Vec<BookingStatus>,
    pub next: BookingStatus,
    /// `None` leaves the assignment unchanged
    pub assignment: Option<Assignment>,
    pub postings: Vec<LedgerPosting>,
    /// Users whose `sessions_completed` goes up by one
    pub completed_sessions_for: Vec<Uuid>,
    /// Every calendar the transition takes, checked together with the write
    pub slot_guards: Vec<SlotGuard>,
}

impl Transition {
    pub fn new(booking_id: Uuid, expected: &[BookingStatus], next: BookingStatus) -> Self {
        Self {
            booking_id,
            expected: expected.to_vec(),
            next,
            assignment: None,
            postings: Vec::new(),
            completed_sessions_for: Vec::new(),
            slot_guards: Vec::new(),
        }
    }

    pub fn assign(mut self, assignment: Assignment) -> Self {
        self.assignment = Some(assignment);
        self
    }

    pub fn post(mut self, postings: impl IntoIterator<Item = LedgerPosting>) -> Self {
        self.postings.extend(postings);
        self
    }

    pub fn count_session(mut self, user_id: Uuid) -> Self {
        if !self.completed_sessions_for.contains(&user_id) {
            self.completed_sessions_for.push(user_id);
        }
        self
    }

    pub fn guard_slot(mut self, guard: SlotGuard) -> Self {
        if !self.slot_guards.iter().any(|g| g.user_id == guard.user_id) {
            self.slot_guards.push(guard);
        }
        self
    }

    /// Guards sorted by user id, the order row locks are taken in
    pub fn guards_in_lock_order(&self) -> Vec<SlotGuard> {
        let mut guards = self.slot_guards.clone();
        guards.sort_by_key(|g| g.user_id);
        guards
    }
}

#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(Booking),
    /// The conditional update matched nothing; carries the status found instead
    StatusMismatch(BookingStatus),
    SlotTaken { conflicting_booking: Uuid },
}

#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Booking),
    SlotTaken { conflicting_booking: Uuid },
}

/// Repository trait for booking data access
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Persist a new booking, assigning its `sequence`. Postings are for
    /// bookings created already CONFIRMED under charge-on-confirmation.
    async fn insert_booking(
        &self,
        booking: Booking,
        guard: Option<SlotGuard>,
        postings: Vec<LedgerPosting>,
    ) -> StoreResult<InsertOutcome>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Candidate set for the job board: stoodio-posted PENDING bookings
    async fn list_open_jobs(&self) -> StoreResult<Vec<Booking>>;

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;

    /// CONFIRMED bookings holding the user inside the window
    async fn find_overlapping(
        &self,
        user_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>>;

    async fn apply_transition(&self, transition: Transition) -> StoreResult<TransitionOutcome>;
}

/// Repository trait for user records and their wallet ledgers
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>>;

    /// Insert or update profile fields. Never touches balance or counters.
    async fn save_user(&self, user: &UserAccount) -> StoreResult<()>;

    /// Oldest first
    async fn list_transactions(&self, user_id: Uuid) -> StoreResult<Vec<Transaction>>;

    async fn find_transaction(&self, idempotency_key: &str) -> StoreResult<Option<Transaction>>;

    /// Atomically append postings and move balances. Postings whose key
    /// already exists are skipped; returns only the newly appended entries.
    async fn append_postings(&self, postings: Vec<LedgerPosting>) -> StoreResult<Vec<Transaction>>;
}
