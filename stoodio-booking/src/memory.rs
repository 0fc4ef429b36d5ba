use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use stoodio_core::repository::{
    BookingRepository, InsertOutcome, SlotGuard, StoreError, StoreResult, Transition,
    TransitionOutcome, UserRepository,
};
use stoodio_core::{Booking, LedgerPosting, Transaction, UserAccount};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    bookings: HashMap<Uuid, Booking>,
    users: HashMap<Uuid, UserAccount>,
    transactions: Vec<Transaction>,
    keys: HashSet<String>,
    next_sequence: i64,
}

impl State {
    fn conflict(&self, guard: &SlotGuard, except: Option<Uuid>) -> Option<Uuid> {
        self.bookings
            .values()
            .filter(|b| Some(b.id) != except)
            .find(|b| b.holds(guard.user_id) && b.slot.overlaps(guard.starts_at, guard.ends_at))
            .map(|b| b.id)
    }

    fn ensure_users<'a>(&self, ids: impl IntoIterator<Item = &'a Uuid>) -> StoreResult<()> {
        for id in ids {
            if !self.users.contains_key(id) {
                return Err(StoreError::NotFound(format!("user {}", id)));
            }
        }
        Ok(())
    }

    /// Callers check `ensure_users` first so this never fails halfway
    fn append(&mut self, postings: Vec<LedgerPosting>, at: DateTime<Utc>) -> Vec<Transaction> {
        let mut applied = Vec::new();
        for posting in postings {
            if !self.keys.insert(posting.idempotency_key.clone()) {
                continue;
            }
            if let Some(user) = self.users.get_mut(&posting.user_id) {
                user.wallet_balance_cents += posting.amount_cents;
            }
            let tx = posting.into_transaction(at);
            self.transactions.push(tx.clone());
            applied.push(tx);
        }
        applied
    }
}

/// Process-local store for development and tests. Every operation runs in a
/// single critical section, which gives the same atomicity the Postgres
/// store gets from its transactions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert_booking(
        &self,
        mut booking: Booking,
        guard: Option<SlotGuard>,
        postings: Vec<LedgerPosting>,
    ) -> StoreResult<InsertOutcome> {
        let mut state = self.lock()?;

        if let Some(guard) = guard {
            if let Some(conflicting_booking) = state.conflict(&guard, None) {
                return Ok(InsertOutcome::SlotTaken { conflicting_booking });
            }
        }
        state.ensure_users(postings.iter().map(|p| &p.user_id))?;

        state.next_sequence += 1;
        booking.sequence = state.next_sequence;
        state.bookings.insert(booking.id, booking.clone());
        state.append(postings, Utc::now());

        Ok(InsertOutcome::Inserted(booking))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    async fn list_open_jobs(&self) -> StoreResult<Vec<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .filter(|b| b.is_open_job())
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .lock()?
            .bookings
            .values()
            .filter(|b| b.is_participant(user_id))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.sequence);
        Ok(bookings)
    }

    async fn find_overlapping(
        &self,
        user_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .values()
            .filter(|b| b.holds(user_id) && b.slot.overlaps(starts_at, ends_at))
            .cloned()
            .collect())
    }

    async fn apply_transition(&self, transition: Transition) -> StoreResult<TransitionOutcome> {
        let mut state = self.lock()?;

        let current = state
            .bookings
            .get(&transition.booking_id)
            .map(|b| b.status)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", transition.booking_id)))?;

        if !transition.expected.contains(&current) {
            return Ok(TransitionOutcome::StatusMismatch(current));
        }

        for guard in &transition.slot_guards {
            if let Some(conflicting_booking) = state.conflict(guard, Some(transition.booking_id)) {
                return Ok(TransitionOutcome::SlotTaken { conflicting_booking });
            }
        }

        state.ensure_users(
            transition
                .postings
                .iter()
                .map(|p| &p.user_id)
                .chain(transition.completed_sessions_for.iter()),
        )?;

        let now = Utc::now();
        state.append(transition.postings, now);
        for user_id in &transition.completed_sessions_for {
            if let Some(user) = state.users.get_mut(user_id) {
                user.sessions_completed += 1;
            }
        }

        let booking = state
            .bookings
            .get_mut(&transition.booking_id)
            .ok_or_else(|| StoreError::NotFound(format!("booking {}", transition.booking_id)))?;
        booking.status = transition.next;
        if let Some(assignment) = transition.assignment {
            booking.assignment = assignment;
        }
        booking.updated_at = now;

        Ok(TransitionOutcome::Applied(booking.clone()))
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn save_user(&self, user: &UserAccount) -> StoreResult<()> {
        let mut state = self.lock()?;
        let mut record = user.clone();
        if let Some(existing) = state.users.get(&user.id) {
            record.wallet_balance_cents = existing.wallet_balance_cents;
            record.sessions_completed = existing.sessions_completed;
        } else {
            record.wallet_balance_cents = 0;
        }
        state.users.insert(record.id, record);
        Ok(())
    }

    async fn list_transactions(&self, user_id: Uuid) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_transaction(&self, idempotency_key: &str) -> StoreResult<Option<Transaction>> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .find(|t| t.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn append_postings(&self, postings: Vec<LedgerPosting>) -> StoreResult<Vec<Transaction>> {
        let mut state = self.lock()?;
        state.ensure_users(postings.iter().map(|p| &p.user_id))?;
        Ok(state.append(postings, Utc::now()))
    }
}
