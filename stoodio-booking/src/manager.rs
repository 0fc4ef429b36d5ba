use std::sync::Arc;

use stoodio_core::booking::{NewBooking, ParticipantSnapshot, SessionSlot};
use stoodio_core::clock::{Clock, SystemClock};
use stoodio_core::events::EventPublisher;
use stoodio_core::ledger::booking_key;
use stoodio_core::payment::{CheckoutPurpose, CheckoutSession};
use stoodio_core::repository::{
    BookingRepository, InsertOutcome, SlotGuard, Transition, TransitionOutcome, UserRepository,
};
use stoodio_core::rules::{BookingRules, ChargePolicy};
use stoodio_core::{
    Assignment, Booking, BookingError, BookingResult, BookingStatus, LedgerPosting, RequestType,
    Role, TransactionCategory, UserAccount,
};
use stoodio_shared::models::events::{
    BookingCompletedEvent, BookingCreatedEvent, BookingTransitionEvent, JobAcceptedEvent,
    JobPostedEvent, SessionStartedEvent, TipReceivedEvent, WalletCreditedEvent,
};
use stoodio_shared::DomainEvent;
use tracing::{info, warn};
use uuid::Uuid;

use crate::finance::{Party, Reconciliation, SettlementParties, WalletLedger};
use crate::job_board::{is_visible, visible_jobs};
use crate::models::{
    non_negative_cents, parse_slot, BookingTarget, DirectBookingRequest, EngineerChoice, JobBoard,
    OpenJobRequest, WalletSummary,
};
use crate::ranking::visibility_hint;
use crate::session::{SessionRuntime, SessionState};

/// Result of applying a checkout's money to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Credited,
    AlreadyApplied,
}

/// Booking command service: every lifecycle operation, its preconditions and
/// the ledger side effects that commit with it.
pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    users: Arc<dyn UserRepository>,
    ledger: WalletLedger,
    sessions: SessionRuntime,
    publishers: Vec<Arc<dyn EventPublisher>>,
    clock: Arc<dyn Clock>,
    rules: BookingRules,
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        users: Arc<dyn UserRepository>,
        rules: BookingRules,
    ) -> Self {
        Self {
            bookings,
            users,
            ledger: WalletLedger::new(rules.platform_fee_rate),
            sessions: SessionRuntime::new(),
            publishers: Vec::new(),
            clock: Arc::new(SystemClock),
            rules,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    // ---- Creation ----

    /// A stoodio posts an open engineer job for one of its rooms
    pub async fn post_open_job(&self, stoodio_id: Uuid, req: OpenJobRequest) -> BookingResult<Booking> {
        let stoodio = self.load_user(stoodio_id).await?;
        if !stoodio.acts_as(Role::Stoodio) {
            return Err(BookingError::NotAuthorized("only stoodios can post jobs".to_string()));
        }

        let slot = parse_slot(req.date.as_deref(), req.start_time.as_deref(), req.duration_hours)?;
        let rate = req
            .engineer_pay_rate_cents
            .ok_or_else(|| BookingError::Validation("engineer_pay_rate_cents is required".to_string()))?;
        if rate <= 0 {
            return Err(BookingError::Validation("engineer_pay_rate_cents must be positive".to_string()));
        }
        non_negative_cents("engineer_pay_rate_cents", rate)?;

        let booking = Booking::create(
            NewBooking {
                status: BookingStatus::Pending,
                posted_by: Role::Stoodio,
                request_type: RequestType::FindAvailable,
                booked_by_id: stoodio.id,
                artist: None,
                stoodio: Some(snapshot(&stoodio)),
                assignment: Assignment::Unassigned,
                label_id: None,
                room_name: req.room_name,
                coordinates: req.coordinates.or(stoodio.coordinates),
                slot,
                engineer_pay_rate_cents: rate,
                room_rate_cents: 0,
                pull_up_fee_cents: None,
            },
            self.clock.now(),
        )
        .map_err(BookingError::Validation)?;

        let booking = match self.bookings.insert_booking(booking, None, Vec::new()).await? {
            InsertOutcome::Inserted(booking) => booking,
            InsertOutcome::SlotTaken { conflicting_booking } => {
                return Err(slot_conflict(conflicting_booking));
            }
        };

        info!("Job {} posted by stoodio {} for {}", booking.id, stoodio.id, booking.slot.date);
        self.publish_job_posted(&booking).await;
        Ok(booking)
    }

    /// An artist, label or stoodio books an engineer, producer or room directly
    pub async fn create_direct_booking(&self, booker_id: Uuid, req: DirectBookingRequest) -> BookingResult<Booking> {
        let booker = self.load_user(booker_id).await?;
        if booker.suspended {
            return Err(BookingError::NotAuthorized("account is suspended".to_string()));
        }
        if !matches!(booker.role, Role::Artist | Role::Label | Role::Stoodio) {
            return Err(BookingError::NotAuthorized(format!(
                "{} accounts cannot create bookings",
                booker.role
            )));
        }

        let slot = parse_slot(req.date.as_deref(), req.start_time.as_deref(), req.duration_hours)?;
        let pull_up_fee = req
            .pull_up_fee_cents
            .map(|fee| non_negative_cents("pull_up_fee_cents", fee))
            .transpose()?;
        if pull_up_fee.is_some() && !matches!(req.target, BookingTarget::Producer { .. }) {
            return Err(BookingError::Validation("pull_up_fee_cents applies to producer bookings only".to_string()));
        }

        let plan = self.plan_booking(&booker, req.target, req.engineer_pay_rate_cents).await?;

        // Artists signed to a label need the label's sign-off first
        let label_id = match booker.role {
            Role::Artist if plan.request_type != RequestType::FindAvailable => booker.label_id,
            _ => None,
        };
        let status = if label_id.is_some() { BookingStatus::PendingLabelApproval } else { plan.status };

        let booking = Booking::create(
            NewBooking {
                status,
                posted_by: plan.posted_by.unwrap_or(booker.role),
                request_type: plan.request_type,
                booked_by_id: booker.id,
                artist: (booker.role == Role::Artist).then(|| snapshot(&booker)),
                stoodio: plan.stoodio.as_ref().map(snapshot),
                assignment: plan.assignment,
                label_id,
                room_name: req.room_name,
                coordinates: req.coordinates.or_else(|| plan.stoodio.as_ref().and_then(|s| s.coordinates)),
                slot,
                engineer_pay_rate_cents: plan.engineer_rate_cents,
                room_rate_cents: plan.room_rate_cents,
                pull_up_fee_cents: pull_up_fee,
            },
            self.clock.now(),
        )
        .map_err(BookingError::Validation)?;

        let postings = if booking.status == BookingStatus::Confirmed {
            self.confirmation_charge(&booking, &booker, plan.stoodio.as_ref())
        } else {
            Vec::new()
        };
        let guard = guard_for(plan.resource_id, &slot);

        let booking = match self.bookings.insert_booking(booking, Some(guard), postings).await? {
            InsertOutcome::Inserted(booking) => booking,
            InsertOutcome::SlotTaken { conflicting_booking } => {
                return Err(slot_conflict(conflicting_booking));
            }
        };

        info!(
            "Booking {} created by {} ({}) with status {}",
            booking.id, booker.id, booking.request_type.as_str(), booking.status
        );

        self.publish(DomainEvent::BookingCreated(BookingCreatedEvent {
            booking_id: booking.id,
            booked_by_id: booking.booked_by_id,
            status: booking.status.to_string(),
            participant_ids: booking.participant_ids(),
            timestamp: self.clock.now().timestamp(),
        }))
        .await;
        if booking.is_open_job() {
            self.publish_job_posted(&booking).await;
        }

        Ok(booking)
    }

    async fn plan_booking(
        &self,
        booker: &UserAccount,
        target: BookingTarget,
        offered_rate: Option<i64>,
    ) -> BookingResult<BookingPlan> {
        match target {
            BookingTarget::Engineer { engineer_id } | BookingTarget::Producer { producer_id: engineer_id } => {
                let role = match target {
                    BookingTarget::Producer { .. } => Role::Producer,
                    _ => Role::Engineer,
                };
                let person = self.load_target(booker, engineer_id, role).await?;
                Ok(BookingPlan {
                    status: BookingStatus::PendingApproval,
                    posted_by: None,
                    request_type: RequestType::Direct,
                    assignment: Assignment::Requested { user_id: person.id, role },
                    stoodio: None,
                    engineer_rate_cents: profile_rate(&person)?,
                    room_rate_cents: 0,
                    resource_id: person.id,
                })
            }
            BookingTarget::Stoodio { stoodio_id, engineer } => {
                let stoodio = self.load_target(booker, stoodio_id, Role::Stoodio).await?;
                let room_rate_cents = non_negative_cents("room rate", stoodio.hourly_rate_cents.unwrap_or(0))?;

                let mut plan = BookingPlan {
                    status: BookingStatus::Confirmed,
                    posted_by: None,
                    request_type: RequestType::BringYourOwn,
                    assignment: Assignment::Unassigned,
                    stoodio: None,
                    engineer_rate_cents: 0,
                    room_rate_cents,
                    resource_id: stoodio.id,
                };

                match engineer {
                    EngineerChoice::BringYourOwn => {}
                    EngineerChoice::Specific { engineer_id } => {
                        let engineer = self.load_target(booker, engineer_id, Role::Engineer).await?;
                        plan.status = BookingStatus::PendingApproval;
                        plan.request_type = RequestType::SpecificEngineer;
                        plan.assignment = Assignment::Requested { user_id: engineer.id, role: Role::Engineer };
                        plan.engineer_rate_cents = profile_rate(&engineer)?;
                    }
                    EngineerChoice::FindAvailable => {
                        let rate = offered_rate.ok_or_else(|| {
                            BookingError::Validation("engineer_pay_rate_cents is required to find an engineer".to_string())
                        })?;
                        if rate <= 0 {
                            return Err(BookingError::Validation("engineer_pay_rate_cents must be positive".to_string()));
                        }
                        non_negative_cents("engineer_pay_rate_cents", rate)?;
                        plan.status = BookingStatus::Pending;
                        plan.posted_by = Some(Role::Stoodio);
                        plan.request_type = RequestType::FindAvailable;
                        plan.engineer_rate_cents = rate;
                    }
                }

                plan.stoodio = Some(stoodio);
                Ok(plan)
            }
        }
    }

    async fn load_target(&self, booker: &UserAccount, id: Uuid, role: Role) -> BookingResult<UserAccount> {
        if id == booker.id {
            return Err(BookingError::Validation("cannot book yourself".to_string()));
        }
        let user = self.load_user(id).await?;
        if user.role != role {
            return Err(BookingError::Validation(format!("user {} is not a {}", id, role)));
        }
        if user.suspended {
            return Err(BookingError::Validation(format!("{} {} is not available", role, id)));
        }
        Ok(user)
    }

    // ---- Job board ----

    pub async fn job_board(&self, engineer_id: Uuid) -> BookingResult<JobBoard> {
        let engineer = self.load_user(engineer_id).await?;
        if !engineer.acts_as(Role::Engineer) {
            return Err(BookingError::NotAuthorized("only engineers can browse jobs".to_string()));
        }

        let candidates = self.bookings.list_open_jobs().await?;
        let jobs = visible_jobs(&candidates, engineer.ranking_tier, self.clock.now());

        Ok(JobBoard {
            ranking_tier: engineer.ranking_tier,
            hint: visibility_hint(engineer.ranking_tier),
            jobs,
        })
    }

    /// Claim an open job. Exactly one of any number of concurrent callers wins.
    pub async fn accept_job(&self, engineer_id: Uuid, booking_id: Uuid) -> BookingResult<Booking> {
        let engineer = self.load_user(engineer_id).await?;
        if !engineer.acts_as(Role::Engineer) {
            return Err(BookingError::NotAuthorized("only engineers can accept jobs".to_string()));
        }

        let booking = self.load_booking(booking_id).await?;
        if booking.posted_by != Role::Stoodio {
            return Err(BookingError::InvalidState(format!("booking {} is not a job", booking_id)));
        }
        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Confirmed | BookingStatus::Completed => {
                return Err(BookingError::AlreadyClaimed(booking_id));
            }
            other => {
                return Err(BookingError::InvalidState(format!("job {} is {}", booking_id, other)));
            }
        }

        let now = self.clock.now();
        if !is_visible(&booking, engineer.ranking_tier, now) {
            return Err(BookingError::NotAuthorized(format!(
                "job not yet visible: {}",
                visibility_hint(engineer.ranking_tier)
            )));
        }

        let mut claimed = booking.clone();
        claimed.assignment = Assignment::Assigned { user_id: engineer.id, role: Role::Engineer };
        let payer = self.load_user(booking.booked_by_id).await?;
        let postings = self.confirmation_charge(&claimed, &payer, Some(&engineer));

        let transition = confirmation_guards(&claimed).into_iter().fold(
            Transition::new(booking_id, &[BookingStatus::Pending], BookingStatus::Confirmed)
                .assign(claimed.assignment)
                .post(postings),
            Transition::guard_slot,
        );

        let booking = match self.bookings.apply_transition(transition).await? {
            TransitionOutcome::Applied(booking) => booking,
            TransitionOutcome::StatusMismatch(_) => return Err(BookingError::AlreadyClaimed(booking_id)),
            TransitionOutcome::SlotTaken { conflicting_booking } => {
                return Err(slot_conflict(conflicting_booking));
            }
        };

        info!("Job {} accepted by engineer {}", booking_id, engineer.id);
        self.publish(DomainEvent::JobAccepted(JobAcceptedEvent {
            booking_id,
            engineer_id: engineer.id,
            stoodio_id: booking.stoodio_id(),
            timestamp: now.timestamp(),
        }))
        .await;
        self.publish_transition(DomainEvent::BookingConfirmed, &booking, engineer.id, BookingStatus::Pending)
            .await;

        Ok(booking)
    }

    // ---- Approval ----

    pub async fn approve_request(&self, approver_id: Uuid, booking_id: Uuid) -> BookingResult<Booking> {
        let (booking, approver) = self.authorize_approver(approver_id, booking_id).await?;
        let from = booking.status;

        let (next, assignment) = match from {
            BookingStatus::PendingApproval => (BookingStatus::Confirmed, Some(booking.assignment.promote())),
            // The label signs off; a requested engineer/producer still has to accept
            _ => match booking.assignment {
                Assignment::Requested { .. } => (BookingStatus::PendingApproval, None),
                _ => (BookingStatus::Confirmed, None),
            },
        };

        let mut transition = Transition::new(booking_id, &[from], next);
        if let Some(assignment) = assignment {
            transition = transition.assign(assignment);
        }
        if next == BookingStatus::Confirmed {
            let payer = self.load_user(booking.booked_by_id).await?;
            let mut confirmed = booking.clone();
            if let Some(assignment) = assignment {
                confirmed.assignment = assignment;
            }
            transition = transition.post(self.confirmation_charge(&confirmed, &payer, Some(&approver)));
            transition = confirmation_guards(&confirmed).into_iter().fold(transition, Transition::guard_slot);
        }

        let booking = match self.bookings.apply_transition(transition).await? {
            TransitionOutcome::Applied(booking) => booking,
            TransitionOutcome::StatusMismatch(status) => return Err(changed_underneath(booking_id, status)),
            TransitionOutcome::SlotTaken { conflicting_booking } => {
                return Err(slot_conflict(conflicting_booking));
            }
        };

        info!("Booking {} approved by {}: {} -> {}", booking_id, approver.id, from, booking.status);
        let event: fn(BookingTransitionEvent) -> DomainEvent = if booking.status == BookingStatus::Confirmed {
            DomainEvent::BookingConfirmed
        } else {
            DomainEvent::ApprovalRequested
        };
        self.publish_transition(event, &booking, approver.id, from).await;

        Ok(booking)
    }

    pub async fn deny_request(&self, approver_id: Uuid, booking_id: Uuid) -> BookingResult<Booking> {
        let (booking, approver) = self.authorize_approver(approver_id, booking_id).await?;
        let from = booking.status;

        let transition = Transition::new(booking_id, &[from], BookingStatus::Denied);
        let booking = match self.bookings.apply_transition(transition).await? {
            TransitionOutcome::Applied(booking) => booking,
            TransitionOutcome::StatusMismatch(status) => return Err(changed_underneath(booking_id, status)),
            TransitionOutcome::SlotTaken { conflicting_booking } => {
                return Err(slot_conflict(conflicting_booking));
            }
        };

        info!("Booking {} denied by {}", booking_id, approver.id);
        self.publish_transition(DomainEvent::BookingDenied, &booking, approver.id, from).await;
        Ok(booking)
    }

    async fn authorize_approver(&self, approver_id: Uuid, booking_id: Uuid) -> BookingResult<(Booking, UserAccount)> {
        let booking = self.load_booking(booking_id).await?;
        let approver = self.load_user(approver_id).await?;
        if approver.suspended {
            return Err(BookingError::NotAuthorized("account is suspended".to_string()));
        }

        match booking.status {
            BookingStatus::PendingApproval => {
                if booking.assignment.requested_id() != Some(approver.id) {
                    return Err(BookingError::NotAuthorized(
                        "only the requested engineer or producer can respond".to_string(),
                    ));
                }
            }
            BookingStatus::PendingLabelApproval => {
                if booking.label_id != Some(approver.id) || approver.role != Role::Label {
                    return Err(BookingError::NotAuthorized("only the artist's label can respond".to_string()));
                }
            }
            other => {
                return Err(BookingError::InvalidState(format!(
                    "booking {} is {} and not awaiting approval",
                    booking_id, other
                )));
            }
        }

        Ok((booking, approver))
    }

    // ---- Session runtime ----

    /// Only the assigned engineer/producer starts the session; anyone else
    /// gets the current state back unchanged.
    pub async fn start_session(&self, user_id: Uuid, booking_id: Uuid) -> BookingResult<SessionState> {
        let booking = self.load_booking(booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::InvalidState(format!(
                "booking {} is {}, sessions start on confirmed bookings",
                booking_id, booking.status
            )));
        }

        let current = self.sessions.state(booking_id).await;
        if !self.runs_session(&booking, user_id).await? {
            return Ok(current);
        }

        let now = self.clock.now();
        if self.rules.enforce_start_time && now < booking.slot.starts_at() {
            return Err(BookingError::InvalidState(format!(
                "session cannot start before {}",
                booking.slot.starts_at()
            )));
        }

        if current.is_in_session() {
            return Ok(current);
        }

        let state = self.sessions.begin(booking_id, now).await;
        info!("Session started for booking {} by {}", booking_id, user_id);
        self.publish(DomainEvent::SessionStarted(SessionStartedEvent {
            booking_id,
            engineer_id: user_id,
            participant_ids: booking.participant_ids(),
            timestamp: now.timestamp(),
        }))
        .await;

        Ok(state)
    }

    pub async fn end_session(&self, user_id: Uuid, booking_id: Uuid, confirmed: bool) -> BookingResult<Booking> {
        if !confirmed {
            return Err(BookingError::Validation("ending a session must be confirmed".to_string()));
        }
        let booking = self.load_booking(booking_id).await?;
        if !self.runs_session(&booking, user_id).await? {
            return Err(BookingError::NotAuthorized(
                "only the assigned engineer or producer can end the session".to_string(),
            ));
        }
        if !self.sessions.state(booking_id).await.is_in_session() {
            return Err(BookingError::InvalidState(format!("booking {} is not in session", booking_id)));
        }

        let booking = self.complete_booking(user_id, booking_id).await?;
        self.sessions.clear(booking_id).await;
        Ok(booking)
    }

    /// The assignee, acting in the role they were assigned as
    async fn runs_session(&self, booking: &Booking, user_id: Uuid) -> BookingResult<bool> {
        let Assignment::Assigned { user_id: assignee, role } = booking.assignment else {
            return Ok(false);
        };
        if assignee != user_id {
            return Ok(false);
        }
        Ok(self.load_user(user_id).await?.acts_as(role))
    }

    /// `None` unless the booking is confirmed
    pub async fn session_state(&self, booking_id: Uuid) -> BookingResult<Option<SessionState>> {
        let booking = self.load_booking(booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Ok(None);
        }
        Ok(Some(self.sessions.state(booking_id).await))
    }

    // ---- Completion and cancellation ----

    /// Completing an already completed booking is a no-op success
    pub async fn complete_booking(&self, user_id: Uuid, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        match booking.status {
            BookingStatus::Completed => return Ok(booking),
            BookingStatus::Confirmed => {}
            other => {
                return Err(BookingError::InvalidState(format!(
                    "booking {} is {} and cannot be completed",
                    booking_id, other
                )));
            }
        }
        if !booking.is_party(user_id) {
            return Err(BookingError::NotAuthorized("only booking parties can complete it".to_string()));
        }

        let parties = self.settlement_parties(&booking).await?;
        let counterpart = booking.payee_id().or_else(|| booking.stoodio_id());
        let mut transition = Transition::new(booking_id, &[BookingStatus::Confirmed], BookingStatus::Completed)
            .post(self.ledger.settlement(&booking, &parties))
            .count_session(booking.booked_by_id);
        if let Some(counterpart) = counterpart {
            transition = transition.count_session(counterpart);
        }

        let completed = match self.bookings.apply_transition(transition).await? {
            TransitionOutcome::Applied(booking) => booking,
            TransitionOutcome::StatusMismatch(BookingStatus::Completed) => {
                return self.load_booking(booking_id).await;
            }
            TransitionOutcome::StatusMismatch(status) => return Err(changed_underneath(booking_id, status)),
            TransitionOutcome::SlotTaken { conflicting_booking } => {
                return Err(slot_conflict(conflicting_booking));
            }
        };

        self.sessions.clear(booking_id).await;
        info!(
            "Booking {} completed: charged {} cents, payout {} cents",
            booking_id, completed.total_cost_cents, completed.payout_cents
        );
        self.publish(DomainEvent::BookingCompleted(BookingCompletedEvent {
            booking_id,
            payer_id: completed.booked_by_id,
            payee_id: completed.payee_id(),
            total_cost_cents: completed.total_cost_cents,
            payout_cents: completed.payout_cents,
            participant_ids: completed.participant_ids(),
            timestamp: self.clock.now().timestamp(),
        }))
        .await;

        Ok(completed)
    }

    pub async fn cancel_booking(&self, user_id: Uuid, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.load_booking(booking_id).await?;
        if booking.status.is_terminal() {
            return Err(BookingError::InvalidState(format!(
                "booking {} is already {}",
                booking_id, booking.status
            )));
        }
        if !booking.is_participant(user_id) {
            return Err(BookingError::NotAuthorized("only booking participants can cancel".to_string()));
        }
        if self.clock.now() >= booking.slot.starts_at() {
            return Err(BookingError::InvalidState("the session has already started".to_string()));
        }

        let mut postings = Vec::new();
        if booking.status == BookingStatus::Confirmed {
            let charge_key = booking_key(booking_id, TransactionCategory::SessionCharge, booking.booked_by_id);
            if let Some(charge) = self.users.find_transaction(&charge_key).await? {
                postings.push(self.ledger.reversal(&charge));
            }
        }

        // Expect exactly the status we read so a concurrent confirmation
        // (and its charge) cannot slip past the reversal
        let from = booking.status;
        let transition = Transition::new(booking_id, &[from], BookingStatus::Cancelled).post(postings);
        let booking = match self.bookings.apply_transition(transition).await? {
            TransitionOutcome::Applied(booking) => booking,
            TransitionOutcome::StatusMismatch(status) => return Err(changed_underneath(booking_id, status)),
            TransitionOutcome::SlotTaken { conflicting_booking } => {
                return Err(slot_conflict(conflicting_booking));
            }
        };

        self.sessions.clear(booking_id).await;
        info!("Booking {} cancelled by {}", booking_id, user_id);
        self.publish_transition(DomainEvent::BookingCancelled, &booking, user_id, from).await;
        Ok(booking)
    }

    // ---- Wallet ----

    /// Checks a tip before a checkout is opened for it; returns the recipient
    pub async fn validate_tip(&self, tipper_id: Uuid, booking_id: Uuid, amount_cents: i64) -> BookingResult<Uuid> {
        if amount_cents <= 0 {
            return Err(BookingError::Validation("tip amount must be positive".to_string()));
        }
        let booking = self.load_booking(booking_id).await?;
        if booking.status != BookingStatus::Completed {
            return Err(BookingError::InvalidState("tips are only accepted for completed bookings".to_string()));
        }
        if booking.booked_by_id != tipper_id {
            return Err(BookingError::NotAuthorized("only the paying party can tip".to_string()));
        }
        booking
            .payee_id()
            .or_else(|| booking.stoodio_id())
            .ok_or_else(|| BookingError::InvalidState("booking has nobody to tip".to_string()))
    }

    /// Credit a succeeded tip checkout to the booking's payee
    pub async fn confirm_tip(&self, session: &CheckoutSession) -> BookingResult<CreditOutcome> {
        let CheckoutPurpose::Tip { booking_id, recipient_id } = session.purpose else {
            return Err(BookingError::Validation(format!("checkout {} is not a tip", session.id)));
        };
        let expected = self.validate_tip(session.user_id, booking_id, session.amount_cents).await?;
        if expected != recipient_id {
            return Err(BookingError::Validation("tip recipient does not match the booking".to_string()));
        }

        let tipper = self.load_user(session.user_id).await?;
        let posting = self.ledger.tip(session, booking_id, recipient_id, &Party::from(&tipper));
        let outcome = self.append(posting).await?;

        if outcome == CreditOutcome::Credited {
            info!("Tip of {} cents from {} to {}", session.amount_cents, tipper.id, recipient_id);
            self.publish(DomainEvent::TipReceived(TipReceivedEvent {
                booking_id,
                tipper_id: tipper.id,
                recipient_id,
                amount_cents: session.amount_cents,
                timestamp: self.clock.now().timestamp(),
            }))
            .await;
        }
        Ok(outcome)
    }

    pub async fn credit_top_up(&self, session: &CheckoutSession) -> BookingResult<CreditOutcome> {
        if session.purpose != CheckoutPurpose::TopUp {
            return Err(BookingError::Validation(format!("checkout {} is not a top-up", session.id)));
        }
        if session.amount_cents <= 0 {
            return Err(BookingError::Validation("top-up amount must be positive".to_string()));
        }
        self.load_user(session.user_id).await?;

        let outcome = self.append(self.ledger.top_up(session)).await?;
        if outcome == CreditOutcome::Credited {
            info!("Wallet of {} topped up by {} cents", session.user_id, session.amount_cents);
            self.publish(DomainEvent::WalletCredited(WalletCreditedEvent {
                user_id: session.user_id,
                amount_cents: session.amount_cents,
                checkout_session_id: session.id.clone(),
                timestamp: self.clock.now().timestamp(),
            }))
            .await;
        }
        Ok(outcome)
    }

    async fn append(&self, posting: LedgerPosting) -> BookingResult<CreditOutcome> {
        let applied = self.users.append_postings(vec![posting]).await?;
        Ok(if applied.is_empty() { CreditOutcome::AlreadyApplied } else { CreditOutcome::Credited })
    }

    pub async fn wallet(&self, user_id: Uuid) -> BookingResult<WalletSummary> {
        let user = self.load_user(user_id).await?;
        let transactions = self.users.list_transactions(user_id).await?;
        let reconciliation = Reconciliation::of(&user, &transactions);

        Ok(WalletSummary {
            user_id,
            balance_cents: reconciliation.balance_cents,
            ledger_sum_cents: reconciliation.ledger_sum_cents,
            consistent: reconciliation.is_consistent(),
            transactions,
        })
    }

    /// Recompute the ledger sum and fail with `LedgerDrift` when it disagrees
    /// with the cached balance
    pub async fn reconcile(&self, user_id: Uuid) -> BookingResult<Reconciliation> {
        let user = self.load_user(user_id).await?;
        let transactions = self.users.list_transactions(user_id).await?;
        let reconciliation = Reconciliation::of(&user, &transactions);
        if !reconciliation.is_consistent() {
            warn!(
                "Ledger drift for {}: balance {} vs ledger {}",
                user_id, reconciliation.balance_cents, reconciliation.ledger_sum_cents
            );
        }
        reconciliation.verify()?;
        Ok(reconciliation)
    }

    // ---- Reads ----

    pub async fn get_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.load_booking(booking_id).await
    }

    pub async fn bookings_for_user(&self, user_id: Uuid) -> BookingResult<Vec<Booking>> {
        Ok(self.bookings.list_for_user(user_id).await?)
    }

    pub async fn get_user(&self, user_id: Uuid) -> BookingResult<UserAccount> {
        self.load_user(user_id).await
    }

    // ---- Helpers ----

    async fn load_booking(&self, id: Uuid) -> BookingResult<Booking> {
        self.bookings
            .get_booking(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", id)))
    }

    async fn load_user(&self, id: Uuid) -> BookingResult<UserAccount> {
        self.users
            .get_user(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("user {}", id)))
    }

    async fn settlement_parties(&self, booking: &Booking) -> BookingResult<SettlementParties> {
        let payer = self.load_user(booking.booked_by_id).await?;
        let payee = match booking.payee_id() {
            Some(id) => Some(Party::from(&self.load_user(id).await?)),
            None => None,
        };
        let stoodio = match booking.stoodio_id() {
            Some(id) => Some(Party::from(&self.load_user(id).await?)),
            None => None,
        };
        Ok(SettlementParties { payer: Party::from(&payer), payee, stoodio })
    }

    fn confirmation_charge(
        &self,
        booking: &Booking,
        payer: &UserAccount,
        counterpart: Option<&UserAccount>,
    ) -> Vec<LedgerPosting> {
        if self.rules.charge_policy != ChargePolicy::OnConfirmation {
            return Vec::new();
        }
        let related = counterpart.map(Party::from);
        self.ledger
            .charge(booking, &Party::from(payer), related.as_ref())
            .into_iter()
            .collect()
    }

    async fn publish_job_posted(&self, booking: &Booking) {
        let Some(stoodio_id) = booking.stoodio_id() else {
            return;
        };
        self.publish(DomainEvent::JobPosted(JobPostedEvent {
            booking_id: booking.id,
            stoodio_id,
            session_date: booking.slot.date.to_string(),
            engineer_pay_rate_cents: booking.engineer_pay_rate_cents,
            timestamp: booking.posted_at.timestamp(),
        }))
        .await;
    }

    async fn publish_transition(
        &self,
        variant: fn(BookingTransitionEvent) -> DomainEvent,
        booking: &Booking,
        actor_id: Uuid,
        from: BookingStatus,
    ) {
        self.publish(variant(BookingTransitionEvent {
            booking_id: booking.id,
            actor_id,
            from_status: from.to_string(),
            to_status: booking.status.to_string(),
            participant_ids: booking.participant_ids(),
            timestamp: self.clock.now().timestamp(),
        }))
        .await;
    }

    /// Best effort: the transition has already committed
    async fn publish(&self, event: DomainEvent) {
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(&event).await {
                warn!("Failed to publish {} for {}: {}", event.topic(), event.key(), e);
            }
        }
    }
}

struct BookingPlan {
    status: BookingStatus,
    /// Overrides the booker's role, for room bookings that become open jobs
    posted_by: Option<Role>,
    request_type: RequestType,
    assignment: Assignment,
    stoodio: Option<UserAccount>,
    engineer_rate_cents: i64,
    room_rate_cents: i64,
    /// Whose calendar the booking occupies
    resource_id: Uuid,
}

fn snapshot(user: &UserAccount) -> ParticipantSnapshot {
    ParticipantSnapshot { id: user.id, name: user.name.clone(), role: user.role }
}

fn profile_rate(user: &UserAccount) -> BookingResult<i64> {
    let rate = user
        .hourly_rate_cents
        .ok_or_else(|| BookingError::Validation(format!("{} {} has no hourly rate", user.role, user.id)))?;
    non_negative_cents("hourly rate", rate)
}

fn guard_for(user_id: Uuid, slot: &SessionSlot) -> SlotGuard {
    SlotGuard { user_id, starts_at: slot.starts_at(), ends_at: slot.ends_at() }
}

/// A confirmed booking takes the room and the assigned person's calendar
fn confirmation_guards(confirmed: &Booking) -> Vec<SlotGuard> {
    confirmed
        .assignment
        .assigned_id()
        .into_iter()
        .chain(confirmed.stoodio_id())
        .map(|user_id| guard_for(user_id, &confirmed.slot))
        .collect()
}

fn slot_conflict(conflicting_booking: Uuid) -> BookingError {
    BookingError::Conflict(format!("overlaps confirmed booking {}", conflicting_booking))
}

fn changed_underneath(booking_id: Uuid, status: BookingStatus) -> BookingError {
    BookingError::InvalidState(format!("booking {} changed concurrently and is now {}", booking_id, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use stoodio_core::booking::MAX_AMOUNT_CENTS;
    use stoodio_core::clock::ManualClock;
    use stoodio_core::payment::CheckoutStatus;
    use stoodio_core::RankingTier;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        manager: Arc<BookingManager>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap()
    }

    fn fixture_with(rules: BookingRules) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let manager = BookingManager::new(store.clone(), store.clone(), rules).with_clock(clock.clone());
        Fixture { store, clock, manager: Arc::new(manager) }
    }

    fn fixture() -> Fixture {
        fixture_with(BookingRules::default())
    }

    impl Fixture {
        async fn user(&self, user: UserAccount) -> UserAccount {
            self.store.save_user(&user).await.unwrap();
            user
        }

        async fn balance(&self, id: Uuid) -> i64 {
            self.store.get_user(id).await.unwrap().unwrap().wallet_balance_cents
        }

        /// The session starts on 2025-09-02 at `hour`, a day after `t0`
        fn job_request(&self, hour: u32, rate: i64, hours: f64) -> OpenJobRequest {
            OpenJobRequest {
                date: Some("2025-09-02".to_string()),
                start_time: Some(format!("{:02}:00", hour)),
                duration_hours: Some(hours),
                engineer_pay_rate_cents: Some(rate),
                room_name: Some("Studio A".to_string()),
                coordinates: None,
            }
        }

        fn direct_request(&self, target: BookingTarget, hour: u32, hours: f64) -> DirectBookingRequest {
            DirectBookingRequest {
                target,
                date: Some("2025-09-02".to_string()),
                start_time: Some(format!("{:02}:00", hour)),
                duration_hours: Some(hours),
                room_name: None,
                pull_up_fee_cents: None,
                engineer_pay_rate_cents: None,
                coordinates: None,
            }
        }

        fn session_start(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2025, 9, 2, 12, 0, 0).unwrap()
        }
    }

    fn checkout(user_id: Uuid, id: &str, amount_cents: i64, purpose: CheckoutPurpose) -> CheckoutSession {
        CheckoutSession {
            id: id.to_string(),
            user_id,
            amount_cents,
            currency: "USD".to_string(),
            purpose,
            status: CheckoutStatus::Succeeded,
            checkout_url: None,
            created_at: t0(),
        }
    }

    async fn assert_ledger_consistent(f: &Fixture, users: &[Uuid]) {
        for id in users {
            f.manager.reconcile(*id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_job_lifecycle_pays_engineer_and_charges_stoodio() {
        let f = fixture();
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio)).await;
        let engineer = f.user(UserAccount::new("Mix Eng", Role::Engineer).with_tier(RankingTier::Elite)).await;

        let job = f.manager.post_open_job(stoodio.id, f.job_request(12, 5000, 3.0)).await.unwrap();
        assert_eq!(job.status, BookingStatus::Pending);
        assert_eq!(job.total_cost_cents, 15000);

        let board = f.manager.job_board(engineer.id).await.unwrap();
        assert_eq!(board.jobs.len(), 1);

        let accepted = f.manager.accept_job(engineer.id, job.id).await.unwrap();
        assert_eq!(accepted.status, BookingStatus::Confirmed);
        assert_eq!(accepted.payee_id(), Some(engineer.id));

        f.clock.set(f.session_start());
        let state = f.manager.start_session(engineer.id, job.id).await.unwrap();
        assert!(state.is_in_session());

        let completed = f.manager.end_session(engineer.id, job.id, true).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);

        let wallet = f.manager.wallet(engineer.id).await.unwrap();
        let payout = wallet
            .transactions
            .iter()
            .find(|t| t.category == TransactionCategory::SessionPayout)
            .unwrap();
        assert_eq!(payout.amount_cents, 15000);
        assert_eq!(wallet.balance_cents, 15000 - 1500);
        assert_eq!(f.balance(stoodio.id).await, -15000);

        let engineer_after = f.store.get_user(engineer.id).await.unwrap().unwrap();
        assert_eq!(engineer_after.sessions_completed, 1);
        assert_ledger_consistent(&f, &[stoodio.id, engineer.id]).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_have_one_winner() {
        let f = fixture();
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio)).await;
        let job = f.manager.post_open_job(stoodio.id, f.job_request(12, 5000, 2.0)).await.unwrap();
        let job_id = job.id;

        let mut engineers = Vec::new();
        for i in 0..8 {
            let engineer = UserAccount::new(format!("Engineer {}", i), Role::Engineer).with_tier(RankingTier::Elite);
            engineers.push(f.user(engineer).await.id);
        }

        let handles: Vec<_> = engineers
            .iter()
            .map(|engineer_id| {
                let manager = f.manager.clone();
                let engineer_id = *engineer_id;
                tokio::spawn(async move { manager.accept_job(engineer_id, job_id).await })
            })
            .collect();

        let mut winners = 0;
        let mut claimed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(BookingError::AlreadyClaimed(id)) if id == job.id => claimed += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(claimed, engineers.len() - 1);
        let stored = f.manager.get_booking(job.id).await.unwrap();
        assert!(engineers.contains(&stored.payee_id().unwrap()));
    }

    #[tokio::test]
    async fn test_provisional_engineer_must_wait_twelve_hours() {
        let f = fixture();
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio)).await;
        let engineer = f.user(UserAccount::new("New Eng", Role::Engineer)).await;
        let job = f.manager.post_open_job(stoodio.id, f.job_request(23, 5000, 1.0)).await.unwrap();

        f.clock.advance(Duration::hours(11) + Duration::minutes(59));
        assert!(f.manager.job_board(engineer.id).await.unwrap().jobs.is_empty());
        assert!(matches!(
            f.manager.accept_job(engineer.id, job.id).await,
            Err(BookingError::NotAuthorized(_))
        ));

        f.clock.advance(Duration::minutes(1));
        assert_eq!(f.manager.job_board(engineer.id).await.unwrap().jobs.len(), 1);
        assert!(f.manager.accept_job(engineer.id, job.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_stoodio_cannot_post_and_bad_input_is_rejected() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio)).await;

        assert!(matches!(
            f.manager.post_open_job(artist.id, f.job_request(12, 5000, 2.0)).await,
            Err(BookingError::NotAuthorized(_))
        ));

        let mut missing_rate = f.job_request(12, 5000, 2.0);
        missing_rate.engineer_pay_rate_cents = None;
        assert!(matches!(
            f.manager.post_open_job(stoodio.id, missing_rate).await,
            Err(BookingError::Validation(_))
        ));

        let mut missing_date = f.job_request(12, 5000, 2.0);
        missing_date.date = None;
        assert!(matches!(
            f.manager.post_open_job(stoodio.id, missing_date).await,
            Err(BookingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_direct_engineer_booking_requires_approval() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(6000)).await;
        let stranger = f.user(UserAccount::new("Other Eng", Role::Engineer)).await;

        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 2.0))
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::PendingApproval);
        assert_eq!(booking.assignment.requested_id(), Some(engineer.id));
        assert_eq!(booking.total_cost_cents, 12000);

        assert!(matches!(
            f.manager.approve_request(stranger.id, booking.id).await,
            Err(BookingError::NotAuthorized(_))
        ));

        let confirmed = f.manager.approve_request(engineer.id, booking.id).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payee_id(), Some(engineer.id));
        assert!(confirmed.assignment_consistent());
    }

    #[tokio::test]
    async fn test_payout_uses_rate_fixed_at_creation() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let mut engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;

        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 3.0))
            .await
            .unwrap();
        f.manager.approve_request(engineer.id, booking.id).await.unwrap();

        engineer.hourly_rate_cents = Some(9900);
        f.store.save_user(&engineer).await.unwrap();

        f.manager.complete_booking(artist.id, booking.id).await.unwrap();

        assert_eq!(f.balance(artist.id).await, -15000);
        let wallet = f.manager.wallet(engineer.id).await.unwrap();
        assert!(wallet
            .transactions
            .iter()
            .any(|t| t.category == TransactionCategory::SessionPayout && t.amount_cents == 15000));
    }

    #[tokio::test]
    async fn test_completion_is_idempotent() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;
        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 1.0))
            .await
            .unwrap();
        f.manager.approve_request(engineer.id, booking.id).await.unwrap();

        f.manager.complete_booking(artist.id, booking.id).await.unwrap();
        let again = f.manager.complete_booking(engineer.id, booking.id).await.unwrap();
        assert_eq!(again.status, BookingStatus::Completed);

        assert_eq!(f.balance(artist.id).await, -5000);
        assert_eq!(f.manager.wallet(engineer.id).await.unwrap().transactions.len(), 2);
        let artist_after = f.store.get_user(artist.id).await.unwrap().unwrap();
        assert_eq!(artist_after.sessions_completed, 1);
        assert_ledger_consistent(&f, &[artist.id, engineer.id]).await;
    }

    #[tokio::test]
    async fn test_denied_and_cancelled_are_terminal() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;

        let denied = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 1.0))
            .await
            .unwrap();
        f.manager.deny_request(engineer.id, denied.id).await.unwrap();
        assert!(matches!(
            f.manager.approve_request(engineer.id, denied.id).await,
            Err(BookingError::InvalidState(_))
        ));
        assert!(matches!(
            f.manager.cancel_booking(artist.id, denied.id).await,
            Err(BookingError::InvalidState(_))
        ));

        let cancelled = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 15, 1.0))
            .await
            .unwrap();
        f.manager.cancel_booking(artist.id, cancelled.id).await.unwrap();
        assert!(matches!(
            f.manager.complete_booking(artist.id, cancelled.id).await,
            Err(BookingError::InvalidState(_))
        ));
        assert!(matches!(
            f.manager.approve_request(engineer.id, cancelled.id).await,
            Err(BookingError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_reverses_charge_taken_at_confirmation() {
        let f = fixture_with(BookingRules { charge_policy: ChargePolicy::OnConfirmation, ..BookingRules::default() });
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;

        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 2.0))
            .await
            .unwrap();
        f.manager.approve_request(engineer.id, booking.id).await.unwrap();
        assert_eq!(f.balance(artist.id).await, -10000);

        f.manager.cancel_booking(engineer.id, booking.id).await.unwrap();

        let wallet = f.manager.wallet(artist.id).await.unwrap();
        assert_eq!(wallet.balance_cents, 0);
        assert_eq!(wallet.transactions.len(), 2);
        assert_eq!(wallet.transactions[0].category, TransactionCategory::SessionCharge);
        assert_eq!(wallet.transactions[0].amount_cents, -10000);
        assert_eq!(wallet.transactions[1].category, TransactionCategory::Reversal);
        assert_eq!(wallet.transactions[1].amount_cents, 10000);
        assert_ledger_consistent(&f, &[artist.id, engineer.id]).await;
    }

    #[tokio::test]
    async fn test_charge_on_confirmation_is_not_repeated_at_completion() {
        let f = fixture_with(BookingRules { charge_policy: ChargePolicy::OnConfirmation, ..BookingRules::default() });
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;

        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 2.0))
            .await
            .unwrap();
        f.manager.approve_request(engineer.id, booking.id).await.unwrap();
        f.manager.complete_booking(artist.id, booking.id).await.unwrap();

        assert_eq!(f.balance(artist.id).await, -10000);
        assert_eq!(f.balance(engineer.id).await, 9000);
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;
        let outsider = f.user(UserAccount::new("Outsider", Role::Artist)).await;

        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 2.0))
            .await
            .unwrap();

        assert!(matches!(
            f.manager.cancel_booking(outsider.id, booking.id).await,
            Err(BookingError::NotAuthorized(_))
        ));

        f.clock.set(f.session_start());
        assert!(matches!(
            f.manager.cancel_booking(artist.id, booking.id).await,
            Err(BookingError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_overlapping_room_booking_conflicts() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let other = f.user(UserAccount::new("Other Artist", Role::Artist)).await;
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio).with_rate(3000)).await;
        let target = BookingTarget::Stoodio { stoodio_id: stoodio.id, engineer: EngineerChoice::BringYourOwn };

        let first = f.manager.create_direct_booking(artist.id, f.direct_request(target, 12, 3.0)).await.unwrap();
        assert_eq!(first.status, BookingStatus::Confirmed);
        assert_eq!(first.room_cost_cents, 9000);

        assert!(matches!(
            f.manager.create_direct_booking(other.id, f.direct_request(target, 14, 1.0)).await,
            Err(BookingError::Conflict(_))
        ));
        assert!(f.manager.create_direct_booking(other.id, f.direct_request(target, 15, 1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_engineer_with_overlapping_session_cannot_accept() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000).with_tier(RankingTier::Elite)).await;

        let direct = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 2.0))
            .await
            .unwrap();
        f.manager.approve_request(engineer.id, direct.id).await.unwrap();

        let job = f.manager.post_open_job(stoodio.id, f.job_request(13, 4000, 2.0)).await.unwrap();
        assert!(matches!(
            f.manager.accept_job(engineer.id, job.id).await,
            Err(BookingError::Conflict(_))
        ));
        assert_eq!(f.manager.get_booking(job.id).await.unwrap().status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_label_approval_chain() {
        let f = fixture();
        let label = f.user(UserAccount::new("Label", Role::Label)).await;
        let artist = f.user(UserAccount::new("Signed Artist", Role::Artist).with_label(label.id)).await;
        let producer = f.user(UserAccount::new("Producer", Role::Producer).with_rate(8000)).await;

        let mut req = f.direct_request(BookingTarget::Producer { producer_id: producer.id }, 12, 2.0);
        req.pull_up_fee_cents = Some(2500);
        let booking = f.manager.create_direct_booking(artist.id, req).await.unwrap();
        assert_eq!(booking.status, BookingStatus::PendingLabelApproval);
        assert_eq!(booking.payout_cents, 18500);

        assert!(matches!(
            f.manager.approve_request(producer.id, booking.id).await,
            Err(BookingError::NotAuthorized(_))
        ));

        let after_label = f.manager.approve_request(label.id, booking.id).await.unwrap();
        assert_eq!(after_label.status, BookingStatus::PendingApproval);

        let confirmed = f.manager.approve_request(producer.id, booking.id).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payee_id(), Some(producer.id));
    }

    #[tokio::test]
    async fn test_engineer_approval_cannot_take_a_booked_room() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let other = f.user(UserAccount::new("Other Artist", Role::Artist)).await;
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio).with_rate(3000)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;

        let with_engineer = BookingTarget::Stoodio {
            stoodio_id: stoodio.id,
            engineer: EngineerChoice::Specific { engineer_id: engineer.id },
        };
        let requested = f.manager.create_direct_booking(artist.id, f.direct_request(with_engineer, 12, 2.0)).await.unwrap();
        assert_eq!(requested.status, BookingStatus::PendingApproval);

        let room_only = BookingTarget::Stoodio { stoodio_id: stoodio.id, engineer: EngineerChoice::BringYourOwn };
        let taken = f.manager.create_direct_booking(other.id, f.direct_request(room_only, 12, 2.0)).await.unwrap();
        assert_eq!(taken.status, BookingStatus::Confirmed);

        assert!(matches!(
            f.manager.approve_request(engineer.id, requested.id).await,
            Err(BookingError::Conflict(_))
        ));
        assert_eq!(f.manager.get_booking(requested.id).await.unwrap().status, BookingStatus::PendingApproval);
        assert_eq!(f.balance(artist.id).await, 0);
    }

    #[tokio::test]
    async fn test_accepting_job_cannot_take_a_booked_room() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let other = f.user(UserAccount::new("Other Artist", Role::Artist)).await;
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio).with_rate(3000)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_tier(RankingTier::Elite)).await;

        let mut req = f.direct_request(
            BookingTarget::Stoodio { stoodio_id: stoodio.id, engineer: EngineerChoice::FindAvailable },
            12,
            2.0,
        );
        req.engineer_pay_rate_cents = Some(4500);
        let job = f.manager.create_direct_booking(artist.id, req).await.unwrap();
        assert!(job.is_open_job());

        let room_only = BookingTarget::Stoodio { stoodio_id: stoodio.id, engineer: EngineerChoice::BringYourOwn };
        f.manager.create_direct_booking(other.id, f.direct_request(room_only, 13, 2.0)).await.unwrap();

        assert!(matches!(
            f.manager.accept_job(engineer.id, job.id).await,
            Err(BookingError::Conflict(_))
        ));
        assert!(f.manager.get_booking(job.id).await.unwrap().is_open_job());
        assert_eq!(f.balance(engineer.id).await, 0);
    }

    #[tokio::test]
    async fn test_label_approval_cannot_take_a_booked_room() {
        let f = fixture();
        let label = f.user(UserAccount::new("Label", Role::Label)).await;
        let signed = f.user(UserAccount::new("Signed Artist", Role::Artist).with_label(label.id)).await;
        let other = f.user(UserAccount::new("Other Artist", Role::Artist)).await;
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio).with_rate(3000)).await;
        let room_only = BookingTarget::Stoodio { stoodio_id: stoodio.id, engineer: EngineerChoice::BringYourOwn };

        let pending = f.manager.create_direct_booking(signed.id, f.direct_request(room_only, 12, 2.0)).await.unwrap();
        assert_eq!(pending.status, BookingStatus::PendingLabelApproval);

        f.manager.create_direct_booking(other.id, f.direct_request(room_only, 11, 2.0)).await.unwrap();

        assert!(matches!(
            f.manager.approve_request(label.id, pending.id).await,
            Err(BookingError::Conflict(_))
        ));
        assert_eq!(
            f.manager.get_booking(pending.id).await.unwrap().status,
            BookingStatus::PendingLabelApproval
        );
    }

    #[tokio::test]
    async fn test_oversized_amounts_are_rejected() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio).with_rate(3000)).await;
        let pricey = f.user(UserAccount::new("Pricey Eng", Role::Engineer).with_rate(i64::MAX)).await;

        let find_available = BookingTarget::Stoodio { stoodio_id: stoodio.id, engineer: EngineerChoice::FindAvailable };
        let mut req = f.direct_request(find_available, 12, 2.0);
        req.engineer_pay_rate_cents = Some(i64::MAX);
        assert!(matches!(
            f.manager.create_direct_booking(artist.id, req).await,
            Err(BookingError::Validation(_))
        ));

        // Each rate is in bounds but the booking total is not
        let mut req = f.direct_request(find_available, 12, 24.0);
        req.engineer_pay_rate_cents = Some(MAX_AMOUNT_CENTS);
        assert!(matches!(
            f.manager.create_direct_booking(artist.id, req).await,
            Err(BookingError::Validation(_))
        ));

        assert!(matches!(
            f.manager
                .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: pricey.id }, 12, 2.0))
                .await,
            Err(BookingError::Validation(_))
        ));
        assert!(matches!(
            f.manager.post_open_job(stoodio.id, f.job_request(12, i64::MAX, 2.0)).await,
            Err(BookingError::Validation(_))
        ));
        assert!(f.manager.bookings_for_user(artist.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pull_up_fee_only_for_producers() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;

        let mut req = f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 2.0);
        req.pull_up_fee_cents = Some(1000);
        assert!(matches!(
            f.manager.create_direct_booking(artist.id, req).await,
            Err(BookingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_room_with_find_available_becomes_open_job() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio).with_rate(2000)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_tier(RankingTier::Platinum)).await;

        let mut req = f.direct_request(
            BookingTarget::Stoodio { stoodio_id: stoodio.id, engineer: EngineerChoice::FindAvailable },
            12,
            2.0,
        );
        req.engineer_pay_rate_cents = Some(4500);
        let booking = f.manager.create_direct_booking(artist.id, req).await.unwrap();

        assert!(booking.is_open_job());
        assert_eq!(booking.total_cost_cents, 9000 + 4000);

        f.manager.accept_job(engineer.id, booking.id).await.unwrap();
        f.manager.complete_booking(engineer.id, booking.id).await.unwrap();

        assert_eq!(f.balance(artist.id).await, -13000);
        assert_eq!(f.balance(engineer.id).await, 9000 - 900);
        assert_eq!(f.balance(stoodio.id).await, 4000 - 400);
        assert_ledger_consistent(&f, &[artist.id, engineer.id, stoodio.id]).await;
    }

    #[tokio::test]
    async fn test_start_session_rules() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;
        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 2.0))
            .await
            .unwrap();
        f.manager.approve_request(engineer.id, booking.id).await.unwrap();

        assert!(matches!(
            f.manager.start_session(engineer.id, booking.id).await,
            Err(BookingError::InvalidState(_))
        ));

        f.clock.set(f.session_start());
        let state = f.manager.start_session(artist.id, booking.id).await.unwrap();
        assert_eq!(state, SessionState::EnRoute);

        assert!(matches!(
            f.manager.end_session(engineer.id, booking.id, true).await,
            Err(BookingError::InvalidState(_))
        ));

        f.manager.start_session(engineer.id, booking.id).await.unwrap();
        assert!(matches!(
            f.manager.end_session(engineer.id, booking.id, false).await,
            Err(BookingError::Validation(_))
        ));
        assert!(f.manager.session_state(booking.id).await.unwrap().unwrap().is_in_session());
    }

    #[tokio::test]
    async fn test_only_assignee_can_end_session() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;
        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 2.0))
            .await
            .unwrap();
        f.manager.approve_request(engineer.id, booking.id).await.unwrap();

        f.clock.set(f.session_start());
        f.manager.start_session(engineer.id, booking.id).await.unwrap();

        assert!(matches!(
            f.manager.end_session(artist.id, booking.id, true).await,
            Err(BookingError::NotAuthorized(_))
        ));
        assert!(f.manager.session_state(booking.id).await.unwrap().unwrap().is_in_session());

        let completed = f.manager.end_session(engineer.id, booking.id, true).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);

        // Completing directly stays open to every party
        assert!(f.manager.complete_booking(artist.id, booking.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_suspended_users_are_rejected() {
        let f = fixture();
        let stoodio = f.user(UserAccount::new("Room 9", Role::Stoodio)).await;
        let mut engineer = UserAccount::new("Eng", Role::Engineer).with_tier(RankingTier::Elite);
        engineer.suspended = true;
        let engineer = f.user(engineer).await;

        let job = f.manager.post_open_job(stoodio.id, f.job_request(12, 5000, 2.0)).await.unwrap();
        assert!(matches!(
            f.manager.accept_job(engineer.id, job.id).await,
            Err(BookingError::NotAuthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_tip_requires_completed_booking_and_credits_once() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let engineer = f.user(UserAccount::new("Eng", Role::Engineer).with_rate(5000)).await;
        let booking = f
            .manager
            .create_direct_booking(artist.id, f.direct_request(BookingTarget::Engineer { engineer_id: engineer.id }, 12, 1.0))
            .await
            .unwrap();
        f.manager.approve_request(engineer.id, booking.id).await.unwrap();

        assert!(matches!(
            f.manager.validate_tip(artist.id, booking.id, 500).await,
            Err(BookingError::InvalidState(_))
        ));

        f.manager.complete_booking(artist.id, booking.id).await.unwrap();
        let recipient = f.manager.validate_tip(artist.id, booking.id, 500).await.unwrap();
        assert_eq!(recipient, engineer.id);

        let session = checkout(artist.id, "cs_tip", 500, CheckoutPurpose::Tip { booking_id: booking.id, recipient_id: engineer.id });
        assert_eq!(f.manager.confirm_tip(&session).await.unwrap(), CreditOutcome::Credited);
        assert_eq!(f.manager.confirm_tip(&session).await.unwrap(), CreditOutcome::AlreadyApplied);

        assert_eq!(f.balance(engineer.id).await, 4500 + 500);
        assert_ledger_consistent(&f, &[engineer.id]).await;
    }

    #[tokio::test]
    async fn test_top_up_credits_once() {
        let f = fixture();
        let artist = f.user(UserAccount::new("Artist", Role::Artist)).await;
        let session = checkout(artist.id, "cs_top", 2500, CheckoutPurpose::TopUp);

        assert_eq!(f.manager.credit_top_up(&session).await.unwrap(), CreditOutcome::Credited);
        assert_eq!(f.manager.credit_top_up(&session).await.unwrap(), CreditOutcome::AlreadyApplied);
        assert_eq!(f.balance(artist.id).await, 2500);
    }
}
