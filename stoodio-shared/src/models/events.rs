use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub booked_by_id: Uuid,
    pub status: String,
    pub participant_ids: Vec<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct JobPostedEvent {
    pub booking_id: Uuid,
    pub stoodio_id: Uuid,
    pub session_date: String,
    pub engineer_pay_rate_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct JobAcceptedEvent {
    pub booking_id: Uuid,
    pub engineer_id: Uuid,
    pub stoodio_id: Option<Uuid>,
    pub timestamp: i64,
}

/// Emitted for approval, confirm, deny and cancel transitions
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingTransitionEvent {
    pub booking_id: Uuid,
    pub actor_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub participant_ids: Vec<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SessionStartedEvent {
    pub booking_id: Uuid,
    pub engineer_id: Uuid,
    pub participant_ids: Vec<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCompletedEvent {
    pub booking_id: Uuid,
    pub payer_id: Uuid,
    pub payee_id: Option<Uuid>,
    pub total_cost_cents: i64,
    pub payout_cents: i64,
    pub participant_ids: Vec<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct TipReceivedEvent {
    pub booking_id: Uuid,
    pub tipper_id: Uuid,
    pub recipient_id: Uuid,
    pub amount_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct WalletCreditedEvent {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub checkout_session_id: String,
    pub timestamp: i64,
}

/// Everything the booking core tells the notification system about.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    BookingCreated(BookingCreatedEvent),
    JobPosted(JobPostedEvent),
    JobAccepted(JobAcceptedEvent),
    ApprovalRequested(BookingTransitionEvent),
    BookingConfirmed(BookingTransitionEvent),
    BookingDenied(BookingTransitionEvent),
    BookingCancelled(BookingTransitionEvent),
    SessionStarted(SessionStartedEvent),
    BookingCompleted(BookingCompletedEvent),
    TipReceived(TipReceivedEvent),
    WalletCredited(WalletCreditedEvent),
}

impl DomainEvent {
    /// Kafka topic the event is published to
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated(_) => "booking.created",
            DomainEvent::JobPosted(_) => "job.posted",
            DomainEvent::JobAccepted(_) => "job.accepted",
            DomainEvent::ApprovalRequested(_) => "booking.approval_requested",
            DomainEvent::BookingConfirmed(_) => "booking.confirmed",
            DomainEvent::BookingDenied(_) => "booking.denied",
            DomainEvent::BookingCancelled(_) => "booking.cancelled",
            DomainEvent::SessionStarted(_) => "session.started",
            DomainEvent::BookingCompleted(_) => "booking.completed",
            DomainEvent::TipReceived(_) => "wallet.tip_received",
            DomainEvent::WalletCredited(_) => "wallet.credited",
        }
    }

    /// Partition key: the booking for lifecycle events, the user for wallet events
    pub fn key(&self) -> String {
        match self {
            DomainEvent::BookingCreated(e) => e.booking_id.to_string(),
            DomainEvent::JobPosted(e) => e.booking_id.to_string(),
            DomainEvent::JobAccepted(e) => e.booking_id.to_string(),
            DomainEvent::ApprovalRequested(e)
            | DomainEvent::BookingConfirmed(e)
            | DomainEvent::BookingDenied(e)
            | DomainEvent::BookingCancelled(e) => e.booking_id.to_string(),
            DomainEvent::SessionStarted(e) => e.booking_id.to_string(),
            DomainEvent::BookingCompleted(e) => e.booking_id.to_string(),
            DomainEvent::TipReceived(e) => e.booking_id.to_string(),
            DomainEvent::WalletCredited(e) => e.user_id.to_string(),
        }
    }

    /// Whether a user should be notified about this event.
    /// Job postings are broadcast to everyone; the job board decides visibility.
    pub fn involves(&self, user_id: Uuid) -> bool {
        match self {
            DomainEvent::BookingCreated(e) => e.participant_ids.contains(&user_id),
            DomainEvent::JobPosted(_) => true,
            DomainEvent::JobAccepted(e) => {
                e.engineer_id == user_id || e.stoodio_id == Some(user_id)
            }
            DomainEvent::ApprovalRequested(e)
            | DomainEvent::BookingConfirmed(e)
            | DomainEvent::BookingDenied(e)
            | DomainEvent::BookingCancelled(e) => e.participant_ids.contains(&user_id),
            DomainEvent::SessionStarted(e) => e.participant_ids.contains(&user_id),
            DomainEvent::BookingCompleted(e) => e.participant_ids.contains(&user_id),
            DomainEvent::TipReceived(e) => e.tipper_id == user_id || e.recipient_id == user_id,
            DomainEvent::WalletCredited(e) => e.user_id == user_id,
        }
    }

    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
