use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::user::Role;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    PendingApproval,
    PendingLabelApproval,
    Confirmed,
    Completed,
    Cancelled,
    Denied,
}

impl BookingStatus {
    pub const CANCELLABLE: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::PendingApproval,
        BookingStatus::PendingLabelApproval,
        BookingStatus::Confirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::PendingApproval => "PENDING_APPROVAL",
            BookingStatus::PendingLabelApproval => "PENDING_LABEL_APPROVAL",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Denied => "DENIED",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Denied
        )
    }

    pub fn awaits_approval(&self) -> bool {
        matches!(
            self,
            BookingStatus::PendingApproval | BookingStatus::PendingLabelApproval
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "PENDING_APPROVAL" => Ok(BookingStatus::PendingApproval),
            "PENDING_LABEL_APPROVAL" => Ok(BookingStatus::PendingLabelApproval),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "DENIED" => Ok(BookingStatus::Denied),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// How the engineer side of a booking gets filled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// Marketplace-matched: an open job any eligible engineer may accept
    FindAvailable,
    /// Room only, the artist brings their own engineer
    BringYourOwn,
    /// Room plus a request to one named engineer
    SpecificEngineer,
    /// Engineer or producer booked directly, no room
    Direct,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::FindAvailable => "FIND_AVAILABLE",
            RequestType::BringYourOwn => "BRING_YOUR_OWN",
            RequestType::SpecificEngineer => "SPECIFIC_ENGINEER",
            RequestType::Direct => "DIRECT",
        }
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FIND_AVAILABLE" => Ok(RequestType::FindAvailable),
            "BRING_YOUR_OWN" => Ok(RequestType::BringYourOwn),
            "SPECIFIC_ENGINEER" => Ok(RequestType::SpecificEngineer),
            "DIRECT" => Ok(RequestType::Direct),
            other => Err(format!("unknown request type: {}", other)),
        }
    }
}

/// Who, if anyone, does the engineering/production work.
/// Exactly one of these holds at any time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assignment {
    Unassigned,
    Requested { user_id: Uuid, role: Role },
    Assigned { user_id: Uuid, role: Role },
}

impl Assignment {
    pub fn requested_id(&self) -> Option<Uuid> {
        match self {
            Assignment::Requested { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn assigned_id(&self) -> Option<Uuid> {
        match self {
            Assignment::Assigned { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Assignment::Unassigned => None,
            Assignment::Requested { role, .. } | Assignment::Assigned { role, .. } => Some(*role),
        }
    }

    pub fn state_str(&self) -> &'static str {
        match self {
            Assignment::Unassigned => "UNASSIGNED",
            Assignment::Requested { .. } => "REQUESTED",
            Assignment::Assigned { .. } => "ASSIGNED",
        }
    }

    /// The requested party accepts
    pub fn promote(self) -> Self {
        match self {
            Assignment::Requested { user_id, role } => Assignment::Assigned { user_id, role },
            other => other,
        }
    }
}

/// Display-only copy of a participant taken at booking time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantSnapshot {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Scheduling fields of a booking. Times are UTC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SessionSlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_hours: f64,
}

impl SessionSlot {
    pub fn starts_at(&self) -> DateTime<Utc> {
        NaiveDateTime::new(self.date, self.start_time).and_utc()
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at() + Duration::seconds((self.duration_hours * 3600.0).round() as i64)
    }

    /// Half-open interval overlap
    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        self.starts_at() < ends_at && starts_at < self.ends_at()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.duration_hours.is_finite() || self.duration_hours <= 0.0 {
            return Err("duration_hours must be a positive number".to_string());
        }
        if self.duration_hours > 24.0 {
            return Err("duration_hours cannot exceed 24".to_string());
        }
        Ok(())
    }
}

/// Upper bound on any single rate, fee or booking total ($1,000,000)
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000;

/// `rate * hours`, rounded to the nearest cent. `None` past `MAX_AMOUNT_CENTS`.
pub fn hourly_amount(rate_cents: i64, duration_hours: f64) -> Option<i64> {
    let amount = (rate_cents as f64 * duration_hours).round();
    if !amount.is_finite() || amount < 0.0 || amount > MAX_AMOUNT_CENTS as f64 {
        return None;
    }
    Some(amount as i64)
}

fn within_limit(amount: Option<i64>) -> Result<i64, String> {
    amount
        .filter(|cents| (0..=MAX_AMOUNT_CENTS).contains(cents))
        .ok_or_else(|| format!("booking amount cannot exceed {} cents", MAX_AMOUNT_CENTS))
}

/// Everything needed to create a booking; the store assigns `sequence`
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub status: BookingStatus,
    pub posted_by: Role,
    pub request_type: RequestType,
    pub booked_by_id: Uuid,
    pub artist: Option<ParticipantSnapshot>,
    pub stoodio: Option<ParticipantSnapshot>,
    pub assignment: Assignment,
    pub label_id: Option<Uuid>,
    pub room_name: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub slot: SessionSlot,
    pub engineer_pay_rate_cents: i64,
    pub room_rate_cents: i64,
    pub pull_up_fee_cents: Option<i64>,
}

/// The central entity. Mutated only through booking command transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub status: BookingStatus,
    pub posted_by: Role,
    pub request_type: RequestType,
    /// Paying party
    pub booked_by_id: Uuid,
    pub artist: Option<ParticipantSnapshot>,
    pub stoodio: Option<ParticipantSnapshot>,
    pub assignment: Assignment,
    pub label_id: Option<Uuid>,
    pub room_name: Option<String>,
    pub coordinates: Option<Coordinates>,
    #[serde(flatten)]
    pub slot: SessionSlot,
    pub engineer_pay_rate_cents: i64,
    pub pull_up_fee_cents: Option<i64>,
    /// Owed to the stoodio for the room
    pub room_cost_cents: i64,
    /// Owed to the assigned engineer/producer, before platform fee
    pub payout_cents: i64,
    /// Charged to the paying party; always `payout_cents + room_cost_cents`
    pub total_cost_cents: i64,
    pub posted_at: DateTime<Utc>,
    pub sequence: i64,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Prices are fixed here and never recomputed afterwards
    pub fn create(new: NewBooking, now: DateTime<Utc>) -> Result<Self, String> {
        let payout_cents = within_limit(
            hourly_amount(new.engineer_pay_rate_cents, new.slot.duration_hours)
                .and_then(|pay| pay.checked_add(new.pull_up_fee_cents.unwrap_or(0))),
        )?;
        let room_cost_cents = within_limit(hourly_amount(new.room_rate_cents, new.slot.duration_hours))?;
        let total_cost_cents = within_limit(payout_cents.checked_add(room_cost_cents))?;

        Ok(Self {
            id: Uuid::new_v4(),
            status: new.status,
            posted_by: new.posted_by,
            request_type: new.request_type,
            booked_by_id: new.booked_by_id,
            artist: new.artist,
            stoodio: new.stoodio,
            assignment: new.assignment,
            label_id: new.label_id,
            room_name: new.room_name,
            coordinates: new.coordinates,
            slot: new.slot,
            engineer_pay_rate_cents: new.engineer_pay_rate_cents,
            pull_up_fee_cents: new.pull_up_fee_cents,
            room_cost_cents,
            payout_cents,
            total_cost_cents,
            posted_at: now,
            sequence: 0,
            updated_at: now,
        })
    }

    /// Stoodio-posted and still unclaimed
    pub fn is_open_job(&self) -> bool {
        self.posted_by == Role::Stoodio && self.status == BookingStatus::Pending
    }

    pub fn stoodio_id(&self) -> Option<Uuid> {
        self.stoodio.as_ref().map(|s| s.id)
    }

    pub fn payee_id(&self) -> Option<Uuid> {
        self.assignment.assigned_id()
    }

    /// Parties who may complete the booking
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.booked_by_id == user_id
            || self.stoodio_id() == Some(user_id)
            || self.assignment.assigned_id() == Some(user_id)
    }

    /// Parties who may cancel: the above plus a requested target and the approving label
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.is_party(user_id)
            || self.assignment.requested_id() == Some(user_id)
            || self.label_id == Some(user_id)
    }

    /// Every user with an interest in notifications about this booking
    pub fn participant_ids(&self) -> Vec<Uuid> {
        let mut ids = vec![self.booked_by_id];
        let others = [
            self.artist.as_ref().map(|a| a.id),
            self.stoodio_id(),
            self.assignment.requested_id(),
            self.assignment.assigned_id(),
            self.label_id,
        ];
        for id in others.into_iter().flatten() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Whether this booking occupies `user_id`'s calendar (room or assignee)
    pub fn holds(&self, user_id: Uuid) -> bool {
        self.status == BookingStatus::Confirmed
            && (self.stoodio_id() == Some(user_id) || self.assignment.assigned_id() == Some(user_id))
    }

    /// Status and assignment agree
    pub fn assignment_consistent(&self) -> bool {
        match self.status {
            BookingStatus::Pending => self.assignment == Assignment::Unassigned,
            BookingStatus::PendingApproval => {
                matches!(self.assignment, Assignment::Requested { .. })
            }
            BookingStatus::PendingLabelApproval => {
                !matches!(self.assignment, Assignment::Assigned { .. })
            }
            BookingStatus::Confirmed | BookingStatus::Completed => {
                !matches!(self.assignment, Assignment::Requested { .. })
            }
            BookingStatus::Cancelled | BookingStatus::Denied => true,
        }
    }
}
