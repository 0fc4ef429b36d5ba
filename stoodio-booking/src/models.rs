use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use stoodio_core::booking::{Coordinates, SessionSlot, MAX_AMOUNT_CENTS};
use stoodio_core::{Booking, BookingError, BookingResult, RankingTier, Transaction};
use uuid::Uuid;

/// A stoodio posting an open engineer job for one of its rooms.
/// Fields are optional so that missing input surfaces as a validation error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenJobRequest {
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub duration_hours: Option<f64>,
    pub engineer_pay_rate_cents: Option<i64>,
    pub room_name: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// Who is being booked
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingTarget {
    Engineer { engineer_id: Uuid },
    Producer { producer_id: Uuid },
    Stoodio {
        stoodio_id: Uuid,
        #[serde(default)]
        engineer: EngineerChoice,
    },
}

/// How a room booking gets its engineer
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineerChoice {
    /// Post the session to the job board
    FindAvailable,
    #[default]
    BringYourOwn,
    Specific { engineer_id: Uuid },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectBookingRequest {
    pub target: BookingTarget,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub duration_hours: Option<f64>,
    pub room_name: Option<String>,
    /// Producers only
    pub pull_up_fee_cents: Option<i64>,
    /// Offered hourly rate when the engineer is found through the job board
    pub engineer_pay_rate_cents: Option<i64>,
    pub coordinates: Option<Coordinates>,
}

/// Parse and validate the scheduling fields shared by every request
pub fn parse_slot(
    date: Option<&str>,
    start_time: Option<&str>,
    duration_hours: Option<f64>,
) -> BookingResult<SessionSlot> {
    let date = date.ok_or_else(|| BookingError::Validation("date is required".to_string()))?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| BookingError::Validation(format!("invalid date: {}", date)))?;

    let start_time =
        start_time.ok_or_else(|| BookingError::Validation("start_time is required".to_string()))?;
    let start_time = parse_time(start_time.trim())
        .ok_or_else(|| BookingError::Validation(format!("invalid start_time: {}", start_time)))?;

    let duration_hours = duration_hours
        .ok_or_else(|| BookingError::Validation("duration_hours is required".to_string()))?;

    let slot = SessionSlot { date, start_time, duration_hours };
    slot.validate().map_err(BookingError::Validation)?;
    Ok(slot)
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Non-negative cents no larger than `MAX_AMOUNT_CENTS`, named in the error when invalid
pub fn non_negative_cents(field: &str, value: i64) -> BookingResult<i64> {
    if value < 0 {
        return Err(BookingError::Validation(format!("{} cannot be negative", field)));
    }
    if value > MAX_AMOUNT_CENTS {
        return Err(BookingError::Validation(format!(
            "{} cannot exceed {} cents",
            field, MAX_AMOUNT_CENTS
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, Serialize)]
pub struct JobBoard {
    pub ranking_tier: Option<RankingTier>,
    pub hint: String,
    pub jobs: Vec<Booking>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub user_id: Uuid,
    pub balance_cents: i64,
    pub ledger_sum_cents: i64,
    pub consistent: bool,
    pub transactions: Vec<Transaction>,
}
