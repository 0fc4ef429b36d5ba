use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, Postgres};
use stoodio_core::booking::{Coordinates, ParticipantSnapshot, SessionSlot};
use stoodio_core::repository::{
    BookingRepository, InsertOutcome, SlotGuard, StoreError, StoreResult, Transition,
    TransitionOutcome,
};
use stoodio_core::{Assignment, Booking, BookingStatus, LedgerPosting, Role};
use tracing::debug;
use uuid::Uuid;

use crate::db_err;
use crate::user_repo::{append_postings_in, increment_sessions_in};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    sequence: i64,
    status: String,
    posted_by: String,
    request_type: String,
    booked_by_id: Uuid,
    artist_id: Option<Uuid>,
    artist_name: Option<String>,
    stoodio_id: Option<Uuid>,
    stoodio_name: Option<String>,
    assignment_state: String,
    assignee_id: Option<Uuid>,
    assignee_role: Option<String>,
    label_id: Option<Uuid>,
    room_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    session_date: NaiveDate,
    start_time: NaiveTime,
    duration_hours: f64,
    engineer_pay_rate_cents: i64,
    pull_up_fee_cents: Option<i64>,
    room_cost_cents: i64,
    payout_cents: i64,
    total_cost_cents: i64,
    posted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse<T: std::str::FromStr<Err = String>>(value: &str) -> StoreResult<T> {
    value.parse().map_err(StoreError::Corrupt)
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let assignment = match (row.assignment_state.as_str(), row.assignee_id, row.assignee_role.as_deref()) {
            ("UNASSIGNED", _, _) => Assignment::Unassigned,
            ("REQUESTED", Some(user_id), Some(role)) => Assignment::Requested { user_id, role: parse(role)? },
            ("ASSIGNED", Some(user_id), Some(role)) => Assignment::Assigned { user_id, role: parse(role)? },
            (state, _, _) => {
                return Err(StoreError::Corrupt(format!(
                    "booking {} has inconsistent assignment {}",
                    row.id, state
                )));
            }
        };

        let snapshot = |id: Option<Uuid>, name: Option<String>, role: Role| {
            id.map(|id| ParticipantSnapshot { id, name: name.unwrap_or_default(), role })
        };

        Ok(Booking {
            id: row.id,
            status: parse(&row.status)?,
            posted_by: parse(&row.posted_by)?,
            request_type: parse(&row.request_type)?,
            booked_by_id: row.booked_by_id,
            artist: snapshot(row.artist_id, row.artist_name, Role::Artist),
            stoodio: snapshot(row.stoodio_id, row.stoodio_name, Role::Stoodio),
            assignment,
            label_id: row.label_id,
            room_name: row.room_name,
            coordinates: match (row.latitude, row.longitude) {
                (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
                _ => None,
            },
            slot: SessionSlot {
                date: row.session_date,
                start_time: row.start_time,
                duration_hours: row.duration_hours,
            },
            engineer_pay_rate_cents: row.engineer_pay_rate_cents,
            pull_up_fee_cents: row.pull_up_fee_cents,
            room_cost_cents: row.room_cost_cents,
            payout_cents: row.payout_cents,
            total_cost_cents: row.total_cost_cents,
            posted_at: row.posted_at,
            sequence: row.sequence,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, sequence, status, posted_by, request_type, booked_by_id, \
     artist_id, artist_name, stoodio_id, stoodio_name, assignment_state, assignee_id, assignee_role, \
     label_id, room_name, latitude, longitude, session_date, start_time, duration_hours, \
     engineer_pay_rate_cents, pull_up_fee_cents, room_cost_cents, payout_cents, total_cost_cents, \
     posted_at, updated_at";

/// Lock the guarded user's row, then look for a CONFIRMED booking holding
/// them in the window. The lock serializes concurrent guarded writes.
async fn slot_conflict_in(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    guard: &SlotGuard,
    except: Option<Uuid>,
) -> StoreResult<Option<Uuid>> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(guard.user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

    let conflict: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM bookings
        WHERE status = 'CONFIRMED'
          AND (stoodio_id = $1 OR (assignment_state = 'ASSIGNED' AND assignee_id = $1))
          AND starts_at < $3 AND $2 < ends_at
          AND ($4::uuid IS NULL OR id <> $4)
        LIMIT 1
        "#,
    )
    .bind(guard.user_id)
    .bind(guard.starts_at)
    .bind(guard.ends_at)
    .bind(except)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?;

    Ok(conflict.map(|(id,)| id))
}

fn assignment_columns(assignment: &Assignment) -> (&'static str, Option<Uuid>, Option<&'static str>) {
    match assignment {
        Assignment::Unassigned => ("UNASSIGNED", None, None),
        Assignment::Requested { user_id, role } | Assignment::Assigned { user_id, role } => {
            (assignment.state_str(), Some(*user_id), Some(role.as_str()))
        }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_booking(
        &self,
        booking: Booking,
        guard: Option<SlotGuard>,
        postings: Vec<LedgerPosting>,
    ) -> StoreResult<InsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(guard) = &guard {
            if let Some(conflicting_booking) = slot_conflict_in(&mut tx, guard, None).await? {
                tx.rollback().await.map_err(db_err)?;
                return Ok(InsertOutcome::SlotTaken { conflicting_booking });
            }
        }

        let (state, assignee_id, assignee_role) = assignment_columns(&booking.assignment);
        let (sequence,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO bookings (
                id, status, posted_by, request_type, booked_by_id,
                artist_id, artist_name, stoodio_id, stoodio_name,
                assignment_state, assignee_id, assignee_role, label_id,
                room_name, latitude, longitude,
                session_date, start_time, duration_hours, starts_at, ends_at,
                engineer_pay_rate_cents, pull_up_fee_cents, room_cost_cents, payout_cents, total_cost_cents,
                posted_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)
            RETURNING sequence
            "#,
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(booking.posted_by.as_str())
        .bind(booking.request_type.as_str())
        .bind(booking.booked_by_id)
        .bind(booking.artist.as_ref().map(|a| a.id))
        .bind(booking.artist.as_ref().map(|a| a.name.clone()))
        .bind(booking.stoodio_id())
        .bind(booking.stoodio.as_ref().map(|s| s.name.clone()))
        .bind(state)
        .bind(assignee_id)
        .bind(assignee_role)
        .bind(booking.label_id)
        .bind(&booking.room_name)
        .bind(booking.coordinates.map(|c| c.latitude))
        .bind(booking.coordinates.map(|c| c.longitude))
        .bind(booking.slot.date)
        .bind(booking.slot.start_time)
        .bind(booking.slot.duration_hours)
        .bind(booking.slot.starts_at())
        .bind(booking.slot.ends_at())
        .bind(booking.engineer_pay_rate_cents)
        .bind(booking.pull_up_fee_cents)
        .bind(booking.room_cost_cents)
        .bind(booking.payout_cents)
        .bind(booking.total_cost_cents)
        .bind(booking.posted_at)
        .bind(booking.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        append_postings_in(&mut tx, postings, Utc::now()).await?;
        tx.commit().await.map_err(db_err)?;

        debug!("Inserted booking {} with sequence {}", booking.id, sequence);
        Ok(InsertOutcome::Inserted(Booking { sequence, ..booking }))
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_open_jobs(&self) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE status = 'PENDING' AND posted_by = 'STOODIO' ORDER BY starts_at, sequence",
            BOOKING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE booked_by_id = $1 OR artist_id = $1 OR stoodio_id = $1 OR assignee_id = $1 OR label_id = $1
            ORDER BY sequence
            "#,
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn find_overlapping(
        &self,
        user_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE status = 'CONFIRMED'
              AND (stoodio_id = $1 OR (assignment_state = 'ASSIGNED' AND assignee_id = $1))
              AND starts_at < $3 AND $2 < ends_at
            ORDER BY starts_at
            "#,
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .bind(starts_at)
        .bind(ends_at)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn apply_transition(&self, transition: Transition) -> StoreResult<TransitionOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let expected: Vec<&str> = transition.expected.iter().map(BookingStatus::as_str).collect();
        let (state, assignee_id, assignee_role) = match &transition.assignment {
            Some(assignment) => {
                let (state, id, role) = assignment_columns(assignment);
                (Some(state), id, role)
            }
            None => (None, None, None),
        };

        // The conditional update is the claim: losers match zero rows
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE bookings SET
                status = $2,
                assignment_state = COALESCE($4, assignment_state),
                assignee_id = CASE WHEN $4 IS NULL THEN assignee_id ELSE $5 END,
                assignee_role = CASE WHEN $4 IS NULL THEN assignee_role ELSE $6 END,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(transition.booking_id)
        .bind(transition.next.as_str())
        .bind(&expected)
        .bind(state)
        .bind(assignee_id)
        .bind(assignee_role)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            let current: Option<(String,)> = sqlx::query_as("SELECT status FROM bookings WHERE id = $1")
                .bind(transition.booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            tx.rollback().await.map_err(db_err)?;

            return match current {
                Some((status,)) => Ok(TransitionOutcome::StatusMismatch(parse(&status)?)),
                None => Err(StoreError::NotFound(format!("booking {}", transition.booking_id))),
            };
        };

        // Sorted so two transitions guarding the same pair never lock in opposite order
        for guard in transition.guards_in_lock_order() {
            if let Some(conflicting_booking) =
                slot_conflict_in(&mut tx, &guard, Some(transition.booking_id)).await?
            {
                tx.rollback().await.map_err(db_err)?;
                return Ok(TransitionOutcome::SlotTaken { conflicting_booking });
            }
        }

        append_postings_in(&mut tx, transition.postings, Utc::now()).await?;
        increment_sessions_in(&mut tx, &transition.completed_sessions_for).await?;
        tx.commit().await.map_err(db_err)?;

        debug!("Booking {} moved to {}", transition.booking_id, transition.next);
        Ok(TransitionOutcome::Applied(Booking::try_from(row)?))
    }
}
