use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use stoodio_core::booking::Coordinates;
use stoodio_core::ledger::TransactionStatus;
use stoodio_core::repository::{StoreError, StoreResult, UserRepository};
use stoodio_core::{LedgerPosting, RankingTier, Transaction, UserAccount};
use uuid::Uuid;

use crate::db_err;

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    role: String,
    ranking_tier: Option<String>,
    sessions_completed: i32,
    wallet_balance_cents: i64,
    on_time_rate: f64,
    completion_rate: f64,
    label_id: Option<Uuid>,
    hourly_rate_cents: Option<i64>,
    suspended: bool,
    latitude: Option<f64>,
    longitude: Option<f64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserAccount {
            id: row.id,
            name: row.name,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            // Unknown tiers read as "no tier" and get the most conservative visibility
            ranking_tier: row.ranking_tier.as_deref().and_then(RankingTier::parse_lenient),
            sessions_completed: row.sessions_completed,
            wallet_balance_cents: row.wallet_balance_cents,
            on_time_rate: row.on_time_rate,
            completion_rate: row.completion_rate,
            label_id: row.label_id,
            hourly_rate_cents: row.hourly_rate_cents,
            suspended: row.suspended,
            coordinates: match (row.latitude, row.longitude) {
                (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
                _ => None,
            },
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    booking_id: Option<Uuid>,
    date: DateTime<Utc>,
    description: String,
    amount_cents: i64,
    category: String,
    related_user_name: Option<String>,
    idempotency_key: String,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            booking_id: row.booking_id,
            date: row.date,
            description: row.description,
            amount_cents: row.amount_cents,
            category: row.category.parse().map_err(StoreError::Corrupt)?,
            status: TransactionStatus::Completed,
            related_user_name: row.related_user_name,
            idempotency_key: row.idempotency_key,
        })
    }
}

const USER_COLUMNS: &str = "id, name, role, ranking_tier, sessions_completed, wallet_balance_cents, \
     on_time_rate, completion_rate, label_id, hourly_rate_cents, suspended, latitude, longitude, created_at";

const TRANSACTION_COLUMNS: &str =
    "id, user_id, booking_id, date, description, amount_cents, category, related_user_name, idempotency_key";

/// Append postings inside the caller's transaction. Postings whose key is
/// already on the ledger are skipped; balances move only for new entries.
pub(crate) async fn append_postings_in(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    postings: Vec<LedgerPosting>,
    at: DateTime<Utc>,
) -> StoreResult<Vec<Transaction>> {
    let mut applied = Vec::new();

    for posting in postings {
        let user_id = posting.user_id;
        let amount_cents = posting.amount_cents;
        let entry = posting.into_transaction(at);

        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO wallet_transactions
                (id, user_id, booking_id, date, description, amount_cents, category, status, related_user_name, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.booking_id)
        .bind(entry.date)
        .bind(&entry.description)
        .bind(entry.amount_cents)
        .bind(entry.category.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.related_user_name)
        .bind(&entry.idempotency_key)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;

        if inserted.is_none() {
            continue;
        }

        let updated = sqlx::query(
            "UPDATE users SET wallet_balance_cents = wallet_balance_cents + $2 WHERE id = $1",
        )
        .bind(user_id)
        .bind(amount_cents)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() != 1 {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        applied.push(entry);
    }

    Ok(applied)
}

pub(crate) async fn increment_sessions_in(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_ids: &[Uuid],
) -> StoreResult<()> {
    for user_id in user_ids {
        let updated = sqlx::query("UPDATE users SET sessions_completed = sessions_completed + 1 WHERE id = $1")
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        if updated.rows_affected() != 1 {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
    }
    Ok(())
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>> {
        let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(UserAccount::try_from).transpose()
    }

    async fn save_user(&self, user: &UserAccount) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users
                (id, name, role, ranking_tier, on_time_rate, completion_rate, label_id,
                 hourly_rate_cents, suspended, latitude, longitude, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                role = EXCLUDED.role,
                ranking_tier = EXCLUDED.ranking_tier,
                on_time_rate = EXCLUDED.on_time_rate,
                completion_rate = EXCLUDED.completion_rate,
                label_id = EXCLUDED.label_id,
                hourly_rate_cents = EXCLUDED.hourly_rate_cents,
                suspended = EXCLUDED.suspended,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.ranking_tier.map(|t| t.as_str()))
        .bind(user.on_time_rate)
        .bind(user.completion_rate)
        .bind(user.label_id)
        .bind(user.hourly_rate_cents)
        .bind(user.suspended)
        .bind(user.coordinates.map(|c| c.latitude))
        .bind(user.coordinates.map(|c| c.longitude))
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn list_transactions(&self, user_id: Uuid) -> StoreResult<Vec<Transaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallet_transactions WHERE user_id = $1 ORDER BY seq",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn find_transaction(&self, idempotency_key: &str) -> StoreResult<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM wallet_transactions WHERE idempotency_key = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Transaction::try_from).transpose()
    }

    async fn append_postings(&self, postings: Vec<LedgerPosting>) -> StoreResult<Vec<Transaction>> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let applied = append_postings_in(&mut tx, postings, Utc::now()).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(applied)
    }
}
