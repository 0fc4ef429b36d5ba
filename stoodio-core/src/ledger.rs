use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionCategory {
    SessionCharge,
    SessionPayout,
    PlatformFee,
    Reversal,
    Tip,
    TopUp,
}

impl TransactionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::SessionCharge => "SESSION_CHARGE",
            TransactionCategory::SessionPayout => "SESSION_PAYOUT",
            TransactionCategory::PlatformFee => "PLATFORM_FEE",
            TransactionCategory::Reversal => "REVERSAL",
            TransactionCategory::Tip => "TIP",
            TransactionCategory::TopUp => "TOP_UP",
        }
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SESSION_CHARGE" => Ok(TransactionCategory::SessionCharge),
            "SESSION_PAYOUT" => Ok(TransactionCategory::SessionPayout),
            "PLATFORM_FEE" => Ok(TransactionCategory::PlatformFee),
            "REVERSAL" => Ok(TransactionCategory::Reversal),
            "TIP" => Ok(TransactionCategory::Tip),
            "TOP_UP" => Ok(TransactionCategory::TopUp),
            other => Err(format!("unknown transaction category: {}", other)),
        }
    }
}

/// Settlement state of a ledger entry. The ledger only ever holds settled
/// entries; pending money lives in the checkout provider until it succeeds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum TransactionStatus {
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "COMPLETED",
        }
    }
}

/// Immutable wallet ledger entry. Appended, never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub date: DateTime<Utc>,
    pub description: String,
    /// Signed: credits positive, debits negative
    pub amount_cents: i64,
    pub category: TransactionCategory,
    pub status: TransactionStatus,
    pub related_user_name: Option<String>,
    pub idempotency_key: String,
}

/// A ledger append request. The store turns it into a [`Transaction`] unless
/// an entry with the same idempotency key already exists.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPosting {
    pub user_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub amount_cents: i64,
    pub category: TransactionCategory,
    pub description: String,
    pub related_user_name: Option<String>,
    pub idempotency_key: String,
}

impl LedgerPosting {
    pub fn into_transaction(self, at: DateTime<Utc>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            booking_id: self.booking_id,
            date: at,
            description: self.description,
            amount_cents: self.amount_cents,
            category: self.category,
            status: TransactionStatus::Completed,
            related_user_name: self.related_user_name,
            idempotency_key: self.idempotency_key,
        }
    }
}

/// Key of a booking-triggered posting: one per booking, kind and user
pub fn booking_key(booking_id: Uuid, kind: TransactionCategory, user_id: Uuid) -> String {
    format!("booking:{}:{}:{}", booking_id, kind.as_str(), user_id)
}

/// Key of a checkout-triggered posting: one per checkout session
pub fn checkout_key(session_id: &str) -> String {
    format!("checkout:{}", session_id)
}

pub fn ledger_sum(transactions: &[Transaction]) -> i64 {
    transactions.iter().map(|t| t.amount_cents).sum()
}
