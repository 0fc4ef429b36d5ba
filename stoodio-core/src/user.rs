use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::booking::Coordinates;

/// Marketplace role of a user record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Artist,
    Engineer,
    Producer,
    Stoodio,
    Label,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Artist => "ARTIST",
            Role::Engineer => "ENGINEER",
            Role::Producer => "PRODUCER",
            Role::Stoodio => "STOODIO",
            Role::Label => "LABEL",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ARTIST" => Ok(Role::Artist),
            "ENGINEER" => Ok(Role::Engineer),
            "PRODUCER" => Ok(Role::Producer),
            "STOODIO" => Ok(Role::Stoodio),
            "LABEL" => Ok(Role::Label),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Reputation class maintained by the ranking subsystem.
/// Declaration order is rank order: `Provisional < ... < Elite`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankingTier {
    Provisional,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Elite,
}

impl RankingTier {
    pub const ALL: [RankingTier; 6] = [
        RankingTier::Provisional,
        RankingTier::Bronze,
        RankingTier::Silver,
        RankingTier::Gold,
        RankingTier::Platinum,
        RankingTier::Elite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RankingTier::Provisional => "PROVISIONAL",
            RankingTier::Bronze => "BRONZE",
            RankingTier::Silver => "SILVER",
            RankingTier::Gold => "GOLD",
            RankingTier::Platinum => "PLATINUM",
            RankingTier::Elite => "ELITE",
        }
    }

    /// Lenient parse for persisted values; anything unrecognized yields `None`
    pub fn parse_lenient(s: &str) -> Option<Self> {
        s.trim().to_ascii_uppercase().parse().ok()
    }
}

impl fmt::Display for RankingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankingTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RankingTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| format!("unknown ranking tier: {}", s))
    }
}

/// Canonical user record. Booking snapshots may be stale; this is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub ranking_tier: Option<RankingTier>,
    pub sessions_completed: i32,
    /// Cached sum of the user's wallet transactions
    pub wallet_balance_cents: i64,
    pub on_time_rate: f64,
    pub completion_rate: f64,
    /// Label an artist is signed to; bookings by such artists need label approval
    pub label_id: Option<Uuid>,
    /// Profile rate per hour (engineers, producers) or room rate (stoodios)
    pub hourly_rate_cents: Option<i64>,
    pub suspended: bool,
    pub coordinates: Option<Coordinates>,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            ranking_tier: None,
            sessions_completed: 0,
            wallet_balance_cents: 0,
            on_time_rate: 1.0,
            completion_rate: 1.0,
            label_id: None,
            hourly_rate_cents: None,
            suspended: false,
            coordinates: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_tier(mut self, tier: RankingTier) -> Self {
        self.ranking_tier = Some(tier);
        self
    }

    pub fn with_rate(mut self, hourly_rate_cents: i64) -> Self {
        self.hourly_rate_cents = Some(hourly_rate_cents);
        self
    }

    pub fn with_label(mut self, label_id: Uuid) -> Self {
        self.label_id = Some(label_id);
        self
    }

    /// Active users with the given role
    pub fn acts_as(&self, role: Role) -> bool {
        self.role == role && !self.suspended
    }
}
