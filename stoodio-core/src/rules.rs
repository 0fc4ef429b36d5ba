use serde::{Deserialize, Serialize};

/// When the paying party's wallet is debited
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargePolicy {
    /// Debit at completion; nothing to reverse on cancellation
    #[default]
    OnCompletion,
    /// Escrow-like: debit when the booking becomes CONFIRMED
    OnConfirmation,
}

/// Product rules the booking engine runs with
#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    /// Fraction of every payout kept by the platform
    #[serde(default = "default_platform_fee_rate")]
    pub platform_fee_rate: f64,
    #[serde(default)]
    pub charge_policy: ChargePolicy,
    /// Refuse to start a session before its scheduled start
    #[serde(default = "default_enforce_start_time")]
    pub enforce_start_time: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_platform_fee_rate() -> f64 { 0.10 }
fn default_enforce_start_time() -> bool { true }
fn default_currency() -> String { "USD".to_string() }

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            platform_fee_rate: default_platform_fee_rate(),
            charge_policy: ChargePolicy::default(),
            enforce_start_time: default_enforce_start_time(),
            currency: default_currency(),
        }
    }
}
