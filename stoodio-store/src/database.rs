use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use stoodio_core::rules::{BookingRules, ChargePolicy};
use tracing::{info, warn};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of the `business_rules` table on the configured rules
    pub async fn fetch_business_rules(&self, defaults: BookingRules) -> Result<BookingRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

/// Rows are `{"value": ...}` documents keyed by rule name. Unknown keys and
/// mistyped values are skipped.
fn apply_rule_overrides(mut rules: BookingRules, rows: Vec<(String, Value)>) -> BookingRules {
    for (key, doc) in rows {
        let Some(v) = doc.get("value") else {
            warn!("Business rule {} has no value", key);
            continue;
        };

        match key.as_str() {
            "platform_fee_rate" => {
                if let Some(f) = v.as_f64().filter(|f| (0.0..=1.0).contains(f)) {
                    rules.platform_fee_rate = f;
                }
            }
            "charge_policy" => {
                if let Ok(policy) = serde_json::from_value::<ChargePolicy>(v.clone()) {
                    rules.charge_policy = policy;
                }
            }
            "enforce_start_time" => {
                if let Some(b) = v.as_bool() {
                    rules.enforce_start_time = b;
                }
            }
            "currency" => {
                if let Some(s) = v.as_str() {
                    rules.currency = s.to_string();
                }
            }
            _ => {}
        }
    }
    rules
}
