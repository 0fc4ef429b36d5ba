use serde::Deserialize;
use std::env;
use stoodio_core::rules::BookingRules;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub business_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    /// Publish domain events to Kafka; the in-process SSE stream works either way
    #[serde(default = "default_kafka_enabled")]
    pub enabled: bool,
}

fn default_kafka_enabled() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests_per_window: 100, window_seconds: 60 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `STOODIO__BUSINESS_RULES__PLATFORM_FEE_RATE=0.15`
            .add_source(config::Environment::with_prefix("STOODIO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use stoodio_core::rules::ChargePolicy;

    #[test]
    fn test_business_rules_default_when_absent() {
        let raw = r#"
            [server]
            port = 3000
            [database]
            url = "postgres://localhost/stoodio"
            [redis]
            url = "redis://localhost"
            [kafka]
            brokers = "localhost:9092"
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.business_rules.platform_fee_rate, 0.10);
        assert_eq!(config.business_rules.charge_policy, ChargePolicy::OnCompletion);
        assert!(config.business_rules.enforce_start_time);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.kafka.enabled);
        assert_eq!(config.rate_limit.requests_per_window, 100);
    }

    #[test]
    fn test_business_rules_override() {
        let raw = r#"
            [server]
            port = 3000
            [database]
            url = "postgres://localhost/stoodio"
            [redis]
            url = "redis://localhost"
            [kafka]
            brokers = "localhost:9092"
            enabled = false
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
            [business_rules]
            platform_fee_rate = 0.2
            charge_policy = "ON_CONFIRMATION"
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.business_rules.platform_fee_rate, 0.2);
        assert_eq!(config.business_rules.charge_policy, ChargePolicy::OnConfirmation);
        assert!(!config.kafka.enabled);
    }
}
