use std::sync::Arc;
use std::time::Duration;

use stoodio_booking::{BookingManager, BroadcastPublisher, CheckoutOrchestrator};
use stoodio_store::app_config::RateLimitConfig;
use stoodio_store::RedisClient;

use crate::metrics::ApiMetrics;
use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

pub struct ResiliencyState {
    pub checkout_cb: CircuitBreaker,
}

impl Default for ResiliencyState {
    fn default() -> Self {
        Self {
            checkout_cb: CircuitBreaker::new("checkout", 5, Duration::from_secs(30)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BookingManager>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub events: BroadcastPublisher,
    /// Rate limiting is skipped when no redis is configured
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub resiliency: Arc<ResiliencyState>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(
        manager: Arc<BookingManager>,
        checkout: Arc<CheckoutOrchestrator>,
        events: BroadcastPublisher,
        auth: AuthConfig,
    ) -> prometheus::Result<Self> {
        Ok(Self {
            manager,
            checkout,
            events,
            redis: None,
            auth,
            rate_limit: RateLimitConfig::default(),
            resiliency: Arc::new(ResiliencyState::default()),
            metrics: Arc::new(ApiMetrics::new()?),
        })
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>, rate_limit: RateLimitConfig) -> Self {
        self.redis = Some(redis);
        self.rate_limit = rate_limit;
        self
    }
}
