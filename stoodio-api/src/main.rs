use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use stoodio_api::{app, AppState, AuthConfig};
use stoodio_booking::{BookingManager, BroadcastPublisher, CheckoutOrchestrator, MockCheckoutAdapter};
use stoodio_store::{Config, DbClient, EventProducer, PgBookingRepository, PgUserRepository, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stoodio_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Stoodio API on port {}", config.server.port);

    // Database
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("Failed to load business rules")?;
    tracing::info!(
        "Business rules: fee {} charge {:?} enforce start {}",
        rules.platform_fee_rate,
        rules.charge_policy,
        rules.enforce_start_time
    );

    let bookings = Arc::new(PgBookingRepository::new(db.pool.clone()));
    let users = Arc::new(PgUserRepository::new(db.pool.clone()));

    // SSE fan-out, plus Kafka when enabled
    let events = BroadcastPublisher::default();
    let mut manager = BookingManager::new(bookings, users, rules).with_publisher(Arc::new(events.clone()));
    if config.kafka.enabled {
        let producer = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;
        manager = manager.with_publisher(Arc::new(producer));
    } else {
        tracing::warn!("Kafka publishing disabled");
    }
    let manager = Arc::new(manager);

    // Checkout sessions are served by the in-process mock provider
    let checkout = Arc::new(CheckoutOrchestrator::new(Arc::new(MockCheckoutAdapter::new()), manager.clone()));

    let redis = RedisClient::new(&config.redis.url).context("Failed to create Redis client")?;

    let app_state = AppState::new(
        manager,
        checkout,
        events,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    )?
    .with_redis(Arc::new(redis), config.rate_limit.clone());

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
