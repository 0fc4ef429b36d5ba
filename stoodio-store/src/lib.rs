pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod user_repo;
pub mod redis_repo;
pub mod events;

pub use app_config::Config;
pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use events::EventProducer;
pub use redis_repo::RedisClient;
pub use user_repo::PgUserRepository;

use stoodio_core::repository::StoreError;

pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}
