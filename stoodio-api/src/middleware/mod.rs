pub mod auth;
pub mod resiliency;

pub use auth::{auth_middleware, issue_token, Claims, CurrentUser};
pub use resiliency::{circuit_breaker_middleware, CircuitBreaker, CircuitState};
