use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use stoodio_core::payment::CheckoutError;
use stoodio_core::repository::StoreError;
use stoodio_core::BookingError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    AlreadyClaimed(String),
    InvalidState(String),
    BadGateway(String),
    InternalServerError(String),
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "NOT_AUTHORIZED", msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "VALIDATION", msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            AppError::AlreadyClaimed(msg) => (StatusCode::CONFLICT, "ALREADY_CLAIMED", msg),
            AppError::InvalidState(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE", msg),
            AppError::BadGateway(msg) => {
                tracing::error!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, "UPSTREAM", "Payment provider unavailable".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal Server Error".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = self.parts();

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::ValidationError(msg),
            BookingError::Conflict(msg) => AppError::ConflictError(msg),
            e @ BookingError::AlreadyClaimed(_) => AppError::AlreadyClaimed(e.to_string()),
            BookingError::NotAuthorized(msg) => AppError::AuthorizationError(msg),
            BookingError::InvalidState(msg) => AppError::InvalidState(msg),
            BookingError::NotFound(msg) => AppError::NotFoundError(msg),
            BookingError::Store(StoreError::NotFound(msg)) => AppError::NotFoundError(msg),
            BookingError::Checkout(CheckoutError::UnknownSession(id)) => {
                AppError::NotFoundError(format!("checkout session {}", id))
            }
            BookingError::Checkout(e) => AppError::BadGateway(e.to_string()),
            e @ (BookingError::Store(_) | BookingError::LedgerDrift { .. }) => {
                AppError::InternalServerError(e.to_string())
            }
        }
    }
}
