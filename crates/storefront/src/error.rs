//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`; the body is always `{"message": "..."}`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use marigold_core::{CartError, CheckoutError};

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::orders::OrderError;
use crate::services::payments::PaymentError;
use crate::services::reviews::ReviewError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Order operation failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Review operation failed.
    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    /// Payment processor call failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Request body or parameters failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but lacks rights.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with existing data.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Record is not in a state that allows the change.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session error: {err}"))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

const INTERNAL: &str = "Internal server error";

fn repository_response(err: &RepositoryError) -> (StatusCode, String) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_owned()),
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        RepositoryError::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned())
        }
    }
}

fn payment_response(err: &PaymentError) -> (StatusCode, String) {
    (StatusCode::BAD_GATEWAY, err.public_message())
}

impl AppError {
    /// Status code and client-safe message.
    ///
    /// Internal details never reach the client.
    fn classify(&self) -> (StatusCode, String) {
        match self {
            Self::Database(err) => repository_response(err),
            Self::Payment(err) => payment_response(err),
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "Invalid email or password".to_owned())
                }
                AuthError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_owned()),
                AuthError::UserAlreadyExists => {
                    (StatusCode::CONFLICT, "User already exists".to_owned())
                }
                AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                AuthError::InvalidEmail(_) => {
                    (StatusCode::BAD_REQUEST, "Invalid email address".to_owned())
                }
                AuthError::MissingName => (StatusCode::BAD_REQUEST, "Name is required".to_owned()),
                AuthError::Repository(err) => repository_response(err),
                AuthError::PasswordHash => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned()),
            },
            Self::Order(err) => match err {
                OrderError::Invalid(_)
                | OrderError::NothingToPay
                | OrderError::PaymentIncomplete(_)
                | OrderError::PaymentMismatch(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                OrderError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                OrderError::Forbidden => (StatusCode::FORBIDDEN, err.to_string()),
                OrderError::AlreadyPaid | OrderError::NotPaid => {
                    (StatusCode::CONFLICT, err.to_string())
                }
                OrderError::Payment(err) => payment_response(err),
                OrderError::Repository(err) => repository_response(err),
            },
            Self::Review(err) => match err {
                // Duplicate reviews are a 400, as clients already expect.
                ReviewError::InvalidRating(_)
                | ReviewError::MissingComment
                | ReviewError::AlreadyReviewed => (StatusCode::BAD_REQUEST, err.to_string()),
                ReviewError::ProductNotFound => (StatusCode::NOT_FOUND, err.to_string()),
                ReviewError::Repository(err) => repository_response(err),
            },
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) | Self::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_owned(),
            ),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.classify();

        // Capture server errors to Sentry
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else if status.is_server_error() {
            tracing::warn!(error = %self, "Upstream error");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(ErrorBody { message })).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for checkout actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, String)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb
            .data
            .insert((*key).to_string(), serde_json::Value::String(value.clone()));
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use marigold_core::OrderValidationError;

    use super::*;

    async fn render(err: AppError) -> (StatusCode, String) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json["message"].as_str().unwrap().to_owned())
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product 123".to_string());
        assert_eq!(err.to_string(), "Not found: product 123");

        let err = AppError::Validation("invalid input".to_string());
        assert_eq!(err.to_string(), "Validation error: invalid input");
    }

    #[tokio::test]
    async fn test_status_codes() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::InvalidState("x".into()), StatusCode::CONFLICT),
            (AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (AppError::Payment(PaymentError::Timeout), StatusCode::BAD_GATEWAY),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(render(err).await.0, expected);
        }
    }

    #[tokio::test]
    async fn test_duplicate_review_is_bad_request() {
        let (status, message) = render(ReviewError::AlreadyReviewed.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Product already reviewed");
    }

    #[tokio::test]
    async fn test_order_errors() {
        let (status, _) = render(OrderError::NotPaid.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = render(OrderError::Forbidden.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, message) =
            render(OrderError::Invalid(OrderValidationError::MissingShippingAddress).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!message.is_empty());
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption(
            "order 7 references missing user 3".to_owned(),
        ));
        let (status, message) = render(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
    }
}
