//! Payment Error Types

use market_core::CoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Missing or malformed input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller identity missing or does not match
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    /// Verified webhook payload could not be parsed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Payment processor call failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Store(String),

    /// Unknown user or session
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable.
    /// Upstream failures are surfaced to the user instead of retried here.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Store(_))
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidArgument(_) => "INVALID_ARGUMENT",
            PaymentError::Unauthenticated(_) => "UNAUTHENTICATED",
            PaymentError::SignatureInvalid(_) => "INVALID_SIGNATURE",
            PaymentError::WebhookParse(_) => "WEBHOOK_PARSE",
            PaymentError::Upstream(_) => "UPSTREAM_ERROR",
            PaymentError::Store(_) => "STORE_ERROR",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::InvalidArgument(msg) => format!("Invalid request: {msg}"),
            PaymentError::Unauthenticated(_) => "The function must be called while authenticated.".into(),
            PaymentError::SignatureInvalid(_) => "Invalid signature".into(),
            // Processor message is shown as-is; the user retries manually
            PaymentError::Upstream(msg) => format!("Unable to create checkout session: {msg}"),
            PaymentError::Config(_) => "Service configuration error.".into(),
            _ => "An error occurred processing your request.".into(),
        }
    }
}

impl From<CoreError> for PaymentError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => PaymentError::NotFound(msg),
            CoreError::InvalidArgument(msg) => PaymentError::InvalidArgument(msg),
            CoreError::Unauthenticated(msg) => PaymentError::Unauthenticated(msg),
            other => PaymentError::Store(other.to_string()),
        }
    }
}

#[cfg(feature = "axum-handlers")]
mod response {
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };

    use super::PaymentError;

    impl PaymentError {
        pub fn status_code(&self) -> StatusCode {
            match self {
                PaymentError::InvalidArgument(_)
                | PaymentError::SignatureInvalid(_)
                | PaymentError::WebhookParse(_) => StatusCode::BAD_REQUEST,
                PaymentError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
                PaymentError::Upstream(_) => StatusCode::BAD_GATEWAY,
                PaymentError::Store(_) | PaymentError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for PaymentError {
        fn into_response(self) -> Response {
            let body = serde_json::json!({
                "error": self.user_message(),
                "code": self.code(),
            });
            (self.status_code(), Json(body)).into_response()
        }
    }
}
