//! Unified error type for the credit ledger, payment reconciliation and generation flows.
//!
//! Every fallible function in the crate returns [`Result`]. Errors are converted into
//! user-facing outcomes at the channel and session boundaries; only malformed input and
//! authentication failures are rejected before reaching the core.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Settings or tariff table could not be loaded or are incomplete
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("User not found: {external_id}")]
    UserNotFound { external_id: String },

    #[error("Payment not found: {payment_id}")]
    PaymentNotFound { payment_id: String },

    #[error("Insufficient balance: have {current}, need {required}")]
    InsufficientBalance { current: i64, required: i64 },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    /// Payment processor or generation provider failed, timed out or answered non-2xx
    #[error("{service} unavailable: {message}")]
    UpstreamUnavailable { service: String, message: String },

    /// Webhook or poll payload that cannot be turned into a notification
    #[error("Malformed notification: {message}")]
    MalformedNotification { message: String },

    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl Error {
    /// Wraps any upstream failure under the name of the collaborator that produced it.
    pub fn upstream(service: &str, err: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the user should simply be told to try again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. } | Self::Database(_))
    }
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MalformedNotification { .. } | Self::Serialization(_) => StatusCode::BAD_REQUEST,
            Self::UserNotFound { .. } | Self::PaymentNotFound { .. } => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
