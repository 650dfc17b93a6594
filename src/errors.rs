// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::reservation::ReservationStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Pricing error: {0}")]
    Pricing(String),

    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("QR token mismatch")]
    InvalidToken,

    #[error("Invalid callback signature")]
    InvalidSignature,

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Payment provider timed out")]
    ProviderTimeout,

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Duplicate key error")]
    DuplicateKey,

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            AppError::Pricing(_) => (StatusCode::BAD_REQUEST, "Pricing failed"),
            AppError::IllegalTransition { .. } => (StatusCode::CONFLICT, "Illegal transition"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            AppError::InvalidToken => (StatusCode::UNPROCESSABLE_ENTITY, "QR token mismatch"),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, "Invalid signature"),
            AppError::Provider(_) => (StatusCode::BAD_GATEWAY, "Payment provider error"),
            AppError::ProviderTimeout => (StatusCode::GATEWAY_TIMEOUT, "Payment provider timeout"),
            AppError::Precondition(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Precondition failed"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            AppError::DuplicateKey => (StatusCode::CONFLICT, "Duplicate entry"),
            AppError::ExternalApi(_) => (StatusCode::BAD_GATEWAY, "External API error"),
            AppError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::ProviderTimeout
        } else {
            AppError::ExternalApi(format!("HTTP request failed: {}", err))
        }
    }
}

// Helper conversion functions
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn pricing(msg: impl Into<String>) -> Self {
        AppError::Pricing(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::Conflict(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        AppError::Provider(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        AppError::Precondition(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(what.into())
    }
}

/// True for Mongo's E11000 duplicate-key write failure.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we))
            if we.code == 11000
    )
}

pub type Result<T> = std::result::Result<T, AppError>;
