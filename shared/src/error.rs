//! Unified error type for the Tavola platform
//!
//! One enum covers the whole taxonomy the order lifecycle engine can
//! produce. Handlers return [`AppResult`] and the `IntoResponse` impl maps
//! each variant onto an HTTP status and a `{error, message}` JSON body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::models::OrderStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    SecurityViolation(String),

    #[error("insufficient stock for '{item}'")]
    InsufficientStock { item: String },

    #[error("{0}")]
    AlreadyPaid(String),

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::SecurityViolation(message.into())
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::InvalidSignature(message.into())
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway(message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            AppError::SecurityViolation(_) => (StatusCode::FORBIDDEN, "security_violation"),
            AppError::InsufficientStock { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock")
            }
            AppError::AlreadyPaid(_) => (StatusCode::CONFLICT, "already_paid"),
            AppError::InvalidSignature(_) => (StatusCode::BAD_REQUEST, "invalid_signature"),
            AppError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error"),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        // Log internals but keep the response body generic
        let message = match &self {
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                "An internal error occurred".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "Internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(feature = "db")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Database(format!("serialization: {err}"))
    }
}

/// Result type for engine and handler operations
pub type AppResult<T> = Result<T, AppError>;
