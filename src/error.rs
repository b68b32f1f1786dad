use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

/// Domain error taxonomy. Services raise the specific kind; the HTTP layer
/// maps each kind to a transport status in exactly one place (`into_response`).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidArgument(String),

    /// Field-level input validation report, keyed by field name.
    #[error("validation failed")]
    Validation(BTreeMap<String, String>),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("unable to generate unique card number")]
    GenerationExhausted,

    #[error("crypto failure")]
    Crypto(#[source] anyhow::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::AccessDenied(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "CONFLICT",
            Self::InsufficientFunds => "UNPROCESSABLE_ENTITY",
            Self::GenerationExhausted | Self::Crypto(_) | Self::Database(_) | Self::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
            Self::GenerationExhausted | Self::Crypto(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Validation(fields) => json!({
                "error": self.code(),
                "fields": fields,
            }),
            // Infrastructure failures are logged with their cause but the
            // response body stays generic.
            AppError::GenerationExhausted
            | AppError::Crypto(_)
            | AppError::Database(_)
            | AppError::Internal(_) => {
                tracing::error!(error = %self, "internal error");
                json!({
                    "error": self.code(),
                    "message": "internal server error",
                })
            }
            _ => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
