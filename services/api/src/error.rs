//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
use weather_to_ride_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("{0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while running the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request was understood but its content is not acceptable.
    #[error("{0}")]
    BadRequest(String),

    /// The caller could not be authenticated.
    #[error("{0}")]
    Unauthenticated(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Port(port) => match port {
                PortError::NotFound(_) => StatusCode::NOT_FOUND,
                PortError::Invalid(_) => StatusCode::BAD_REQUEST,
                PortError::Conflict(_) => StatusCode::CONFLICT,
                PortError::Forbidden(_) => StatusCode::FORBIDDEN,
                PortError::Unauthorized => StatusCode::UNAUTHORIZED,
                PortError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
                PortError::Upstream(_) => StatusCode::BAD_GATEWAY,
                PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to the client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Port(PortError::Unexpected(_)) => {
                "An unexpected error occurred.".to_string()
            }
            ApiError::Port(port) => port.to_string(),
            ApiError::BadRequest(message) | ApiError::Unauthenticated(message) => message.clone(),
            _ => "An unexpected error occurred.".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
