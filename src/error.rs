//! Error types for the connector agent.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Per-request errors are rendered as `{"error": "<message>"}` JSON bodies; startup
//! errors (configuration, port selection, tunnel) are fatal to the process.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No available ports found between {start} and {end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("Read-only mode: {message}")]
    ReadOnly { message: String },

    /// Driver message, relayed verbatim.
    #[error("{message}")]
    Database { message: String },

    #[error("Statement exceeded the {limit:?} timeout")]
    Timeout { limit: Duration },

    #[error("Tunnel error: {message}")]
    Tunnel { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AgentError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a read-only rejection.
    pub fn read_only(message: impl Into<String>) -> Self {
        Self::ReadOnly {
            message: message.into(),
        }
    }

    /// Create a database error carrying the driver's message.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout { limit }
    }

    /// Create a tunnel error.
    pub fn tunnel(message: impl Into<String>) -> Self {
        Self::Tunnel {
            message: message.into(),
        }
    }

    /// Create an I/O error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status used when this error answers a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::ReadOnly { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error must abort the process instead of failing one request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::NoFreePort { .. } | Self::Tunnel { .. } | Self::Io { .. }
        )
    }
}

/// Convert sqlx errors to AgentError.
///
/// Every driver failure collapses into the single `Database` class; errors reported
/// by the server keep only the server's message.
impl From<sqlx::Error> for AgentError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => AgentError::database(db_err.message()),
            other => AgentError::database(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::io(err.to_string())
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
