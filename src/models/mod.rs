//! Data models for the connector agent.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionSettings, ConnectionSettingsError, Engine};
pub use query::{HealthStatus, QueryRequest, QueryResult, Row, StatementKind};
