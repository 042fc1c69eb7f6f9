//! Query-related data models.
//!
//! This module defines the request and response shapes of the HTTP surface.

use crate::error::{AgentError, AgentResult};
use crate::models::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Body of a `POST /query` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Missing or null is treated the same as an empty statement.
    #[serde(default)]
    pub query: Option<String>,
}

impl QueryRequest {
    /// Create a request for a statement.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
        }
    }

    /// The trimmed statement, or an `InvalidInput` error if nothing remains.
    pub fn statement(&self) -> AgentResult<&str> {
        let statement = self.query.as_deref().unwrap_or_default().trim();
        if statement.is_empty() {
            return Err(AgentError::invalid_input("Query cannot be empty"));
        }
        Ok(statement)
    }
}

/// Read/write classification of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Rows are fetched and returned.
    Read,
    /// Committed; only an acknowledgment is returned.
    Write,
}

impl StatementKind {
    /// Classify a statement: reads begin (after trimming, case-insensitively) with `select`.
    pub fn classify(statement: &str) -> Self {
        let is_select = statement
            .trim_start()
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"));
        if is_select { Self::Read } else { Self::Write }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Normalized outcome of one statement.
///
/// Reads serialize as a bare array of row objects, writes as `{"status":"success"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Rows(Vec<Row>),
    Status { status: &'static str },
}

impl QueryResult {
    /// Acknowledgment for a committed write.
    pub fn success() -> Self {
        Self::Status { status: "success" }
    }

    /// Number of rows returned (zero for writes).
    pub fn row_count(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Status { .. } => 0,
        }
    }

    pub fn is_rows(&self) -> bool {
        matches!(self, Self::Rows(_))
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub db: String,
    #[serde(rename = "type")]
    pub engine: Engine,
}

impl HealthStatus {
    pub fn ready(engine: Engine, database: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            db: database.into(),
            engine,
        }
    }
}
