//! Route handlers.

use crate::db::DatabaseBridge;
use crate::error::{AgentError, AgentResult};
use crate::models::{HealthStatus, QueryRequest, QueryResult};
use crate::session::Session;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use std::sync::Arc;

/// Shared, read-only state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub bridge: Arc<DatabaseBridge>,
}

impl AppState {
    pub fn new(session: Arc<Session>, bridge: Arc<DatabaseBridge>) -> Self {
        Self { session, bridge }
    }
}

/// `GET /health`: engine, database name and readiness. Never touches the database.
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus::ready(
        state.session.engine(),
        state.session.database(),
    ))
}

/// `POST /query`: run one statement through the bridge.
///
/// The statement runs on its own task, so a client that disconnects early does
/// not cancel the database call (and with it an uncommitted write).
pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> AgentResult<Json<QueryResult>> {
    let Json(request) = payload.map_err(|rejection| AgentError::invalid_input(rejection.body_text()))?;
    let statement = request.statement()?.to_string();

    let bridge = state.bridge.clone();
    let result = tokio::spawn(async move { bridge.execute(&statement).await })
        .await
        .map_err(|e| AgentError::internal(format!("Statement task failed: {}", e)))??;
    Ok(Json(result))
}
