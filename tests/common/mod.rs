//! Shared fixtures for the integration tests.
//!
//! `FakeDriver` stands in for a real database: reads answer with canned rows,
//! writes acknowledge, and statements mentioning `no_such_table` fail the way a
//! server error would.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode};
use db_connector_agent::db::{BridgeOptions, DatabaseBridge, EngineDriver};
use db_connector_agent::error::{AgentError, AgentResult};
use db_connector_agent::models::{ConnectionSettings, Engine, QueryResult, Row, StatementKind};
use db_connector_agent::server::{self, AppState};
use db_connector_agent::session::{Session, SessionToken};
use serde_json::{Value as JsonValue, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TOKEN: &str = "f3a9c2d1e4b5a6978877665544332211";

/// Statements the fake driver has been asked to run.
pub type Calls = Arc<Mutex<Vec<(String, StatementKind)>>>;

#[derive(Clone, Default)]
pub struct FakeDriver {
    pub calls: Calls,
    /// Statements that ran to the end, after any delay.
    pub completed: Arc<Mutex<Vec<String>>>,
    pub rows: Vec<Row>,
    pub delay: Option<Duration>,
}

impl FakeDriver {
    pub fn with_rows(rows: Vec<JsonValue>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                JsonValue::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<(String, StatementKind)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineDriver for FakeDriver {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn run(&self, statement: &str, kind: StatementKind) -> AgentResult<QueryResult> {
        self.calls.lock().unwrap().push((statement.to_string(), kind));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.lock().unwrap().push(statement.to_string());
        if statement.contains("no_such_table") {
            return Err(AgentError::database(
                "relation \"no_such_table\" does not exist",
            ));
        }
        Ok(match kind {
            StatementKind::Read => QueryResult::Rows(self.rows.clone()),
            StatementKind::Write => QueryResult::success(),
        })
    }
}

pub fn settings() -> ConnectionSettings {
    ConnectionSettings::new(Engine::Postgres, "localhost", "app", "secret", "shop")
}

pub fn session(local_port: u16) -> Arc<Session> {
    Arc::new(Session::new(
        settings(),
        SessionToken::from_secret(TOKEN),
        local_port,
    ))
}

pub fn state(driver: FakeDriver, options: BridgeOptions, local_port: u16) -> AppState {
    let bridge = DatabaseBridge::with_driver(driver, options);
    AppState::new(session(local_port), Arc::new(bridge))
}

pub fn app(driver: FakeDriver, options: BridgeOptions) -> Router {
    server::router(state(driver, options, 0))
}

pub fn query_request(body: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("X-API-TOKEN", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("X-API-TOKEN", token);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> (StatusCode, JsonValue) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn sample_rows() -> Vec<JsonValue> {
    vec![
        json!({"id": 1, "name": "Widget", "price": "9.99"}),
        json!({"id": 2, "name": "Gadget", "price": "24.50"}),
        json!({"id": 3, "name": "Gizmo", "price": null}),
    ]
}
