//! HTTP surface.
//!
//! Routes:
//! - `GET /health`: liveness, exempt from the access gate
//! - `POST /query`: execute one statement, gated by `X-API-TOKEN`
//!
//! Layers, outermost first: CORS (browser clients; answers preflights without a
//! token), request tracing, access gate.

pub mod handlers;

pub use handlers::AppState;

use crate::auth::{AccessGate, HEALTH_PATH, auth_middleware};
use crate::error::{AgentError, AgentResult};
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let gate = Arc::new(AccessGate::new(state.session.token().clone()));

    Router::new()
        .route(HEALTH_PATH, get(handlers::health))
        .route("/query", post(handlers::query))
        .with_state(state)
        .layer(middleware::from_fn_with_state(gate, auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// HTTP server bound to the session's local port.
pub struct HttpServer {
    router: Router,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
}

impl HttpServer {
    pub fn new(state: AppState, host: impl Into<String>) -> Self {
        let port = state.session.local_port();
        Self {
            router: router(state),
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the listening socket.
    pub async fn bind(&self) -> AgentResult<TcpListener> {
        let bind_addr = self.bind_addr();
        TcpListener::bind(&bind_addr).await.map_err(|e| {
            AgentError::config(format!(
                "Failed to bind to {}: {}. Check that the port is available",
                bind_addr, e
            ))
        })
    }

    /// Serve on `listener` until `shutdown` is cancelled, then finish in-flight
    /// requests.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> AgentResult<()> {
        info!(addr = %self.bind_addr(), "HTTP surface listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server error");
                AgentError::internal(format!("HTTP server error: {}", e))
            })?;

        info!("HTTP server stopped");
        Ok(())
    }
}
