//! Public tunnel lifecycle.
//!
//! `TunnelManager` owns the tunnel handle and the shutdown sequence:
//!
//! ```text
//! Unstarted -> Listening -> Tunneled -> Closed
//! ```
//!
//! Shutdown order is fixed: close the tunnel, stop accepting connections, let
//! in-flight requests finish (bounded by a grace period), then return.

pub mod ngrok;

pub use ngrok::{NgrokConfig, NgrokProvider};

use crate::console;
use crate::error::{AgentError, AgentResult};
use crate::server::HttpServer;
use crate::session::Session;
use async_trait::async_trait;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long in-flight requests may run after shutdown starts.
pub const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle of the agent's public reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Unstarted,
    Listening,
    Tunneled,
    Closed,
}

impl TunnelState {
    pub fn can_transition_to(self, next: TunnelState) -> bool {
        use TunnelState::*;
        matches!(
            (self, next),
            (Unstarted, Listening)
                | (Listening, Tunneled)
                | (Tunneled, Closed)
                | (Listening, Closed)
                | (Unstarted, Closed)
        )
    }
}

/// An open public mapping. Only the manager holds one.
#[derive(Debug)]
pub struct TunnelHandle {
    public_url: String,
    name: String,
}

impl TunnelHandle {
    pub fn new(public_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
            name: name.into(),
        }
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Provider-side identifier of the tunnel.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A service that can publish a local port under a public URL.
#[async_trait]
pub trait TunnelProvider: Send {
    /// Get the name of this provider for logging.
    fn name(&self) -> &'static str;

    /// Publish `local_port`. Failure is fatal to the agent.
    async fn open(&mut self, local_port: u16) -> AgentResult<TunnelHandle>;

    /// Remove the mapping and end the provider's client session.
    async fn close(&mut self, handle: TunnelHandle) -> AgentResult<()>;
}

pub struct TunnelManager<P: TunnelProvider> {
    provider: P,
    state: TunnelState,
    handle: Option<TunnelHandle>,
    grace: Duration,
}

impl<P: TunnelProvider> TunnelManager<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state: TunnelState::Unstarted,
            handle: None,
            grace: GRACEFUL_TIMEOUT,
        }
    }

    /// Override the grace period for in-flight requests.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    pub fn public_url(&self) -> Option<&str> {
        self.handle.as_ref().map(TunnelHandle::public_url)
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Serve, publish, and block until `shutdown` is cancelled (operator quit or
    /// signal), then tear everything down in order.
    pub async fn run(
        &mut self,
        server: HttpServer,
        session: &Session,
        shutdown: CancellationToken,
    ) -> AgentResult<()> {
        let listener = server.bind().await?;
        let local_port = listener.local_addr()?.port();
        self.transition(TunnelState::Listening)?;

        // Separate from `shutdown` so the listener outlives the tunnel
        let stop_serving = CancellationToken::new();
        let mut server_task = tokio::spawn(server.serve(listener, stop_serving.clone()));

        info!(provider = self.provider.name(), local_port, "Opening tunnel");
        let opened = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            opened = self.provider.open(local_port) => Some(opened),
        };
        let handle = match opened {
            Some(Ok(handle)) => handle,
            Some(Err(e)) => return self.fail_open(e, stop_serving, server_task).await,
            None => {
                info!("Shutdown requested before the tunnel was established");
                let result = stop_server(self.grace, stop_serving, server_task).await;
                self.transition(TunnelState::Closed)?;
                return result;
            }
        };

        info!(public_url = %handle.public_url(), "Tunnel established");
        console::announce(session, handle.public_url());
        self.handle = Some(handle);
        self.transition(TunnelState::Tunneled)?;

        let server_exit = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested");
                None
            }
            joined = &mut server_task => Some(joined),
        };

        self.close_tunnel().await;

        let result = match server_exit {
            None => stop_server(self.grace, stop_serving, server_task).await,
            Some(joined) => {
                warn!("HTTP server exited before shutdown was requested");
                flatten(joined)
            }
        };

        self.transition(TunnelState::Closed)?;
        info!("Connector shutdown complete");
        result
    }

    fn transition(&mut self, next: TunnelState) -> AgentResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(AgentError::internal(format!(
                "Invalid tunnel state transition {:?} -> {:?}",
                self.state, next
            )));
        }
        info!(from = ?self.state, to = ?next, "Tunnel state changed");
        self.state = next;
        Ok(())
    }

    /// Stop serving after the tunnel could not be opened. The tunnel error is
    /// what the caller sees, whatever the server task reports.
    async fn fail_open(
        &mut self,
        e: AgentError,
        stop_serving: CancellationToken,
        server_task: JoinHandle<AgentResult<()>>,
    ) -> AgentResult<()> {
        error!(error = %e, "Failed to establish tunnel");
        if let Err(stop_err) = stop_server(self.grace, stop_serving, server_task).await {
            warn!(error = %stop_err, "HTTP server failed while stopping");
        }
        self.transition(TunnelState::Closed)?;
        Err(e)
    }

    async fn close_tunnel(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        info!(public_url = %handle.public_url(), "Closing tunnel");
        if let Err(e) = self.provider.close(handle).await {
            warn!(error = %e, "Error while closing tunnel");
        }
    }
}

async fn stop_server(
    grace: Duration,
    stop_serving: CancellationToken,
    mut server_task: JoinHandle<AgentResult<()>>,
) -> AgentResult<()> {
    stop_serving.cancel();
    info!(
        timeout_secs = grace.as_secs(),
        "Waiting for in-flight requests to finish"
    );
    match tokio::time::timeout(grace, &mut server_task).await {
        Ok(joined) => flatten(joined),
        Err(_) => {
            warn!("Graceful shutdown timeout, abandoning in-flight requests");
            server_task.abort();
            Ok(())
        }
    }
}

fn flatten(joined: Result<AgentResult<()>, JoinError>) -> AgentResult<()> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(AgentError::internal(format!("HTTP server task failed: {}", e))),
    }
}
