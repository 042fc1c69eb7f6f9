//! ngrok tunnel provider.
//!
//! Talks to the local ngrok agent over its HTTP API. When no agent is reachable
//! at the configured API address one is spawned (`ngrok start --none`) and owned
//! by this provider: it is killed when the tunnel closes or the provider drops.

use super::{TunnelHandle, TunnelProvider};
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Default address of the ngrok agent API.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:4040";

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct NgrokConfig {
    /// ngrok executable, resolved through PATH when not absolute
    pub binary: PathBuf,
    /// Base URL of the agent API
    pub api_url: Url,
    /// Passed to a spawned agent as `NGROK_AUTHTOKEN`
    pub authtoken: Option<String>,
    /// How long a spawned agent may take to expose its API
    pub startup_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct CreateTunnel<'a> {
    name: &'a str,
    addr: String,
    proto: &'static str,
}

#[derive(Debug, Deserialize)]
struct TunnelInfo {
    name: String,
    public_url: String,
}

pub struct NgrokProvider {
    config: NgrokConfig,
    http: reqwest::Client,
    agent: Option<Child>,
}

impl NgrokProvider {
    pub fn new(config: NgrokConfig) -> AgentResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AgentError::tunnel(format!("Failed to build ngrok API client: {}", e)))?;
        Ok(Self {
            config,
            http,
            agent: None,
        })
    }

    /// Whether this provider spawned (and therefore owns) the agent process.
    pub fn owns_agent(&self) -> bool {
        self.agent.is_some()
    }

    fn endpoint(&self, path: &str) -> AgentResult<Url> {
        self.config
            .api_url
            .join(path)
            .map_err(|e| AgentError::tunnel(format!("Invalid ngrok API URL: {}", e)))
    }

    async fn api_ready(&self) -> bool {
        let Ok(url) = self.endpoint("/api/tunnels") else {
            return false;
        };
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "ngrok agent API not reachable");
                false
            }
        }
    }

    async fn ensure_agent(&mut self) -> AgentResult<()> {
        if self.agent.is_some() || self.api_ready().await {
            if self.agent.is_none() {
                info!(api = %self.config.api_url, "Attaching to running ngrok agent");
            }
            return Ok(());
        }

        info!(binary = %self.config.binary.display(), "Starting ngrok agent");
        let mut command = Command::new(&self.config.binary);
        command
            .args(["start", "--none"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(authtoken) = &self.config.authtoken {
            command.env("NGROK_AUTHTOKEN", authtoken);
        }

        let mut child = command.spawn().map_err(|e| {
            AgentError::tunnel(format!(
                "Failed to start ngrok agent ({}): {}. Install ngrok or pass --ngrok-path",
                self.config.binary.display(),
                e
            ))
        })?;

        let deadline = Instant::now() + self.config.startup_timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(AgentError::tunnel(format!(
                    "ngrok agent exited early ({}). Check the authtoken and ngrok configuration",
                    status
                )));
            }
            if self.api_ready().await {
                break;
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill unresponsive ngrok agent");
                }
                return Err(AgentError::tunnel(format!(
                    "ngrok agent API at {} did not become ready within {}s",
                    self.config.api_url,
                    self.config.startup_timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        info!(pid = child.id(), "ngrok agent ready");
        self.agent = Some(child);
        Ok(())
    }

    async fn stop_agent(&mut self) {
        let Some(mut child) = self.agent.take() else {
            return;
        };
        info!(pid = child.id(), "Stopping ngrok agent");
        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to stop ngrok agent");
        }
    }
}

#[async_trait]
impl TunnelProvider for NgrokProvider {
    fn name(&self) -> &'static str {
        "ngrok"
    }

    async fn open(&mut self, local_port: u16) -> AgentResult<TunnelHandle> {
        self.ensure_agent().await?;

        let name = format!("db-connector-{}", Uuid::new_v4().simple());
        let request = CreateTunnel {
            name: &name,
            addr: local_port.to_string(),
            proto: "http",
        };

        let response = self
            .http
            .post(self.endpoint("/api/tunnels")?)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::tunnel(format!("ngrok agent API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            self.stop_agent().await;
            return Err(AgentError::tunnel(format!(
                "ngrok refused to create tunnel ({}): {}",
                status,
                body.trim()
            )));
        }

        let info: TunnelInfo = response
            .json()
            .await
            .map_err(|e| AgentError::tunnel(format!("Unexpected ngrok API response: {}", e)))?;
        debug!(tunnel = %info.name, "ngrok tunnel created");
        Ok(TunnelHandle::new(info.public_url, info.name))
    }

    async fn close(&mut self, handle: TunnelHandle) -> AgentResult<()> {
        let outcome = match self.endpoint(&format!("/api/tunnels/{}", handle.name())) {
            Ok(url) => match self.http.delete(url).send().await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(AgentError::tunnel(format!(
                    "ngrok refused to close tunnel {} ({})",
                    handle.name(),
                    response.status()
                ))),
                Err(e) => Err(AgentError::tunnel(format!(
                    "ngrok agent API request failed: {}",
                    e
                ))),
            },
            Err(e) => Err(e),
        };

        // The agent goes regardless; killing it also drops its tunnels
        self.stop_agent().await;
        outcome
    }
}
