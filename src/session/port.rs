//! Local listening port selection.

use crate::error::{AgentError, AgentResult};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub const DEFAULT_PORT_RANGE_START: u16 = 5000;
pub const DEFAULT_PORT_RANGE_END: u16 = 6000;

/// A probe that hangs this long is treated as "something is listening".
const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Half-open port range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> AgentResult<Self> {
        if start == 0 {
            return Err(AgentError::config("Port range must start above 0"));
        }
        if start >= end {
            return Err(AgentError::config(format!(
                "Invalid port range {start}-{end}: start must be below end"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Return the first port in ascending order on which nothing accepts a local
    /// TCP connection.
    pub async fn first_free(&self) -> AgentResult<u16> {
        for port in self.start..self.end {
            if !is_listening(port).await {
                debug!(port, "Selected free local port");
                return Ok(port);
            }
            debug!(port, "Port in use, probing next");
        }
        Err(AgentError::NoFreePort {
            start: self.start,
            end: self.end,
        })
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_RANGE_START,
            end: DEFAULT_PORT_RANGE_END,
        }
    }
}

async fn is_listening(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(_)) => false,
        Err(_) => true,
    }
}
