//! Process-wide session identity.
//!
//! A `Session` is built once at startup from the operator's configuration and is
//! read-only afterwards. It is shared by reference (`Arc<Session>`) with every
//! component that needs it.

pub mod port;
pub mod token;

pub use port::PortRange;
pub use token::{SessionToken, mask_token};

use crate::error::AgentResult;
use crate::models::{ConnectionSettings, Engine};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Session {
    connection: ConnectionSettings,
    token: SessionToken,
    local_port: u16,
}

impl Session {
    /// Select a free local port in `range` and mint the session token.
    pub async fn establish(connection: ConnectionSettings, range: PortRange) -> AgentResult<Self> {
        let local_port = range.first_free().await?;
        let token = SessionToken::issue();

        info!(
            engine = %connection.engine,
            target = %connection.display_target(),
            local_port,
            "Session established"
        );

        Ok(Self::new(connection, token, local_port))
    }

    pub fn new(connection: ConnectionSettings, token: SessionToken, local_port: u16) -> Self {
        Self {
            connection,
            token,
            local_port,
        }
    }

    pub fn engine(&self) -> Engine {
        self.connection.engine
    }

    pub fn database(&self) -> &str {
        &self.connection.database
    }

    pub fn connection(&self) -> &ConnectionSettings {
        &self.connection
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }
}
