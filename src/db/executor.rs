//! Statement execution.
//!
//! `DatabaseBridge` runs exactly one statement per call against the configured
//! engine and returns a normalized `QueryResult`.
//!
//! # Architecture
//!
//! Engine-specific work lives behind the `EngineDriver` trait, one implementation
//! per engine:
//! - `mysql`: rows come back column-keyed
//! - `postgres`: rows come back positionally and are zipped with the column descriptor
//!
//! A driver owns the whole connection lifecycle of a call (connect, execute,
//! fetch or commit, close). Nothing is pooled or shared between calls.
//! The bridge adds what is engine-independent: read/write classification, the
//! optional read-only gate and statement timeout, and logging.

use crate::error::{AgentError, AgentResult};
use crate::models::{ConnectionSettings, Engine, QueryResult, StatementKind};
use async_trait::async_trait;
use sqlx::Connection;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub use self::mysql::MySqlDriver;
pub use self::postgres::PostgresDriver;

/// One database engine's "execute and return normalized rows" contract.
#[async_trait]
pub trait EngineDriver: Send + Sync {
    fn engine(&self) -> Engine;

    /// Open a fresh connection, run `statement`, and close the connection again
    /// whatever the outcome.
    async fn run(&self, statement: &str, kind: StatementKind) -> AgentResult<QueryResult>;
}

/// Engine-independent execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeOptions {
    /// None means the driver's own defaults apply.
    pub statement_timeout: Option<Duration>,
    /// Reject write-classified statements before connecting.
    pub read_only: bool,
}

/// Executes statements on behalf of the HTTP surface.
pub struct DatabaseBridge {
    driver: Box<dyn EngineDriver>,
    options: BridgeOptions,
}

impl DatabaseBridge {
    /// Create a bridge with the driver matching the configured engine.
    pub fn new(settings: &ConnectionSettings, options: BridgeOptions) -> Self {
        let driver: Box<dyn EngineDriver> = match settings.engine {
            Engine::MySql => Box::new(MySqlDriver::new(settings)),
            Engine::Postgres => Box::new(PostgresDriver::new(settings)),
        };
        Self { driver, options }
    }

    /// Create a bridge around an arbitrary driver.
    pub fn with_driver(driver: impl EngineDriver + 'static, options: BridgeOptions) -> Self {
        Self {
            driver: Box::new(driver),
            options,
        }
    }

    pub fn engine(&self) -> Engine {
        self.driver.engine()
    }

    pub fn options(&self) -> BridgeOptions {
        self.options
    }

    /// Execute one trimmed, non-empty statement.
    pub async fn execute(&self, statement: &str) -> AgentResult<QueryResult> {
        let start = Instant::now();
        let kind = StatementKind::classify(statement);

        if self.options.read_only && kind == StatementKind::Write {
            warn!("Rejected write statement in read-only mode");
            return Err(AgentError::read_only(
                "only SELECT statements are allowed on this connector",
            ));
        }

        debug!(
            engine = %self.engine(),
            kind = kind.as_str(),
            sql = %statement,
            "Executing statement"
        );

        let result = match self.options.statement_timeout {
            Some(limit) => match timeout(limit, self.driver.run(statement, kind)).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::timeout(limit)),
            },
            None => self.driver.run(statement, kind).await,
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => info!(
                kind = kind.as_str(),
                rows = outcome.row_count(),
                elapsed_ms,
                "Statement completed"
            ),
            Err(e) => warn!(kind = kind.as_str(), elapsed_ms, error = %e, "Statement failed"),
        }
        result
    }
}

/// Close a connection, ignoring errors raised while closing.
async fn release<C: Connection>(conn: C) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "Ignoring error while closing connection");
    }
}

// =============================================================================
// Engine-Specific Drivers
// =============================================================================
//
// The two modules below are kept parallel so differences stand out.

mod mysql {
    use super::*;
    use crate::db::normalize;
    use sqlx::Executor;
    use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};

    /// MySQL / MariaDB driver.
    pub struct MySqlDriver {
        options: MySqlConnectOptions,
    }

    impl MySqlDriver {
        pub fn new(settings: &ConnectionSettings) -> Self {
            let mut options = MySqlConnectOptions::new()
                .host(&settings.host)
                .port(settings.port)
                .username(&settings.user)
                .database(&settings.database);
            if !settings.password.is_empty() {
                options = options.password(&settings.password);
            }
            Self { options }
        }
    }

    #[async_trait]
    impl EngineDriver for MySqlDriver {
        fn engine(&self) -> Engine {
            Engine::MySql
        }

        async fn run(&self, statement: &str, kind: StatementKind) -> AgentResult<QueryResult> {
            let mut conn = MySqlConnection::connect_with(&self.options).await?;
            let outcome = run_on(&mut conn, statement, kind).await;
            release(conn).await;
            outcome
        }
    }

    async fn run_on(
        conn: &mut MySqlConnection,
        statement: &str,
        kind: StatementKind,
    ) -> AgentResult<QueryResult> {
        match kind {
            StatementKind::Read => {
                let rows = (&mut *conn).fetch_all(statement).await?;
                Ok(QueryResult::Rows(normalize::keyed_rows(&rows)))
            }
            StatementKind::Write => {
                // Dropping an uncommitted transaction rolls it back
                let mut tx = conn.begin().await?;
                (&mut *tx).execute(statement).await?;
                tx.commit().await?;
                Ok(QueryResult::success())
            }
        }
    }
}

mod postgres {
    use super::*;
    use crate::db::normalize;
    use sqlx::Executor;
    use sqlx::postgres::{PgConnectOptions, PgConnection};

    /// PostgreSQL driver.
    pub struct PostgresDriver {
        options: PgConnectOptions,
    }

    impl PostgresDriver {
        pub fn new(settings: &ConnectionSettings) -> Self {
            let mut options = PgConnectOptions::new()
                .host(&settings.host)
                .port(settings.port)
                .username(&settings.user)
                .database(&settings.database);
            if !settings.password.is_empty() {
                options = options.password(&settings.password);
            }
            Self { options }
        }
    }

    #[async_trait]
    impl EngineDriver for PostgresDriver {
        fn engine(&self) -> Engine {
            Engine::Postgres
        }

        async fn run(&self, statement: &str, kind: StatementKind) -> AgentResult<QueryResult> {
            let mut conn = PgConnection::connect_with(&self.options).await?;
            let outcome = run_on(&mut conn, statement, kind).await;
            release(conn).await;
            outcome
        }
    }

    async fn run_on(
        conn: &mut PgConnection,
        statement: &str,
        kind: StatementKind,
    ) -> AgentResult<QueryResult> {
        match kind {
            StatementKind::Read => {
                let rows = (&mut *conn).fetch_all(statement).await?;
                Ok(QueryResult::Rows(normalize::positional_rows(&rows)))
            }
            StatementKind::Write => {
                let mut tx = conn.begin().await?;
                (&mut *tx).execute(statement).await?;
                tx.commit().await?;
                Ok(QueryResult::success())
            }
        }
    }
}
