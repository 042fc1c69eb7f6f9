//! DB Connector Agent - Main entry point.
//!
//! Connects a local MySQL/PostgreSQL database to a remote web app: picks a free
//! port, mints a session token, serves the query surface and publishes it
//! through an ngrok tunnel until the operator quits.

use clap::Parser;
use db_connector_agent::config::Config;
use db_connector_agent::console;
use db_connector_agent::db::DatabaseBridge;
use db_connector_agent::error::AgentResult;
use db_connector_agent::server::{AppState, HttpServer};
use db_connector_agent::session::Session;
use db_connector_agent::tunnel::{NgrokProvider, TunnelManager};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout belongs to the operator console.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: Config) -> AgentResult<()> {
    let connection = config.connection_settings()?;
    let range = config.port_range()?;
    let ngrok = NgrokProvider::new(config.ngrok_config()?)?;

    info!(
        engine = %connection.engine,
        target = %connection.display_target(),
        read_only = config.read_only,
        "Starting DB Connector Agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    let bridge = Arc::new(DatabaseBridge::new(&connection, config.bridge_options()));
    let session = Arc::new(Session::establish(connection, range).await?);
    let server = HttpServer::new(AppState::new(session.clone(), bridge), &config.bind_host);

    let shutdown = CancellationToken::new();
    console::spawn_signal_listener(shutdown.clone());
    if let Err(e) = console::spawn_quit_listener(shutdown.clone()) {
        warn!(error = %e, "Console unavailable, stop the agent with Ctrl+C");
    }

    let mut manager = TunnelManager::new(ngrok);
    manager.run(server, &session, shutdown).await
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    match run(config).await {
        Ok(()) => {
            println!("Connector stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Connector failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
