//! Integration tests for the tunnel lifecycle.
//!
//! A fake provider records what happens to the tunnel and probes the local
//! surface when asked to open, so the tests can check ordering end to end.

mod common;

use async_trait::async_trait;
use common::{FakeDriver, TOKEN, state};
use db_connector_agent::db::BridgeOptions;
use db_connector_agent::error::{AgentError, AgentResult};
use db_connector_agent::server::HttpServer;
use db_connector_agent::tunnel::{TunnelHandle, TunnelManager, TunnelProvider, TunnelState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeProvider {
    events: Arc<Mutex<Vec<String>>>,
    fail_open: bool,
    /// Never finishes opening, like a provider whose API stopped answering.
    stall_open: bool,
    /// Cancelled as soon as the tunnel is open.
    quit_after_open: Option<CancellationToken>,
    opened_port: Option<oneshot::Sender<u16>>,
}

impl FakeProvider {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

#[async_trait]
impl TunnelProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn open(&mut self, local_port: u16) -> AgentResult<TunnelHandle> {
        // The surface must already be serving when the tunnel is requested
        let health = reqwest::get(format!("http://127.0.0.1:{}/health", local_port))
            .await
            .map(|r| r.status().as_u16())
            .unwrap_or(0);
        self.record(format!("health:{}", health));

        if self.stall_open {
            std::future::pending::<()>().await;
        }
        if self.fail_open {
            return Err(AgentError::tunnel("authentication failed: invalid authtoken"));
        }
        self.record("open");

        if let Some(tx) = self.opened_port.take() {
            let _ = tx.send(local_port);
        }
        if let Some(token) = &self.quit_after_open {
            token.cancel();
        }
        Ok(TunnelHandle::new("https://fake.tunnel.test", "fake-tunnel"))
    }

    async fn close(&mut self, handle: TunnelHandle) -> AgentResult<()> {
        self.record(format!("close:{}", handle.name()));
        Ok(())
    }
}

fn server(driver: FakeDriver) -> (HttpServer, Arc<db_connector_agent::Session>) {
    let state = state(driver, BridgeOptions::default(), 0);
    let session = state.session.clone();
    (HttpServer::new(state, "127.0.0.1"), session)
}

#[tokio::test]
async fn test_full_lifecycle() {
    let shutdown = CancellationToken::new();
    let provider = FakeProvider {
        quit_after_open: Some(shutdown.clone()),
        ..FakeProvider::default()
    };
    let (server, session) = server(FakeDriver::default());

    let mut manager = TunnelManager::new(provider);
    assert_eq!(manager.state(), TunnelState::Unstarted);

    let result = manager.run(server, &session, shutdown).await;
    assert!(result.is_ok(), "run failed: {:?}", result);
    assert_eq!(manager.state(), TunnelState::Closed);
    assert!(manager.public_url().is_none());
    assert_eq!(
        manager.provider().events(),
        vec!["health:200", "open", "close:fake-tunnel"]
    );
}

#[tokio::test]
async fn test_open_failure_is_fatal_and_stops_server() {
    let provider = FakeProvider {
        fail_open: true,
        ..FakeProvider::default()
    };
    let (server, session) = server(FakeDriver::default());

    let mut manager = TunnelManager::new(provider);
    let err = manager
        .run(server, &session, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Tunnel { .. }));
    assert!(err.is_fatal());
    assert_eq!(manager.state(), TunnelState::Closed);
    assert_eq!(manager.provider().events(), vec!["health:200"]);
}

#[tokio::test]
async fn test_listener_released_after_shutdown() {
    let shutdown = CancellationToken::new();
    let (port_tx, port_rx) = oneshot::channel();
    let provider = FakeProvider {
        quit_after_open: Some(shutdown.clone()),
        opened_port: Some(port_tx),
        ..FakeProvider::default()
    };
    let (server, session) = server(FakeDriver::default());

    let mut manager = TunnelManager::new(provider);
    manager.run(server, &session, shutdown).await.unwrap();

    let port = port_rx.await.unwrap();
    assert!(
        tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_err(),
        "port {port} still accepting connections"
    );
}

#[tokio::test]
async fn test_in_flight_request_completes_during_shutdown() {
    let shutdown = CancellationToken::new();
    let (port_tx, port_rx) = oneshot::channel();
    let provider = FakeProvider {
        opened_port: Some(port_tx),
        ..FakeProvider::default()
    };
    let (server, session) = server(FakeDriver::slow(Duration::from_millis(500)));

    let run_shutdown = shutdown.clone();
    let run = tokio::spawn(async move {
        let mut manager = TunnelManager::new(provider);
        let result = manager.run(server, &session, run_shutdown).await;
        (result, manager.state())
    });

    let port = port_rx.await.unwrap();
    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/query", port))
            .header("X-API-TOKEN", TOKEN)
            .json(&serde_json::json!({"query": "SELECT 1"}))
            .send()
            .await
            .map(|r| r.status().as_u16())
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    assert_eq!(request.await.unwrap().unwrap(), 200);
    let (result, state) = run.await.unwrap();
    assert!(result.is_ok());
    assert_eq!(state, TunnelState::Closed);
}

#[tokio::test]
async fn test_grace_period_bounds_shutdown() {
    let shutdown = CancellationToken::new();
    let (port_tx, port_rx) = oneshot::channel();
    let provider = FakeProvider {
        opened_port: Some(port_tx),
        ..FakeProvider::default()
    };
    let (server, session) = server(FakeDriver::slow(Duration::from_secs(30)));

    let run_shutdown = shutdown.clone();
    let run = tokio::spawn(async move {
        let mut manager =
            TunnelManager::new(provider).with_grace_period(Duration::from_millis(200));
        manager.run(server, &session, run_shutdown).await
    });

    let port = port_rx.await.unwrap();
    tokio::spawn(async move {
        let _ = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/query", port))
            .header("X-API-TOKEN", TOKEN)
            .json(&serde_json::json!({"query": "SELECT pg_sleep(30)"}))
            .send()
            .await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("shutdown exceeded the grace period")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_while_tunnel_is_opening() {
    let shutdown = CancellationToken::new();
    let provider = FakeProvider {
        stall_open: true,
        ..FakeProvider::default()
    };
    let events = provider.events.clone();
    let (server, session) = server(FakeDriver::default());

    let run_shutdown = shutdown.clone();
    let run = tokio::spawn(async move {
        let mut manager = TunnelManager::new(provider);
        let result = manager.run(server, &session, run_shutdown).await;
        (result, manager.state())
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();

    let (result, state) = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("shutdown waited on the stalled tunnel")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(state, TunnelState::Closed);
    assert_eq!(*events.lock().unwrap(), vec!["health:200".to_string()]);
}
