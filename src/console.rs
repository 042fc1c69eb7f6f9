//! Operator console.
//!
//! Everything the operator sees goes to stdout (logs go to stderr): the
//! connection announcement and the quit prompt. Shutdown can be requested by
//! typing a quit command or by SIGINT/SIGTERM; both cancel the same token.

use crate::session::Session;
use std::io::{self, BufRead, Write};
use std::net::{IpAddr, UdpSocket};
use std::thread::JoinHandle;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const QUIT_PROMPT: &str = "Type 'q' and press Enter to quit.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Quit,
}

/// Parse one console line. Anything unrecognised is ignored.
pub fn parse_command(line: &str) -> Option<OperatorCommand> {
    let line = line.trim();
    ["q", "quit", "exit"]
        .iter()
        .any(|cmd| line.eq_ignore_ascii_case(cmd))
        .then_some(OperatorCommand::Quit)
}

/// Discover the LAN address by "connecting" a UDP socket. No packet is sent.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Render the connection announcement.
pub fn announcement(session: &Session, public_url: &str, lan_ip: Option<IpAddr>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nConnector ready for {} database '{}'\n",
        session.engine(),
        session.database()
    ));
    out.push_str(&format!("Public URL: {}\n", public_url));
    out.push_str(&format!(
        "API Token (keep this secret!): {}\n",
        session.token().expose()
    ));
    if let Some(ip) = lan_ip {
        out.push_str(&format!("Local URL: http://{}:{}\n", ip, session.local_port()));
    }
    out.push_str("Enter the public URL and token in the web app to connect.\n");
    out.push_str("Keep this window open while you work.\n");
    out
}

/// Print the announcement and the quit prompt.
pub fn announce(session: &Session, public_url: &str) {
    let mut stdout = io::stdout().lock();
    let _ = write!(stdout, "{}", announcement(session, public_url, local_ip()));
    let _ = writeln!(stdout, "{}", QUIT_PROMPT);
    let _ = stdout.flush();
}

/// Read commands from `input` until a quit command or end of input.
///
/// Returns true when a quit command cancelled `shutdown`.
pub fn quit_loop<R: BufRead>(input: R, shutdown: &CancellationToken) -> bool {
    for line in input.lines() {
        match line {
            Ok(line) => match parse_command(&line) {
                Some(OperatorCommand::Quit) => {
                    println!("Shutting down connector and tunnel...");
                    shutdown.cancel();
                    return true;
                }
                None if !line.trim().is_empty() => println!("{}", QUIT_PROMPT),
                None => {}
            },
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                return false;
            }
        }
        if shutdown.is_cancelled() {
            return false;
        }
    }
    debug!("Console input closed, quit command unavailable");
    false
}

/// Run the quit loop on stdin in a dedicated thread.
///
/// Stdin reads block, so the thread is never joined; it dies with the process.
pub fn spawn_quit_listener(shutdown: CancellationToken) -> io::Result<JoinHandle<bool>> {
    std::thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || quit_loop(io::stdin().lock(), &shutdown))
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
pub fn spawn_signal_listener(shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                println!("\nInterrupted. Shutting down connector and tunnel...");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    })
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
