//! DB Connector Agent Library
//!
//! This library lets an operator expose a private MySQL or PostgreSQL database to
//! a remote web application: a token-gated HTTP surface executes single SQL
//! statements and returns normalized JSON, published through a public tunnel.

pub mod auth;
pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod models;
pub mod server;
pub mod session;
pub mod tunnel;

pub use config::Config;
pub use db::DatabaseBridge;
pub use error::{AgentError, AgentResult};
pub use server::{AppState, HttpServer};
pub use session::Session;
pub use tunnel::{TunnelManager, TunnelProvider, TunnelState};
