//! Database bridge.
//!
//! This module provides the only engine-aware code in the agent:
//! - Statement execution over a fresh connection per call
//! - Row normalisation into column-keyed objects
//! - Column type to JSON mappings

pub mod executor;
pub mod normalize;
pub mod types;

pub use executor::{BridgeOptions, DatabaseBridge, EngineDriver, MySqlDriver, PostgresDriver};
