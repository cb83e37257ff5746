//! Simulator error types

use std::time::Duration;
use thiserror::Error;

/// Simulator errors
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("Send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("Connection already closed")]
    Closed,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimulatorError>;
