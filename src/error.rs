//! Error types for the seek-ramp daemon.
//!
//! This module defines custom error enums for each component of the daemon,
//! providing descriptive error messages with context information.

use std::io::ErrorKind;
use thiserror::Error;

/// Errors related to the mpv JSON IPC connection.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to connect to mpv socket '{path}': {source}")]
    ConnectFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("mpv connection dropped unexpectedly")]
    ConnectionDropped,

    #[error("mpv rejected command {command}: {error}")]
    CommandFailed { command: String, error: String },

    #[error("mpv did not answer command {0} in time")]
    Timeout(String),

    #[error("Invalid client message: {0}")]
    InvalidMessage(String),

    #[error("Failed to encode or decode IPC message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl HostError {
    /// Whether waiting and reconnecting can make the error go away.
    ///
    /// A missing or refusing socket just means mpv is not running yet.
    pub fn is_retryable(&self) -> bool {
        match self {
            HostError::ConnectFailed { source, .. } => matches!(
                source.kind(),
                ErrorKind::NotFound | ErrorKind::ConnectionRefused
            ),
            _ => true,
        }
    }
}

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown configuration option '{0}'")]
    UnknownOption(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),
}

/// Top-level daemon errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("mpv host error: {0}")]
    Host(#[from] HostError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
