//! Core error types for tunplane

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the tunplane ecosystem
#[derive(Error, Debug)]
pub enum TpError {
    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by the routing engine.
///
/// The control plane never recovers from these locally; they reach the
/// caller exactly as the engine produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Engine could not be reached
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// Engine refused the request
    #[error("Engine rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Named group, proxy or provider does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Engine replied with something we could not decode
    #[error("Malformed engine response: {0}")]
    Decode(String),

    /// Operation is not available on this engine
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Persisted selection store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing file could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Store contents could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
