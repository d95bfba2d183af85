//! Error types for Reef.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while launching or talking to an external agent process.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Unknown agent: {name}")]
    NotFound { name: String },

    #[error("Agent {agent} does not support resuming sessions")]
    ResumeUnsupported { agent: String },

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to agent stdin: {0}")]
    Input(#[source] std::io::Error),
}

/// Snapshot store errors.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Console request errors.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Malformed request: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Result type alias for Reef.
pub type Result<T> = std::result::Result<T, Error>;
