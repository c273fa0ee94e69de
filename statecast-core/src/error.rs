//! Error types for statecast-core

use thiserror::Error;

/// Main error type for the statecast-core library
///
/// Errors only surface from construction and setup calls. Once a
/// [`StateReporter`](crate::StateReporter) is running, delivery failures end
/// at the worker boundary as log records.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP transport error (connect failure, timeout, broken body)
    #[error("transport error: {0}")]
    Transport(String),

    /// The reporter already received its game identity
    #[error("reporter already initialized for game {0}")]
    AlreadyInitialized(u64),

    /// Game identity rejected during bootstrap
    #[error("invalid game identity: {0}")]
    InvalidIdentity(String),
}

/// Result type alias for statecast-core
pub type Result<T> = std::result::Result<T, Error>;
