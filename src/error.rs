//! Session bridge error types

use thiserror::Error;

/// Session bridge error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frame or event codec error
    #[error("Codec error: {0}")]
    Codec(String),

    /// Pseudo-terminal error (spawn, resize, kill)
    #[error("PTY error: {0}")]
    Pty(String),

    /// Agent session error
    #[error("Session error: {0}")]
    Session(String),

    /// Agent producer error
    #[error("Agent error: {0}")]
    Agent(String),

    /// Transport error (socket closed, stream read failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for session bridge operations
pub type Result<T> = std::result::Result<T, Error>;
