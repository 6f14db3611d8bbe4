//! Common error types for Sheetwatch components.

use std::fmt;

/// A specialized Result type for Sheetwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Sheetwatch operations.
///
/// Probe-local failures (unreachable targets, bad URLs, timeouts) are
/// never represented here: they are mapped to status strings and travel
/// as data. These variants cover collaborator failures, which are fatal
/// to the current reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Row source error: {0}")]
    RowSource(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Display update error: {0}")]
    Display(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new row source error.
    pub fn row_source(msg: impl fmt::Display) -> Self {
        Error::RowSource(msg.to_string())
    }

    /// Create a new persistence error.
    pub fn persistence(msg: impl fmt::Display) -> Self {
        Error::Persistence(msg.to_string())
    }

    /// Create a new notification error.
    pub fn notification(msg: impl fmt::Display) -> Self {
        Error::Notification(msg.to_string())
    }

    /// Create a new display update error.
    pub fn display(msg: impl fmt::Display) -> Self {
        Error::Display(msg.to_string())
    }

    /// Create a new credential error.
    pub fn credential(msg: impl fmt::Display) -> Self {
        Error::Credential(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }
}
