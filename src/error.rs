//! Podcoord Error Types

use thiserror::Error;

/// Result type alias for podcoord operations
pub type Result<T> = std::result::Result<T, Error>;

/// Podcoord error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Coordination errors
    #[error("Registration rejected for {pod_id}: {reason}")]
    RegistrationRejected { pod_id: String, reason: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from {url}: HTTP {status}")]
    UnexpectedStatus { url: String, status: u16 },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable on the next heartbeat cycle
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::Http(_)
                | Error::UnexpectedStatus { .. }
                | Error::RegistrationRejected { .. }
        )
    }
}
