//! Error taxonomy for the check
//!
//! Fetch failures are recoverable and degrade a single phase of the cycle;
//! configuration errors are fatal at startup.

use thiserror::Error;

/// Failure talking to an upstream HTTP endpoint
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection failure or timeout
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Non-success HTTP status
    #[error("unexpected status {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    /// Body could not be decoded into the expected schema
    #[error("malformed response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

/// Fatal configuration problem detected at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("either host or derive_host must be set")]
    MissingHost,

    #[error("derive_host requires in-cluster API access: {0}")]
    InClusterUnavailable(String),
}
