//! Error types for run orchestration.
//!
//! Validation failures never reach the network. Transport failures keep the
//! raw response body so it can be shown to the user as-is.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller-supplied input is insufficient.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Transport { status: u16, body: String },

    /// The request never produced a response (connect, TLS, body read).
    #[error("transport failure: {0}")]
    Http(#[from] reqwest::Error),

    /// A response did not have the expected shape.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The event stream stopped making progress before a terminal event.
    #[error("run {run_id} stalled: {reason}")]
    Stalled { run_id: String, reason: String },

    #[error("cannot {action} while run is {state}")]
    InvalidState { action: &'static str, state: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// True for failures of the request itself, whether or not a response came back.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Http(_))
    }
}
