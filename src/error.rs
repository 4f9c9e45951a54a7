//! Error types for the collector, the sink clients, and the control surface.

use std::path::PathBuf;
use thiserror::Error;

/// Reasons a collection tick did not deliver a batch.
///
/// None of these are fatal: the supervisor logs them and waits for the
/// next tick.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("configuration incomplete: {0} is not set")]
    ConfigIncomplete(&'static str),

    #[error("failed to read settings: {0}")]
    Settings(String),

    #[error("no data directory found for '{resource}' (checked: {checked:?})")]
    DiscoveryNotFound {
        resource: String,
        checked: Vec<PathBuf>,
    },

    #[error("filesystem task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl CollectorError {
    /// Whether the tick was skipped before any data was produced.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            CollectorError::ConfigIncomplete(_)
                | CollectorError::Settings(_)
                | CollectorError::DiscoveryNotFound { .. }
        )
    }
}

/// Failures talking to the remote time-series sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sink rejected request: status {status}, body: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced synchronously to a caller of the control surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid action '{0}'")]
    UnknownAction(String),

    #[error("interval must be at least one second")]
    InvalidInterval,

    #[error("invalid action or already in requested state (monitoring: {running})")]
    InapplicableAction { running: bool },

    #[error("invalid request body: {0}")]
    MalformedRequest(String),
}
