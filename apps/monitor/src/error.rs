use std::io::Error as IoError;

use thiserror::Error;

/// Failure to read or parse the dashboard's configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("configuration document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure to read or write the durable history snapshot. Never fatal: an
/// unreadable snapshot at startup means "no history yet", and a failed write
/// is logged and retried at the next cadence point.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("history snapshot is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure to hand a message to the delivery channel. Logged by the
/// dispatcher and dropped; never retried, never reflected in history.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification channel unavailable: {0}")]
    ChannelUnavailable(String),
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}
