use std::path::PathBuf;
use thiserror::Error;

/// Runtime failures raised inside the long-running loops.
///
/// All of these are recoverable: the loop that hits one reports it, backs off
/// and keeps going. Startup problems live in [`crate::config::ConfigError`].
#[derive(Debug, Error)]
pub enum WatchError {
    /// Node unreachable, IPC socket gone, or a request timed out
    #[error("node unreachable: {0}")]
    Connectivity(String),

    /// Block or transaction payload missing or malformed
    #[error("malformed node data: {0}")]
    Data(String),

    /// A durable document could not be read or replaced
    #[error("store failure on {}: {reason}", path.display())]
    Store { path: PathBuf, reason: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Outbound alert could not be delivered
    #[error("notification failed: {0}")]
    Notify(String),
}

impl WatchError {
    pub fn store(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        WatchError::Store {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
