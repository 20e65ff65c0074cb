//! Error types for the watcher

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watch handle error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WatchError>;
