//! Error types for the remote client

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server replied with a status the current command cannot accept.
    /// Carries the raw reply line for diagnosis.
    #[error("server responded with {reply:?}")]
    UnexpectedReply { reply: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RemoteError>;
