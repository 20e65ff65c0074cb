//! Error types for archive parsing

use std::path::PathBuf;
use thiserror::Error;

/// Archive parse error
#[derive(Debug, Error)]
pub enum PkgError {
    #[error("invalid magic number: {0:#010x}")]
    InvalidMagic(u32),

    #[error("{what} out of bounds: need {need} bytes at offset {offset:#x}, have {have}")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: u64,
    },

    #[error("missing required entry {id:#x}")]
    MissingEntry { id: u32 },

    #[error("{field} is not valid UTF-8")]
    Encoding { field: &'static str },

    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PkgError>;
