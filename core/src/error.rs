//! Error types for the irix library.

use thiserror::Error;

/// Top-level error type for irix operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure on an input or output stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or inconsistent index file (bad magic, wrong version,
    /// missing section, misaligned or out-of-range section contents).
    #[error("format error: {0}")]
    Format(String),

    /// Input data that cannot be turned into a valid index.
    #[error("data error: {0}")]
    Data(String),

    /// Per-query parse or evaluation failure. Non-fatal: the caller reports
    /// it and moves on to the next query.
    #[error("{0}")]
    Query(String),
}

/// Result type for irix operations.
pub type Result<T> = std::result::Result<T, Error>;
