//! Core error types for the strata carving engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O operation against the underlying source failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before the structure was complete
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// The bytes at the candidate offset do not form a valid file
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Scanner was constructed with unusable parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CoreError {
    /// A rejection is recoverable: the engine moves on to the next candidate.
    /// Only real I/O failures abort a scan.
    #[inline]
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::UnexpectedEof | Self::InvalidFormat(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
