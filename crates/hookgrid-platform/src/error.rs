//! Error types for platform calls.

use thiserror::Error;

/// Result type alias for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors returned by a [`crate::PlatformClient`].
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The platform answered with a non-success status.
    #[error("platform returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl PlatformError {
    /// HTTP status to surface for this error.
    ///
    /// Remote status codes pass through verbatim; everything else is a 500.
    pub fn status(&self) -> u16 {
        match self {
            PlatformError::Status { code, .. } => *code,
            _ => 500,
        }
    }
}
