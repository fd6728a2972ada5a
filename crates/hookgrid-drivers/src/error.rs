//! Error types for driver validation and execution.

use hookgrid_platform::PlatformError;
use thiserror::Error;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported by a [`crate::Driver`].
#[derive(Debug, Error)]
pub enum DriverError {
    /// Malformed or out-of-range configuration or payload. Always raised
    /// before any remote mutation.
    #[error("{0}")]
    Validation(String),

    /// The platform is not in a state the action can work from.
    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    NotFound(String),

    /// A platform call failed; its status code is passed through.
    #[error(transparent)]
    Remote(#[from] PlatformError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DriverError::Validation(msg.into())
    }

    /// HTTP status to surface for this error.
    pub fn status(&self) -> u16 {
        match self {
            DriverError::Validation(_) | DriverError::InvalidState(_) => 400,
            DriverError::NotFound(_) => 404,
            DriverError::Remote(e) => e.status(),
            DriverError::Internal(_) => 500,
        }
    }
}

/// Errors from looking up a driver by id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid driver {0}")]
    UnknownDriver(String),
}

impl RegistryError {
    pub fn status(&self) -> u16 {
        400
    }
}
