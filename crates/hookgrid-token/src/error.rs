//! Error types for token issuance and verification.

use thiserror::Error;

/// Result type alias for token operations.
pub type TokenResult<T> = Result<T, TokenError>;

/// Errors that can occur while issuing, verifying, or loading keys.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unexpected signing method: {0}")]
    Algorithm(String),

    #[error("signature verification failed")]
    Signature,

    #[error("invalid claims: {0}")]
    Claims(String),

    #[error("token encoding failed: {0}")]
    Encode(String),

    #[error("key error: {0}")]
    Key(String),
}

impl TokenError {
    /// Whether this error means the presented token must be rejected.
    ///
    /// Key and encoding failures are operator problems, not bad tokens.
    pub fn is_invalid_token(&self) -> bool {
        !matches!(self, TokenError::Encode(_) | TokenError::Key(_))
    }
}
