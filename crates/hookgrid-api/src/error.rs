//! API error resource.
//!
//! Every failure is rendered as
//! `{"type":"error","statusCode":N,"status":"<reason>","message":"..."}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hookgrid_drivers::{DriverError, RegistryError};
use hookgrid_platform::PlatformError;
use hookgrid_token::TokenError;
use serde_json::json;
use tracing::{error, warn};

/// An error ready to be sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Use a status code reported by a lower layer.
    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, message)
    }
}

/// Build the JSON error resource for `status`.
pub fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(json!({
            "type": "error",
            "statusCode": status.as_u16(),
            "status": status.canonical_reason().unwrap_or("Server Error"),
            "message": msg,
        })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %self.message, "request failed");
        } else {
            warn!(status = self.status.as_u16(), error = %self.message, "request rejected");
        }
        error_response(&self.message, self.status)
    }
}

impl From<DriverError> for ApiError {
    fn from(e: DriverError) -> Self {
        Self::with_code(e.status(), e.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self::with_code(e.status(), e.to_string())
    }
}

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        Self::with_code(e.status(), e.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        if e.is_invalid_token() {
            Self::bad_request(format!("invalid token: {e}"))
        } else {
            Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_layer_codes_pass_through() {
        let err = ApiError::from(PlatformError::Status {
            code: 422,
            message: "unprocessable".into(),
        });
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);

        let err = ApiError::from(DriverError::Internal("boom".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::from(TokenError::Signature).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(TokenError::Key("missing".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::with_code(42, "odd").status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_resource_shape() {
        let resp = ApiError::forbidden("revoked").into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
