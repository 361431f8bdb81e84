//! HTTP error rendering.
//!
//! Wraps `chemgate_core::GatewayError` and renders it per the error
//! taxonomy in §7, onto status codes. Shaped after `oya_web::error::
//! AppError` (thiserror enum + `IntoResponse`), but the payload is a
//! flat `{"detail": ...}` body matching `original_source`'s FastAPI
//! `HTTPException` responses rather than RFC 7807 Problem Details, since
//! that's the wire contract callers of this gateway already depend on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chemgate_core::GatewayError;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Gateway(e) => status_for_gateway_error(e),
        }
    }
}

/// Mirrors the exit-code table in §7 exactly, including the choice of a
/// flat 500 (not 503) for broker/backend failures — revocation was
/// already attempted, so this is a server error, not a transient-retry
/// signal.
fn status_for_gateway_error(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        GatewayError::UnsupportedCalcType { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::UnknownOption(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::InvalidTaskId(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::ResultNotFound => StatusCode::GONE,
        GatewayError::BrokerUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::BackendUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::AuthFailure(_) => StatusCode::UNAUTHORIZED,
        GatewayError::InsufficientScope(_) => StatusCode::FORBIDDEN,
        GatewayError::UpstreamOAuthError { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        GatewayError::SchemaViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}
