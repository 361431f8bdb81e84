//! Gateway error taxonomy.
//!
//! Mirrors the kinds in spec §7. Each variant knows the HTTP status it
//! surfaces as; the web crate is responsible for rendering the body.

use thiserror::Error;

/// Result type used throughout the core crate.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors produced by the submission/retrieval core.
///
/// Errors raised by compute workers themselves never become a
/// `GatewayError` — they surface inside a `ProgramOutput` with
/// `success: false` instead.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A batch submission exceeded `max_batch_inputs`.
    #[error("cannot submit more than {limit} inputs at once")]
    BatchTooLarge { limit: usize },

    /// `program == bigchem` with a calctype other than `hessian`.
    #[error("calctype '{calctype}' not supported for bigchem; supported: {supported}")]
    UnsupportedCalcType {
        calctype: String,
        supported: String,
    },

    /// A submission carried an option name this gateway does not recognize.
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// A task id did not match the canonical UUID v4 form.
    #[error("invalid task id '{0}'")]
    InvalidTaskId(String),

    /// `get_dag` reported no such id; either never existed or already
    /// consumed by a prior retrieval.
    #[error("result has already been deleted from server")]
    ResultNotFound,

    /// The broker rejected or could not be reached for task submission.
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The result backend could not be reached or returned an I/O error.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Missing/expired/malformed bearer token.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Bearer token lacks a required scope.
    #[error("insufficient scope: missing '{0}'")]
    InsufficientScope(String),

    /// The upstream OIDC provider rejected a token exchange.
    #[error("upstream OAuth error ({status}): {body}")]
    UpstreamOAuthError { status: u16, body: String },

    /// Request body failed schema validation (unknown fields, wrong shape).
    #[error("schema violation: {0}")]
    SchemaViolation(String),
}

impl GatewayError {
    /// Whether this error kind is safe to surface as 5xx after attempting
    /// best-effort cleanup, per spec §4.5/§7.
    pub fn is_broker_or_backend_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::BrokerUnavailable(_) | GatewayError::BackendUnavailable(_)
        )
    }
}
