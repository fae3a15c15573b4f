use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub const BUSY_MESSAGE: &str = "We are a bit busy right now. Please try again later.";
pub const RATE_EXCEEDED_MESSAGE: &str = "Rate limit exceeded. Please try again later";

/// Errors produced by the admission-control and short-code components.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Bad construction parameters. Fatal for the component being built.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A store or the distinct-client table is full.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A window or token limit was reached.
    #[error("Rate limit exceeded")]
    RateExceeded,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GateError>;

impl From<envconfig::Error> for GateError {
    fn from(err: envconfig::Error) -> Self {
        GateError::Configuration(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_gate_error(err: &GateError) -> Self {
        match err {
            GateError::Validation(msg) => Self::new("service_unavailable", msg, 503),
            GateError::CapacityExceeded(_) => Self::new("capacity_exceeded", BUSY_MESSAGE, 429),
            GateError::RateExceeded => Self::new("rate_limit_exceeded", RATE_EXCEEDED_MESSAGE, 429),
            GateError::NotFound(msg) => Self::new("not_found", msg, 404),
            GateError::InvalidRequest(msg) => Self::new("bad_request", msg, 400),
            GateError::Unauthorized(msg) => Self::new("unauthorized", msg, 401),
            GateError::Configuration(msg) => Self::new("service_unavailable", msg, 503),
            GateError::Internal(_) => Self::new(
                "internal_error",
                "Something broke on our end. Please try again later.",
                500,
            ),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_gate_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
