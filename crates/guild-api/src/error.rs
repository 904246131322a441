//! Invocation failures surfaced by the gateway.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Why a `/hello` invocation did not produce a greeting.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    /// The handler panicked or no slot could be started.
    #[error("handler fault: {0}")]
    Fault(String),

    #[error("invocation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl InvocationError {
    pub fn status(&self) -> StatusCode {
        match self {
            InvocationError::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InvocationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for InvocationError {
    fn into_response(self) -> Response {
        // Fault details stay in the logs.
        let message = match &self {
            InvocationError::Fault(_) => "internal error".to_string(),
            InvocationError::Timeout(_) => self.to_string(),
        };
        (self.status(), Json(serde_json::json!({ "error": message }))).into_response()
    }
}
