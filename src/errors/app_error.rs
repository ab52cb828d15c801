use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::core::assessment::AssessmentError;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request is malformed or incomplete (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The upload exceeds the configured body limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// The assessment engine failed
    #[error(transparent)]
    Assessment(#[from] AssessmentError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Status code, machine-readable code and client-facing message.
    ///
    /// Provider and protocol details stay in the logs; clients get a generic
    /// message for upstream failures.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            Self::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            Self::Assessment(err) => match err {
                AssessmentError::ProtocolTimeout(_) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "ASSESSMENT_TIMEOUT",
                    "Assessment timed out".to_string(),
                ),
                AssessmentError::InvalidAudio(msg) => {
                    (StatusCode::BAD_REQUEST, "INVALID_AUDIO", msg.clone())
                }
                AssessmentError::ConfigurationError(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "Assessment service is not configured correctly".to_string(),
                ),
                AssessmentError::ProviderError { .. }
                | AssessmentError::UnparseableResult(_)
                | AssessmentError::AllChunksFailed { .. }
                | AssessmentError::ConnectionFailed(_)
                | AssessmentError::NetworkError(_) => (
                    StatusCode::BAD_GATEWAY,
                    "ASSESSMENT_FAILED",
                    "Assessment failed".to_string(),
                ),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
