use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::response::ErrorBody;

/// The error taxonomy of §7: every failure an orchestrator or handler can
/// raise, each carrying its own HTTP mapping and user-safe message.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("no face detected in identity document")]
    NoFaceInId,

    #[error("no face detected in selfie")]
    NoFaceInSelfie,

    #[error("required stage not ready: {0}")]
    NotReady(String),

    #[error("challenge not found or expired")]
    ChallengeNotFound,

    #[error("challenge signature invalid")]
    SignatureInvalid,

    #[error("request deadline exceeded")]
    Timeout,

    #[error("inference backend failure: {0}")]
    BackendFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::BadInput(_) => "BAD_INPUT",
            AppError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            AppError::NoFaceInId => "NO_FACE_IN_ID",
            AppError::NoFaceInSelfie => "NO_FACE_IN_SELFIE",
            AppError::NotReady(_) => "NOT_READY",
            AppError::ChallengeNotFound => "CHALLENGE_NOT_FOUND",
            AppError::SignatureInvalid => "SIGNATURE_INVALID",
            AppError::Timeout => "TIMEOUT",
            AppError::BackendFailure(_) => "BACKEND_FAILURE",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadInput(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NoFaceInId | AppError::NoFaceInSelfie => StatusCode::BAD_REQUEST,
            AppError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ChallengeNotFound => StatusCode::BAD_REQUEST,
            AppError::SignatureInvalid => StatusCode::BAD_REQUEST,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::BackendFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client: no stack traces, no internal ids.
    fn public_message(&self) -> String {
        match self {
            AppError::NoFaceInId => "No face detected in the identity document image".to_string(),
            AppError::NoFaceInSelfie => "No face detected in the selfie image".to_string(),
            AppError::NotReady(stage) => format!("Service not ready: {stage} stage not loaded"),
            AppError::BackendFailure(_) => "An inference backend failure occurred".to_string(),
            AppError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::BackendFailure(msg) | AppError::Internal(msg) => {
                tracing::error!(error = %msg, code = self.code(), "request failed");
            }
            other => {
                tracing::warn!(code = other.code(), "request rejected");
            }
        }

        let body = ErrorBody::new(self.code(), self.public_message());
        (self.status(), Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
