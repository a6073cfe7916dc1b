use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to HTTP callers.
///
/// The display text is the exact `error` string callers receive; upstream detail is logged by
/// the handler and never carried here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Message text is required.")]
    MissingMessageText,
    #[error("Failed to analyze message.")]
    AnalysisFailed,
    #[error("Not allowed by CORS")]
    OriginNotAllowed,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingMessageText => StatusCode::BAD_REQUEST,
            Self::AnalysisFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::OriginNotAllowed => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
