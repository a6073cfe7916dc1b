use crate::analysis::{AnalysisRequest, AnalysisResult, AnalyzeResponse};
use crate::error::ApiError;
use crate::introspection;
use crate::notify::{self, NotificationDecision, RequestContext};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `POST /api/analyze`: classify one chat message and, when warranted, notify the guardian.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Response {
    // A body we cannot read is indistinguishable from one without messageText.
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable analyze body");
            AnalysisRequest::default()
        }
    };

    let Some(message_text) = request.message_text() else {
        return ApiError::MissingMessageText.into_response();
    };

    let analysis = match state.classifier.classify(message_text).await {
        Ok(analysis) => analysis,
        Err(e) if e.is_content_filter() => {
            warn!(error = %e, "backend analysis error: content filter triggered");
            let resp = AnalyzeResponse::from(AnalysisResult::content_filtered());
            return (StatusCode::OK, Json(resp)).into_response();
        }
        Err(e) => {
            error!(error = %e, "backend analysis error");
            return ApiError::AnalysisFailed.into_response();
        }
    };

    let context = RequestContext::parse(request.context.as_deref());
    match notify::decide(&analysis, request.parent_email(), context) {
        NotificationDecision::Send { recipient } if state.notifications.enabled => {
            info!(recipient = %recipient, "high severity detected; preparing email");
            let message = notify::build_message(
                &state.notifications.sender_address,
                recipient,
                &analysis,
                message_text,
            );
            notify::dispatch(state.email.clone(), message);
        }
        NotificationDecision::Send { recipient } => {
            info!(recipient = %recipient, "high severity detected; notifications disabled");
        }
        NotificationDecision::SuppressedSidebar => {
            info!("high severity detected in sidebar; no email sent per configuration");
        }
        NotificationDecision::Skip => {}
    }

    (StatusCode::OK, Json(AnalyzeResponse::from(analysis))).into_response()
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "ok": true })))
}

pub async fn get_schema() -> impl IntoResponse {
    (StatusCode::OK, Json(introspection::analysis_schema()))
}
