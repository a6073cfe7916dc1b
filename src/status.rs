use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Only include non-secret runtime data.
    let v = json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "allowed_origin": state.allowed_origin,
        "completion": {
            "deployment": state.upstream.deployment,
            "api_version": state.upstream.api_version,
            "timeout_secs": state.upstream.timeout_secs,
            "sampling": state.classifier.sampling(),
        },
        "notification": {
            "enabled": state.notifications.enabled,
        },
    });

    (StatusCode::OK, Json(v)).into_response()
}
