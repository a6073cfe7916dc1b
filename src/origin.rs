use crate::{error::ApiError, state::AppState};
use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
        },
        HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Restrict browser callers to the configured extension origin.
///
/// Requests without an `Origin` header (curl, server-to-server) pass through untouched.
/// Preflights from the allowed origin are answered here and never reach a handler.
pub async fn restrict_origin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(origin) = req.headers().get(ORIGIN).cloned() else {
        return next.run(req).await;
    };

    if origin.as_bytes() != state.allowed_origin.as_bytes() {
        warn!(
            origin = %String::from_utf8_lossy(origin.as_bytes()),
            path = %req.uri().path(),
            "rejected request from disallowed origin"
        );
        return ApiError::OriginNotAllowed.into_response();
    }

    let mut resp = if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        let h = resp.headers_mut();
        h.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET,HEAD,POST,OPTIONS"),
        );
        h.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("content-type"),
        );
        resp
    } else {
        next.run(req).await
    };

    let h = resp.headers_mut();
    h.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    h.insert(VARY, HeaderValue::from_static("Origin"));
    resp
}
