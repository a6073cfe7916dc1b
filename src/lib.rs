//! Content-safety relay for the BantAI Buddy browser extension.
//!
//! A chat message posted to `/api/analyze` is classified by an Azure OpenAI deployment; severe
//! findings are emailed to the guardian through Azure Communication Services.

pub mod analysis;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod email;
pub mod error;
pub mod introspection;
pub mod notify;
pub mod origin;
pub mod routes;
pub mod secrets;
pub mod startup;
pub mod state;
pub mod status;

pub use state::AppState;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/analyze", post(routes::analyze))
        .route("/api/schema", get(routes::get_schema))
        .route("/health", get(routes::health))
        .route("/status", get(status::get_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            origin::restrict_origin,
        ))
        .with_state(state)
}
