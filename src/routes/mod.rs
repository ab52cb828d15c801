pub mod api;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::handlers::api::health_check;
use crate::state::AppState;

/// Public health route plus the assessment API, bound to `state`.
///
/// Cross-cutting layers (CORS, security headers) are applied by the binary.
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(health_check))
        .merge(api::create_api_router(max_upload_bytes))
        .with_state(state)
}
