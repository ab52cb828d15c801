use axum::{Router, extract::DefaultBodyLimit, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::assess;
use crate::state::AppState;
use std::sync::Arc;

/// Create the assessment API router
///
/// Uploads above `max_upload_bytes` are rejected with 413 before any
/// provider session is opened.
pub fn create_api_router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/assess", post(assess::assess_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}
