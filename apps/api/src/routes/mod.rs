pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::evaluation::handlers;
use crate::state::AppState;

/// Headroom above the upload limit for the job description and multipart framing.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/evaluations",
            post(handlers::handle_evaluate_upload),
        )
        .route(
            "/api/v1/evaluations/text",
            post(handlers::handle_evaluate_text),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
