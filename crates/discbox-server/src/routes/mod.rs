pub mod health;
pub mod jobs;
pub mod sync;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/jobs",
            post(jobs::create_job)
                .get(jobs::list_jobs)
                .delete(jobs::clear_jobs),
        )
        .route("/api/jobs/stream", get(jobs::stream_jobs))
        .route("/api/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/api/jobs/{id}", delete(jobs::delete_job))
        .route("/api/sync", post(sync::sync))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
