/// API route modules
pub mod formats;
pub mod health;
pub mod jobs;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

/// Build the HTTP router, with every route nested under `/api`
pub fn router(app_state: AppState) -> Router {
    let max_upload = app_state.config.server.max_upload_bytes;

    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/formats", get(formats::list_formats))
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::cancel_job))
        .route("/jobs/:id/artifact", get(jobs::fetch_artifact))
        .layer(DefaultBodyLimit::max(max_upload));

    Router::new()
        .nest("/api", routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
