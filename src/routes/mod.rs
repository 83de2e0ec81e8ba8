//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - survey submissions under `/api/survey/...` (the original wire paths)
/// - session surface under `/api/session/...`
/// - assistant proxy and sandbox run endpoints
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: AppState) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/health", get(http::http_health))
        .route("/api/variants", get(http::http_get_variants))
        // Survey submissions (wire contract paths)
        .route("/api/survey/start", post(http::http_start_survey))
        .route("/api/survey/pre-task", post(http::http_submit_pre))
        .route("/api/survey/task-result", post(http::http_task_result))
        .route("/api/survey/post-task", post(http::http_submit_post))
        .route("/api/survey/overall", post(http::http_submit_overall))
        // Assistant + sandbox
        .route("/api/assistant", post(http::http_assistant))
        .route("/api/run", post(http::http_run))
        // Session surface
        .route("/api/session/:participant_id", get(http::http_get_session))
        .route(
            "/api/session/:participant_id/advance",
            post(http::http_advance),
        )
        .route("/api/session/:participant_id/file", post(http::http_update_file))
        .route(
            "/api/session/:participant_id/active-file",
            post(http::http_set_active_file),
        )
        .route("/api/session/:participant_id/retry", post(http::http_retry))
        .route("/api/session/:participant_id/quit", post(http::http_quit))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
