//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tutorhub_types::institution::MAX_DOCUMENT_BYTES;

use crate::http::handlers;
use crate::state::AppState;

/// Headroom over the largest document for the upload route's body limit.
const UPLOAD_BODY_SLACK: usize = 64 * 1024;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/wizards", post(handlers::wizard::create_wizard))
        .route(
            "/wizards/{id}",
            get(handlers::wizard::get_wizard).delete(handlers::wizard::close_wizard),
        )
        .route("/wizards/{id}/fields/{field}", put(handlers::wizard::update_field))
        // Navigation
        .route("/wizards/{id}/next", post(handlers::wizard::next_step))
        .route("/wizards/{id}/prev", post(handlers::wizard::prev_step))
        .route("/wizards/{id}/steps/{step}/goto", post(handlers::wizard::go_to_step))
        .route("/wizards/{id}/steps/{step}", delete(handlers::wizard::clear_step))
        // Persistence
        .route("/wizards/{id}/save", post(handlers::wizard::save_now))
        .route("/wizards/{id}/unload", post(handlers::wizard::unload))
        // Submission
        .route("/wizards/{id}/submit", post(handlers::wizard::submit))
        .route(
            "/wizards/{id}/documents/{field}",
            post(handlers::wizard::attach_document)
                .layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES as usize + UPLOAD_BODY_SLACK)),
        )
        .route("/wizards/{id}/otp/send", post(handlers::wizard::send_otp))
        .route("/wizards/{id}/otp/verify", post(handlers::wizard::verify_otp));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
