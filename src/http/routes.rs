use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/ports", get(handlers::list_ports))
        // Session control
        .route("/session/setup", post(handlers::setup_session))
        .route("/session/start", post(handlers::start_reading))
        .route("/session/pause", post(handlers::pause))
        .route("/session/resume", post(handlers::resume))
        .route("/session/decision", post(handlers::decide))
        .route("/session/param", post(handlers::send_param))
        .route("/session/stop", post(handlers::stop))
        // Session queries
        .route("/session/status", get(handlers::status))
        .route("/session/events", get(handlers::events))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
