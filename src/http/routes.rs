use super::handlers;
use super::socket;
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
        // Live session protocol
        .route("/ws/audio", get(socket::ws_audio))
        // Session queries
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/sessions/:session_id/status",
            get(handlers::get_session_status),
        )
        // Client directory
        .route("/api/clients", get(handlers::search_clients))
        .route("/api/clients/:client_id", get(handlers::get_client))
        .route(
            "/api/suggest-discussion-points",
            post(handlers::suggest_discussion_points),
        )
        // Advisor notes
        .route(
            "/api/notes/:key",
            get(handlers::get_note).put(handlers::put_note),
        )
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
