pub mod applications;
pub mod health;

use axum::{routing::get, Router};

use crate::chat::ws::session_channel_handler;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Read-only screening results
        .route(
            "/api/v1/applications/:id/summary",
            get(applications::handle_get_summary),
        )
        .route(
            "/api/v1/applications/:id/session",
            get(applications::handle_get_session),
        )
        .route(
            "/api/v1/applications/:id/messages",
            get(applications::handle_get_messages),
        )
        // Session channel
        .route("/ws/applications/:id", get(session_channel_handler))
        .with_state(state)
}
