pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod sessions;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// All REST routes. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(sessions::health));

    let protected_routes = Router::new()
        .route("/sessions", get(sessions::get_sessions))
        .route(
            "/partners/{partner_id}/conversation",
            get(sessions::conversation_with),
        )
        .route(
            "/conversations/{conversation_id}/read",
            post(sessions::mark_read),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/messages/{message_id}/recall",
            post(messages::recall_message),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
