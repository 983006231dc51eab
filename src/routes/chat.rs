use crate::handlers::chat::chatbot;
use crate::handlers::entity::method_not_allowed;
use crate::rate_limit::{enforce, FixedWindowLimiter};
use crate::state::AppState;
use axum::{middleware, routing::post, Router};

/// `POST /chatbot` behind its own (tighter) limiter.
pub fn chat_routes(limiter: FixedWindowLimiter) -> Router<AppState> {
    Router::new()
        .route("/chatbot", post(chatbot).fallback(method_not_allowed))
        .route_layer(middleware::from_fn_with_state(limiter, enforce))
}
