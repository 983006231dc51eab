use crate::handlers::auth::auth;
use crate::handlers::entity::method_not_allowed;
use crate::state::AppState;
use axum::{routing::get, Router};

/// `/auth?action=...`; `session` is also reachable with GET.
pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth", get(auth).post(auth).fallback(method_not_allowed))
}
