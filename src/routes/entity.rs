//! Resource routes. The path segment selects the resource descriptor; handlers resolve it.
//! `booked-slots` is a static segment so it wins over `/:path_segment/:id`.

use crate::handlers::appointments::booked_slots;
use crate::handlers::entity::{create, delete, list, method_not_allowed, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/appointments/booked-slots",
            get(booked_slots).fallback(method_not_allowed),
        )
        .route(
            "/:path_segment",
            get(list).post(create).fallback(method_not_allowed),
        )
        .route(
            "/:path_segment/:id",
            get(read).put(update).delete(delete).fallback(method_not_allowed),
        )
}
