//! Router assembly and cross-cutting middleware.

pub mod auth;
pub mod chat;
pub mod common;
pub mod entity;

pub use auth::auth_routes;
pub use chat::chat_routes;
pub use common::common_routes;
pub use entity::entity_routes;

use crate::config::Settings;
use crate::error::{AppError, ErrorBody, InternalDetail};
use crate::rate_limit::enforce;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn has_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) || headers.contains_key(header::CONTENT_TYPE) {
        return true;
    }
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(false, |n| n > 0)
}

/// 415 for POST/PUT/PATCH bodies that are not JSON. Bodiless requests pass.
pub async fn require_json(req: Request, next: Next) -> Response {
    let writes = matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH);
    if writes && has_body(req.headers()) && !is_json(req.headers()) {
        return AppError::UnsupportedMediaType.into_response();
    }
    next.run(req).await
}

/// Development only: replace the generic 500 body with the logged error message.
pub async fn reveal_internal_errors(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned() else {
        return response;
    };
    let Ok(bytes) = serde_json::to_vec(&ErrorBody { error: detail }) else {
        return response;
    };
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}

pub fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(3600))
}

async fn not_found() -> AppError {
    AppError::NotFound("route".into())
}

/// Full application: `/health`, `/ready`, `/version` and everything under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth_routes())
        .merge(chat_routes(state.chat_limiter.clone()))
        .merge(entity_routes())
        .layer(middleware::from_fn(require_json))
        .layer(middleware::from_fn_with_state(state.api_limiter.clone(), enforce));

    let mut app = Router::new()
        .merge(common_routes())
        .nest("/api", api)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));
    if state.settings.is_development() {
        app = app.layer(middleware::from_fn(reveal_internal_errors));
    }
    app.layer(cors_layer(&state.settings)).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tests::StubProvider;
    use crate::db::Database;
    use crate::rate_limit::InMemoryCounterStore;
    use axum::http::{self, StatusCode};
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn settings(overrides: &[(&str, &str)]) -> Settings {
        let overrides: Vec<(String, String)> =
            overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| {
            overrides
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    /// Router over a pool that never connects; only routes that fail before any query are usable.
    fn app_with(overrides: &[(&str, &str)]) -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        let state = AppState::new(
            Database::new(pool),
            settings(overrides),
            Arc::new(StubProvider::new(|| Ok(Some("Please call us to book.".into())))),
            Arc::new(InMemoryCounterStore::new()),
        );
        build_router(state)
    }

    fn app() -> Router {
        app_with(&[])
    }

    fn json_request(method: Method, uri: &str, body: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let res = app()
            .oneshot(http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "ok");
    }

    #[tokio::test]
    async fn preflight_gets_cors_headers() {
        let res = app()
            .oneshot(
                http::Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/patients")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,authorization")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(res.headers().get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "3600");
    }

    #[tokio::test]
    async fn configured_origins_are_echoed() {
        let res = app_with(&[("CORS_ALLOWED_ORIGINS", "https://clinic.example")])
            .oneshot(
                http::Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "https://clinic.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://clinic.example"
        );
    }

    #[tokio::test]
    async fn non_json_bodies_get_415() {
        let res = app()
            .oneshot(
                http::Request::builder()
                    .method(Method::POST)
                    .uri("/api/patients")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("name=x"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(res).await["error"], "Content-Type must be application/json");
    }

    #[tokio::test]
    async fn unknown_resource_is_404() {
        let res = app()
            .oneshot(http::Request::builder().uri("/api/invoices").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(body_json(res).await["error"].is_string());
    }

    #[tokio::test]
    async fn disallowed_operations_are_405() {
        let res = app()
            .oneshot(
                http::Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/feedback/6f1c2a8e-3d7b-4c1e-9a55-1f2e3d4c5b6a")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

        let res = app()
            .oneshot(json_request(Method::PUT, "/api/patients", "{}"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(res).await["error"], "method not allowed");
    }

    #[tokio::test]
    async fn admin_writes_need_a_token() {
        let res = app()
            .oneshot(json_request(Method::POST, "/api/doctors", r#"{"name":"Dr. Patel"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"], "No authorization token provided");
    }

    #[tokio::test]
    async fn unknown_auth_action_is_400() {
        let res = app()
            .oneshot(json_request(Method::POST, "/api/auth?action=login", "{}"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["error"].as_str().unwrap().starts_with("Invalid action"));
    }

    #[tokio::test]
    async fn signout_without_token_is_401() {
        let res = app()
            .oneshot(http::Request::builder().method(Method::POST).uri("/api/auth?action=signout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn booked_slots_requires_a_date() {
        let res = app()
            .oneshot(http::Request::builder().uri("/api/appointments/booked-slots").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chatbot_replies_through_the_provider() {
        let res = app()
            .oneshot(json_request(Method::POST, "/api/chatbot", r#"{"message":"Can I book online?"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "10");
        let body = body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], "Please call us to book.");
    }

    #[tokio::test]
    async fn chatbot_rejects_empty_messages() {
        let res = app()
            .oneshot(json_request(Method::POST, "/api/chatbot", r#"{"message":"  "}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "Message is required");
    }

    #[tokio::test]
    async fn chat_limiter_returns_429_past_the_limit() {
        let app = app_with(&[("CHAT_RATE_LIMIT_MAX", "2")]);
        for _ in 0..2 {
            let res = app
                .clone()
                .oneshot(json_request(Method::POST, "/api/chatbot", r#"{"message":"hi"}"#))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        let res = app
            .oneshot(json_request(Method::POST, "/api/chatbot", r#"{"message":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "0");
    }

    #[tokio::test]
    async fn development_mode_reveals_internal_detail() {
        let inner = Router::new()
            .route(
                "/boom",
                axum::routing::get(|| async { AppError::Internal("pool timed out".into()) }),
            )
            .layer(middleware::from_fn(reveal_internal_errors));
        let res = inner
            .oneshot(http::Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(res).await["error"], "pool timed out");
    }
}
