//! Fixed-window rate limiting keyed by client address.
//!
//! Counters live behind the [`CounterStore`] trait. [`InMemoryCounterStore`] is enough for a
//! single process; a shared store (Redis, a database table) can implement the trait when
//! several instances sit behind one load balancer.

use crate::config::RateLimitSettings;
use crate::error::AppError;
use crate::extractors::BearerToken;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stale windows are swept once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 10_000;

/// Counter for one key: requests seen since `window_start` (unix seconds).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    pub window_start: u64,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one request for `key` at `now`. A window older than `window_secs` is replaced by a
    /// fresh one starting at `now`. Returns the state after counting.
    async fn hit(&self, key: &str, now: u64, window_secs: u64) -> Result<WindowState, AppError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    windows: Mutex<HashMap<String, WindowState>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(&self, key: &str, now: u64, window_secs: u64) -> Result<WindowState, AppError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| AppError::Internal("rate limiter lock poisoned".into()))?;
        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, w| now < w.window_start + window_secs);
        }
        let state = windows.entry(key.to_string()).or_insert(WindowState {
            count: 0,
            window_start: now,
        });
        if now >= state.window_start + window_secs {
            *state = WindowState {
                count: 0,
                window_start: now,
            };
        }
        state.count = state.count.saturating_add(1);
        Ok(*state)
    }
}

/// Outcome of one check, with the values for the `X-RateLimit-*` headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the current window ends.
    pub reset_at: u64,
    pub retry_after: u64,
}

impl RateDecision {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let pairs = [
            ("x-ratelimit-limit", self.limit.to_string()),
            ("x-ratelimit-remaining", self.remaining.to_string()),
            ("x-ratelimit-reset", self.reset_at.to_string()),
        ];
        for (name, value) in pairs {
            if let Ok(v) = HeaderValue::from_str(&value) {
                headers.insert(HeaderName::from_static(name), v);
            }
        }
    }
}

#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn CounterStore>,
    scope: &'static str,
    max_requests: u32,
    window_secs: u64,
}

impl FixedWindowLimiter {
    /// `scope` namespaces keys so several limiters can share one store.
    pub fn new(store: Arc<dyn CounterStore>, scope: &'static str, settings: RateLimitSettings) -> Self {
        FixedWindowLimiter {
            store,
            scope,
            max_requests: settings.max_requests,
            window_secs: settings.window.as_secs().max(1),
        }
    }

    pub async fn check(&self, key: &str) -> Result<RateDecision, AppError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.check_at(key, now).await
    }

    pub async fn check_at(&self, key: &str, now: u64) -> Result<RateDecision, AppError> {
        let scoped = format!("{}:{}", self.scope, key);
        let state = self.store.hit(&scoped, now, self.window_secs).await?;
        let reset_at = state.window_start + self.window_secs;
        Ok(RateDecision {
            allowed: state.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(state.count),
            reset_at,
            retry_after: reset_at.saturating_sub(now).max(1),
        })
    }
}

/// Client address: first `X-Forwarded-For` hop, else the peer. Only when neither is known does
/// the bearer token prefix stand in, since an unchecked token is free to rotate.
pub fn rate_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return format!("ip:{}", ip);
    }
    if let Some(addr) = peer {
        return format!("ip:{}", addr.ip());
    }
    match BearerToken::from_headers(headers).0 {
        Some(token) => format!("token:{}", token.chars().take(16).collect::<String>()),
        None => "anonymous".to_string(),
    }
}

/// Middleware: count the request, reject with 429 past the limit, stamp `X-RateLimit-*`.
pub async fn enforce(State(limiter): State<FixedWindowLimiter>, req: Request, next: Next) -> Response {
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0);
    let key = rate_key(req.headers(), peer);
    let decision = match limiter.check(&key).await {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };
    if !decision.allowed {
        tracing::warn!(scope = limiter.scope, key = %key, "rate limit exceeded");
        let mut response = AppError::RateLimited {
            retry_after: decision.retry_after,
        }
        .into_response();
        decision.apply_headers(response.headers_mut());
        return response;
    }
    let mut response = next.run(req).await;
    // A nested, more specific limiter has already stamped its numbers.
    if !response.headers().contains_key("x-ratelimit-limit") {
        decision.apply_headers(response.headers_mut());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use std::time::Duration;
    use tower::ServiceExt;

    fn limiter(max: u32, window: u64) -> FixedWindowLimiter {
        FixedWindowLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            "test",
            RateLimitSettings {
                max_requests: max,
                window: Duration::from_secs(window),
            },
        )
    }

    #[tokio::test]
    async fn rejects_the_request_after_the_limit() {
        let l = limiter(3, 60);
        for i in 0..3 {
            let d = l.check_at("ip:1.2.3.4", 1_000 + i).await.unwrap();
            assert!(d.allowed);
            assert_eq!(d.remaining, 2 - i as u32);
        }
        let d = l.check_at("ip:1.2.3.4", 1_010).await.unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_at, 1_060);
        assert_eq!(d.retry_after, 50);
    }

    #[tokio::test]
    async fn window_rollover_starts_fresh() {
        let l = limiter(1, 60);
        assert!(l.check_at("k", 100).await.unwrap().allowed);
        assert!(!l.check_at("k", 159).await.unwrap().allowed);
        let d = l.check_at("k", 160).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.reset_at, 220);
    }

    #[tokio::test]
    async fn keys_and_scopes_are_independent() {
        let store: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::new());
        let settings = RateLimitSettings {
            max_requests: 1,
            window: Duration::from_secs(60),
        };
        let api = FixedWindowLimiter::new(store.clone(), "api", settings);
        let chat = FixedWindowLimiter::new(store, "chat", settings);
        assert!(api.check_at("a", 0).await.unwrap().allowed);
        assert!(api.check_at("b", 0).await.unwrap().allowed);
        assert!(chat.check_at("a", 0).await.unwrap().allowed);
        assert!(!api.check_at("a", 1).await.unwrap().allowed);
    }

    #[test]
    fn key_prefers_client_address_over_tokens() {
        let mut h = HeaderMap::new();
        assert_eq!(rate_key(&h, None), "anonymous");
        h.insert("authorization", HeaderValue::from_static("bearer abcdefghijklmnopqrstuvwxyz"));
        assert_eq!(rate_key(&h, None), "token:abcdefghijklmnop");

        // A fresh token per request does not buy a fresh counter.
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        assert_eq!(rate_key(&h, Some(peer)), "ip:10.0.0.9");
        h.insert("authorization", HeaderValue::from_static("Bearer zzzzzzzzzzzzzzzzzzzz"));
        assert_eq!(rate_key(&h, Some(peer)), "ip:10.0.0.9");

        h.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(rate_key(&h, Some(peer)), "ip:203.0.113.7");
    }

    #[tokio::test]
    async fn middleware_sets_headers_and_returns_429() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter(2, 60), enforce));
        let req = || axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();

        let first = app.clone().oneshot(req()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-ratelimit-limit"], "2");
        assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

        let second = app.clone().oneshot(req()).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let third = app.oneshot(req()).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(third.headers().contains_key("retry-after"));
        assert_eq!(third.headers()["x-ratelimit-remaining"], "0");
    }
}
