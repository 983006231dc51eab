//! Typed HTTP client for the REST API, used by front ends and scripts.
//!
//! The client keeps the bearer token returned by sign-in, sign-up and refresh and sends it with
//! every later request. Errors come back as [`ClientError`]; a non-2xx response carries the
//! server's `{error}` message.

use crate::auth::Role;
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub role: Role,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SessionInfo {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthResponse {
    pub user: UserInfo,
    pub session: SessionInfo,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SessionExpiry {
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CurrentSession {
    pub session: SessionExpiry,
    pub user: UserInfo,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

/// Message from an `{error}` body, else the status reason, else the raw body.
pub fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(v) = serde_json::from_slice::<Value>(body) {
        if let Some(msg) = v.get("error").and_then(Value::as_str) {
            return msg.to_string();
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if !text.is_empty() {
        return text;
    }
    status.canonical_reason().unwrap_or("request failed").to_string()
}

pub struct DentalClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl DentalClient {
    /// `base_url` is the server root, e.g. `http://localhost:8000`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(DentalClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `/api/{segments...}` under the base URL.
    pub fn url(&self, segments: &[&str]) -> String {
        let mut url = format!("{}/api", self.base_url);
        for s in segments {
            url.push('/');
            url.push_str(s.trim_matches('/'));
        }
        url
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let bytes = self.send_raw(builder).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_raw(&self, builder: RequestBuilder) -> Result<Bytes, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(status, &bytes),
            });
        }
        Ok(bytes)
    }

    async fn auth_action<T: DeserializeOwned>(&self, action: &str, body: Option<Value>) -> Result<T, ClientError> {
        let mut builder = self
            .request(Method::POST, self.url(&["auth"]))
            .query(&[("action", action)]);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        self.send(builder).await
    }

    pub async fn sign_up(&mut self, email: &str, password: &str, role: Option<Role>) -> Result<AuthResponse, ClientError> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(role) = role {
            body["role"] = json!(role);
        }
        let auth: AuthResponse = self.auth_action("signup", Some(body)).await?;
        self.token = Some(auth.session.access_token.clone());
        Ok(auth)
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = json!({ "email": email, "password": password });
        let auth: AuthResponse = self.auth_action("signin", Some(body)).await?;
        self.token = Some(auth.session.access_token.clone());
        Ok(auth)
    }

    /// Ends the session server-side and forgets the token either way.
    pub async fn sign_out(&mut self) -> Result<(), ClientError> {
        let result: Result<Value, ClientError> = self.auth_action("signout", None).await;
        self.token = None;
        result.map(|_| ())
    }

    pub async fn session(&self) -> Result<CurrentSession, ClientError> {
        self.auth_action("session", None).await
    }

    pub async fn refresh(&mut self) -> Result<AuthResponse, ClientError> {
        let auth: AuthResponse = self.auth_action("refresh", None).await?;
        self.token = Some(auth.session.access_token.clone());
        Ok(auth)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let _: Value = self.auth_action("reset-password", Some(json!({ "email": email }))).await?;
        Ok(())
    }

    pub async fn update_password(&self, password: &str) -> Result<(), ClientError> {
        let _: Value = self
            .auth_action("update-password", Some(json!({ "password": password })))
            .await?;
        Ok(())
    }

    /// `GET /api/{path}` with filters such as `[("status", "active")]`.
    pub async fn list<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<T>, ClientError> {
        let builder = self.request(Method::GET, self.url(&[path])).query(params);
        let envelope: Envelope<Vec<T>> = self.send(builder).await?;
        Ok(envelope.data)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, id: &str) -> Result<T, ClientError> {
        let envelope: Envelope<T> = self.send(self.request(Method::GET, self.url(&[path, id]))).await?;
        Ok(envelope.data)
    }

    pub async fn create<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let builder = self.request(Method::POST, self.url(&[path])).json(body);
        let envelope: Envelope<T> = self.send(builder).await?;
        Ok(envelope.data)
    }

    pub async fn update<B: Serialize, T: DeserializeOwned>(&self, path: &str, id: &str, body: &B) -> Result<T, ClientError> {
        let builder = self.request(Method::PUT, self.url(&[path, id])).json(body);
        let envelope: Envelope<T> = self.send(builder).await?;
        Ok(envelope.data)
    }

    pub async fn delete(&self, path: &str, id: &str) -> Result<(), ClientError> {
        self.send_raw(self.request(Method::DELETE, self.url(&[path, id]))).await?;
        Ok(())
    }

    pub async fn booked_slots(&self, date: &str, doctor: Option<&str>) -> Result<Vec<String>, ClientError> {
        let mut params = vec![("date", date)];
        if let Some(d) = doctor {
            params.push(("doctor", d));
        }
        let builder = self
            .request(Method::GET, self.url(&["appointments", "booked-slots"]))
            .query(&params);
        let envelope: Envelope<Vec<String>> = self.send(builder).await?;
        Ok(envelope.data)
    }

    pub async fn chat(&self, message: &str, context: Option<&str>) -> Result<String, ClientError> {
        let builder = self
            .request(Method::POST, self.url(&["chatbot"]))
            .json(&ChatBody { message, context });
        let reply: ChatResponse = self.send(builder).await?;
        Ok(reply.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tests::StubProvider;
    use crate::config::Settings;
    use crate::db::Database;
    use crate::rate_limit::InMemoryCounterStore;
    use crate::routes::build_router;
    use crate::state::AppState;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    #[test]
    fn urls_are_joined_under_api() {
        let c = DentalClient::new("http://localhost:8000/").unwrap();
        assert_eq!(c.url(&["patients"]), "http://localhost:8000/api/patients");
        assert_eq!(
            c.url(&["appointments", "booked-slots"]),
            "http://localhost:8000/api/appointments/booked-slots"
        );
    }

    #[test]
    fn error_messages_prefer_the_error_field() {
        assert_eq!(
            error_message(StatusCode::CONFLICT, br#"{"error":"Time slot already booked"}"#),
            "Time slot already booked"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, b"upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::NOT_FOUND, b""), "Not Found");
    }

    /// Serve the real router (lazy pool, stub chat provider) on an ephemeral port.
    async fn spawn_server() -> String {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        let settings = Settings::from_lookup(|_| None).unwrap();
        let state = AppState::new(
            Database::new(pool),
            settings,
            Arc::new(StubProvider::new(|| Ok(Some("We open at 8 AM.".into())))),
            Arc::new(InMemoryCounterStore::new()),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn chat_and_errors_over_http() {
        let base = spawn_server().await;
        let client = DentalClient::new(&base).unwrap();
        assert_eq!(client.chat("When do you open?", None).await.unwrap(), "We open at 8 AM.");

        let err = client.list::<Value>("invoices", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(404));

        let err = client
            .create::<_, Value>("doctors", &json!({"name": "Dr. Patel"}))
            .await
            .unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "No authorization token provided");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn sign_out_forgets_the_token() {
        let base = spawn_server().await;
        let mut client = DentalClient::new(&base).unwrap();
        assert!(client.sign_out().await.is_err());
        assert!(client.token().is_none());
    }
}
