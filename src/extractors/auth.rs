//! Bearer-token extraction and role checks.

use crate::auth::{AuthError, ClientInfo, SessionUser};
use crate::config::Access;
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

/// `Bearer <token>` (scheme case-insensitive) → token.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Optional bearer token from `Authorization`. Never rejects.
#[derive(Clone, Debug, Default)]
pub struct BearerToken(pub Option<String>);

impl BearerToken {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer)
            .map(str::to_string);
        BearerToken(token)
    }

    pub fn require(&self) -> Result<&str, AuthError> {
        self.0.as_deref().ok_or(AuthError::MissingToken)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(BearerToken::from_headers(&parts.headers))
    }
}

/// Check `access` for the caller. Public access never touches the session table.
pub async fn ensure_access(
    state: &AppState,
    access: Access,
    bearer: &BearerToken,
) -> Result<Option<SessionUser>, AppError> {
    let role = match access {
        Access::Public => return Ok(None),
        Access::Role(role) => role,
    };
    let session = state.auth.get_session(bearer.require()?).await?;
    if !state.auth.has_role(&session.user.id, role).await? {
        tracing::warn!(user_id = %session.user.id, required = %role, "insufficient role");
        return Err(AuthError::Forbidden.into());
    }
    Ok(Some(session.user))
}

/// Address and agent recorded with new sessions.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    ClientInfo {
        ip_address: header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string())
            .or_else(|| header_str("x-real-ip").map(str::to_string)),
        user_agent: header_str("user-agent").map(str::to_string),
    }
}
