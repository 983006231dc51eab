//! `/api/auth?action=...`: sign-up, sign-in, sessions and passwords.

use crate::auth::{AuthError, Role};
use crate::error::AppError;
use crate::extractors::{client_info, ensure_access, BearerToken};
use crate::config::Access;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

const INVALID_ACTION: &str =
    "Invalid action. Use: signup, signin, signout, session, refresh, reset-password, update-password";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthAction {
    SignUp,
    SignIn,
    SignOut,
    Session,
    Refresh,
    ResetPassword,
    UpdatePassword,
}

impl AuthAction {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "signup" => AuthAction::SignUp,
            "signin" => AuthAction::SignIn,
            "signout" => AuthAction::SignOut,
            "session" => AuthAction::Session,
            "refresh" => AuthAction::Refresh,
            "reset-password" => AuthAction::ResetPassword,
            "update-password" => AuthAction::UpdatePassword,
            _ => return None,
        })
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ActionQuery {
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct Credentials {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct EmailOnly {
    #[serde(default)]
    email: String,
}

#[derive(Deserialize, Debug, Default)]
struct NewPassword {
    #[serde(default)]
    password: String,
}

/// Decode an optional JSON body; an empty body decodes as the default.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

fn require_fields(pairs: &[(&str, &str)]) -> Result<(), AppError> {
    let missing: Vec<&str> = pairs
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Missing required fields: {}", missing.join(", "))))
    }
}

fn ok() -> Response {
    Json(json!({ "success": true })).into_response()
}

/// Role a sign-up may claim. Anything above patient needs an admin caller.
async fn signup_role(state: &AppState, requested: Option<&str>, bearer: &BearerToken) -> Result<Role, AppError> {
    let role = match requested.map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) => r.parse::<Role>()?,
        None => Role::Patient,
    };
    if role != Role::Patient {
        ensure_access(state, Access::Role(Role::Admin), bearer).await?;
    }
    Ok(role)
}

pub async fn auth(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
    bearer: BearerToken,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let action = query
        .action
        .as_deref()
        .and_then(AuthAction::parse)
        .ok_or_else(|| AppError::BadRequest(INVALID_ACTION.into()))?;
    let client = client_info(&headers);

    match action {
        AuthAction::SignUp => {
            let creds: Credentials = parse_body(&body)?;
            require_fields(&[("email", creds.email.as_str()), ("password", creds.password.as_str())])?;
            let role = signup_role(&state, creds.role.as_deref(), &bearer).await?;
            let result = state.auth.sign_up(&creds.email, &creds.password, role, &client).await?;
            Ok((StatusCode::CREATED, Json(result)).into_response())
        }
        AuthAction::SignIn => {
            let creds: Credentials = parse_body(&body)?;
            require_fields(&[("email", creds.email.as_str()), ("password", creds.password.as_str())])?;
            let result = state.auth.sign_in(&creds.email, &creds.password, &client).await?;
            Ok(Json(result).into_response())
        }
        AuthAction::SignOut => {
            state.auth.sign_out(bearer.require()?).await?;
            Ok(ok())
        }
        AuthAction::Session => {
            let active = state.auth.get_session(bearer.require()?).await?;
            Ok(Json(json!({
                "session": { "expires_at": active.expires_at },
                "user": active.user,
            }))
            .into_response())
        }
        AuthAction::Refresh => {
            let result = state.auth.refresh_session(bearer.require()?, &client).await?;
            Ok(Json(result).into_response())
        }
        AuthAction::ResetPassword => {
            let req: EmailOnly = parse_body(&body)?;
            require_fields(&[("email", req.email.as_str())])?;
            state.auth.request_password_reset(&req.email).await?;
            Ok(ok())
        }
        AuthAction::UpdatePassword => {
            let active = state.auth.get_session(bearer.require()?).await?;
            let req: NewPassword = parse_body(&body)?;
            if req.password.is_empty() {
                return Err(AuthError::WeakPassword(crate::auth::password::MIN_PASSWORD_LEN).into());
            }
            state.auth.update_password(&active.user.id, &req.password).await?;
            Ok(ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse() {
        assert_eq!(AuthAction::parse("signin"), Some(AuthAction::SignIn));
        assert_eq!(AuthAction::parse("reset-password"), Some(AuthAction::ResetPassword));
        assert_eq!(AuthAction::parse("login"), None);
    }

    #[test]
    fn empty_body_decodes_to_default() {
        let creds: Credentials = parse_body(&Bytes::new()).unwrap();
        assert!(creds.email.is_empty());
        let err = parse_body::<Credentials>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn missing_fields_are_listed() {
        let err = require_fields(&[("email", ""), ("password", "secret")]).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: email");
        assert!(require_fields(&[("email", "a@b.co")]).is_ok());
    }
}
