use super::{effective_role, password, token, AuthError, Role};
use crate::db::{is_unique_violation, Database};
use crate::service::validation::is_valid_email;
use crate::sql::QueryBuilder;
use crate::store::{PASSWORD_RESETS, USERS, USER_ROLES, USER_SESSIONS};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Password reset tokens live for one hour.
pub const RESET_TOKEN_TTL_SECS: i64 = 3600;

/// Request metadata recorded with a session.
#[derive(Clone, Debug, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

/// Newly minted token. The plain token is only ever returned here.
#[derive(Clone, Debug, Serialize)]
pub struct IssuedSession {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuthResult {
    pub user: SessionUser,
    pub session: IssuedSession,
}

/// A valid, unexpired session looked up by token.
#[derive(Clone, Debug, Serialize)]
pub struct ActiveSession {
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

/// Expired when the expiry instant is strictly in the past.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at < now
}

/// Trim, lower-case and check the address.
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

#[derive(Clone, Debug)]
pub struct AuthService {
    db: Database,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(db: Database, session_ttl: std::time::Duration) -> Self {
        let session_ttl = Duration::from_std(session_ttl).unwrap_or_else(|_| Duration::hours(24));
        AuthService { db, session_ttl }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        role: Role,
        client: &ClientInfo,
    ) -> Result<AuthResult, AuthError> {
        let email = normalize_email(email)?;
        password::check_strength(password)?;
        let existing = QueryBuilder::table(&USERS)
            .select(&["id"])
            .eq("email", email.as_str())
            .single(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AuthError::EmailTaken);
        }
        let password_hash = password::hash(password)?;

        let mut user = Map::new();
        user.insert("email".into(), Value::String(email.clone()));
        user.insert("password_hash".into(), Value::String(password_hash));
        user.insert("email_verified".into(), Value::Bool(false));

        let mut tx = self.db.begin().await?;
        let row = match tx.insert(&USERS, &user).await {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        };
        let user_id = str_field(&row, "id")?;
        let mut role_row = Map::new();
        role_row.insert("user_id".into(), Value::String(user_id.clone()));
        role_row.insert("role".into(), Value::String(role.as_str().into()));
        tx.insert(&USER_ROLES, &role_row).await?;
        tx.commit().await?;

        let session = self.create_session(&user_id, client).await?;
        tracing::info!(user_id = %user_id, role = %role, "user signed up");
        Ok(AuthResult {
            user: SessionUser {
                id: user_id,
                email,
                role,
            },
            session,
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str, client: &ClientInfo) -> Result<AuthResult, AuthError> {
        let email = email.trim().to_lowercase();
        let Some(user) = QueryBuilder::table(&USERS)
            .select(&["id", "email", "password_hash"])
            .eq("email", email.as_str())
            .single(&self.db)
            .await?
        else {
            tracing::warn!("sign-in for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !password::verify(password, &str_field(&user, "password_hash")?)? {
            tracing::warn!("sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        let user_id = str_field(&user, "id")?;
        let role = self.role_of(&user_id).await?;

        let mut stamp = Map::new();
        stamp.insert("last_sign_in".into(), Value::String(Utc::now().to_rfc3339()));
        QueryBuilder::table(&USERS)
            .eq("id", user_id.as_str())
            .update(&self.db, &stamp)
            .await?;

        let session = self.create_session(&user_id, client).await?;
        tracing::info!(user_id = %user_id, "user signed in");
        Ok(AuthResult {
            user: SessionUser {
                id: user_id,
                email: str_field(&user, "email")?,
                role,
            },
            session,
        })
    }

    /// Look up a token. An expired session is deleted before the error is returned.
    pub async fn get_session(&self, token: &str) -> Result<ActiveSession, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let Some(session) = QueryBuilder::table(&USER_SESSIONS)
            .select(&["id", "user_id", "expires_at"])
            .eq("token_hash", token::hash_token(token))
            .single(&self.db)
            .await?
        else {
            return Err(AuthError::InvalidSession);
        };
        let expires_at = timestamp_field(&session, "expires_at")?;
        if is_expired(expires_at, Utc::now()) {
            QueryBuilder::table(&USER_SESSIONS)
                .eq("id", str_field(&session, "id")?)
                .delete(&self.db)
                .await?;
            tracing::warn!(user_id = ?session.get("user_id"), "expired session removed");
            return Err(AuthError::SessionExpired);
        }
        let user_id = str_field(&session, "user_id")?;
        let user = QueryBuilder::table(&USERS)
            .select(&["id", "email"])
            .eq("id", user_id.as_str())
            .single(&self.db)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        let role = self.role_of(&user_id).await?;
        Ok(ActiveSession {
            expires_at,
            user: SessionUser {
                id: user_id,
                email: str_field(&user, "email")?,
                role,
            },
        })
    }

    /// Swap a valid token for a new one; the old token stops working.
    pub async fn refresh_session(&self, token: &str, client: &ClientInfo) -> Result<AuthResult, AuthError> {
        let active = self.get_session(token).await?;
        self.delete_session(token).await?;
        let session = self.create_session(&active.user.id, client).await?;
        Ok(AuthResult {
            user: active.user,
            session,
        })
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.delete_session(token).await
    }

    pub async fn has_role(&self, user_id: &str, role: Role) -> Result<bool, AuthError> {
        let n = QueryBuilder::table(&USER_ROLES)
            .eq("user_id", user_id)
            .eq("role", role.as_str())
            .count(&self.db)
            .await?;
        Ok(n > 0)
    }

    pub async fn is_healthcare_provider(&self, user_id: &str) -> Result<bool, AuthError> {
        let n = QueryBuilder::table(&USER_ROLES)
            .eq("user_id", user_id)
            .in_list("role", Role::PROVIDERS.iter().map(|r| r.as_str()))
            .count(&self.db)
            .await?;
        Ok(n > 0)
    }

    /// Always succeeds for a well-formed request so callers cannot probe which emails exist.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim().to_lowercase();
        let Some(user) = QueryBuilder::table(&USERS)
            .select(&["id"])
            .eq("email", email.as_str())
            .single(&self.db)
            .await?
        else {
            return Ok(());
        };
        let user_id = str_field(&user, "id")?;
        let reset_token = token::generate_token();
        let expires_at = Utc::now() + Duration::seconds(RESET_TOKEN_TTL_SECS);
        let mut row = Map::new();
        row.insert("user_id".into(), Value::String(user_id.clone()));
        row.insert("token_hash".into(), Value::String(token::hash_token(&reset_token)));
        row.insert("expires_at".into(), Value::String(expires_at.to_rfc3339()));
        self.db.insert(&PASSWORD_RESETS, &row).await?;
        // No mail transport; the token is only visible in debug logs.
        tracing::debug!(user_id = %user_id, token = %reset_token, "password reset token issued");
        Ok(())
    }

    pub async fn update_password(&self, user_id: &str, new_password: &str) -> Result<(), AuthError> {
        password::check_strength(new_password)?;
        let mut data = Map::new();
        data.insert("password_hash".into(), Value::String(password::hash(new_password)?));
        let updated = QueryBuilder::table(&USERS)
            .eq("id", user_id)
            .update(&self.db, &data)
            .await?;
        if updated.is_empty() {
            return Err(AuthError::InvalidSession);
        }
        tracing::info!(user_id = %user_id, "password updated");
        Ok(())
    }

    async fn role_of(&self, user_id: &str) -> Result<Role, AuthError> {
        let rows = QueryBuilder::table(&USER_ROLES)
            .select(&["role"])
            .eq("user_id", user_id)
            .get(&self.db)
            .await?;
        Ok(effective_role(
            rows.iter()
                .filter_map(|r| r.get("role").and_then(Value::as_str))
                .filter_map(|s| s.parse().ok()),
        ))
    }

    async fn create_session(&self, user_id: &str, client: &ClientInfo) -> Result<IssuedSession, AuthError> {
        let access_token = token::generate_token();
        let expires_at = Utc::now() + self.session_ttl;
        let mut row = Map::new();
        row.insert("user_id".into(), Value::String(user_id.to_string()));
        row.insert("token_hash".into(), Value::String(token::hash_token(&access_token)));
        row.insert("expires_at".into(), Value::String(expires_at.to_rfc3339()));
        if let Some(ip) = &client.ip_address {
            row.insert("ip_address".into(), Value::String(ip.clone()));
        }
        if let Some(ua) = &client.user_agent {
            row.insert("user_agent".into(), Value::String(ua.clone()));
        }
        self.db.insert(&USER_SESSIONS, &row).await?;
        Ok(IssuedSession {
            access_token,
            token_type: "bearer",
            expires_at,
            expires_in: self.session_ttl.num_seconds(),
        })
    }

    async fn delete_session(&self, token: &str) -> Result<(), AuthError> {
        QueryBuilder::table(&USER_SESSIONS)
            .eq("token_hash", token::hash_token(token))
            .delete(&self.db)
            .await?;
        Ok(())
    }
}

fn str_field(row: &Value, key: &str) -> Result<String, AuthError> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AuthError::Db(crate::error::AppError::Internal(format!("row missing '{}'", key))))
}

fn timestamp_field(row: &Value, key: &str) -> Result<DateTime<Utc>, AuthError> {
    let raw = str_field(row, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| AuthError::Db(crate::error::AppError::Internal(format!("bad timestamp '{}': {}", raw, e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expiry_is_strictly_past() {
        let now = Utc::now();
        assert!(is_expired(now - Duration::seconds(1), now));
        assert!(!is_expired(now, now));
        assert!(!is_expired(now + Duration::hours(24), now));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM ").unwrap(), "jane.doe@example.com");
        assert!(matches!(normalize_email("not-an-email"), Err(AuthError::InvalidEmail)));
        assert!(matches!(normalize_email("a@b"), Err(AuthError::InvalidEmail)));
    }

    #[test]
    fn timestamps_decode_from_rows() {
        let row = json!({"expires_at": "2024-05-01T10:00:00+00:00"});
        let t = timestamp_field(&row, "expires_at").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert!(timestamp_field(&json!({}), "expires_at").is_err());
    }

    #[test]
    fn issued_session_serializes_bearer_type() {
        let s = IssuedSession {
            access_token: "t".into(),
            token_type: "bearer",
            expires_at: Utc::now(),
            expires_in: 86_400,
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["token_type"], "bearer");
        assert_eq!(v["expires_in"], 86_400);
    }
}
