//! Session/auth service: Argon2 password hashes, opaque bearer tokens (stored hashed), roles.

pub mod password;
pub mod service;
pub mod token;

pub use service::*;

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Staff,
    Patient,
}

impl Role {
    pub const PROVIDERS: [Role; 3] = [Role::Admin, Role::Doctor, Role::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Staff => "staff",
            Role::Patient => "patient",
        }
    }

    pub fn is_provider(&self) -> bool {
        Role::PROVIDERS.contains(self)
    }

    /// Higher wins when a user holds several roles.
    fn rank(&self) -> u8 {
        match self {
            Role::Admin => 3,
            Role::Doctor => 2,
            Role::Staff => 1,
            Role::Patient => 0,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "staff" => Ok(Role::Staff),
            "patient" => Ok(Role::Patient),
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("No authorization token provided")]
    MissingToken,
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("Session expired")]
    SessionExpired,
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("password hash: {0}")]
    Hash(String),
    #[error(transparent)]
    Db(#[from] AppError),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidEmail | AuthError::WeakPassword(_) | AuthError::UnknownRole(_) => {
                AppError::Validation(e.to_string())
            }
            AuthError::EmailTaken => AppError::Conflict(e.to_string()),
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidSession
            | AuthError::SessionExpired => AppError::Unauthorized(e.to_string()),
            AuthError::Forbidden => AppError::Forbidden(e.to_string()),
            AuthError::Hash(msg) => AppError::Internal(format!("password hash: {}", msg)),
            AuthError::Db(inner) => inner,
        }
    }
}

/// Highest-ranked role among `roles`; users without a role row are patients.
pub fn effective_role(roles: impl IntoIterator<Item = Role>) -> Role {
    roles.into_iter().max_by_key(Role::rank).unwrap_or(Role::Patient)
}
