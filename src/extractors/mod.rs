pub mod auth;
pub mod json;

pub use auth::{client_info, ensure_access, parse_bearer, BearerToken};
pub use json::ApiJson;
