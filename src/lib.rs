//! Dental API: REST backend for a dental practice on PostgreSQL.

pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use auth::{AuthError, AuthService, Role};
pub use client::{ClientError, DentalClient};
pub use config::{resource_by_path, Settings, RESOURCES};
pub use db::Database;
pub use error::{AppError, ConfigError};
pub use rate_limit::{CounterStore, FixedWindowLimiter, InMemoryCounterStore};
pub use routes::build_router;
pub use service::CrudService;
pub use state::AppState;
pub use store::{ensure_database_exists, ensure_schema};
