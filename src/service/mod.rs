//! CrudService: generic CRUD over resources, plus the booking, balance and completion rules.

pub mod appointments;
mod crud;
pub mod financials;
pub mod patient_services;
pub mod validation;

pub use crud::{apply_defaults, list_query, parse_id, CrudService, DEFAULT_LIMIT};
pub use validation::RequestValidator;
