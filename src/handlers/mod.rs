//! HTTP handlers for resources, authentication, booked slots and the chatbot.

pub mod appointments;
pub mod auth;
pub mod chat;
pub mod entity;
