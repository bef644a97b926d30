//! Spark wire payloads and connection authentication.

pub mod auth;
pub mod types;
