//! Session state and streaming orchestration.

pub mod chat_stream;
pub mod config;
pub mod error;
pub mod message;
pub mod session;
