//! Sparkmd pairs a streaming Spark chat endpoint with a markdown tool
//! provider spoken to over MCP stdio.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the Spark wire payloads and the signed-URL handshake.
//! - [`core`] owns the exchange state machine, session history, and the
//!   turn processor that stitches tool calls into a conversation.
//! - [`mcp`] provides the stdio client for the tool provider and the
//!   capability inventory advertised to the model.
//! - [`commands`] implements the slash commands available at the prompt.
//! - [`server`] is the markdown document provider served by the
//!   `sparkmd-server` binary.
//!
//! Runtime entrypoints live in the binary crates (`src/main.rs` and
//! `src/bin/markdown_server.rs`), which route through [`cli::run`] and
//! [`server::serve`] respectively.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod mcp;
pub mod server;
