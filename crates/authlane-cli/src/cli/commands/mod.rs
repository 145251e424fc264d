//! CLI command handlers.

pub mod config;
pub mod request;
pub mod session;
