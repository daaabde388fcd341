//! specrun Web
//!
//! The ephemeral HTTP server a test run's browser loads the harness from,
//! and the root-list resolver behind it.

pub mod resolver;
pub mod server;

pub use resolver::{resolve, Resolved};
pub use server::{ServerConfig, ServerSession, NOT_FOUND_BODY};
