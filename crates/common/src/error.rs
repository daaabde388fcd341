//! Error types for specrun

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the specrun Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a run before a pass/fail verdict exists.
///
/// Test failures are not errors: they are reported through `RunResult`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Glob expansion failed: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read harness source {path}: {source}")]
    TemplateSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write harness document {path}: {source}")]
    HarnessWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} not found on PATH or in node_modules/.bin")]
    BrowserNotFound { name: String },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Server(String),
}
