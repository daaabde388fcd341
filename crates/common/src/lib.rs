//! specrun Common Library
//!
//! Configuration, resource references and error types shared by the
//! server, the runner and the CLI.

pub mod config;
pub mod error;
pub mod resource;

pub use config::{
    FrameworkAssets, HarnessSource, KeepRunner, RunConfiguration, RunOptions, ServerRoots,
    VendorSpec,
};
pub use error::{Error, Result};
pub use resource::{Location, Resource, ResourceKind};

/// specrun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
