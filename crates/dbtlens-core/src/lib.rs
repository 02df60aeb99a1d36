//! dbtlens Core
//!
//! Shared domain plumbing for the analysis crates.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod config;
pub mod sandbox;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use config::{Config, ConfigError, DialectConfig, ScanConfig, LineageConfig, CONFIG_FILE_NAME};
pub use sandbox::{Sandbox, SandboxError};
