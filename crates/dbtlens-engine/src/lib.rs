//! dbtlens engine - request-scoped analysis sessions
//!
//! This crate ties the analysis crates to a sandboxed project root:
//! - Every caller-supplied path is validated before it is touched
//! - Dependency graphs are cached per root until invalidated
//! - Failures map onto input-absent, boundary-violation and malformed-input

pub mod error;
pub mod session;

pub use error::{EngineError, ErrorKind};
pub use session::Session;
