//! Engine error taxonomy

use dbtlens_core::{ConfigError, Diagnostic, DiagnosticCode, Location, SandboxError, Severity};
use dbtlens_dbt::{LineageError, ScanError};
use dbtlens_sql::AnalysisError;
use std::path::PathBuf;

/// Broad failure class, for callers that only need to react to the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A file, directory or model does not exist
    InputAbsent,

    /// A path escaped the sandbox root; always fatal to the operation
    BoundaryViolation,

    /// Input exists but could not be read or understood
    MalformedInput,
}

/// Errors from session operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Lineage(#[from] LineageError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Sandbox(e) if e.is_boundary_violation() => ErrorKind::BoundaryViolation,
            Self::Sandbox(SandboxError::RootMissing(_) | SandboxError::RootNotDirectory(_)) => {
                ErrorKind::InputAbsent
            }
            Self::Sandbox(_) => ErrorKind::MalformedInput,
            Self::FileNotFound(_) | Self::Scan(_) | Self::Lineage(_) => ErrorKind::InputAbsent,
            Self::Unreadable { .. } | Self::Config(_) | Self::Analysis(_) => {
                ErrorKind::MalformedInput
            }
        }
    }

    /// Convert to a dbtlens diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (code, path) = match self {
            Self::Analysis(e) => return e.to_diagnostic(),
            Self::Lineage(e) => return e.to_diagnostic(),
            Self::Sandbox(SandboxError::OutsideRoot { path, .. }) => {
                (DiagnosticCode::PathOutsideSandbox, Some(path))
            }
            Self::Sandbox(SandboxError::Io { path, .. }) => (DiagnosticCode::FileUnreadable, Some(path)),
            Self::Sandbox(SandboxError::RootMissing(path) | SandboxError::RootNotDirectory(path)) => {
                (DiagnosticCode::FileNotFound, Some(path))
            }
            Self::Scan(ScanError::RootMissing(path) | ScanError::NotADirectory(path)) => {
                (DiagnosticCode::FileNotFound, Some(path))
            }
            Self::FileNotFound(path) => (DiagnosticCode::FileNotFound, Some(path)),
            Self::Unreadable { path, .. } => (DiagnosticCode::FileUnreadable, Some(path)),
            Self::Config(_) => (DiagnosticCode::ConfigInvalid, None),
        };

        let diag = Diagnostic::new(code, Severity::Error, self.to_string());
        match path {
            Some(path) => diag.with_location(Location::new(path.display().to_string())),
            None => diag,
        }
    }
}
