//! Path containment for every caller-supplied path
//!
//! A [`Sandbox`] is an explicit context value: it is created once per session
//! and passed to whatever needs to touch the filesystem. There is no global
//! "current root".

use std::path::{Component, Path, PathBuf};

/// A validated, canonical directory that all path operations must stay within
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Create a sandbox rooted at an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref();

        let canonical = root.canonicalize().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SandboxError::RootMissing(root.to_path_buf()),
            _ => SandboxError::Io {
                path: root.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        if !canonical.is_dir() {
            return Err(SandboxError::RootNotDirectory(canonical));
        }

        Ok(Self { root: canonical })
    }

    /// Canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a candidate path and check that it lies within the root
    ///
    /// Relative paths are interpreted against the root. The returned path is
    /// absolute; it is canonical when the target exists. Otherwise its deepest
    /// existing ancestor is canonicalized and the rest appended, so a missing
    /// file still reports as missing rather than as a boundary violation.
    pub fn validate(&self, candidate: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let candidate = candidate.as_ref();
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let resolved = match joined.canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => resolve_missing(&joined),
            Err(e) => {
                return Err(SandboxError::Io {
                    path: candidate.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        if !resolved.starts_with(&self.root) {
            return Err(SandboxError::OutsideRoot {
                path: candidate.to_path_buf(),
                resolved,
                root: self.root.clone(),
            });
        }

        Ok(resolved)
    }

    /// Check a path without producing an error value
    pub fn is_within(&self, candidate: impl AsRef<Path>) -> bool {
        self.validate(candidate).is_ok()
    }

    /// Validate a path and express it relative to the root
    pub fn relative(&self, candidate: impl AsRef<Path>) -> Result<PathBuf, SandboxError> {
        let resolved = self.validate(candidate)?;
        Ok(resolved
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_default())
    }
}

/// Canonicalize the deepest existing ancestor of a missing path
///
/// Symlinks in the existing prefix are resolved; the missing tail is
/// normalised lexically.
fn resolve_missing(path: &Path) -> PathBuf {
    let normalized = normalize_lexically(path);

    for ancestor in normalized.ancestors().skip(1) {
        if let Ok(base) = ancestor.canonicalize() {
            return match normalized.strip_prefix(ancestor) {
                Ok(rest) => base.join(rest),
                Err(_) => normalized,
            };
        }
    }

    normalized
}

/// Collapse `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Sandbox errors
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Sandbox root does not exist: {0}")]
    RootMissing(PathBuf),

    #[error("Sandbox root is not a directory: {0}")]
    RootNotDirectory(PathBuf),

    #[error("Path '{path}' resolves to '{resolved}' which is outside sandbox '{root}'")]
    OutsideRoot {
        path: PathBuf,
        resolved: PathBuf,
        root: PathBuf,
    },

    #[error("Failed to resolve {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl SandboxError {
    /// Whether this error means the path escaped the root
    pub fn is_boundary_violation(&self) -> bool {
        matches!(self, Self::OutsideRoot { .. })
    }
}
