//! Error types for host network operations.

use thiserror::Error;

/// Result type alias for host network operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors returned by the host executor.
///
/// `NotFound` and `AlreadyExists` are first-class outcomes, not just
/// failures: callers performing ensure- or remove-style operations treat
/// them as success.
#[derive(Debug, Error)]
pub enum NetError {
    /// The external tool could not be launched at all.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The target kernel object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The kernel object (or rule) is already present.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The operation requires privileges the process does not have.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other tool failure, with the command line and captured stderr.
    #[error("command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

impl NetError {
    /// Returns true if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is an already exists error.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}
