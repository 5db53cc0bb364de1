//! Error types for the reproducible tar builder.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for tar-building operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// An ownership string was not of the form `"uid:gid"` with numeric parts.
    #[error("invalid ownership string {0:?}, expected \"uid:gid\"")]
    #[diagnostic(code(ocibuild::tar::invalid_ownership))]
    InvalidOwnership(String),

    /// A permission value did not fit in 9 bits.
    #[error("permission value {0:#o} does not fit in 9 bits")]
    #[diagnostic(code(ocibuild::tar::invalid_permissions))]
    InvalidPermissions(u32),

    /// I/O error while building the archive.
    #[error("I/O error during {operation}")]
    #[diagnostic(code(ocibuild::tar::io))]
    Io {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Operation that failed.
        operation: String,
    },
}

impl Error {
    /// Build an [`Error::Io`].
    #[must_use]
    pub fn io(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            operation: operation.into(),
        }
    }
}

/// Result type for tar-building operations.
pub type Result<T> = std::result::Result<T, Error>;
