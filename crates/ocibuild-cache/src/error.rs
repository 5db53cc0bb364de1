//! Error types for the layer cache.

use miette::Diagnostic;
use thiserror::Error;
use std::path::PathBuf;

/// Error type for cache operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// No writable cache root could be found among the candidate
    /// directories.
    #[error("no writable cache directory found")]
    #[diagnostic(
        code(ocibuild::cache::no_writable_root),
        help("set OCIBUILD_CACHE_DIR to an explicit writable directory")
    )]
    NoWritableRoot,

    /// Filesystem operation failed.
    #[error("cache I/O error during {operation} on {}", path.display())]
    #[diagnostic(code(ocibuild::cache::io))]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// What was being done, e.g. `"rename"`.
        operation: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A selector or layer entry could not be serialized to its canonical
    /// JSON form.
    #[error("failed to serialize {what} to canonical JSON")]
    #[diagnostic(code(ocibuild::cache::serialization))]
    Serialization {
        /// What was being serialized.
        what: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A digest-layer operation failed.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::cache::digest))]
    Digest(#[from] ocibuild_digest::Error),
}

impl Error {
    /// Build an `Io` error.
    #[must_use]
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Build a `Serialization` error.
    #[must_use]
    pub fn serialization(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            what: what.into(),
            source,
        }
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
