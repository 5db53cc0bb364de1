//! Error types for digest and blob primitives.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for digest and blob operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A digest string did not match `sha256:[a-f0-9]{64}` (or the bare hex form).
    #[error("invalid digest {0:?}")]
    #[diagnostic(
        code(ocibuild::digest::invalid),
        help("digests must be a 64-character lowercase hex sha256 hash, optionally prefixed with \"sha256:\"")
    )]
    InvalidDigest(String),

    /// I/O error while computing or writing a blob.
    #[error("I/O error during {operation}")]
    #[diagnostic(code(ocibuild::digest::io))]
    Io {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Operation that failed (e.g. "write", "read").
        operation: String,
    },

    /// The bytes observed while writing a blob did not hash to the digest the
    /// caller asserted in advance.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    #[diagnostic(code(ocibuild::digest::mismatch))]
    Mismatch {
        /// Digest asserted by the caller.
        expected: String,
        /// Digest actually observed.
        actual: String,
    },
}

impl Error {
    /// Build an [`Error::InvalidDigest`].
    #[must_use]
    pub fn invalid_digest(s: impl Into<String>) -> Self {
        Self::InvalidDigest(s.into())
    }

    /// Build an [`Error::Io`].
    #[must_use]
    pub fn io(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            operation: operation.into(),
        }
    }

    /// Build an [`Error::Mismatch`].
    #[must_use]
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Mismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result type for digest and blob operations.
pub type Result<T> = std::result::Result<T, Error>;
