//! Error types for the output sinks.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for sink operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// An I/O operation on a path failed.
    #[error("{operation} failed for {path}")]
    #[diagnostic(code(ocibuild::sinks::io))]
    Io {
        /// Path the operation targeted.
        path: String,
        /// What was being done.
        operation: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed.
    #[error("failed to serialize {what}")]
    #[diagnostic(code(ocibuild::sinks::json))]
    Json {
        /// What was being serialized.
        what: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The daemon's image-load endpoint responded with an unexpected
    /// status line.
    #[error("daemon image load failed: {status_line}")]
    #[diagnostic(code(ocibuild::sinks::daemon_load_failed))]
    DaemonLoadFailed {
        /// The HTTP status line the daemon returned.
        status_line: String,
    },

    /// An image-model operation failed while assembling a sink's input.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::sinks::image))]
    Image(#[from] ocibuild_image::Error),
}

impl Error {
    /// Build an `Io` error.
    pub fn io(path: impl Into<String>, operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Build a `Json` error.
    pub fn json(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            what: what.into(),
            source,
        }
    }
}

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, Error>;
