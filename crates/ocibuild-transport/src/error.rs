//! Error types for the HTTP transport.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for transport-layer operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// TLS handshake failed and no further downgrade tier was permitted
    /// (`strict` mode, or the ladder was already exhausted).
    #[error("TLS handshake failed for {host}:{port}")]
    #[diagnostic(
        code(ocibuild::transport::tls),
        help("the registry's certificate could not be validated; this host may need allow_insecure_registries")
    )]
    Tls {
        /// Host the handshake was attempted against.
        host: String,
        /// Port the handshake was attempted against.
        port: u16,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// `strict` mode forbade falling back past HTTPS, and HTTPS failed.
    #[error("insecure connection to {host}:{port} forbidden by strict mode")]
    #[diagnostic(code(ocibuild::transport::insecure_connection))]
    InsecureConnection {
        /// Host that would have required a downgrade.
        host: String,
        /// Port that would have required a downgrade.
        port: u16,
    },

    /// A redirect chain exceeded the configured depth limit.
    #[error("too many redirects (last Location: {last_location})")]
    #[diagnostic(code(ocibuild::transport::too_many_redirects))]
    TooManyRedirects {
        /// The last `Location` header value encountered.
        last_location: String,
    },

    /// A `Location` header could not be parsed or resolved against the
    /// original request URL.
    #[error("invalid redirect location {0:?}")]
    #[diagnostic(code(ocibuild::transport::invalid_redirect))]
    InvalidRedirect(String),

    /// The retry budget was exhausted without a successful attempt.
    #[error("request failed after exhausting the retry budget")]
    #[diagnostic(code(ocibuild::transport::retries_exhausted))]
    RetriesExhausted {
        /// The last underlying error observed.
        #[source]
        source: Box<Error>,
    },

    /// A non-retryable request body was required to retry (e.g. after a
    /// redirect or a transient failure) and could not be.
    #[error("request body is not retryable")]
    #[diagnostic(code(ocibuild::transport::body_not_retryable))]
    BodyNotRetryable,

    /// An unrecoverable I/O or protocol error, not eligible for retry.
    #[error("transport error during {operation}")]
    #[diagnostic(code(ocibuild::transport::io))]
    Io {
        /// Operation that failed (e.g. "GET https://...").
        operation: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The caller's cancellation token was observed before the request
    /// completed.
    #[error("request cancelled")]
    #[diagnostic(code(ocibuild::transport::cancelled))]
    Cancelled,
}

impl Error {
    /// Whether a subsequent attempt of the *same* request is worth making.
    /// Timeouts and connect failures on idempotent methods are retryable;
    /// redirect and configuration errors are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.is_timeout() || source.is_connect(),
            Self::Tls { .. }
            | Self::InsecureConnection { .. }
            | Self::TooManyRedirects { .. }
            | Self::InvalidRedirect(_)
            | Self::RetriesExhausted { .. }
            | Self::BodyNotRetryable
            | Self::Cancelled => false,
        }
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
