//! The orchestrator's error taxonomy, folding every lower crate's errors
//! into one set of kinds an integrator can match on without knowing which
//! internal crate raised them.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for build orchestration.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A malformed digest, image reference, permission string, or an empty
    /// target platform set.
    #[error("invalid input: {0}")]
    #[diagnostic(code(ocibuild::build::invalid_input))]
    InvalidInput(String),

    /// A 401 was returned and no credentials were available to answer it.
    #[error("authentication required for {registry}")]
    #[diagnostic(code(ocibuild::build::auth_required))]
    AuthRequired {
        /// Registry host that challenged the request.
        registry: String,
    },

    /// A 401 was returned even though credentials were supplied.
    #[error("authentication failed for {registry}: {message}")]
    #[diagnostic(code(ocibuild::build::auth_failed))]
    AuthFailed {
        /// Registry host that rejected the credentials.
        registry: String,
        /// Registry-supplied or locally-determined reason.
        message: String,
    },

    /// A 403 was returned.
    #[error("access forbidden for {registry}")]
    #[diagnostic(code(ocibuild::build::auth_forbidden))]
    AuthForbidden {
        /// Registry host that forbade the request.
        registry: String,
    },

    /// A 401 occurred after the transport stripped credentials because the
    /// connection was downgraded to plain HTTP.
    #[error("credentials were withheld because the connection to {registry} was downgraded to plain HTTP")]
    #[diagnostic(code(ocibuild::build::credentials_not_sent))]
    CredentialsNotSent {
        /// Registry host the downgrade happened against.
        registry: String,
    },

    /// A 4xx response with a parseable error envelope.
    #[error("registry error {code}: {}", reasons.join("; "))]
    #[diagnostic(code(ocibuild::build::registry_error))]
    RegistryError {
        /// The first error's code, e.g. `BLOB_UNKNOWN`.
        code: String,
        /// Every error message in the envelope, in order.
        reasons: Vec<String>,
    },

    /// A committed cache entry failed digest verification on read.
    #[error("cache entry for {digest} is corrupted")]
    #[diagnostic(code(ocibuild::build::cache_corrupted))]
    CacheCorrupted {
        /// Digest of the corrupted entry.
        digest: String,
    },

    /// The caller forbade insecure fallback and HTTPS failed.
    #[error("insecure connection to {host} forbidden")]
    #[diagnostic(code(ocibuild::build::insecure_connection))]
    InsecureConnection {
        /// Host that would have required a downgrade.
        host: String,
    },

    /// The build was cancelled before completing.
    #[error("build cancelled")]
    #[diagnostic(code(ocibuild::build::cancelled))]
    Cancelled,

    /// The step graph reported a named step failure; preserved as-is so the
    /// failing step's name survives in the error chain.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::build::graph))]
    Graph(#[from] ocibuild_graph::Error),

    /// The registry client failed in a way not covered by a specific kind
    /// above (digest mismatch, missing Location header, bad challenge...).
    #[error(transparent)]
    #[diagnostic(code(ocibuild::build::registry))]
    Registry(#[from] ocibuild_registry::Error),

    /// The cache layer failed outside of the `CacheCorrupted` case.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::build::cache))]
    Cache(#[from] ocibuild_cache::Error),

    /// The image model rejected a manifest, config, or layer operation.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::build::image))]
    Image(#[from] ocibuild_image::Error),

    /// The reproducible tar builder failed.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::build::tar))]
    Tar(#[from] ocibuild_tar::Error),

    /// An output sink (Docker-tar, OCI layout, daemon load) failed.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::build::sinks))]
    Sinks(#[from] ocibuild_sinks::Error),

    /// The underlying transport failed outside of the specific auth/
    /// insecure-connection cases above.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::build::transport))]
    Transport(#[from] ocibuild_transport::Error),

    /// A digest or blob primitive failed.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::build::digest))]
    Digest(#[from] ocibuild_digest::Error),

    /// An I/O operation on a path failed (e.g. writing a tarball to disk).
    #[error("{operation} failed for {}", path.display())]
    #[diagnostic(code(ocibuild::build::io))]
    Io {
        /// Path the operation targeted.
        path: std::path::PathBuf,
        /// What was being done.
        operation: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Build an [`Error::InvalidInput`].
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Build an [`Error::Io`].
    #[must_use]
    pub fn io(path: impl Into<std::path::PathBuf>, operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Translate a wire-level registry error into the orchestrator's
    /// taxonomy, attaching the registry host for the auth-shaped variants.
    #[must_use]
    pub fn from_registry(registry: &str, source: ocibuild_registry::Error) -> Self {
        match source {
            ocibuild_registry::Error::AuthenticationFailed { registry, message } => {
                Self::AuthFailed { registry, message }
            }
            ocibuild_registry::Error::CredentialsNotSent { registry } => {
                Self::CredentialsNotSent { registry }
            }
            ocibuild_registry::Error::Api { code, message } => Self::RegistryError {
                code,
                reasons: vec![message],
            },
            ocibuild_registry::Error::UnexpectedStatus { status: 401, .. } => Self::AuthRequired {
                registry: registry.to_string(),
            },
            ocibuild_registry::Error::UnexpectedStatus { status: 403, .. } => Self::AuthForbidden {
                registry: registry.to_string(),
            },
            other => Self::Registry(other),
        }
    }
}

/// Result type for build orchestration.
pub type Result<T> = std::result::Result<T, Error>;
