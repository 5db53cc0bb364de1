//! Error types for registry wire operations.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for registry operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The registry's `WWW-Authenticate` challenge could not be parsed.
    #[error("unparseable WWW-Authenticate challenge: {0:?}")]
    #[diagnostic(code(ocibuild::registry::bad_challenge))]
    BadChallenge(String),

    /// The credential provider refused to supply credentials, or the
    /// registry rejected them.
    #[error("authentication failed for {registry}: {message}")]
    #[diagnostic(code(ocibuild::registry::auth_failed))]
    AuthenticationFailed {
        /// Registry host.
        registry: String,
        /// Registry-supplied or locally-determined reason.
        message: String,
    },

    /// A request carried an `Authorization` header but the transport
    /// stripped it before sending because the connection was downgraded to
    /// cleartext HTTP, and the registry then answered with a 401.
    #[error("credentials were withheld from {registry} because the connection was downgraded to plain HTTP")]
    #[diagnostic(code(ocibuild::registry::credentials_not_sent))]
    CredentialsNotSent {
        /// Registry host the downgrade happened against.
        registry: String,
    },

    /// A manifest pull or push returned a body that did not parse as any
    /// known manifest media type.
    #[error("unrecognized manifest media type {0:?}")]
    #[diagnostic(code(ocibuild::registry::unknown_manifest_type))]
    UnknownManifestType(String),

    /// The registry responded with an error envelope
    /// (`{"errors": [{"code": ..., "message": ...}]}`).
    #[error("registry error {code}: {message}")]
    #[diagnostic(code(ocibuild::registry::api_error))]
    Api {
        /// The registry's error code, e.g. `BLOB_UNKNOWN`, `MANIFEST_INVALID`.
        code: String,
        /// Human-readable detail.
        message: String,
    },

    /// An HTTP response had a status this client does not know how to
    /// interpret for the operation attempted.
    #[error("unexpected status {status} from {operation}")]
    #[diagnostic(code(ocibuild::registry::unexpected_status))]
    UnexpectedStatus {
        /// The operation attempted, e.g. `"push manifest"`.
        operation: String,
        /// The HTTP status code received.
        status: u16,
    },

    /// A blob or manifest's computed digest did not match the digest the
    /// caller requested or declared.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    #[diagnostic(code(ocibuild::registry::digest_mismatch))]
    DigestMismatch {
        /// Digest the caller expected.
        expected: String,
        /// Digest actually observed.
        actual: String,
    },

    /// The server omitted a `Location` header where the upload state
    /// machine requires one.
    #[error("{operation} response had no Location header")]
    #[diagnostic(code(ocibuild::registry::missing_location))]
    MissingLocation {
        /// The operation that required the header.
        operation: String,
    },

    /// Response body failed to deserialize as JSON.
    #[error("failed to parse {what} as JSON")]
    #[diagnostic(code(ocibuild::registry::json))]
    Json {
        /// What was being parsed, e.g. `"manifest"`.
        what: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The underlying transport failed.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::registry::transport))]
    Transport(#[from] ocibuild_transport::Error),

    /// A digest-layer operation failed.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::registry::digest))]
    Digest(#[from] ocibuild_digest::Error),
}

impl Error {
    /// Build an `AuthenticationFailed` error.
    #[must_use]
    pub fn authentication_failed(registry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            registry: registry.into(),
            message: message.into(),
        }
    }

    /// Build a `MissingLocation` error.
    #[must_use]
    pub fn missing_location(operation: impl Into<String>) -> Self {
        Self::MissingLocation {
            operation: operation.into(),
        }
    }

    /// Build a `Json` error.
    #[must_use]
    pub fn json(what: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            what: what.into(),
            source,
        }
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;
