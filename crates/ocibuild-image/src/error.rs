//! Error types for the image model.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for image-model operations.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Access to a field a [`crate::Layer`] variant does not carry.
    #[error("layer is missing {property}: it is in the {state} state")]
    #[diagnostic(
        code(ocibuild::image::layer_property_missing),
        help("only Cached and Reference layers carry a size; only Unwritten and Cached layers carry a Blob")
    )]
    LayerPropertyMissing {
        /// The field that was requested.
        property: &'static str,
        /// The variant's name, for diagnostics.
        state: &'static str,
    },

    /// A manifest's `schemaVersion`/`mediaType` did not match any supported
    /// variant.
    #[error("unsupported or missing schemaVersion/mediaType")]
    #[diagnostic(code(ocibuild::image::manifest_format_unknown))]
    ManifestFormatUnknown,

    /// The container config's `rootfs.diff_ids` length did not match the
    /// manifest's layer count.
    #[error("layer count mismatch: config has {config_count} diff-ids, manifest has {manifest_count} layers")]
    #[diagnostic(code(ocibuild::image::layer_count_mismatch))]
    LayerCountMismatch {
        /// Diff-id count from the container config.
        config_count: usize,
        /// Layer count from the manifest.
        manifest_count: usize,
    },

    /// No platform-matching entry was found in a manifest list/index.
    #[error("no entry for platform {os}/{architecture} in manifest list")]
    #[diagnostic(code(ocibuild::image::platform_not_found))]
    PlatformNotFound {
        /// Requested OS.
        os: String,
        /// Requested architecture.
        architecture: String,
    },

    /// JSON (de)serialization failed.
    #[error("failed to (de)serialize {what}")]
    #[diagnostic(code(ocibuild::image::json))]
    Json {
        /// What was being processed.
        what: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A digest-layer operation failed.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::image::digest))]
    Digest(#[from] ocibuild_digest::Error),
}

impl Error {
    /// Build a `LayerPropertyMissing` error.
    #[must_use]
    pub fn layer_property_missing(property: &'static str, state: &'static str) -> Self {
        Self::LayerPropertyMissing { property, state }
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

/// Result type for image-model operations.
pub type Result<T> = std::result::Result<T, Error>;
