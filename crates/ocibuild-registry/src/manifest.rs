//! The raw, untranslated manifest bytes returned by a registry.
//!
//! Translating these into the application's `Image` model is
//! `ocibuild-image`'s job; this crate only speaks the wire protocol.

use ocibuild_digest::Digest;

/// Media types this client recognizes as manifests it can push or pull.
pub const MEDIA_TYPE_DOCKER_MANIFEST_V2: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
/// OCI image manifest media type.
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// Deprecated Docker schema-1 manifest media type.
pub const MEDIA_TYPE_DOCKER_MANIFEST_V1: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
/// Docker manifest list (multi-platform) media type.
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
/// OCI image index (multi-platform) media type.
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Manifest media types accepted when pulling, in preference order.
pub const ACCEPTED_MANIFEST_MEDIA_TYPES: &[&str] = &[
    MEDIA_TYPE_OCI_MANIFEST,
    MEDIA_TYPE_DOCKER_MANIFEST_V2,
    MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_DOCKER_MANIFEST_LIST,
    MEDIA_TYPE_DOCKER_MANIFEST_V1,
];

/// A manifest as returned by (or sent to) a registry: raw bytes plus the
/// media type they were served under and their digest.
#[derive(Clone, Debug)]
pub struct RawManifest {
    /// The `Content-Type` the registry used.
    pub media_type: String,
    /// The manifest body, byte-for-byte as received.
    pub bytes: Vec<u8>,
    /// The digest of `bytes`, either computed locally (push) or taken from
    /// `Docker-Content-Digest` (pull).
    pub digest: Digest,
}

impl RawManifest {
    /// Whether this manifest is a multi-platform list/index rather than a
    /// single-platform image manifest.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            MEDIA_TYPE_DOCKER_MANIFEST_LIST | MEDIA_TYPE_OCI_INDEX
        )
    }
}
