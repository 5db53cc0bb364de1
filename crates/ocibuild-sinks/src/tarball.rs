//! The in-memory form a composed image takes before it is handed to a sink.

use ocibuild_digest::Digest;

/// One layer's bytes in both forms a sink might need: the compressed blob
/// (as referenced by manifests and OCI layout blobs) and the uncompressed
/// tar (as Docker's tar archive format stores each layer).
#[derive(Clone)]
pub struct LayerBlob {
    /// Digest of the uncompressed tar.
    pub diff_id: Digest,
    /// Digest of the compressed bytes.
    pub compressed_digest: Digest,
    /// Gzipped tar bytes.
    pub compressed_bytes: Vec<u8>,
    /// Uncompressed tar bytes.
    pub uncompressed_tar: Vec<u8>,
}

/// Everything a sink needs to materialize a fully composed image: its
/// manifest, container config, and every referenced layer, oldest first.
#[derive(Clone)]
pub struct ImageTarball {
    /// The manifest's own media type.
    pub manifest_media_type: String,
    /// Serialized manifest bytes.
    pub manifest_bytes: Vec<u8>,
    /// The manifest's digest.
    pub manifest_digest: Digest,
    /// Serialized container config bytes.
    pub config_bytes: Vec<u8>,
    /// The config blob's digest.
    pub config_digest: Digest,
    /// Layers, base then application, oldest first.
    pub layers: Vec<LayerBlob>,
    /// Tags this image should be recorded under in Docker's `manifest.json`.
    pub repo_tags: Vec<String>,
}

impl ImageTarball {
    /// Total size, in bytes, of everything this tarball would write: used
    /// to size a `Content-Length` header or a progress allocation total.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        let layers: u64 = self
            .layers
            .iter()
            .map(|l| l.uncompressed_tar.len() as u64)
            .sum();
        self.manifest_bytes.len() as u64 + self.config_bytes.len() as u64 + layers
    }
}
