//! The polymorphic `Layer` value and the deduplicating `ImageLayers` list.

use crate::error::{Error, Result};
use ocibuild_digest::{Blob, BlobDescriptor, Digest};
use std::collections::HashSet;
use std::sync::Arc;

/// A layer in one of four states, reflecting how much is known about it
/// and whether its bytes are locally available.
///
/// Field access that a variant cannot satisfy returns
/// [`Error::LayerPropertyMissing`] instead of panicking.
#[derive(Clone)]
pub enum Layer {
    /// Only the uncompressed content is known; nothing has been written or
    /// uploaded yet.
    Unwritten {
        /// The uncompressed blob.
        blob: Arc<dyn Blob>,
    },
    /// Compressed on disk, with a known digest, diff-id, and size.
    Cached {
        /// Digest of the compressed bytes.
        compressed_digest: Digest,
        /// Digest of the uncompressed bytes.
        diff_id: Digest,
        /// Compressed size.
        size: u64,
        /// Path to the compressed artifact.
        compressed_path: std::path::PathBuf,
    },
    /// Known digest, diff-id, and size, but the bytes live only on a remote
    /// registry.
    Reference {
        /// Digest of the compressed bytes.
        compressed_digest: Digest,
        /// Digest of the uncompressed bytes.
        diff_id: Digest,
        /// Compressed size.
        size: u64,
    },
    /// Only the compressed digest is known; everything else is
    /// unavailable (e.g. a manifest layer entry before its diff-id has
    /// been resolved from the container config).
    DigestOnly {
        /// Digest of the compressed bytes.
        compressed_digest: Digest,
    },
}

impl Layer {
    /// The compressed digest, if known. Every variant but none carries
    /// this; `Unwritten` is the only one that does not.
    pub fn compressed_digest(&self) -> Result<&Digest> {
        match self {
            Self::Cached {
                compressed_digest, ..
            }
            | Self::Reference {
                compressed_digest, ..
            }
            | Self::DigestOnly { compressed_digest } => Ok(compressed_digest),
            Self::Unwritten { .. } => Err(Error::layer_property_missing(
                "compressed_digest",
                "Unwritten",
            )),
        }
    }

    /// The uncompressed (diff-id) digest, if known.
    pub fn diff_id(&self) -> Result<&Digest> {
        match self {
            Self::Cached { diff_id, .. } | Self::Reference { diff_id, .. } => Ok(diff_id),
            Self::Unwritten { .. } => Err(Error::layer_property_missing("diff_id", "Unwritten")),
            Self::DigestOnly { .. } => {
                Err(Error::layer_property_missing("diff_id", "DigestOnly"))
            }
        }
    }

    /// The compressed size in bytes, if known.
    pub fn size(&self) -> Result<u64> {
        match self {
            Self::Cached { size, .. } | Self::Reference { size, .. } => Ok(*size),
            Self::Unwritten { .. } => Err(Error::layer_property_missing("size", "Unwritten")),
            Self::DigestOnly { .. } => Err(Error::layer_property_missing("size", "DigestOnly")),
        }
    }

    /// The uncompressed blob, if this layer's bytes are locally available.
    pub fn blob(&self) -> Result<Arc<dyn Blob>> {
        match self {
            Self::Unwritten { blob } => Ok(blob.clone()),
            Self::Cached { .. } => Err(Error::layer_property_missing(
                "blob (read the compressed_path instead)",
                "Cached",
            )),
            Self::Reference { .. } => {
                Err(Error::layer_property_missing("blob", "Reference"))
            }
            Self::DigestOnly { .. } => {
                Err(Error::layer_property_missing("blob", "DigestOnly"))
            }
        }
    }

    /// A [`BlobDescriptor`] for the compressed bytes, if size and digest are
    /// both known.
    pub fn descriptor(&self) -> Result<BlobDescriptor> {
        Ok(BlobDescriptor::new(self.size()?, self.compressed_digest()?.clone()))
    }
}

/// An ordered, deduplicating sequence of layers.
///
/// Adding a layer whose compressed digest is already present is a no-op.
/// Iteration order is insertion order.
#[derive(Clone, Default)]
pub struct ImageLayers {
    layers: Vec<Layer>,
    present_digests: HashSet<Digest>,
}

impl ImageLayers {
    /// An empty layer sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `layer`, unless its compressed digest is already present (in
    /// which case this is a no-op and the call returns `false`).
    ///
    /// `Unwritten` layers have no digest yet, so they are always appended.
    pub fn push(&mut self, layer: Layer) -> bool {
        if let Ok(digest) = layer.compressed_digest() {
            if self.present_digests.contains(digest) {
                return false;
            }
            self.present_digests.insert(digest.clone());
        }
        self.layers.push(layer);
        true
    }

    /// Iterate the layers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether there are no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocibuild_digest::BytesBlob;

    fn digest_only(byte: u8) -> Layer {
        Layer::DigestOnly {
            compressed_digest: Digest::of_bytes(&[byte]),
        }
    }

    #[test]
    fn unwritten_layer_reports_missing_digest() {
        let layer = Layer::Unwritten {
            blob: Arc::new(BytesBlob::new(b"hi".to_vec())),
        };
        assert!(layer.compressed_digest().is_err());
        assert!(layer.blob().is_ok());
    }

    #[test]
    fn digest_only_layer_reports_missing_diff_id_and_size() {
        let layer = digest_only(1);
        assert!(layer.compressed_digest().is_ok());
        assert!(layer.diff_id().is_err());
        assert!(layer.size().is_err());
        assert!(layer.blob().is_err());
    }

    #[test]
    fn cached_layer_reports_full_descriptor() {
        let layer = Layer::Cached {
            compressed_digest: Digest::of_bytes(b"c"),
            diff_id: Digest::of_bytes(b"d"),
            size: 42,
            compressed_path: "/tmp/x".into(),
        };
        let descriptor = layer.descriptor().unwrap();
        assert_eq!(descriptor.size, 42);
    }

    #[test]
    fn image_layers_deduplicates_by_compressed_digest() {
        let mut layers = ImageLayers::new();
        assert!(layers.push(digest_only(1)));
        assert!(!layers.push(digest_only(1)));
        assert!(layers.push(digest_only(2)));
        assert_eq!(layers.len(), 2);
    }

    #[test]
    fn image_layers_preserves_insertion_order() {
        let mut layers = ImageLayers::new();
        layers.push(digest_only(3));
        layers.push(digest_only(1));
        layers.push(digest_only(2));
        let digests: Vec<_> = layers
            .iter()
            .map(|l| l.compressed_digest().unwrap().clone())
            .collect();
        assert_eq!(
            digests,
            vec![
                Digest::of_bytes(&[3]),
                Digest::of_bytes(&[1]),
                Digest::of_bytes(&[2])
            ]
        );
    }

    #[test]
    fn unwritten_layers_are_always_appended() {
        let mut layers = ImageLayers::new();
        layers.push(Layer::Unwritten {
            blob: Arc::new(BytesBlob::new(b"a".to_vec())),
        });
        layers.push(Layer::Unwritten {
            blob: Arc::new(BytesBlob::new(b"a".to_vec())),
        });
        assert_eq!(layers.len(), 2);
    }
}
