//! Manifest templates: the v2.2, OCI, schema-v1, and manifest-list/index
//! JSON shapes, plus translation into the internal [`crate::image::Image`].

use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::platform::Platform;
use ocibuild_digest::{BlobDescriptor, Digest};
use serde::{Deserialize, Serialize};

/// Media type constants, mirroring the registry wire protocol.
pub const MEDIA_TYPE_DOCKER_MANIFEST_V2: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_V1: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// A content descriptor as it appears in manifest `config`/`layers` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub size: i64,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub urls: Option<Vec<String>>,
}

impl Descriptor {
    #[must_use]
    pub fn new(media_type: impl Into<String>, descriptor: &BlobDescriptor) -> Self {
        Self {
            media_type: media_type.into(),
            size: descriptor.size,
            digest: descriptor.digest.canonical().to_string(),
            urls: None,
        }
    }

    pub fn digest(&self) -> Result<Digest> {
        Digest::from_canonical(&self.digest).map_err(Error::from)
    }
}

/// Schema 2 (Docker v2.2) / OCI image manifest. Structurally identical
/// apart from media types, so both variants share this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V22Manifest {
    pub schema_version: u32,
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// Schema 1 (deprecated) manifest: fs-layers in reverse chronological
/// order, with per-layer history fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V21Schema1Manifest {
    pub schema_version: u32,
    pub name: String,
    pub tag: String,
    pub architecture: String,
    pub fs_layers: Vec<FsLayer>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    pub blob_sum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// One entry in a manifest list / OCI image index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestListEntry {
    pub media_type: String,
    pub size: i64,
    pub digest: String,
    pub platform: Platform,
}

/// A manifest list (Docker) or image index (OCI).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    pub schema_version: u32,
    pub media_type: String,
    pub manifests: Vec<ManifestListEntry>,
}

impl ManifestList {
    /// Select the entry matching `os`/`architecture`, defaulting to
    /// `linux/amd64` when the caller doesn't care.
    pub fn select(&self, os: &str, architecture: &str) -> Result<&ManifestListEntry> {
        self.manifests
            .iter()
            .find(|entry| entry.platform.matches(os, architecture))
            .ok_or_else(|| Error::PlatformNotFound {
                os: os.to_string(),
                architecture: architecture.to_string(),
            })
    }
}

/// The discriminated union of manifest shapes a registry may return.
#[derive(Debug, Clone)]
pub enum Manifest {
    V21Schema1(V21Schema1Manifest),
    V22Schema2(V22Manifest),
    Oci(V22Manifest),
    ManifestList(ManifestList),
}

impl Manifest {
    /// Parse raw JSON bytes plus the `Content-Type` the registry served
    /// them with, using the media type (and, failing that, the body's own
    /// `mediaType`/`schemaVersion` fields) to pick a variant.
    pub fn parse(media_type: &str, bytes: &[u8]) -> Result<Self> {
        match media_type {
            MEDIA_TYPE_DOCKER_MANIFEST_V2 => {
                let manifest: V22Manifest =
                    serde_json::from_slice(bytes).map_err(|e| Error::json("v2.2 manifest", e))?;
                Ok(Self::V22Schema2(manifest))
            }
            MEDIA_TYPE_OCI_MANIFEST => {
                let manifest: V22Manifest =
                    serde_json::from_slice(bytes).map_err(|e| Error::json("OCI manifest", e))?;
                Ok(Self::Oci(manifest))
            }
            MEDIA_TYPE_DOCKER_MANIFEST_V1 => {
                let manifest: V21Schema1Manifest = serde_json::from_slice(bytes)
                    .map_err(|e| Error::json("schema-v1 manifest", e))?;
                Ok(Self::V21Schema1(manifest))
            }
            MEDIA_TYPE_DOCKER_MANIFEST_LIST | MEDIA_TYPE_OCI_INDEX => {
                let list: ManifestList =
                    serde_json::from_slice(bytes).map_err(|e| Error::json("manifest list", e))?;
                Ok(Self::ManifestList(list))
            }
            _ => Self::parse_by_sniffing(bytes),
        }
    }

    fn parse_by_sniffing(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::json("manifest", e))?;
        if value.get("manifests").is_some() {
            let list: ManifestList =
                serde_json::from_value(value).map_err(|e| Error::json("manifest list", e))?;
            return Ok(Self::ManifestList(list));
        }
        if value.get("fsLayers").is_some() {
            let manifest: V21Schema1Manifest = serde_json::from_value(value)
                .map_err(|e| Error::json("schema-v1 manifest", e))?;
            return Ok(Self::V21Schema1(manifest));
        }
        if value.get("config").is_some() && value.get("layers").is_some() {
            let manifest: V22Manifest =
                serde_json::from_value(value).map_err(|e| Error::json("v2.2 manifest", e))?;
            return Ok(Self::V22Schema2(manifest));
        }
        Err(Error::ManifestFormatUnknown)
    }

    /// The manifest's own `schemaVersion` field.
    #[must_use]
    pub fn schema_version(&self) -> u32 {
        match self {
            Self::V21Schema1(m) => m.schema_version,
            Self::V22Schema2(m) | Self::Oci(m) => m.schema_version,
            Self::ManifestList(m) => m.schema_version,
        }
    }

    /// The media type to send as `Content-Type` / `Accept`, where
    /// applicable.
    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        match self {
            Self::V21Schema1(_) => Some(MEDIA_TYPE_DOCKER_MANIFEST_V1),
            Self::V22Schema2(m) | Self::Oci(m) => Some(m.media_type.as_str()),
            Self::ManifestList(m) => Some(m.media_type.as_str()),
        }
    }

    /// Whether this manifest is a list/index requiring platform selection.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::ManifestList(_))
    }

    /// Layers in forward (oldest-first) order, regardless of the wire
    /// representation's own ordering. Schema-v1's reverse-chronological
    /// fs-layers are un-reversed here.
    pub fn layers_forward_order(&self) -> Result<Vec<Layer>> {
        match self {
            Self::V22Schema2(m) | Self::Oci(m) => m
                .layers
                .iter()
                .map(|d| {
                    Ok(Layer::DigestOnly {
                        compressed_digest: d.digest()?,
                    })
                })
                .collect(),
            Self::V21Schema1(m) => m
                .fs_layers
                .iter()
                .rev()
                .map(|fs_layer| {
                    Ok(Layer::DigestOnly {
                        compressed_digest: Digest::from_canonical(&fs_layer.blob_sum)?,
                    })
                })
                .collect(),
            Self::ManifestList(_) => Err(Error::ManifestFormatUnknown),
        }
    }

    /// Compressed blob sizes in the same forward order as
    /// [`Self::layers_forward_order`]. Schema-v1 carries no size field on
    /// its fs-layers, so those entries report `0`.
    pub fn layer_sizes_forward_order(&self) -> Result<Vec<u64>> {
        match self {
            Self::V22Schema2(m) | Self::Oci(m) => {
                Ok(m.layers.iter().map(|d| d.size.max(0) as u64).collect())
            }
            Self::V21Schema1(m) => Ok(vec![0; m.fs_layers.len()]),
            Self::ManifestList(_) => Err(Error::ManifestFormatUnknown),
        }
    }

    /// The config descriptor, for variants that carry one.
    pub fn config_descriptor(&self) -> Result<&Descriptor> {
        match self {
            Self::V22Schema2(m) | Self::Oci(m) => Ok(&m.config),
            Self::V21Schema1(_) | Self::ManifestList(_) => Err(Error::ManifestFormatUnknown),
        }
    }

    /// Serialize to canonical JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let value = match self {
            Self::V21Schema1(m) => serde_json::to_vec(m),
            Self::V22Schema2(m) | Self::Oci(m) => serde_json::to_vec(m),
            Self::ManifestList(m) => serde_json::to_vec(m),
        };
        value.map_err(|e| Error::json("manifest", e))
    }

    /// Build a v2.2 or OCI manifest from a config descriptor and an
    /// ordered list of layer descriptors.
    #[must_use]
    pub fn build_v22(
        oci: bool,
        config: Descriptor,
        layers: Vec<Descriptor>,
    ) -> Self {
        let manifest = V22Manifest {
            schema_version: 2,
            media_type: if oci {
                MEDIA_TYPE_OCI_MANIFEST.to_string()
            } else {
                MEDIA_TYPE_DOCKER_MANIFEST_V2.to_string()
            },
            config,
            layers,
        };
        if oci {
            Self::Oci(manifest)
        } else {
            Self::V22Schema2(manifest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(byte: u8) -> Descriptor {
        Descriptor::new(
            MEDIA_TYPE_DOCKER_MANIFEST_V2,
            &BlobDescriptor::new(10, Digest::of_bytes(&[byte])),
        )
    }

    #[test]
    fn parses_v22_manifest_by_media_type() {
        let manifest = Manifest::build_v22(false, descriptor(1), vec![descriptor(2)]);
        let json = manifest.to_json().unwrap();
        let parsed = Manifest::parse(MEDIA_TYPE_DOCKER_MANIFEST_V2, &json).unwrap();
        assert_eq!(parsed.schema_version(), 2);
        assert!(!parsed.is_list());
    }

    #[test]
    fn schema_v1_fs_layers_are_unreversed() {
        let manifest = V21Schema1Manifest {
            schema_version: 1,
            name: "library/test".to_string(),
            tag: "latest".to_string(),
            architecture: "amd64".to_string(),
            fs_layers: vec![
                FsLayer {
                    blob_sum: Digest::of_bytes(b"newest").canonical().to_string(),
                },
                FsLayer {
                    blob_sum: Digest::of_bytes(b"oldest").canonical().to_string(),
                },
            ],
            history: vec![],
        };
        let manifest = Manifest::V21Schema1(manifest);
        let layers = manifest.layers_forward_order().unwrap();
        assert_eq!(
            layers[0].compressed_digest().unwrap(),
            &Digest::of_bytes(b"oldest")
        );
        assert_eq!(
            layers[1].compressed_digest().unwrap(),
            &Digest::of_bytes(b"newest")
        );
    }

    #[test]
    fn manifest_list_selects_requested_platform() {
        let list = ManifestList {
            schema_version: 2,
            media_type: MEDIA_TYPE_DOCKER_MANIFEST_LIST.to_string(),
            manifests: vec![
                ManifestListEntry {
                    media_type: MEDIA_TYPE_DOCKER_MANIFEST_V2.to_string(),
                    size: 1,
                    digest: Digest::of_bytes(b"arm").canonical().to_string(),
                    platform: Platform {
                        os: "linux".to_string(),
                        architecture: "arm64".to_string(),
                        variant: Some("v8".to_string()),
                    },
                },
                ManifestListEntry {
                    media_type: MEDIA_TYPE_DOCKER_MANIFEST_V2.to_string(),
                    size: 1,
                    digest: Digest::of_bytes(b"amd").canonical().to_string(),
                    platform: Platform::default_target(),
                },
            ],
        };
        let entry = list.select("linux", "amd64").unwrap();
        assert_eq!(entry.digest, Digest::of_bytes(b"amd").canonical().to_string());
        assert!(list.select("linux", "riscv64").is_err());
    }

    #[test]
    fn unknown_media_type_falls_back_to_sniffing() {
        let manifest = Manifest::build_v22(true, descriptor(1), vec![descriptor(2)]);
        let json = manifest.to_json().unwrap();
        let parsed = Manifest::parse("application/octet-stream", &json).unwrap();
        assert!(matches!(parsed, Manifest::V22Schema2(_)));
    }
}
