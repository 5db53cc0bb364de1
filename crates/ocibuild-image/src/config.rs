//! Container configuration JSON (the blob a manifest's `config` descriptor
//! points at).

use crate::error::{Error, Result};
use crate::image::Image;
use chrono::{DateTime, Utc};
use ocibuild_digest::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root filesystem descriptor: type plus the ordered diff-ids of every
/// layer, base then application, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,
    #[serde(rename = "diff_ids")]
    pub diff_ids: Vec<String>,
}

/// The `config` object nested inside the container config, mirroring the
/// subset of `docker inspect` fields the build engine sets. Field names
/// follow the Docker image-config convention of capitalizing each word.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecConfig {
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cmd: Option<Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub exposed_ports: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub volumes: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<String>,
}

/// The container configuration JSON blob: architecture/os, creation time,
/// the nested exec `config`, and `rootfs.diff_ids`.
///
/// Field order is fixed to match what real registries and daemons expect
/// to see, and every collection is emitted with sorted keys / insertion
/// order as declared in the field types above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub architecture: String,
    pub created: DateTime<Utc>,
    pub os: String,
    pub config: ExecConfig,
    pub rootfs: RootFs,
}

impl ContainerConfig {
    /// Build a container configuration from an [`Image`], validating that
    /// the number of diff-ids it would emit matches the manifest layer
    /// count passed in (the manifest and the config must stay in lockstep).
    pub fn from_image(image: &Image, manifest_layer_count: usize) -> Result<Self> {
        let mut diff_ids = Vec::new();
        for layer in image.base_layers.iter().chain(image.app_layers.iter()) {
            diff_ids.push(layer.diff_id()?.canonical().to_string());
        }

        if diff_ids.len() != manifest_layer_count {
            return Err(Error::LayerCountMismatch {
                config_count: diff_ids.len(),
                manifest_count: manifest_layer_count,
            });
        }

        Ok(Self {
            architecture: image.architecture.clone(),
            created: image.creation_time,
            os: image.os.clone(),
            config: ExecConfig {
                env: image.environment.clone(),
                entrypoint: if image.entrypoint.is_empty() {
                    None
                } else {
                    Some(image.entrypoint.clone())
                },
                cmd: if image.cmd.is_empty() {
                    None
                } else {
                    Some(image.cmd.clone())
                },
                labels: image.labels.clone(),
                exposed_ports: image
                    .exposed_ports
                    .iter()
                    .map(|p| (p.clone(), serde_json::Value::Object(Default::default())))
                    .collect(),
                volumes: image
                    .volumes
                    .iter()
                    .map(|v| (v.clone(), serde_json::Value::Object(Default::default())))
                    .collect(),
                working_dir: image.working_dir.clone(),
                user: image.user.clone(),
            },
            rootfs: RootFs {
                fs_type: "layers".to_string(),
                diff_ids,
            },
        })
    }

    /// Serialize to canonical JSON bytes (UTF-8, no BOM).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::json("container config", e))
    }

    /// The layer's diff-id digests, in config order.
    pub fn diff_ids(&self) -> Result<Vec<Digest>> {
        self.rootfs
            .diff_ids
            .iter()
            .map(|s| Digest::from_canonical(s).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::layer::Layer;

    fn layer(byte: u8) -> Layer {
        Layer::Cached {
            compressed_digest: Digest::of_bytes(&[byte]),
            diff_id: Digest::of_bytes(&[byte, byte]),
            size: 10,
            compressed_path: "/tmp/x".into(),
        }
    }

    #[test]
    fn from_image_collects_diff_ids_in_order() {
        let mut image = Image::new("linux".into(), "amd64".into());
        image.base_layers.push(layer(1));
        image.app_layers.push(layer(2));
        let config = ContainerConfig::from_image(&image, 2).unwrap();
        assert_eq!(config.rootfs.diff_ids.len(), 2);
        assert_eq!(config.rootfs.fs_type, "layers");
    }

    #[test]
    fn mismatched_layer_count_is_rejected() {
        let mut image = Image::new("linux".into(), "amd64".into());
        image.base_layers.push(layer(1));
        let err = ContainerConfig::from_image(&image, 5).unwrap_err();
        assert!(matches!(err, Error::LayerCountMismatch { .. }));
    }

    #[test]
    fn empty_entrypoint_and_cmd_are_omitted() {
        let image = Image::new("linux".into(), "amd64".into());
        let config = ContainerConfig::from_image(&image, 0).unwrap();
        let json = config.to_json().unwrap();
        let text = String::from_utf8(json).unwrap();
        assert!(!text.contains("\"Entrypoint\""));
    }
}
