//! The `Image` aggregate: base and application layers plus runtime config.

use crate::layer::ImageLayers;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// A container image under construction: a base layer sequence, an
/// application layer sequence, and the runtime configuration that will end
/// up in the container config JSON.
#[derive(Clone)]
pub struct Image {
    /// Layers pulled from (or synthesized for) the base image, oldest first.
    pub base_layers: ImageLayers,
    /// Layers built for the application, oldest first.
    pub app_layers: ImageLayers,
    /// Environment variables, `KEY=value` pairs flattened into a map.
    pub environment: BTreeMap<String, String>,
    /// Entrypoint argv, if overridden from the base image.
    pub entrypoint: Vec<String>,
    /// Default command argv, if overridden from the base image.
    pub cmd: Vec<String>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Exposed ports, e.g. `"8080/tcp"`.
    pub exposed_ports: Vec<String>,
    /// Declared volumes, absolute container paths.
    pub volumes: Vec<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Runtime user, `"uid[:gid]"` or a name.
    pub user: Option<String>,
    /// Target architecture, e.g. `"amd64"`.
    pub architecture: String,
    /// Target OS, e.g. `"linux"`.
    pub os: String,
    /// Image creation timestamp.
    pub creation_time: DateTime<Utc>,
}

impl Image {
    /// A new, empty image targeting the given OS/architecture, with
    /// creation time set to the Unix epoch plus one second (the fixed
    /// timestamp used throughout for reproducibility).
    #[must_use]
    pub fn new(os: String, architecture: String) -> Self {
        Self {
            base_layers: ImageLayers::new(),
            app_layers: ImageLayers::new(),
            environment: BTreeMap::new(),
            entrypoint: Vec::new(),
            cmd: Vec::new(),
            labels: BTreeMap::new(),
            exposed_ports: Vec::new(),
            volumes: Vec::new(),
            working_dir: None,
            user: None,
            architecture,
            os,
            creation_time: Utc.timestamp_opt(1, 0).single().unwrap_or_else(Utc::now),
        }
    }

    /// Total layer count: base layers followed by application layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.base_layers.len() + self.app_layers.len()
    }

    /// All layers, base then application, in the order they appear in the
    /// manifest and container config.
    pub fn layers(&self) -> impl Iterator<Item = &crate::layer::Layer> {
        self.base_layers.iter().chain(self.app_layers.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use ocibuild_digest::Digest;

    #[test]
    fn new_image_has_epoch_plus_one_creation_time() {
        let image = Image::new("linux".into(), "amd64".into());
        assert_eq!(image.creation_time.timestamp(), 1);
    }

    #[test]
    fn layers_iterates_base_then_app() {
        let mut image = Image::new("linux".into(), "amd64".into());
        image.base_layers.push(Layer::DigestOnly {
            compressed_digest: Digest::of_bytes(b"base"),
        });
        image.app_layers.push(Layer::DigestOnly {
            compressed_digest: Digest::of_bytes(b"app"),
        });
        let digests: Vec<_> = image
            .layers()
            .map(|l| l.compressed_digest().unwrap().clone())
            .collect();
        assert_eq!(
            digests,
            vec![Digest::of_bytes(b"base"), Digest::of_bytes(b"app")]
        );
        assert_eq!(image.layer_count(), 2);
    }
}
