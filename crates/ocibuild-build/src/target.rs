//! Build inputs: where the base image comes from, what application layers
//! go on top of it, and where the result should land.

use ocibuild_tar::FileEntriesLayer;

/// A named application layer: a set of file entries that becomes one tar
/// blob stacked on top of the base image. The core treats the number and
/// naming of these as entirely up to the caller (e.g. "dependencies",
/// "resources", "classes", "extras").
#[derive(Clone, Debug)]
pub struct ApplicationLayerSpec {
    /// Human-readable name, carried through to cache selector logging.
    pub name: String,
    /// The planned file entries for this layer.
    pub entries: FileEntriesLayer,
}

impl ApplicationLayerSpec {
    /// Build a named application layer spec.
    #[must_use]
    pub fn new(name: impl Into<String>, entries: FileEntriesLayer) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

/// Where a pull or push pipeline's registry client should point.
#[derive(Clone, Debug)]
pub struct RegistryTarget {
    /// Registry host, e.g. `ghcr.io`.
    pub registry: String,
    /// Repository path, e.g. `org/app`.
    pub repository: String,
}

/// A destination a built image can be sent to.
#[derive(Clone, Debug)]
pub enum Destination {
    /// Push to a registry under one or more tags.
    Registry {
        /// Registry/repository to push to.
        target: RegistryTarget,
        /// Tags to push the manifest under; at least one is required.
        tags: Vec<String>,
    },
    /// Load into a running container daemon.
    Daemon {
        /// Where the daemon's image-load endpoint is reachable.
        endpoint: ocibuild_sinks::DaemonEndpoint,
        /// `RepoTags` entries to record in the Docker-tar manifest.
        repo_tags: Vec<String>,
    },
    /// Write a Docker-tar archive to a file path.
    DockerTar {
        /// Destination file path.
        path: std::path::PathBuf,
        /// `RepoTags` entries to record in the manifest.
        repo_tags: Vec<String>,
    },
    /// Write an OCI image layout rooted at a directory.
    OciLayout {
        /// Destination directory.
        path: std::path::PathBuf,
    },
}

/// A complete build request: a base image to start from, application
/// layers to stack on top, and where to send the result.
#[derive(Clone, Debug)]
pub struct BuildTarget {
    /// Source image reference, e.g. `docker.io/library/alpine:3.19`.
    pub base_image: String,
    /// Registry the base image should be pulled from (may differ from the
    /// destination registry).
    pub base_registry: RegistryTarget,
    /// Application layers to stack on top of the base image's layers, in
    /// order.
    pub application_layers: Vec<ApplicationLayerSpec>,
    /// Where the finished image should be sent.
    pub destination: Destination,
    /// Whether to emit an OCI-flavored manifest/config rather than
    /// Docker's schema 2.
    pub oci_media_types: bool,
}
