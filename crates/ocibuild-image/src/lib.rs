//! Typed OCI/Docker image, manifest, and container-config model.
//!
//! Builds on [`ocibuild_digest`] for content addressing. Nothing here
//! touches the filesystem or network; this crate is pure data modeling and
//! JSON translation.

mod config;
mod error;
mod image;
mod layer;
mod manifest;
mod platform;

pub use config::{ContainerConfig, ExecConfig, RootFs};
pub use error::{Error, Result};
pub use image::Image;
pub use layer::{ImageLayers, Layer};
pub use manifest::{
    Descriptor, FsLayer, HistoryEntry, Manifest, ManifestList, ManifestListEntry,
    V21Schema1Manifest, V22Manifest, MEDIA_TYPE_DOCKER_MANIFEST_LIST,
    MEDIA_TYPE_DOCKER_MANIFEST_V1, MEDIA_TYPE_DOCKER_MANIFEST_V2, MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_OCI_MANIFEST,
};
pub use platform::{Platform, DEFAULT_ARCHITECTURE, DEFAULT_OS};
