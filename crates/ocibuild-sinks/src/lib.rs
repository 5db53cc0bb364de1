//! Output sinks: a Docker-tar archive writer, an OCI image layout writer,
//! and a container daemon image-load streamer.
//!
//! None of these touch the registry or the cache; they consume an
//! [`ImageTarball`] already assembled by the build orchestrator.

pub mod daemon;
pub mod docker_tar;
mod error;
pub mod oci_layout;
mod tarball;

pub use daemon::DaemonEndpoint;
pub use error::{Error, Result};
pub use tarball::{ImageTarball, LayerBlob};
