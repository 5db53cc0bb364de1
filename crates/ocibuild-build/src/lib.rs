//! Build orchestration: composes the registry client, the layer cache, the
//! image model, and the output sinks into three pipelines over a single
//! [`ocibuild_graph::StepGraph`] — push to a registry, load into a running
//! daemon, or save a Docker-tar/OCI-layout archive to disk.
//!
//! Every pipeline shares the same head (authenticate against the base
//! registry, pull and translate the base manifest, pull-and-cache the base
//! layers, build-and-cache the application layers) and diverges only in
//! its tail, matching how the layers and container config end up the same
//! regardless of where the finished image goes.

mod config;
mod error;
mod load;
mod pipeline;
mod push;
mod save;
mod target;

pub use config::Config;
pub use error::{Error, Result};
pub use load::load;
pub use push::push;
pub use save::save;
pub use target::{ApplicationLayerSpec, BuildTarget, Destination, RegistryTarget};
