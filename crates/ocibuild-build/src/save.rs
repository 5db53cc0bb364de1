//! Docker-tar / OCI-layout pipeline tail: assemble the tarball and write it
//! to disk atomically (temp file or temp directory, then rename).

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::{
    add_shared_head, build_image_tarball, registry_client, step_failed, transport_config,
    unwrap_step_error, BuildContext, StepOutput,
};
use crate::target::{BuildTarget, Destination};
use ocibuild_cache::Cache;
use ocibuild_events::{AllocationRegistry, EventSender};
use ocibuild_graph::{CancellationToken, Runner, StepGraph, StepInputs, StepShape};
use ocibuild_image::Image;
use ocibuild_registry::{CredentialProvider, Reference};
use ocibuild_transport::Transport;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Build `target` and write the result to a Docker-tar archive or OCI
/// image layout on disk, per `target.destination`.
pub async fn save(
    target: BuildTarget,
    config: Config,
    cache: Arc<Cache>,
    credentials: Arc<dyn CredentialProvider>,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<()> {
    match &target.destination {
        Destination::DockerTar { .. } | Destination::OciLayout { .. } => {}
        Destination::Registry { .. } | Destination::Daemon { .. } => {
            return Err(Error::invalid_input(
                "save() requires a Destination::DockerTar or Destination::OciLayout target",
            ))
        }
    }

    let base_reference = Reference::parse(&target.base_image)
        .map_err(|e| Error::from_registry(&target.base_registry.registry, e))?;

    let transport = Arc::new(Transport::new(transport_config(&config))?);
    let pull_client = Arc::new(registry_client(
        Arc::clone(&transport),
        Arc::clone(&credentials),
        &target.base_registry,
    ));

    let ctx = Arc::new(BuildContext {
        cache,
        config: config.clone(),
        events,
    });

    let mut graph: StepGraph<StepOutput> = StepGraph::new();
    add_shared_head(
        &mut graph,
        Arc::clone(&ctx),
        Arc::clone(&pull_client),
        base_reference,
        target.clone(),
    )?;

    let destination = target.destination.clone();
    let oci_media_types = target.oci_media_types;
    graph.add_step(
        "write-archive",
        StepShape::Scalar,
        &["merge-layers"],
        move |inputs: StepInputs<StepOutput>| {
            let destination = destination.clone();
            let image = expect_image(&inputs, "merge-layers");
            Box::pin(async move {
                write_destination(&image, oci_media_types, &destination)
                    .await
                    .map_err(|e| step_failed("write-archive", e))?;
                Ok(StepOutput::Unit)
            })
        },
    )?;

    graph.finalize().map_err(Error::from)?;
    let cancellation = CancellationToken::new();
    Runner::new(config.effective_worker_pool_size())
        .run(&graph, cancellation)
        .await
        .map_err(unwrap_step_error)?;
    Ok(())
}

fn expect_image(inputs: &StepInputs<StepOutput>, name: &str) -> Image {
    match inputs.get(name).cloned().expect("declared dependency") {
        StepOutput::Image(image) => image,
        _ => panic!("step wiring bug: expected StepOutput::Image"),
    }
}

async fn write_destination(image: &Image, oci_media_types: bool, destination: &Destination) -> Result<()> {
    match destination {
        Destination::DockerTar { path, repo_tags } => {
            let tarball = build_image_tarball(image, oci_media_types, repo_tags.clone()).await?;
            let mut bytes = Vec::new();
            ocibuild_sinks::docker_tar::write(&tarball, &mut bytes)?;
            write_file_atomically(path, &bytes).await
        }
        Destination::OciLayout { path } => {
            let tarball = build_image_tarball(image, oci_media_types, Vec::new()).await?;
            write_oci_layout_atomically(path, &tarball).await
        }
        Destination::Registry { .. } | Destination::Daemon { .. } => {
            unreachable!("save() validated the destination kind up front")
        }
    }
}

/// Write `bytes` to `path` via a same-directory temp file plus a rename,
/// so a reader never observes a partially-written archive.
async fn write_file_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("ocibuild-archive")
    ));
    tokio::fs::write(&temp_path, bytes)
        .await
        .map_err(|e| Error::io(temp_path.clone(), "write temp archive", e))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| Error::io(path.to_path_buf(), "rename temp archive into place", e))?;
    Ok(())
}

/// Write an OCI image layout into a sibling temp directory, then rename it
/// onto `dir` so a reader never observes a partially-populated layout.
async fn write_oci_layout_atomically(dir: &Path, tarball: &ocibuild_sinks::ImageTarball) -> Result<()> {
    let parent = dir.parent().unwrap_or_else(|| Path::new("."));
    let temp_dir: PathBuf = parent.join(format!(
        ".{}.tmp",
        dir.file_name().and_then(|n| n.to_str()).unwrap_or("ocibuild-layout")
    ));
    if tokio::fs::metadata(&temp_dir).await.is_ok() {
        tokio::fs::remove_dir_all(&temp_dir)
            .await
            .map_err(|e| Error::io(temp_dir.clone(), "clear stale temp layout", e))?;
    }
    tokio::fs::create_dir_all(&temp_dir)
        .await
        .map_err(|e| Error::io(temp_dir.clone(), "create temp layout dir", e))?;

    ocibuild_sinks::oci_layout::write(tarball, &temp_dir).await?;

    if tokio::fs::metadata(dir).await.is_ok() {
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| Error::io(dir.to_path_buf(), "clear existing layout", e))?;
    }
    tokio::fs::rename(&temp_dir, dir)
        .await
        .map_err(|e| Error::io(dir.to_path_buf(), "rename temp layout into place", e))?;
    Ok(())
}
