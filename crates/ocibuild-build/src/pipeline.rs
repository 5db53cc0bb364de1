//! Shared pipeline machinery: the build context, the step-graph value type,
//! and the head steps every pipeline (push, daemon load, tar/layout write)
//! has in common.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::target::{ApplicationLayerSpec, BuildTarget, RegistryTarget};
use flate2::read::GzDecoder;
use ocibuild_cache::Cache;
use ocibuild_digest::{BytesBlob, Digest};
use ocibuild_events::{AllocationRegistry, Event, EventSender};
use ocibuild_graph::{CancellationToken, StepGraph, StepInputs, StepShape};
use ocibuild_image::{ContainerConfig, Image, Layer, Manifest};
use ocibuild_registry::{CredentialProvider, Reference, RegistryClient};
use ocibuild_transport::{Transport, TransportConfig};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// The single value type threaded through every pipeline's [`StepGraph`].
/// Heterogeneous step outputs are modeled as variants; steps that feed a
/// downstream step document which variant they produce.
#[derive(Clone)]
pub(crate) enum StepOutput {
    /// A step with no meaningful return value (e.g. authentication).
    Unit,
    /// The `Image` assembled from a pulled base manifest/config.
    Image(Image),
    /// A list of resolved layers (pulled-and-cached base layers, or
    /// built-and-cached application layers).
    Layers(Vec<Layer>),
    /// An assembled container config, its serialized bytes, and its digest.
    Config(Arc<ContainerConfig>, Arc<Vec<u8>>, Digest),
    /// A manifest digest, e.g. the result of pushing it.
    Digest(Digest),
}

impl StepOutput {
    fn into_image(self) -> Image {
        match self {
            Self::Image(image) => image,
            _ => panic!("step wiring bug: expected StepOutput::Image"),
        }
    }

    fn into_layers(self) -> Vec<Layer> {
        match self {
            Self::Layers(layers) => layers,
            _ => panic!("step wiring bug: expected StepOutput::Layers"),
        }
    }
}

/// Shared state every step closure captures: the cache, the registry
/// client(s), the build config, and an optional event sink.
pub(crate) struct BuildContext {
    pub(crate) cache: Arc<Cache>,
    pub(crate) config: Config,
    pub(crate) events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
}

impl BuildContext {
    pub(crate) fn log(&self, message: impl Into<String>) {
        if let Some((sender, _)) = &self.events {
            let _ = sender.send(Event::log(ocibuild_events::LogLevel::Info, message));
        }
    }
}

/// Build a [`TransportConfig`] from the orchestrator's [`Config`].
pub(crate) fn transport_config(config: &Config) -> TransportConfig {
    TransportConfig {
        timeout: Duration::from_millis(config.http_timeout_ms),
        strict: !config.allow_insecure_registries,
        user_agent: config.user_agent.clone(),
        ..TransportConfig::default()
    }
}

/// Build a registry client for one `(registry, repository)` pair.
pub(crate) fn registry_client(
    transport: Arc<Transport>,
    credentials: Arc<dyn CredentialProvider>,
    target: &RegistryTarget,
) -> RegistryClient {
    RegistryClient::new(transport, credentials, &target.registry, &target.repository)
}

/// *AuthenticatePullStep* / *AuthenticatePushStep*: resolve an
/// `Authorization` value for the given scope against `client`.
pub(crate) async fn authenticate(client: &RegistryClient, push: bool) -> Result<()> {
    if push {
        client.authenticate_push().await?;
    } else {
        client.authenticate_pull().await?;
    }
    Ok(())
}

/// *PullBaseImageStep*: fetch the base image's manifest (following a
/// manifest list down to the target platform), fetch its container config,
/// and synthesize an [`Image`] whose layers are all [`Layer::Reference`].
pub(crate) async fn pull_base_image(
    client: &RegistryClient,
    reference: &Reference,
    config: &Config,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<Image> {
    let raw = client.pull_manifest(&reference.manifest_selector()).await?;
    let mut manifest = Manifest::parse(&raw.media_type, &raw.bytes)?;

    if manifest.is_list() {
        let Manifest::ManifestList(list) = &manifest else {
            unreachable!("is_list() only true for ManifestList");
        };
        let entry = list.select(
            &config.target_platform.os,
            &config.target_platform.architecture,
        )?;
        let selected = client.pull_manifest(&entry.digest).await?;
        manifest = Manifest::parse(&selected.media_type, &selected.bytes)?;
    }

    let config_descriptor = manifest.config_descriptor()?;
    let mut config_bytes = Vec::new();
    client
        .pull_blob(&config_descriptor.digest()?, &mut config_bytes, events)
        .await?;
    let container_config: ContainerConfig = serde_json::from_slice(&config_bytes)
        .map_err(|e| ocibuild_image::Error::json("pulled container config", e))?;

    let layer_descriptors = manifest.layers_forward_order()?;
    let diff_ids = container_config.diff_ids()?;
    if layer_descriptors.len() != diff_ids.len() {
        return Err(ocibuild_image::Error::LayerCountMismatch {
            config_count: diff_ids.len(),
            manifest_count: layer_descriptors.len(),
        }
        .into());
    }

    let mut image = Image::new(container_config.os.clone(), container_config.architecture.clone());
    image.environment = container_config.config.env.clone();
    image.entrypoint = container_config.config.entrypoint.clone().unwrap_or_default();
    image.cmd = container_config.config.cmd.clone().unwrap_or_default();
    image.labels = container_config.config.labels.clone();
    image.exposed_ports = container_config.config.exposed_ports.keys().cloned().collect();
    image.volumes = container_config.config.volumes.keys().cloned().collect();
    image.working_dir = container_config.config.working_dir.clone();
    image.user = container_config.config.user.clone();

    let layer_sizes = manifest.layer_sizes_forward_order()?;
    for ((layer, diff_id), size) in layer_descriptors.into_iter().zip(diff_ids).zip(layer_sizes) {
        let compressed_digest = layer.compressed_digest()?.clone();
        image.base_layers.push(Layer::Reference {
            compressed_digest,
            diff_id,
            size,
        });
    }

    Ok(image)
}

/// *PullAndCacheBaseImageLayersStep*: for each `Reference` base layer,
/// check the cache by compressed digest; on a miss, pull the blob, gunzip
/// it to compute the diff-id, and commit both to the cache. Runs every
/// layer concurrently, bounded only by the caller's own concurrency.
pub(crate) async fn pull_and_cache_base_layers(
    client: &RegistryClient,
    cache: &Cache,
    layers: &[Layer],
    cancellation: &CancellationToken,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<Vec<Layer>> {
    let mut out = Vec::with_capacity(layers.len());
    for layer in layers {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let compressed_digest = layer.compressed_digest()?.clone();
        if let Some(entry) = cache.lookup(&compressed_digest).await {
            if let Some((sender, _)) = &events {
                let _ = sender.send(Event::log(
                    ocibuild_events::LogLevel::Info,
                    format!("layer {compressed_digest} already cached"),
                ));
            }
            out.push(Layer::Cached {
                compressed_digest,
                diff_id: entry.diff_id,
                size: layer.size().unwrap_or(0),
                compressed_path: entry.compressed_path,
            });
            continue;
        }

        let mut compressed_bytes = Vec::new();
        let descriptor = client
            .pull_blob(&compressed_digest, &mut compressed_bytes, events.clone())
            .await?;
        let diff_id = gunzip_digest(&compressed_bytes)?;
        let entry = cache
            .store_layer(&compressed_digest, &diff_id, &compressed_bytes)
            .await?;
        out.push(Layer::Cached {
            compressed_digest,
            diff_id,
            size: descriptor.size,
            compressed_path: entry.compressed_path,
        });
    }
    Ok(out)
}

/// *BuildAndCacheApplicationLayersStep*: for each named application layer,
/// compute its selector digest; on a cache hit, reuse the committed entry.
/// On a miss, tar-build and gzip it, then commit.
pub(crate) async fn build_and_cache_application_layers(
    cache: &Cache,
    specs: &[ApplicationLayerSpec],
    cancellation: &CancellationToken,
) -> Result<Vec<Layer>> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let selector = ocibuild_cache::selector_digest(&spec.entries.entries).await?;
        if let Some(compressed_digest) = cache.lookup_selector(&selector).await {
            if let Some(entry) = cache.lookup(&compressed_digest).await {
                out.push(Layer::Cached {
                    compressed_digest,
                    diff_id: entry.diff_id,
                    size: tokio::fs::metadata(&entry.compressed_path)
                        .await
                        .map(|m| m.len())
                        .unwrap_or(0),
                    compressed_path: entry.compressed_path,
                });
                continue;
            }
        }

        let compressed_bytes = ocibuild_tar::build(&spec.entries)?;
        let compressed_digest = Digest::of_bytes(&compressed_bytes);
        let diff_id = gunzip_digest(&compressed_bytes)?;
        let entry = cache
            .store_layer(&compressed_digest, &diff_id, &compressed_bytes)
            .await?;
        cache.record_selector(&selector, &compressed_digest).await?;
        out.push(Layer::Cached {
            compressed_digest,
            diff_id,
            size: compressed_bytes.len() as u64,
            compressed_path: entry.compressed_path,
        });
    }
    Ok(out)
}

/// Gunzip `compressed` entirely in memory and return the digest of the
/// uncompressed bytes (the diff-id). `ocibuild-tar::build` only returns the
/// compressed form, so every consumer needing the diff-id does this.
pub(crate) fn gunzip_digest(compressed: &[u8]) -> Result<Digest> {
    let mut decoder = GzDecoder::new(compressed);
    let mut uncompressed = Vec::new();
    decoder
        .read_to_end(&mut uncompressed)
        .map_err(|e| Error::io("<in-memory layer>", "gunzip", e))?;
    Ok(Digest::of_bytes(&uncompressed))
}

/// Gunzip `compressed` entirely in memory and return the uncompressed
/// bytes themselves, for sinks that need the raw per-layer tar.
pub(crate) fn gunzip_bytes(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut uncompressed = Vec::new();
    decoder
        .read_to_end(&mut uncompressed)
        .map_err(|e| Error::io("<in-memory layer>", "gunzip", e))?;
    Ok(uncompressed)
}

/// *BuildImageStep*: assemble the container config from an image (base
/// layers then app layers already merged onto it) and serialize it.
pub(crate) fn build_container_config(image: &Image, manifest_layer_count: usize) -> Result<(ContainerConfig, Vec<u8>, Digest)> {
    let config = ContainerConfig::from_image(image, manifest_layer_count)?;
    let bytes = config.to_json()?;
    let digest = Digest::of_bytes(&bytes);
    Ok((config, bytes, digest))
}

/// Assemble an [`ocibuild_sinks::ImageTarball`] from a merged `image`,
/// reading each layer's compressed bytes off disk and gunzipping them for
/// the uncompressed tar a Docker-tar archive or daemon load needs. Every
/// layer must already be [`Layer::Cached`] (true once the shared head's
/// `pull-and-cache-base-layers`/`build-and-cache-app-layers` steps run).
pub(crate) async fn build_image_tarball(
    image: &Image,
    oci_media_types: bool,
    repo_tags: Vec<String>,
) -> Result<ocibuild_sinks::ImageTarball> {
    let layer_count = image.layer_count();
    let (_, config_bytes, config_digest) = build_container_config(image, layer_count)?;

    let config_media_type = if oci_media_types {
        "application/vnd.oci.image.config.v1+json"
    } else {
        "application/vnd.docker.container.image.v1+json"
    };
    let layer_media_type = if oci_media_types {
        "application/vnd.oci.image.layer.v1.tar+gzip"
    } else {
        "application/vnd.docker.image.rootfs.diff.tar.gzip"
    };

    let mut layers = Vec::with_capacity(layer_count);
    let mut layer_descriptors = Vec::with_capacity(layer_count);
    for layer in image.layers() {
        let compressed_path = match layer {
            Layer::Cached { compressed_path, .. } => compressed_path.clone(),
            _ => {
                return Err(Error::invalid_input(
                    "cannot materialize a layer that was never written to the cache",
                ))
            }
        };
        let compressed_bytes = tokio::fs::read(&compressed_path)
            .await
            .map_err(|e| Error::io(compressed_path.clone(), "read cached layer", e))?;
        let uncompressed_tar = gunzip_bytes(&compressed_bytes)?;
        layer_descriptors.push(ocibuild_image::Descriptor {
            media_type: layer_media_type.to_string(),
            size: compressed_bytes.len() as i64,
            digest: layer.compressed_digest()?.canonical().to_string(),
            urls: None,
        });
        layers.push(ocibuild_sinks::LayerBlob {
            diff_id: layer.diff_id()?.clone(),
            compressed_digest: layer.compressed_digest()?.clone(),
            compressed_bytes,
            uncompressed_tar,
        });
    }

    let config_descriptor = ocibuild_image::Descriptor {
        media_type: config_media_type.to_string(),
        size: config_bytes.len() as i64,
        digest: config_digest.canonical().to_string(),
        urls: None,
    };
    let manifest = Manifest::build_v22(oci_media_types, config_descriptor, layer_descriptors);
    let manifest_bytes = manifest.to_json()?;
    let manifest_digest = Digest::of_bytes(&manifest_bytes);

    Ok(ocibuild_sinks::ImageTarball {
        manifest_media_type: manifest.media_type().unwrap_or_default().to_string(),
        manifest_bytes,
        manifest_digest,
        config_bytes,
        config_digest,
        layers,
        repo_tags,
    })
}

/// Build the shared head steps (authenticate-pull, pull-base-image,
/// pull-and-cache-base-layers, build-and-cache-app-layers) into `graph`,
/// returning nothing: callers add their own tail steps depending on
/// `"merge-layers"`.
pub(crate) fn add_shared_head(
    graph: &mut StepGraph<StepOutput>,
    ctx: Arc<BuildContext>,
    pull_client: Arc<RegistryClient>,
    base_reference: Reference,
    target: BuildTarget,
) -> Result<()> {
    {
        let client = Arc::clone(&pull_client);
        graph.add_step("authenticate-pull", StepShape::Scalar, &[], move |_: StepInputs<StepOutput>| {
            let client = Arc::clone(&client);
            Box::pin(async move {
                authenticate(&client, false).await.map_err(|e| {
                    step_failed("authenticate-pull", e)
                })?;
                Ok(StepOutput::Unit)
            })
        })?;
    }

    {
        let client = Arc::clone(&pull_client);
        let ctx = Arc::clone(&ctx);
        let reference = base_reference.clone();
        graph.add_step(
            "pull-base-image",
            StepShape::Scalar,
            &["authenticate-pull"],
            move |_: StepInputs<StepOutput>| {
                let client = Arc::clone(&client);
                let ctx = Arc::clone(&ctx);
                let reference = reference.clone();
                Box::pin(async move {
                    let image = pull_base_image(&client, &reference, &ctx.config, ctx.events.clone())
                        .await
                        .map_err(|e| step_failed("pull-base-image", e))?;
                    Ok(StepOutput::Image(image))
                })
            },
        )?;
    }

    {
        let client = Arc::clone(&pull_client);
        let ctx = Arc::clone(&ctx);
        graph.add_step(
            "pull-and-cache-base-layers",
            StepShape::FanOut,
            &["pull-base-image"],
            move |inputs: StepInputs<StepOutput>| {
                let client = Arc::clone(&client);
                let ctx = Arc::clone(&ctx);
                let image = inputs
                    .get("pull-base-image")
                    .cloned()
                    .expect("pull-base-image is a declared dependency")
                    .into_image();
                let cancellation = inputs.cancellation().clone();
                Box::pin(async move {
                    let base_layers: Vec<Layer> = image.base_layers.iter().cloned().collect();
                    let layers = pull_and_cache_base_layers(
                        &client,
                        &ctx.cache,
                        &base_layers,
                        &cancellation,
                        ctx.events.clone(),
                    )
                    .await
                    .map_err(|e| {
                        step_failed("pull-and-cache-base-layers", e)
                    })?;
                    Ok(StepOutput::Layers(layers))
                })
            },
        )?;
    }

    {
        let ctx = Arc::clone(&ctx);
        let specs = target.application_layers.clone();
        graph.add_step(
            "build-and-cache-app-layers",
            StepShape::FanOut,
            &[],
            move |inputs: StepInputs<StepOutput>| {
                let ctx = Arc::clone(&ctx);
                let specs = specs.clone();
                let cancellation = inputs.cancellation().clone();
                Box::pin(async move {
                    let layers = build_and_cache_application_layers(&ctx.cache, &specs, &cancellation)
                        .await
                        .map_err(|e| {
                            step_failed("build-and-cache-app-layers", e)
                        })?;
                    Ok(StepOutput::Layers(layers))
                })
            },
        )?;
    }

    {
        graph.add_step(
            "merge-layers",
            StepShape::Barrier,
            &["pull-base-image", "pull-and-cache-base-layers", "build-and-cache-app-layers"],
            move |inputs: StepInputs<StepOutput>| {
                let base_image = inputs
                    .get("pull-base-image")
                    .cloned()
                    .expect("pull-base-image is a declared dependency")
                    .into_image();
                let base_layers = inputs
                    .get("pull-and-cache-base-layers")
                    .cloned()
                    .expect("pull-and-cache-base-layers is a declared dependency")
                    .into_layers();
                let app_layers = inputs
                    .get("build-and-cache-app-layers")
                    .cloned()
                    .expect("build-and-cache-app-layers is a declared dependency")
                    .into_layers();
                Box::pin(async move {
                    let mut image = base_image;
                    image.base_layers = ocibuild_image::ImageLayers::new();
                    for layer in base_layers {
                        image.base_layers.push(layer);
                    }
                    for layer in app_layers {
                        image.app_layers.push(layer);
                    }
                    Ok(StepOutput::Image(image))
                })
            },
        )?;
    }

    Ok(())
}

/// Build a [`ocibuild_graph::Error::StepFailed`] wrapping `e` under `name`.
pub(crate) fn step_failed(name: &str, e: Error) -> ocibuild_graph::Error {
    ocibuild_graph::Error::step_failed(name, e)
}

/// Unwrap a [`ocibuild_graph::Error`] back into the orchestrator's own
/// [`Error`] type, recovering the original variant when the failing step
/// raised one (every step in this crate boxes `crate::Error` as its
/// source), and falling back to [`Error::Graph`] otherwise (a cycle,
/// duplicate step, or cancellation raised by the graph itself).
pub(crate) fn unwrap_step_error(e: ocibuild_graph::Error) -> Error {
    if let ocibuild_graph::Error::StepFailed { step, source } = e {
        match source.downcast::<Error>() {
            Ok(inner) => return *inner,
            Err(source) => return Error::Graph(ocibuild_graph::Error::StepFailed { step, source }),
        }
    }
    Error::Graph(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_config_honors_allow_insecure_registries() {
        let mut config = Config::default();
        config.allow_insecure_registries = true;
        let transport = transport_config(&config);
        assert!(!transport.strict);
    }

    #[test]
    fn gunzip_digest_matches_uncompressed_content() {
        let layer = ocibuild_tar::FileEntriesLayer::new(
            "test",
            vec![ocibuild_tar::FileEntry::regular_file(
                std::env::current_exe().unwrap(),
                "/bin/x",
                0o755,
            )],
        );
        let compressed = ocibuild_tar::build(&layer).unwrap();
        assert!(gunzip_digest(&compressed).is_ok());
    }
}
