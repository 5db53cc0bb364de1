//! Push pipeline tail: push every layer, push the container config, then
//! push the manifest once per tag, strictly last.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::{
    add_shared_head, authenticate, build_container_config, registry_client, step_failed,
    transport_config, unwrap_step_error, BuildContext, StepOutput,
};
use crate::target::{BuildTarget, Destination, RegistryTarget};
use ocibuild_cache::Cache;
use ocibuild_digest::{Blob, BytesBlob, Digest, FileBlob};
use ocibuild_events::{AllocationRegistry, Event, EventSender};
use ocibuild_graph::{CancellationToken, Runner, StepGraph, StepInputs, StepShape};
use ocibuild_image::{Image, Layer, Manifest};
use ocibuild_registry::{CredentialProvider, Reference, RegistryClient};
use ocibuild_transport::Transport;
use std::sync::Arc;

/// Push a built image to `target`'s registry destination, returning the
/// digest the registry assigned to every pushed tag's manifest.
pub async fn push(
    target: BuildTarget,
    config: Config,
    cache: Arc<Cache>,
    credentials: Arc<dyn CredentialProvider>,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<Vec<Digest>> {
    let Destination::Registry {
        target: push_target,
        tags,
    } = target.destination.clone()
    else {
        return Err(Error::invalid_input(
            "push() requires a Destination::Registry target",
        ));
    };
    if tags.is_empty() {
        return Err(Error::invalid_input("at least one tag is required to push"));
    }

    let base_reference = Reference::parse(&target.base_image)
        .map_err(|e| Error::from_registry(&target.base_registry.registry, e))?;

    let transport = Arc::new(Transport::new(transport_config(&config))?);
    let pull_client = Arc::new(registry_client(
        Arc::clone(&transport),
        Arc::clone(&credentials),
        &target.base_registry,
    ));
    let push_client = Arc::new(registry_client(
        Arc::clone(&transport),
        Arc::clone(&credentials),
        &push_target,
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

    add_push_tail(
        &mut graph,
        Arc::clone(&push_client),
        &push_target,
        &target.base_registry,
        &tags,
        target.oci_media_types,
        ctx.events.clone(),
    )?;

    graph.finalize().map_err(Error::from)?;
    let cancellation = CancellationToken::new();
    let results = Runner::new(config.effective_worker_pool_size())
        .run(&graph, cancellation)
        .await
        .map_err(unwrap_step_error)?;

    let mut digests = Vec::with_capacity(tags.len());
    for tag in &tags {
        let step_name = format!("push-manifest:{tag}");
        let StepOutput::Digest(digest) = results
            .get(&step_name)
            .cloned()
            .expect("every requested tag has a push-manifest step")
        else {
            panic!("step wiring bug: expected StepOutput::Digest");
        };
        digests.push(digest);
    }
    Ok(digests)
}

fn add_push_tail(
    graph: &mut StepGraph<StepOutput>,
    push_client: Arc<RegistryClient>,
    push_target: &RegistryTarget,
    base_registry: &RegistryTarget,
    tags: &[String],
    oci_media_types: bool,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<()> {
    let push_registry = push_target.registry.clone();

    {
        let client = Arc::clone(&push_client);
        graph.add_step(
            "authenticate-push",
            StepShape::Scalar,
            &[],
            move |_: StepInputs<StepOutput>| {
                let client = Arc::clone(&client);
                Box::pin(async move {
                    authenticate(&client, true)
                        .await
                        .map_err(|e| step_failed("authenticate-push", e))?;
                    Ok(StepOutput::Unit)
                })
            },
        )?;
    }

    let source_repository = if push_target.registry == base_registry.registry {
        Some(base_registry.repository.clone())
    } else {
        None
    };

    {
        let client = Arc::clone(&push_client);
        let registry = push_registry.clone();
        let source_repository = source_repository.clone();
        let events = events.clone();
        graph.add_step(
            "push-layers",
            StepShape::FanOut,
            &["merge-layers", "authenticate-push"],
            move |inputs: StepInputs<StepOutput>| {
                let client = Arc::clone(&client);
                let registry = registry.clone();
                let source_repository = source_repository.clone();
                let events = events.clone();
                let image = expect_image(&inputs, "merge-layers");
                let cancellation = inputs.cancellation().clone();
                Box::pin(async move {
                    push_layers(
                        &client,
                        &registry,
                        &image,
                        source_repository.as_deref(),
                        &cancellation,
                        events,
                    )
                    .await
                    .map_err(|e| step_failed("push-layers", e))?;
                    Ok(StepOutput::Unit)
                })
            },
        )?;
    }

    {
        graph.add_step(
            "build-container-config",
            StepShape::Scalar,
            &["merge-layers"],
            move |inputs: StepInputs<StepOutput>| {
                let image = expect_image(&inputs, "merge-layers");
                Box::pin(async move {
                    let layer_count = image.layer_count();
                    let (config, bytes, digest) = build_container_config(&image, layer_count)
                        .map_err(|e| step_failed("build-container-config", e))?;
                    Ok(StepOutput::Config(Arc::new(config), Arc::new(bytes), digest))
                })
            },
        )?;
    }

    {
        let client = Arc::clone(&push_client);
        let registry = push_registry.clone();
        let events = events.clone();
        graph.add_step(
            "push-container-config",
            StepShape::Scalar,
            &["build-container-config", "authenticate-push"],
            move |inputs: StepInputs<StepOutput>| {
                let client = Arc::clone(&client);
                let registry = registry.clone();
                let events = events.clone();
                let (_, bytes, digest) = expect_config(&inputs, "build-container-config");
                Box::pin(async move {
                    let blob: Arc<dyn Blob> = Arc::new(BytesBlob::new((*bytes).clone()));
                    client
                        .push_blob(&digest, blob, None, events)
                        .await
                        .map_err(|e| Error::from_registry(&registry, e))
                        .map_err(|e| step_failed("push-container-config", e))?;
                    Ok(StepOutput::Digest(digest))
                })
            },
        )?;
    }

    for tag in tags {
        let client = Arc::clone(&push_client);
        let registry = push_registry.clone();
        let tag = tag.clone();
        let events = events.clone();
        let step_name = format!("push-manifest:{tag}");
        graph.add_step(
            &step_name,
            StepShape::Scalar,
            &["push-layers", "push-container-config", "merge-layers", "build-container-config"],
            move |inputs: StepInputs<StepOutput>| {
                let client = Arc::clone(&client);
                let registry = registry.clone();
                let tag = tag.clone();
                let events = events.clone();
                let image = expect_image(&inputs, "merge-layers");
                let (_, config_bytes, config_digest) = expect_config(&inputs, "build-container-config");
                Box::pin(async move {
                    let digest = push_manifest(
                        &client,
                        &registry,
                        &image,
                        &config_digest,
                        config_bytes.len(),
                        &tag,
                        oci_media_types,
                        events,
                    )
                    .await
                    .map_err(|e| step_failed("push-manifest", e))?;
                    Ok(StepOutput::Digest(digest))
                })
            },
        )?;
    }

    Ok(())
}

fn expect_image(inputs: &StepInputs<StepOutput>, name: &str) -> Image {
    match inputs.get(name).cloned().expect("declared dependency") {
        StepOutput::Image(image) => image,
        _ => panic!("step wiring bug: expected StepOutput::Image"),
    }
}

fn expect_config(
    inputs: &StepInputs<StepOutput>,
    name: &str,
) -> (Arc<ocibuild_image::ContainerConfig>, Arc<Vec<u8>>, Digest) {
    match inputs.get(name).cloned().expect("declared dependency") {
        StepOutput::Config(config, bytes, digest) => (config, bytes, digest),
        _ => panic!("step wiring bug: expected StepOutput::Config"),
    }
}

/// *PushBlobStep*, applied to every layer in `image`: mount from
/// `source_repository` when pushing within the same registry host,
/// otherwise check-then-push in full.
async fn push_layers(
    client: &RegistryClient,
    registry: &str,
    image: &Image,
    source_repository: Option<&str>,
    cancellation: &CancellationToken,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<()> {
    for layer in image.layers() {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let digest = layer.compressed_digest()?.clone();
        if let Some(descriptor) = client
            .check_blob(&digest)
            .await
            .map_err(|e| Error::from_registry(registry, e))?
        {
            if let Some((sender, allocations)) = &events {
                let size = descriptor.size.max(0) as u64;
                allocations.open(digest.canonical(), Some(size));
                allocations.advance(digest.canonical(), size);
                let _ = sender.send(Event::log(
                    ocibuild_events::LogLevel::Info,
                    format!("{} already exists, {size} bytes", digest.canonical()),
                ));
                let _ = sender.send(Event::progress(digest.canonical(), size));
            }
            continue;
        }

        let blob: Arc<dyn Blob> = match layer {
            Layer::Cached { compressed_path, .. } => Arc::new(FileBlob::new(compressed_path.clone())),
            Layer::Reference { .. } => {
                return Err(Error::invalid_input(
                    "cannot push a base layer that was never pulled into the cache",
                ))
            }
            Layer::Unwritten { .. } | Layer::DigestOnly { .. } => {
                return Err(Error::invalid_input("cannot push a layer with no known bytes"))
            }
        };

        client
            .push_blob(&digest, blob, source_repository, events.clone())
            .await
            .map_err(|e| Error::from_registry(registry, e))?;
    }
    Ok(())
}

/// *PushManifestStep*: assemble the v2.2/OCI manifest from `image`'s
/// layers and the already-pushed config digest, then `PUT` it under `tag`.
async fn push_manifest(
    client: &RegistryClient,
    registry: &str,
    image: &Image,
    config_digest: &Digest,
    config_bytes_len: usize,
    tag: &str,
    oci: bool,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<Digest> {
    let config_media_type = if oci {
        "application/vnd.oci.image.config.v1+json"
    } else {
        "application/vnd.docker.container.image.v1+json"
    };
    let config_descriptor = ocibuild_image::Descriptor {
        media_type: config_media_type.to_string(),
        size: config_bytes_len as i64,
        digest: config_digest.canonical().to_string(),
        urls: None,
    };

    let layer_media_type = if oci {
        "application/vnd.oci.image.layer.v1.tar+gzip"
    } else {
        "application/vnd.docker.image.rootfs.diff.tar.gzip"
    };
    let mut layer_descriptors = Vec::with_capacity(image.layer_count());
    for layer in image.layers() {
        layer_descriptors.push(ocibuild_image::Descriptor {
            media_type: layer_media_type.to_string(),
            size: layer.size()? as i64,
            digest: layer.compressed_digest()?.canonical().to_string(),
            urls: None,
        });
    }

    let manifest = Manifest::build_v22(oci, config_descriptor, layer_descriptors);
    let bytes = manifest.to_json()?;
    let digest = Digest::of_bytes(&bytes);
    let raw = ocibuild_registry::RawManifest {
        media_type: manifest.media_type().unwrap_or_default().to_string(),
        bytes,
        digest,
    };

    let result = client
        .push_manifest(&raw, tag)
        .await
        .map_err(|e| Error::from_registry(registry, e))?;

    if let Some((sender, _)) = &events {
        let _ = sender.send(Event::log(
            ocibuild_events::LogLevel::Info,
            format!("pushed manifest for {tag} as {}", result.canonical()),
        ));
    }

    Ok(result)
}
