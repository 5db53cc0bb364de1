//! Daemon-load pipeline tail: assemble an in-memory tarball and stream it
//! to a running container daemon's image-load endpoint.

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
use std::sync::Arc;

/// Build `target` and stream the result to `target`'s daemon endpoint.
pub async fn load(
    target: BuildTarget,
    config: Config,
    cache: Arc<Cache>,
    credentials: Arc<dyn CredentialProvider>,
    events: Option<(Arc<EventSender>, Arc<AllocationRegistry>)>,
) -> Result<()> {
    let Destination::Daemon { endpoint, repo_tags } = target.destination.clone() else {
        return Err(Error::invalid_input(
            "load() requires a Destination::Daemon target",
        ));
    };

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
        events: events.clone(),
    });

    let mut graph: StepGraph<StepOutput> = StepGraph::new();
    add_shared_head(
        &mut graph,
        Arc::clone(&ctx),
        Arc::clone(&pull_client),
        base_reference,
        target.clone(),
    )?;

    let oci_media_types = target.oci_media_types;
    graph.add_step(
        "load-to-daemon",
        StepShape::Scalar,
        &["merge-layers"],
        move |inputs: StepInputs<StepOutput>| {
            let repo_tags = repo_tags.clone();
            let events = events.clone();
            let endpoint = endpoint.clone();
            let image = expect_image(&inputs, "merge-layers");
            Box::pin(async move {
                let tarball = build_image_tarball(&image, oci_media_types, repo_tags)
                    .await
                    .map_err(|e| step_failed("load-to-daemon", e))?;
                ocibuild_sinks::daemon::load(&tarball, &endpoint, events)
                    .await
                    .map_err(|e| step_failed("load-to-daemon", Error::from(e)))?;
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
