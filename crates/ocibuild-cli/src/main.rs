//! `ocibuild` CLI: push, load, or save an image assembled from a base
//! image plus local application layers.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod credentials;
mod error;
mod layers;

use crate::credentials::EnvCredentialProvider;
use crate::error::{CliError, EXIT_OK};
use crate::layers::{build_layer, LayerArg};
use clap::{Parser, Subcommand};
use ocibuild_build::{ApplicationLayerSpec, BuildTarget, Config, Destination, RegistryTarget};
use ocibuild_cache::Cache;
use ocibuild_registry::CredentialProvider;
use ocibuild_sinks::DaemonEndpoint;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "ocibuild")]
#[command(about = "Build OCI/Docker images from a base image plus local layers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base image reference, e.g. `docker.io/library/alpine:3.19`.
    #[arg(long, global = true)]
    from: String,

    /// `NAME=SRC[:DEST]`; repeatable. `DEST` defaults to `/opt/NAME`.
    #[arg(long = "layer", global = true)]
    layers: Vec<String>,

    /// Cache directory; defaults to the platform cache dir.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Emit an OCI-flavored manifest/config instead of Docker's schema 2.
    #[arg(long, global = true)]
    oci: bool,

    /// Accept self-signed or otherwise unverifiable TLS certificates.
    #[arg(long, global = true)]
    insecure: bool,

    /// Refuse any network access; only cache hits may be used.
    #[arg(long, global = true)]
    offline: bool,

    /// Bound the step graph's worker pool; `0` means unbounded.
    #[arg(long, global = true, default_value_t = 0)]
    workers: usize,

    /// Target platform, `os/architecture`, e.g. `linux/arm64`.
    #[arg(long, global = true)]
    platform: Option<String>,

    /// Logging verbosity passed to `tracing_subscriber::EnvFilter`.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push the built image to a registry.
    Push {
        /// Destination `registry/repository`.
        #[arg(long)]
        to: String,
        /// Tag to push under; repeatable, at least one required.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Load the built image into a running container daemon.
    Load {
        /// Unix-domain socket path for the daemon's image-load endpoint.
        #[arg(long, default_value = "/var/run/docker.sock")]
        daemon_socket: PathBuf,
        /// `host:port` TCP endpoint instead of a Unix socket.
        #[arg(long, conflicts_with = "daemon_socket")]
        daemon_tcp: Option<String>,
        /// `RepoTags` entries to record in the Docker-tar manifest;
        /// repeatable.
        #[arg(long = "repo-tag")]
        repo_tags: Vec<String>,
    },
    /// Write the built image to a Docker-tar archive or OCI image layout.
    Save {
        /// Write a Docker-tar archive to this file path.
        #[arg(long, conflicts_with = "oci_layout")]
        docker_tar: Option<PathBuf>,
        /// Write an OCI image layout rooted at this directory.
        #[arg(long)]
        oci_layout: Option<PathBuf>,
        /// `RepoTags` entries for the Docker-tar manifest; repeatable.
        #[arg(long = "repo-tag")]
        repo_tags: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = cli.log_level.clone();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .try_init();

    match run(cli).await {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let base_registry = parse_base_registry(&cli.from)?;

    let mut application_layers = Vec::with_capacity(cli.layers.len());
    for raw in &cli.layers {
        let arg = LayerArg::parse(raw).map_err(CliError::usage)?;
        let entries = build_layer(&arg).map_err(|e| {
            CliError::usage(format!("--layer {raw:?}: {e}"))
        })?;
        application_layers.push(ApplicationLayerSpec::new(arg.name, entries));
    }

    let destination = match &cli.command {
        Commands::Push { to, tags } => {
            if tags.is_empty() {
                return Err(CliError::usage("push requires at least one --tag"));
            }
            let target = parse_registry_target(to)?;
            Destination::Registry {
                target,
                tags: tags.clone(),
            }
        }
        Commands::Load {
            daemon_socket,
            daemon_tcp,
            repo_tags,
        } => {
            let endpoint = match daemon_tcp {
                Some(addr) => DaemonEndpoint::Tcp(addr.clone()),
                None => DaemonEndpoint::Unix(daemon_socket.clone()),
            };
            Destination::Daemon {
                endpoint,
                repo_tags: repo_tags.clone(),
            }
        }
        Commands::Save {
            docker_tar,
            oci_layout,
            repo_tags,
        } => match (docker_tar, oci_layout) {
            (Some(path), None) => Destination::DockerTar {
                path: path.clone(),
                repo_tags: repo_tags.clone(),
            },
            (None, Some(path)) => Destination::OciLayout { path: path.clone() },
            (None, None) => {
                return Err(CliError::usage(
                    "save requires either --docker-tar or --oci-layout",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(CliError::usage(
                    "save accepts only one of --docker-tar or --oci-layout",
                ))
            }
        },
    };

    let target = BuildTarget {
        base_image: cli.from.clone(),
        base_registry,
        application_layers,
        destination,
        oci_media_types: cli.oci,
    };

    let mut config = Config {
        allow_insecure_registries: cli.insecure,
        offline_mode: cli.offline,
        worker_pool_size: cli.workers,
        ..Config::default()
    };
    if let Some(platform) = &cli.platform {
        config.target_platform = parse_platform(platform)?;
    }

    let cache = Arc::new(open_cache(cli.cache_dir).await?);
    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentialProvider);

    match cli.command {
        Commands::Push { .. } => {
            let digests = ocibuild_build::push(target, config, cache, credentials, None)
                .await
                .map_err(CliError::from)?;
            for digest in digests {
                println!("{}", digest.canonical());
            }
        }
        Commands::Load { .. } => {
            ocibuild_build::load(target, config, cache, credentials, None)
                .await
                .map_err(CliError::from)?;
        }
        Commands::Save { .. } => {
            ocibuild_build::save(target, config, cache, credentials, None)
                .await
                .map_err(CliError::from)?;
        }
    }

    Ok(())
}

fn parse_base_registry(reference: &str) -> Result<RegistryTarget, CliError> {
    let parsed = ocibuild_registry::Reference::parse(reference)
        .map_err(|e| CliError::usage(format!("invalid --from {reference:?}: {e}")))?;
    Ok(RegistryTarget {
        registry: parsed.registry().to_string(),
        repository: parsed.repository().to_string(),
    })
}

fn parse_registry_target(raw: &str) -> Result<RegistryTarget, CliError> {
    let (registry, repository) = raw
        .split_once('/')
        .ok_or_else(|| CliError::usage(format!("--to {raw:?} must be registry/repository")))?;
    Ok(RegistryTarget {
        registry: registry.to_string(),
        repository: repository.to_string(),
    })
}

fn parse_platform(raw: &str) -> Result<ocibuild_image::Platform, CliError> {
    let (os, architecture) = raw
        .split_once('/')
        .ok_or_else(|| CliError::usage(format!("--platform {raw:?} must be os/architecture")))?;
    Ok(ocibuild_image::Platform {
        os: os.to_string(),
        architecture: architecture.to_string(),
        variant: None,
    })
}

async fn open_cache(cache_dir: Option<PathBuf>) -> Result<Cache, CliError> {
    let cache = match cache_dir {
        Some(dir) => Cache::open(dir).await,
        None => Cache::open_default().await,
    };
    cache.map_err(|e| CliError::usage(format!("failed to open layer cache: {e}")))
}
