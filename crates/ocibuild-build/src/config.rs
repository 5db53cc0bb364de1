//! Build-wide configuration.

use ocibuild_image::Platform;

/// Core-level build configuration, independent of any one pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Accept self-signed or otherwise unverifiable TLS certificates.
    pub allow_insecure_registries: bool,
    /// Allow falling back to plain HTTP and still send credentials over it.
    pub send_credentials_over_http: bool,
    /// Per-request HTTP timeout, in milliseconds.
    pub http_timeout_ms: u64,
    /// Force every step to run sequentially, ignoring `worker_pool_size`.
    pub disable_parallel_execution: bool,
    /// Always pull and cache the base image's layers, even when every
    /// application layer is already cached (useful for warming the cache
    /// ahead of a push).
    pub always_cache_base_image: bool,
    /// Refuse any network access; only cache hits and already-resolved
    /// local state may be used.
    pub offline_mode: bool,
    /// Worker pool size for the step graph runner. `0` means unbounded.
    pub worker_pool_size: usize,
    /// Target platform for base image manifest-list selection and the
    /// built image's own `architecture`/`os` fields.
    pub target_platform: Platform,
    /// `User-Agent` sent with every registry request.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_insecure_registries: false,
            send_credentials_over_http: false,
            http_timeout_ms: 30_000,
            disable_parallel_execution: false,
            always_cache_base_image: false,
            offline_mode: false,
            worker_pool_size: 0,
            target_platform: Platform::default_target(),
            user_agent: format!("ocibuild/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// The worker pool size to hand the step graph runner, honoring
    /// `disable_parallel_execution`.
    #[must_use]
    pub fn effective_worker_pool_size(&self) -> usize {
        if self.disable_parallel_execution {
            1
        } else {
            self.worker_pool_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_linux_amd64() {
        let config = Config::default();
        assert_eq!(config.target_platform.os, "linux");
        assert_eq!(config.target_platform.architecture, "amd64");
    }

    #[test]
    fn disabling_parallel_execution_forces_single_worker() {
        let mut config = Config::default();
        config.worker_pool_size = 8;
        config.disable_parallel_execution = true;
        assert_eq!(config.effective_worker_pool_size(), 1);
    }
}
