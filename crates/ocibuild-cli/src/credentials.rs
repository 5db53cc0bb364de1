//! Environment-variable-backed credential lookup.
//!
//! Checks `OCIBUILD_<REGISTRY>_USERNAME`/`_PASSWORD` first (with the
//! registry host uppercased and every non-alphanumeric character turned
//! into `_`), then falls back to `OCIBUILD_USERNAME`/`OCIBUILD_PASSWORD`
//! for a single-registry setup.

use async_trait::async_trait;
use ocibuild_registry::{CredentialProvider, Credentials};

/// Reads registry credentials from the process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvCredentialProvider;

fn env_key(registry: &str, suffix: &str) -> String {
    let normalized: String = registry
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("OCIBUILD_{normalized}_{suffix}")
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn credentials_for(&self, registry: &str) -> Option<Credentials> {
        let username = std::env::var(env_key(registry, "USERNAME"))
            .or_else(|_| std::env::var("OCIBUILD_USERNAME"))
            .ok()?;
        let password = std::env::var(env_key(registry, "PASSWORD"))
            .or_else(|_| std::env::var("OCIBUILD_PASSWORD"))
            .ok()?;
        Some(Credentials { username, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_registry_host_into_env_key() {
        assert_eq!(env_key("ghcr.io", "USERNAME"), "OCIBUILD_GHCR_IO_USERNAME");
        assert_eq!(env_key("localhost:5000", "PASSWORD"), "OCIBUILD_LOCALHOST_5000_PASSWORD");
    }
}
