//! Target platform selection for manifest lists / image indexes.

use serde::{Deserialize, Serialize};

/// The default platform used when a build does not pin one explicitly.
pub const DEFAULT_OS: &str = "linux";
/// The default platform used when a build does not pin one explicitly.
pub const DEFAULT_ARCHITECTURE: &str = "amd64";

/// An OS/architecture pair, as carried by manifest-list entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture, e.g. `"amd64"`.
    pub architecture: String,
    /// Operating system, e.g. `"linux"`.
    pub os: String,
    /// Variant, e.g. `"v8"` for `arm64`. Omitted when not applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// The platform a build targets when none is configured explicitly:
    /// `linux/amd64`.
    #[must_use]
    pub fn default_target() -> Self {
        Self {
            architecture: DEFAULT_ARCHITECTURE.to_string(),
            os: DEFAULT_OS.to_string(),
            variant: None,
        }
    }

    /// Whether this platform matches the requested `os`/`architecture`.
    /// Variant is ignored for matching purposes.
    #[must_use]
    pub fn matches(&self, os: &str, architecture: &str) -> bool {
        self.os == os && self.architecture == architecture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_target_is_linux_amd64() {
        let platform = Platform::default_target();
        assert!(platform.matches("linux", "amd64"));
    }

    #[test]
    fn matches_ignores_variant() {
        let platform = Platform {
            os: "linux".to_string(),
            architecture: "arm64".to_string(),
            variant: Some("v8".to_string()),
        };
        assert!(platform.matches("linux", "arm64"));
        assert!(!platform.matches("linux", "amd64"));
    }
}
