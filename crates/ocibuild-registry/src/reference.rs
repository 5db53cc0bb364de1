//! Image reference parsing (`registry/repository[:tag][@digest]`).

use crate::error::{Error, Result};
use ocibuild_digest::Digest;

const DEFAULT_REGISTRY: &str = "registry-1.docker.io";
const DEFAULT_TAG: &str = "latest";

/// A parsed image reference: which registry, which repository, and which
/// tag or digest identifies the image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reference {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl Reference {
    /// Parse `image` in Docker's usual `[registry/]repository[:tag][@digest]`
    /// form. A missing registry defaults to Docker Hub; a missing tag
    /// defaults to `latest` unless a digest was given.
    pub fn parse(image: &str) -> Result<Self> {
        if image.is_empty() {
            return Err(Error::BadChallenge("empty image reference".to_string()));
        }

        let (remainder, digest) = match image.split_once('@') {
            Some((rest, digest_str)) => (rest, Some(Digest::from_canonical(digest_str)?)),
            None => (image, None),
        };

        let (remainder, tag) = match remainder.rfind(':') {
            // A colon after the last '/' is a tag; one before it is a port.
            Some(idx) if !remainder[idx + 1..].contains('/') => {
                (&remainder[..idx], Some(remainder[idx + 1..].to_string()))
            }
            _ => (remainder, None),
        };

        let (registry, repository) = match remainder.split_once('/') {
            Some((first, rest)) if first.contains('.') || first.contains(':') || first == "localhost" => {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DEFAULT_REGISTRY.to_string(), remainder.to_string()),
            None => (DEFAULT_REGISTRY.to_string(), remainder.to_string()),
        };

        if repository.is_empty() {
            return Err(Error::BadChallenge(format!(
                "reference {image:?} has no repository"
            )));
        }

        let tag = match (&tag, &digest) {
            (Some(tag), _) => Some(tag.clone()),
            (None, Some(_)) => None,
            (None, None) => Some(DEFAULT_TAG.to_string()),
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Registry host (and optional `:port`).
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path, e.g. `library/alpine`.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag, if the reference named one (or defaulted to `latest`).
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Digest, if the reference pinned one.
    #[must_use]
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// The tag-or-digest path segment used in manifest requests.
    #[must_use]
    pub fn manifest_selector(&self) -> String {
        match (&self.tag, &self.digest) {
            (_, Some(digest)) => digest.canonical().to_string(),
            (Some(tag), None) => tag.clone(),
            (None, None) => DEFAULT_TAG.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_repository() {
        let r = Reference::parse("alpine").unwrap();
        assert_eq!(r.registry(), DEFAULT_REGISTRY);
        assert_eq!(r.repository(), "alpine");
        assert_eq!(r.tag(), Some("latest"));
        assert_eq!(r.digest(), None);
    }

    #[test]
    fn parses_tagged_repository_with_registry() {
        let r = Reference::parse("ghcr.io/cuenv/ocibuild:v1").unwrap();
        assert_eq!(r.registry(), "ghcr.io");
        assert_eq!(r.repository(), "cuenv/ocibuild");
        assert_eq!(r.tag(), Some("v1"));
    }

    #[test]
    fn parses_registry_with_port() {
        let r = Reference::parse("localhost:5000/myimage:dev").unwrap();
        assert_eq!(r.registry(), "localhost:5000");
        assert_eq!(r.repository(), "myimage");
        assert_eq!(r.tag(), Some("dev"));
    }

    #[test]
    fn parses_digest_reference() {
        let digest = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let r = Reference::parse(&format!("myimage@{digest}")).unwrap();
        assert_eq!(r.tag(), None);
        assert_eq!(r.digest().unwrap().canonical(), digest);
        assert_eq!(r.manifest_selector(), digest);
    }

    #[test]
    fn rejects_empty_repository() {
        assert!(Reference::parse("ghcr.io/").is_err());
    }
}
