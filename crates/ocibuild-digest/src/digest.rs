//! The `Digest` type: an algorithm-qualified SHA-256 hash in canonical form.

use crate::error::{Error, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;

const ALGORITHM: &str = "sha256";
const HEX_LEN: usize = 64;

/// A SHA-256 digest in canonical `sha256:<64-hex>` form.
///
/// Equality is string equality of the canonical form; the hex portion is
/// always lowercase.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Digest(String);

impl Digest {
    /// Build a digest from the bare 64-character hex hash, validating the
    /// pattern `[a-f0-9]{64}`.
    pub fn from_hash(hex: impl AsRef<str>) -> Result<Self> {
        let hex = hex.as_ref();
        if !is_valid_hex(hex) {
            return Err(Error::invalid_digest(hex));
        }
        Ok(Self(format!("{ALGORITHM}:{hex}")))
    }

    /// Build a digest from the canonical `sha256:<64-hex>` string.
    pub fn from_canonical(s: impl AsRef<str>) -> Result<Self> {
        let s = s.as_ref();
        let Some(hex) = s.strip_prefix("sha256:") else {
            return Err(Error::invalid_digest(s));
        };
        if !is_valid_hex(hex) {
            return Err(Error::invalid_digest(s));
        }
        Ok(Self(s.to_string()))
    }

    /// The canonical `sha256:<64-hex>` string.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.0
    }

    /// The bare 64-character hex hash, without the `sha256:` prefix.
    #[must_use]
    pub fn hex(&self) -> &str {
        self.0.strip_prefix("sha256:").unwrap_or(&self.0)
    }

    /// The algorithm name. Always `"sha256"` today.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        ALGORITHM
    }

    /// Compute the digest of a byte slice directly, with no streaming.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let hash = hasher.finalize();
        Self(format!("{ALGORITHM}:{}", hex::encode(hash)))
    }
}

fn is_valid_hex(s: &str) -> bool {
    s.len() == HEX_LEN && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_canonical(&s).map_err(serde::de::Error::custom)
    }
}

/// A `(size, digest)` pair describing a blob. `size == -1` denotes "unknown".
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlobDescriptor {
    /// Byte size of the blob, or `-1` if unknown.
    pub size: i64,
    /// Digest of the blob's bytes.
    pub digest: Digest,
}

impl BlobDescriptor {
    /// Build a descriptor with a known size.
    #[must_use]
    pub fn new(size: u64, digest: Digest) -> Self {
        Self {
            size: size as i64,
            digest,
        }
    }

    /// Build a descriptor with an unknown size.
    #[must_use]
    pub fn unknown_size(digest: Digest) -> Self {
        Self { size: -1, digest }
    }

    /// Whether the size is known.
    #[must_use]
    pub fn has_known_size(&self) -> bool {
        self.size >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_hash_accepts_valid_hex() {
        let hex = "a".repeat(64);
        let d = Digest::from_hash(&hex).unwrap();
        assert_eq!(d.canonical(), format!("sha256:{hex}"));
    }

    #[test]
    fn from_hash_rejects_bad_length() {
        assert!(Digest::from_hash("abc").is_err());
    }

    #[test]
    fn from_hash_rejects_uppercase() {
        let hex = "A".repeat(64);
        assert!(Digest::from_hash(&hex).is_err());
    }

    #[test]
    fn from_canonical_requires_prefix() {
        let hex = "b".repeat(64);
        assert!(Digest::from_canonical(&hex).is_err());
        assert!(Digest::from_canonical(format!("sha256:{hex}")).is_ok());
    }

    #[test]
    fn round_trip_canonical() {
        let hex = "c".repeat(64);
        let d = Digest::from_canonical(format!("sha256:{hex}")).unwrap();
        let again = Digest::from_canonical(d.canonical()).unwrap();
        assert_eq!(d, again);
    }

    #[test]
    fn of_bytes_matches_known_sha256() {
        // sha256("") is the well-known empty-input digest.
        let d = Digest::of_bytes(b"");
        assert_eq!(
            d.canonical(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn equality_is_canonical_string_equality() {
        let a = Digest::from_hash("d".repeat(64)).unwrap();
        let b = Digest::from_canonical(format!("sha256:{}", "d".repeat(64))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn blob_descriptor_unknown_size() {
        let d = Digest::of_bytes(b"x");
        let desc = BlobDescriptor::unknown_size(d);
        assert!(!desc.has_known_size());
    }
}
