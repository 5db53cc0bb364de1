//! Selector digests: "have I already built a layer for exactly this set of
//! file entries?"
//!
//! The selector digest is computed over the canonical JSON of the entries,
//! sorted by extraction path, including permissions, modification time,
//! ownership, and — for regular files — a content hash of the source file.
//! It never includes the digest being computed, so it stays valid across
//! cache-root moves as long as the source files themselves are unchanged.

use crate::error::Result;
use ocibuild_digest::Digest;
use ocibuild_tar::{EntryKind, FileEntry};
use serde::Serialize;

#[derive(Serialize)]
struct CanonicalEntry {
    kind: &'static str,
    extraction_path: String,
    permissions: u32,
    modification_time: u64,
    ownership: Option<String>,
    content_hash: Option<String>,
}

/// Compute the selector digest for `entries`. Regular file entries must
/// have their `source_path` populated; it is hashed to detect content
/// changes between otherwise-identical `FileEntry` descriptions.
pub async fn selector_digest(entries: &[FileEntry]) -> Result<Digest> {
    let mut sorted: Vec<&FileEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.extraction_path.cmp(&b.extraction_path));

    let mut canonical = Vec::with_capacity(sorted.len());
    for entry in sorted {
        let content_hash = match (&entry.kind, &entry.source_path) {
            (EntryKind::RegularFile, Some(path)) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| crate::error::Error::io(e, path, "read"))?;
                Some(Digest::of_bytes(&bytes).canonical().to_string())
            }
            _ => None,
        };
        canonical.push(CanonicalEntry {
            kind: match entry.kind {
                EntryKind::RegularFile => "file",
                EntryKind::Directory => "dir",
            },
            extraction_path: entry.extraction_path.clone(),
            permissions: entry.permissions,
            modification_time: entry.modification_time,
            ownership: entry.ownership.clone(),
            content_hash,
        });
    }

    let json = serde_json::to_vec(&canonical)
        .map_err(|e| crate::error::Error::serialization("selector entries", e))?;
    Ok(Digest::of_bytes(&json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_entries_produce_identical_selectors() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        tokio::fs::write(&file_path, b"content").await.unwrap();

        let entries = vec![FileEntry::regular_file(&file_path, "/app/a.txt", 0o644)];
        let d1 = selector_digest(&entries).await.unwrap();
        let d2 = selector_digest(&entries).await.unwrap();
        assert_eq!(d1, d2);
    }

    #[tokio::test]
    async fn content_change_changes_selector() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        tokio::fs::write(&file_path, b"content").await.unwrap();
        let entries = vec![FileEntry::regular_file(&file_path, "/app/a.txt", 0o644)];
        let before = selector_digest(&entries).await.unwrap();

        tokio::fs::write(&file_path, b"different content").await.unwrap();
        let after = selector_digest(&entries).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn entry_order_does_not_affect_selector() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, b"a").await.unwrap();
        tokio::fs::write(&b, b"b").await.unwrap();

        let forward = vec![
            FileEntry::regular_file(&a, "/app/a.txt", 0o644),
            FileEntry::regular_file(&b, "/app/b.txt", 0o644),
        ];
        let reversed = vec![
            FileEntry::regular_file(&b, "/app/b.txt", 0o644),
            FileEntry::regular_file(&a, "/app/a.txt", 0o644),
        ];
        assert_eq!(
            selector_digest(&forward).await.unwrap(),
            selector_digest(&reversed).await.unwrap()
        );
    }
}
