//! `FileEntry`: a single planned entry in a reproducible tar layer.

use std::path::PathBuf;

/// What kind of filesystem object an entry describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EntryKind {
    /// A regular file, read from `source_path`.
    RegularFile,
    /// A directory, with no source content of its own.
    Directory,
}

/// A planned entry in a reproducible tar layer.
///
/// `source_path` is absent for directory entries (including ones synthesized
/// by the builder). `extraction_path` is an absolute POSIX path inside the
/// container. `permissions` is the low 9 bits of the file mode.
/// `ownership`, when present, is a numeric `"uid:gid"` string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    /// Kind of filesystem object.
    pub kind: EntryKind,
    /// Path to the file's content on the local filesystem, for regular files.
    pub source_path: Option<PathBuf>,
    /// Absolute POSIX path this entry is extracted to inside the layer.
    pub extraction_path: String,
    /// Low 9 bits of the POSIX file mode.
    pub permissions: u32,
    /// Modification time, in whole seconds since the Unix epoch.
    pub modification_time: u64,
    /// Numeric ownership as `"uid:gid"`, if specified.
    pub ownership: Option<String>,
}

/// Default modification time used when a layer specifies none: one second
/// past the epoch. Zero is avoided because some tar readers treat a zero
/// mtime as "unset" and substitute wall-clock time, which would break
/// reproducibility.
pub const DEFAULT_MODIFICATION_TIME: u64 = 1;

/// Default permissions for directories synthesized by the builder.
pub const DEFAULT_DIRECTORY_PERMISSIONS: u32 = 0o755;

impl FileEntry {
    /// Build a regular-file entry.
    #[must_use]
    pub fn regular_file(
        source_path: impl Into<PathBuf>,
        extraction_path: impl Into<String>,
        permissions: u32,
    ) -> Self {
        Self {
            kind: EntryKind::RegularFile,
            source_path: Some(source_path.into()),
            extraction_path: extraction_path.into(),
            permissions,
            modification_time: DEFAULT_MODIFICATION_TIME,
            ownership: None,
        }
    }

    /// Build a directory entry with no source content.
    #[must_use]
    pub fn directory(extraction_path: impl Into<String>, permissions: u32) -> Self {
        Self {
            kind: EntryKind::Directory,
            source_path: None,
            extraction_path: extraction_path.into(),
            permissions,
            modification_time: DEFAULT_MODIFICATION_TIME,
            ownership: None,
        }
    }

    /// Set the modification time in whole seconds since the epoch.
    #[must_use]
    pub fn with_modification_time(mut self, mtime: u64) -> Self {
        self.modification_time = mtime;
        self
    }

    /// Set numeric ownership as `"uid:gid"`.
    #[must_use]
    pub fn with_ownership(mut self, ownership: impl Into<String>) -> Self {
        self.ownership = Some(ownership.into());
        self
    }

    /// Every non-root ancestor directory of this entry's extraction path, in
    /// root-to-leaf order, e.g. `/a/b/c.txt` yields `["/a", "/a/b"]`.
    pub(crate) fn ancestor_directories(&self) -> Vec<String> {
        let mut out = Vec::new();
        let trimmed = self.extraction_path.trim_start_matches('/');
        let mut acc = String::new();
        let segments: Vec<&str> = trimmed.split('/').collect();
        // Skip the last segment: that's the entry itself, not an ancestor.
        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            if segment.is_empty() {
                continue;
            }
            acc.push('/');
            acc.push_str(segment);
            out.push(acc.clone());
        }
        out
    }
}

/// A named layer: a set of planned file entries that become one tar+gzip
/// blob.
#[derive(Clone, Debug)]
pub struct FileEntriesLayer {
    /// Human-readable name, used only for logging/error context.
    pub name: String,
    /// The planned entries, in any order (the builder sorts them).
    pub entries: Vec<FileEntry>,
}

impl FileEntriesLayer {
    /// Build a named layer from a list of entries.
    #[must_use]
    pub fn new(name: impl Into<String>, entries: Vec<FileEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_directories_of_nested_path() {
        let entry = FileEntry::regular_file("/tmp/x", "/a/b/c.txt", 0o644);
        assert_eq!(entry.ancestor_directories(), vec!["/a", "/a/b"]);
    }

    #[test]
    fn ancestor_directories_of_top_level_path() {
        let entry = FileEntry::regular_file("/tmp/x", "/c.txt", 0o644);
        assert!(entry.ancestor_directories().is_empty());
    }

    #[test]
    fn entries_equal_iff_all_fields_equal() {
        let a = FileEntry::regular_file("/tmp/x", "/a.txt", 0o644);
        let b = FileEntry::regular_file("/tmp/x", "/a.txt", 0o644);
        let c = a.clone().with_modification_time(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
