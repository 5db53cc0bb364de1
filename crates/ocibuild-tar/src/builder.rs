//! Deterministic tar+gzip layer construction.

use crate::entry::{EntryKind, FileEntriesLayer, FileEntry, DEFAULT_DIRECTORY_PERMISSIONS};
use crate::error::{Error, Result};
use flate2::{Compression, GzBuilder};
use std::collections::BTreeSet;
use std::io::Read;

/// Build a gzipped POSIX ustar archive from `layer`, following the
/// reproducibility rules: entries sorted by extraction path, parent
/// directories synthesized where missing, fixed timestamps, 9-bit
/// permissions, numeric ownership, no GID/UID name lookups, and a gzip
/// header with no filename or embedded mtime.
///
/// Returns the raw gzipped bytes.
pub fn build(layer: &FileEntriesLayer) -> Result<Vec<u8>> {
    let entries = plan_entries(&layer.entries)?;

    let mut gz = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
    {
        let mut tar_builder = tar::Builder::new(&mut gz);
        tar_builder.mode(tar::HeaderMode::Complete);
        for entry in &entries {
            append_entry(&mut tar_builder, entry)?;
        }
        tar_builder
            .into_inner()
            .map_err(|e| Error::io(e, "finish tar stream"))?;
    }
    gz.finish().map_err(|e| Error::io(e, "finish gzip stream"))
}

/// Sort the given entries by extraction path and synthesize any missing
/// parent directories, returning the final ordered entry list (directories
/// precede their children because of the lexicographic sort: a parent path
/// is always a strict prefix, hence sorts before its children).
fn plan_entries(entries: &[FileEntry]) -> Result<Vec<FileEntry>> {
    let mut present: BTreeSet<String> = entries.iter().map(|e| e.extraction_path.clone()).collect();
    let mut synthesized = Vec::new();

    for entry in entries {
        for ancestor in entry.ancestor_directories() {
            if present.insert(ancestor.clone()) {
                synthesized.push(FileEntry::directory(ancestor, DEFAULT_DIRECTORY_PERMISSIONS)
                    .with_modification_time(entry.modification_time));
            }
        }
    }

    let mut all: Vec<FileEntry> = entries.iter().cloned().chain(synthesized).collect();
    all.sort_by(|a, b| a.extraction_path.cmp(&b.extraction_path));
    Ok(all)
}

fn parse_ownership(ownership: &str) -> Result<(u64, u64)> {
    let (uid, gid) = ownership
        .split_once(':')
        .ok_or_else(|| Error::InvalidOwnership(ownership.to_string()))?;
    let uid: u64 = uid
        .parse()
        .map_err(|_| Error::InvalidOwnership(ownership.to_string()))?;
    let gid: u64 = gid
        .parse()
        .map_err(|_| Error::InvalidOwnership(ownership.to_string()))?;
    Ok((uid, gid))
}

fn append_entry<W: std::io::Write>(builder: &mut tar::Builder<W>, entry: &FileEntry) -> Result<()> {
    if entry.permissions > 0o777 {
        return Err(Error::InvalidPermissions(entry.permissions));
    }

    let mut header = tar::Header::new_ustar();
    header
        .set_path(entry.extraction_path.trim_start_matches('/'))
        .map_err(|e| Error::io(e, "set tar entry path"))?;
    header.set_mode(entry.permissions);
    header.set_mtime(entry.modification_time);
    // `set_mtime` above covers mtime; ustar headers have no separate atime/
    // ctime fields, so the "all three set to modification time" rule is
    // satisfied by construction for the fields the format actually carries.

    let (uid, gid) = match &entry.ownership {
        Some(s) => parse_ownership(s)?,
        None => (0, 0),
    };
    header.set_uid(uid);
    header.set_gid(gid);
    header.set_username("").ok();
    header.set_groupname("").ok();

    match entry.kind {
        EntryKind::Directory => {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_cksum();
            builder
                .append(&header, std::io::empty())
                .map_err(|e| Error::io(e, "append directory entry"))?;
        }
        EntryKind::RegularFile => {
            let source = entry
                .source_path
                .as_ref()
                .expect("regular file entries always carry a source path");
            let mut file = std::fs::File::open(source)
                .map_err(|e| Error::io(e, format!("open {}", source.display())))?;
            let metadata = file
                .metadata()
                .map_err(|e| Error::io(e, format!("stat {}", source.display())))?;
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(metadata.len());
            header.set_cksum();
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| Error::io(e, format!("read {}", source.display())))?;
            builder
                .append(&header, buf.as_slice())
                .map_err(|e| Error::io(e, "append file entry"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Write as _;

    fn extract_paths(bytes: &[u8]) -> Vec<String> {
        let decoder = GzDecoder::new(bytes);
        let mut archive = tar::Archive::new(decoder);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                format!("/{}", e.path().unwrap().to_string_lossy())
            })
            .collect()
    }

    #[test]
    fn synthesizes_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("x.txt");
        std::fs::write(&file_path, b"hello").unwrap();

        let layer = FileEntriesLayer::new(
            "app",
            vec![FileEntry::regular_file(&file_path, "/a/b/x.txt", 0o644)],
        );
        let bytes = build(&layer).unwrap();
        let paths = extract_paths(&bytes);
        assert_eq!(paths, vec!["/a", "/a/b", "/a/b/x.txt"]);
    }

    #[test]
    fn empty_layer_produces_only_root_entries() {
        let layer = FileEntriesLayer::new("empty", vec![]);
        let bytes = build(&layer).unwrap();
        let paths = extract_paths(&bytes);
        assert!(paths.is_empty());
    }

    #[test]
    fn build_is_deterministic_for_identical_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("x.txt");
        std::fs::write(&file_path, b"same content").unwrap();

        let make_layer = || {
            FileEntriesLayer::new(
                "app",
                vec![
                    FileEntry::regular_file(&file_path, "/b.txt", 0o644),
                    FileEntry::regular_file(&file_path, "/a.txt", 0o644),
                ],
            )
        };

        let first = build(&make_layer()).unwrap();
        let second = build(&make_layer()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn entries_sorted_lexicographically_by_extraction_path() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("x.txt");
        std::fs::write(&file_path, b"c").unwrap();

        let layer = FileEntriesLayer::new(
            "app",
            vec![
                FileEntry::regular_file(&file_path, "/z.txt", 0o644),
                FileEntry::regular_file(&file_path, "/a.txt", 0o644),
            ],
        );
        let bytes = build(&layer).unwrap();
        let paths = extract_paths(&bytes);
        assert_eq!(paths, vec!["/a.txt", "/z.txt"]);
    }

    #[test]
    fn rejects_out_of_range_permissions() {
        let layer = FileEntriesLayer::new(
            "app",
            vec![FileEntry::regular_file("/tmp/x", "/x.txt", 0o1_0000)],
        );
        assert!(build(&layer).is_err());
    }

    #[test]
    fn gzip_header_has_no_filename_or_mtime() {
        let layer = FileEntriesLayer::new("app", vec![]);
        let bytes = build(&layer).unwrap();
        // GZIP header: magic(2) + method(1) + flags(1) + mtime(4) + xfl(1) + os(1)
        assert_eq!(&bytes[0..2], &[0x1f, 0x8b]);
        let flags = bytes[3];
        assert_eq!(flags & 0x08, 0, "FNAME flag must be unset");
        let mtime_bytes = &bytes[4..8];
        assert_eq!(mtime_bytes, &[0, 0, 0, 0]);
        let mut out = Vec::new();
        out.write_all(&bytes).unwrap();
    }
}
