//! `--layer NAME=SRC[:DEST]` argument parsing: turns a local directory
//! into a planned set of tar entries rooted at `DEST` (default
//! `/opt/<NAME>`).

use ocibuild_tar::{FileEntriesLayer, FileEntry};
use std::path::{Path, PathBuf};

/// One `--layer` argument, already split into its name, source directory,
/// and in-container destination.
pub struct LayerArg {
    pub name: String,
    pub source: PathBuf,
    pub destination: String,
}

impl LayerArg {
    /// Parse `NAME=SRC[:DEST]`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (name, rest) = raw
            .split_once('=')
            .ok_or_else(|| format!("--layer {raw:?} must be NAME=SRC[:DEST]"))?;
        if name.is_empty() {
            return Err(format!("--layer {raw:?} has an empty name"));
        }
        let (source, destination) = match rest.split_once(':') {
            Some((src, dest)) => (src.to_string(), dest.to_string()),
            None => (rest.to_string(), format!("/opt/{name}")),
        };
        if source.is_empty() {
            return Err(format!("--layer {raw:?} has an empty source directory"));
        }
        Ok(Self {
            name: name.to_string(),
            source: PathBuf::from(source),
            destination,
        })
    }
}

/// Recursively walk `source`, producing one [`FileEntry`] per directory and
/// regular file, rooted at `destination` inside the container.
pub fn walk_layer_dir(source: &Path, destination: &str) -> std::io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    let destination = destination.trim_end_matches('/');
    entries.push(FileEntry::directory(destination.to_string(), 0o755));

    let walker = walkdir::WalkDir::new(source)
        .min_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    for entry in walker {
        let entry = entry.map_err(walkdir_io_error)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walkdir only yields descendants of its root");
        let extraction_path = format!(
            "{destination}/{}",
            relative.to_string_lossy().replace('\\', "/")
        );
        let metadata = entry.metadata().map_err(walkdir_io_error)?;

        if metadata.is_dir() {
            entries.push(FileEntry::directory(extraction_path, 0o755));
        } else if metadata.is_file() {
            let permissions = executable_permissions(&metadata);
            entries.push(FileEntry::regular_file(
                entry.path().to_path_buf(),
                extraction_path,
                permissions,
            ));
        }
    }
    Ok(entries)
}

fn walkdir_io_error(e: walkdir::Error) -> std::io::Error {
    e.into_io_error()
        .unwrap_or_else(|| std::io::Error::other(e.to_string()))
}

#[cfg(unix)]
fn executable_permissions(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn executable_permissions(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

/// Build a named [`FileEntriesLayer`] from a `--layer` argument.
pub fn build_layer(arg: &LayerArg) -> std::io::Result<FileEntriesLayer> {
    let entries = walk_layer_dir(&arg.source, &arg.destination)?;
    Ok(FileEntriesLayer::new(arg.name.clone(), entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_source_and_default_destination() {
        let arg = LayerArg::parse("app=./dist").unwrap();
        assert_eq!(arg.name, "app");
        assert_eq!(arg.source, PathBuf::from("./dist"));
        assert_eq!(arg.destination, "/opt/app");
    }

    #[test]
    fn parses_explicit_destination() {
        let arg = LayerArg::parse("app=./dist:/srv/app").unwrap();
        assert_eq!(arg.destination, "/srv/app");
    }

    #[test]
    fn rejects_missing_equals() {
        assert!(LayerArg::parse("./dist").is_err());
    }
}
