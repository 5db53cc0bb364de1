//! Opt-in crash-recovery cleanup.
//!
//! This is not eviction: it never removes a committed entry. It only
//! removes the cache's own litter — temp files left behind by a writer that
//! crashed or was killed before it could rename them into place.

use crate::error::{Error, Result};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Remove uncommitted temp files (`.{digest}.tmp`, `.{digest}.marker.tmp`,
/// `*.tmp` selector writes) under `root` whose modification time is older
/// than `max_age`. Returns the number of files removed.
pub async fn collect_stale_temp_files(root: &Path, max_age: Duration) -> Result<usize> {
    let mut removed = 0usize;
    let mut stack = vec![root.to_path_buf()];
    let now = SystemTime::now();

    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(e, &dir, "read_dir"))?
        {
            let path = entry.path();
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if metadata.is_dir() {
                stack.push(path);
                continue;
            }
            if !is_temp_file(&path) {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let Ok(age) = now.duration_since(modified) else {
                continue;
            };
            if age >= max_age && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
    }

    Ok(removed)
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name.ends_with(".tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_only_stale_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let layer_dir = dir.path().join("layers").join("abc");
        tokio::fs::create_dir_all(&layer_dir).await.unwrap();

        let stale_tmp = layer_dir.join(".abc.tmp");
        let fresh_tmp = layer_dir.join(".fresh.tmp");
        let committed = layer_dir.join("abc.tar.gz");
        tokio::fs::write(&stale_tmp, b"x").await.unwrap();
        tokio::fs::write(&fresh_tmp, b"x").await.unwrap();
        tokio::fs::write(&committed, b"x").await.unwrap();

        // Backdate the stale file by rewriting its mtime far in the past.
        let old = filetime_like_past();
        set_mtime(&stale_tmp, old);

        let removed = collect_stale_temp_files(dir.path(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!stale_tmp.exists());
        assert!(fresh_tmp.exists());
        assert!(committed.exists());
    }

    fn filetime_like_past() -> SystemTime {
        SystemTime::now() - Duration::from_secs(3600)
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = std::fs::File::open(path).unwrap();
        file.set_modified(time).unwrap();
    }
}
