//! The cache root's advisory per-process lock file.

use crate::error::{Error, Result};
use fs4::tokio::AsyncFileExt;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

/// Holds an exclusive advisory lock on `<root>/lock` for as long as it is
/// alive. Other `ocibuild` processes sharing the same cache root block (or,
/// via [`CacheLock::try_acquire`], fail fast) until it is dropped.
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Block until the lock is acquired.
    pub async fn acquire(root: &Path) -> Result<Self> {
        let path = root.join("lock");
        let file = open(&path).await?;
        file.lock_exclusive()
            .map_err(|e| Error::io(e, &path, "lock_exclusive"))?;
        Ok(Self { file, path })
    }

    /// Acquire the lock without blocking, returning `Ok(None)` if another
    /// process currently holds it.
    pub async fn try_acquire(root: &Path) -> Result<Option<Self>> {
        let path = root.join("lock");
        let file = open(&path).await?;
        match file.try_lock_exclusive() {
            Ok(true) => Ok(Some(Self { file, path })),
            Ok(false) => Ok(None),
            Err(e) => Err(Error::io(e, &path, "try_lock_exclusive")),
        }
    }
}

impl CacheLock {
    /// Path to the lock file this guard holds.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// No explicit unlock on drop: closing the file descriptor (which happens
// when `file` is dropped) releases the OS-level advisory lock.

async fn open(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(e, parent, "create_dir_all"))?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(|e| Error::io(e, path, "open"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = CacheLock::acquire(dir.path()).await.unwrap();
        }
        let _lock_again = CacheLock::acquire(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let _held = CacheLock::acquire(dir.path()).await.unwrap();
        let second = CacheLock::try_acquire(dir.path()).await.unwrap();
        assert!(second.is_none());
    }
}
