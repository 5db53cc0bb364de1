//! Resolution of the cache root directory.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

struct CacheRootInputs {
    explicit: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn resolve(inputs: CacheRootInputs) -> Result<PathBuf> {
    // Resolution order (first writable wins):
    // 1) OCIBUILD_CACHE_DIR (explicit override)
    // 2) XDG_CACHE_HOME/ocibuild
    // 3) OS cache dir/ocibuild
    // 4) ~/.cache/ocibuild (legacy fallback)
    // 5) TMPDIR/ocibuild/cache
    let mut candidates = Vec::new();
    if let Some(dir) = inputs.explicit.filter(|p| !p.as_os_str().is_empty()) {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("ocibuild"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("ocibuild"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".cache/ocibuild"));
    }
    candidates.push(inputs.temp_dir.join("ocibuild/cache"));

    for path in candidates {
        if path.exists() {
            let probe = path.join(".write_probe");
            match std::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&probe)
            {
                Ok(_) => {
                    let _ = std::fs::remove_file(&probe);
                    return Ok(path);
                }
                Err(_) => continue,
            }
        }
        if std::fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
    }
    Err(Error::NoWritableRoot)
}

/// Resolve the cache root from the environment, honoring
/// `OCIBUILD_CACHE_DIR` and `XDG_CACHE_HOME` before falling back to
/// `~/.cache/ocibuild` and finally the system temp directory.
pub fn default_cache_root() -> Result<PathBuf> {
    resolve(CacheRootInputs {
        explicit: std::env::var("OCIBUILD_CACHE_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from),
        xdg_cache_home: std::env::var("XDG_CACHE_HOME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from),
        os_cache_dir: dirs::cache_dir(),
        home_dir: dirs::home_dir(),
        temp_dir: std::env::temp_dir(),
    })
}

/// Join `root` and `key`, without touching the filesystem.
#[must_use]
pub fn key_to_path(root: &Path, key: &str) -> PathBuf {
    root.join(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_explicit_override() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit");
        let root = resolve(CacheRootInputs {
            explicit: Some(explicit.clone()),
            xdg_cache_home: None,
            os_cache_dir: None,
            home_dir: None,
            temp_dir: std::env::temp_dir(),
        })
        .unwrap();
        assert_eq!(root, explicit);
    }

    #[test]
    fn falls_back_to_temp_dir_when_nothing_else_given() {
        let root = resolve(CacheRootInputs {
            explicit: None,
            xdg_cache_home: None,
            os_cache_dir: None,
            home_dir: None,
            temp_dir: std::env::temp_dir(),
        })
        .unwrap();
        assert!(root.starts_with(std::env::temp_dir()));
    }
}
