//! Progress byte accounting across concurrently transferring blobs.
//!
//! A build pushes or pulls several blobs at once; each gets a named
//! [`Allocation`] so a renderer can draw one progress line per transfer
//! instead of a single conflated total.

use std::collections::HashMap;
use std::sync::Mutex;

/// A single named transfer's known total and bytes transferred so far.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocationState {
    /// Total bytes expected, if known in advance (e.g. from a
    /// `Content-Length` header).
    pub total: Option<u64>,
    /// Bytes transferred so far.
    pub transferred: u64,
}

/// Tracks the state of every named allocation in a build.
#[derive(Debug, Default)]
pub struct AllocationRegistry {
    state: Mutex<HashMap<String, AllocationState>>,
}

impl AllocationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new allocation with a known total size, overwriting any
    /// prior state under the same name.
    pub fn open(&self, name: impl Into<String>, total: Option<u64>) {
        let mut state = self.state.lock().expect("allocation registry poisoned");
        state.insert(
            name.into(),
            AllocationState {
                total,
                transferred: 0,
            },
        );
    }

    /// Record additional bytes transferred for a named allocation.
    pub fn advance(&self, name: &str, units: u64) {
        let mut state = self.state.lock().expect("allocation registry poisoned");
        state.entry(name.to_string()).or_default().transferred += units;
    }

    /// Snapshot the current state of one allocation.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<AllocationState> {
        self.state
            .lock()
            .expect("allocation registry poisoned")
            .get(name)
            .copied()
    }

    /// Snapshot every allocation currently tracked.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, AllocationState> {
        self.state.lock().expect("allocation registry poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_accumulates_transferred_bytes() {
        let registry = AllocationRegistry::new();
        registry.open("sha256:abc", Some(100));
        registry.advance("sha256:abc", 40);
        registry.advance("sha256:abc", 60);

        let state = registry.get("sha256:abc").unwrap();
        assert_eq!(state.total, Some(100));
        assert_eq!(state.transferred, 100);
    }

    #[test]
    fn advance_without_open_still_tracks() {
        let registry = AllocationRegistry::new();
        registry.advance("sha256:unregistered", 5);
        let state = registry.get("sha256:unregistered").unwrap();
        assert_eq!(state.total, None);
        assert_eq!(state.transferred, 5);
    }

    #[test]
    fn unknown_allocation_returns_none() {
        let registry = AllocationRegistry::new();
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn snapshot_includes_all_allocations() {
        let registry = AllocationRegistry::new();
        registry.open("a", Some(1));
        registry.open("b", Some(2));
        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);
    }
}
