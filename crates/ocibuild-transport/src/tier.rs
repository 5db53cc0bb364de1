//! Per-`(host, port)` memoization of which transport tier last succeeded.

use std::collections::HashMap;
use std::sync::Mutex;

/// Which tier of the failover ladder a host:port pair is known to require.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Tier {
    /// Plain HTTPS with certificate validation.
    Https,
    /// HTTPS with certificate validation disabled.
    InsecureHttps,
    /// Plain HTTP.
    Http,
}

/// Records, per `(host, port)`, which tier last succeeded so subsequent
/// requests skip straight to it instead of re-probing the ladder.
#[derive(Debug, Default)]
pub struct FailoverHistory {
    memo: Mutex<HashMap<(String, u16), Tier>>,
}

impl FailoverHistory {
    /// Build an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The memoized tier for `host:port`, if any request to it has
    /// succeeded before.
    #[must_use]
    pub fn get(&self, host: &str, port: u16) -> Option<Tier> {
        self.memo
            .lock()
            .expect("failover history poisoned")
            .get(&(host.to_string(), port))
            .copied()
    }

    /// Record that `tier` succeeded for `host:port`.
    pub fn record(&self, host: &str, port: u16, tier: Tier) {
        self.memo
            .lock()
            .expect("failover history poisoned")
            .insert((host.to_string(), port), tier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecorded_host_has_no_memoized_tier() {
        let history = FailoverHistory::new();
        assert_eq!(history.get("registry.example", 443), None);
    }

    #[test]
    fn records_and_recalls_tier() {
        let history = FailoverHistory::new();
        history.record("registry.example", 5000, Tier::Http);
        assert_eq!(history.get("registry.example", 5000), Some(Tier::Http));
    }

    #[test]
    fn distinct_ports_on_same_host_are_independent() {
        let history = FailoverHistory::new();
        history.record("registry.example", 443, Tier::Https);
        history.record("registry.example", 5000, Tier::Http);
        assert_eq!(history.get("registry.example", 443), Some(Tier::Https));
        assert_eq!(history.get("registry.example", 5000), Some(Tier::Http));
    }
}
