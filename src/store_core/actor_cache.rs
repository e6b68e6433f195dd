//! Bounded TTL cache of recently-touched actors.
//!
//! The applier refreshes `actors.last_seen` at most once per TTL per
//! actor; on a busy stream the same handful of DIDs commit constantly and
//! an upsert per commit would dominate write load. Eviction is blunt: at
//! capacity, expired entries are swept, and if the cache is still full it
//! is cleared. A cleared entry only costs one redundant touch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

pub struct SeenActorCache {
    ttl: Duration,
    max_entries: usize,
    seen: HashMap<String, Instant>,
}

impl SeenActorCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            seen: HashMap::new(),
        }
    }

    /// True when `did` has not been touched within the TTL; records the
    /// touch either way.
    pub fn should_touch(&mut self, did: &str) -> bool {
        let now = Instant::now();

        if let Some(last) = self.seen.get(did) {
            if now.duration_since(*last) < self.ttl {
                return false;
            }
        }

        if self.seen.len() >= self.max_entries && !self.seen.contains_key(did) {
            self.sweep(now);
        }
        self.seen.insert(did.to_string(), now);
        true
    }

    fn sweep(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.seen.retain(|_, last| now.duration_since(*last) < ttl);
        if self.seen.len() >= self.max_entries {
            log::warn!(
                "Actor cache still full after sweep ({} entries), clearing",
                self.seen.len()
            );
            self.seen.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for SeenActorCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_touch_then_suppressed() {
        let mut cache = SeenActorCache::default();
        assert!(cache.should_touch("did:plc:alice"));
        assert!(!cache.should_touch("did:plc:alice"));
        assert!(cache.should_touch("did:plc:bob"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_expired_entry_touches_again() {
        let mut cache = SeenActorCache::new(Duration::from_millis(0), 10);
        assert!(cache.should_touch("did:plc:alice"));
        // Zero TTL: always expired
        assert!(cache.should_touch("did:plc:alice"));
    }

    #[test]
    fn test_capacity_sweep_clears_when_all_fresh() {
        let mut cache = SeenActorCache::new(Duration::from_secs(60), 2);
        assert!(cache.should_touch("did:plc:a"));
        assert!(cache.should_touch("did:plc:b"));
        // Full of fresh entries: sweep clears, new entry still lands
        assert!(cache.should_touch("did:plc:c"));
        assert_eq!(cache.len(), 1);
    }
}
