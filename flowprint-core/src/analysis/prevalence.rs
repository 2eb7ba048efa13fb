//! Fingerprint prevalence tracking.
//!
//! Two tiers: a seeded, immutable "known" set loaded from the resource
//! archive, and a bounded LRU of fingerprints observed at runtime. The
//! LRU writer uses a try-lock so the packet path never waits on the
//! cache; a lost race just means one missed (best-effort) update.

use std::collections::{BTreeMap, HashMap, HashSet};

use compact_str::CompactString;
use parking_lot::RwLock;

/// Default adaptive-cache capacity.
pub const PREVALENCE_CACHE_SIZE: usize = 100_000;

struct LruInner {
    stamp: u64,
    entries: HashMap<CompactString, u64>,
    order: BTreeMap<u64, CompactString>,
}

impl LruInner {
    fn touch(&mut self, fp: &str, max: usize) {
        self.stamp += 1;
        if let Some(old) = self.entries.get_mut(fp) {
            self.order.remove(old);
            *old = self.stamp;
            self.order.insert(self.stamp, CompactString::new(fp));
            return;
        }
        if self.entries.len() >= max {
            if let Some((&oldest, _)) = self.order.iter().next() {
                if let Some(victim) = self.order.remove(&oldest) {
                    self.entries.remove(&victim);
                }
            }
        }
        self.entries.insert(CompactString::new(fp), self.stamp);
        self.order.insert(self.stamp, CompactString::new(fp));
    }
}

/// Seeded known set plus thread-safe adaptive LRU.
pub struct FingerprintPrevalence {
    known: HashSet<CompactString>,
    lru: RwLock<LruInner>,
    max_cache_size: usize,
}

impl FingerprintPrevalence {
    pub fn new(max_cache_size: usize) -> Self {
        FingerprintPrevalence {
            known: HashSet::new(),
            lru: RwLock::new(LruInner {
                stamp: 0,
                entries: HashMap::new(),
                order: BTreeMap::new(),
            }),
            max_cache_size,
        }
    }

    /// Seed the immutable known set (load time only).
    pub fn initial_add(&mut self, fp: &str) {
        self.known.insert(CompactString::new(fp));
    }

    /// Known from seeding, or seen before at runtime.
    pub fn contains(&self, fp: &str) -> bool {
        if self.known.contains(fp) {
            return true;
        }
        self.lru.read().entries.contains_key(fp)
    }

    /// Record an observation. Seeded fingerprints are never cached; a
    /// contended lock skips the update.
    pub fn update(&self, fp: &str) {
        if self.known.contains(fp) {
            return;
        }
        let Some(mut inner) = self.lru.try_write() else {
            return;
        };
        inner.touch(fp, self.max_cache_size);
    }

    pub fn cached_len(&self) -> usize {
        self.lru.read().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_fingerprints_are_known() {
        let mut p = FingerprintPrevalence::new(10);
        p.initial_add("tls/1/(0303)(1301)()");
        assert!(p.contains("tls/1/(0303)(1301)()"));
        assert!(!p.contains("tls/1/(0303)(1302)()"));
    }

    #[test]
    fn test_update_makes_seen() {
        let p = FingerprintPrevalence::new(10);
        assert!(!p.contains("http/(GET)(HTTP/1.1)"));
        p.update("http/(GET)(HTTP/1.1)");
        assert!(p.contains("http/(GET)(HTTP/1.1)"));
    }

    #[test]
    fn test_seeded_entries_never_cached() {
        let mut p = FingerprintPrevalence::new(10);
        p.initial_add("tls/1/(x)");
        p.update("tls/1/(x)");
        assert_eq!(p.cached_len(), 0);
    }

    #[test]
    fn test_lru_eviction_bounds_cache() {
        let p = FingerprintPrevalence::new(3);
        for i in 0..10 {
            p.update(&format!("fp{i}"));
        }
        assert_eq!(p.cached_len(), 3);
        // the most recent entries survive
        assert!(p.contains("fp9"));
        assert!(!p.contains("fp0"));
    }

    #[test]
    fn test_touch_refreshes_entry() {
        let p = FingerprintPrevalence::new(2);
        p.update("a");
        p.update("b");
        p.update("a"); // refresh a
        p.update("c"); // evicts b
        assert!(p.contains("a"));
        assert!(!p.contains("b"));
        assert!(p.contains("c"));
    }
}
