//! Single-level cache store
//!
//! A tier is one bounded collection of entries with one eviction policy,
//! optional disk persistence and its own statistics. Every operation holds
//! the tier's lock for its full duration, disk I/O included; the manager
//! never takes a lock of its own, so no cross-tier lock is ever held.

pub mod disk;

pub use disk::DiskStore;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::TierConfig;
use crate::core::error::{CacheError, Result};
use crate::core::types::{CacheEntry, EvictionPolicy, StorageKind, TierSnapshot, TierStats};

pub struct Tier {
    name: String,
    kind: StorageKind,
    policy: EvictionPolicy,
    max_entries: usize,
    max_bytes: usize,
    default_ttl: Option<Duration>,
    disk: Option<DiskStore>,
    inner: RwLock<TierInner>,
}

struct TierInner {
    entries: HashMap<String, CacheEntry>,
    stats: TierStats,
}

impl Tier {
    /// Create a tier from its configuration. Disk and hybrid tiers get one
    /// directory under `cache_root` (or the configured override); failing to
    /// create it fails tier construction.
    pub fn new(
        config: &TierConfig,
        cache_root: &Path,
        fallback_ttl: Option<Duration>,
    ) -> Result<Self> {
        if config.max_entries == 0 || config.max_size_mb == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "tier {} must allow at least one entry and one MB",
                config.name
            )));
        }

        let disk = match config.kind {
            StorageKind::Memory => None,
            StorageKind::Disk | StorageKind::Hybrid => {
                Some(DiskStore::open(config.resolve_dir(cache_root))?)
            }
        };

        info!(
            "creating cache tier {} (kind={:?}, policy={:?}, max_entries={}, max_size_mb={})",
            config.name, config.kind, config.policy, config.max_entries, config.max_size_mb
        );

        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            policy: config.policy,
            max_entries: config.max_entries,
            max_bytes: config.max_bytes(),
            default_ttl: config.ttl_secs.map(Duration::from_secs).or(fallback_ttl),
            disk,
            inner: RwLock::new(TierInner {
                entries: HashMap::new(),
                stats: TierStats::default(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    /// Get a value by key
    ///
    /// A hit updates the entry's access metadata; an expired entry is removed
    /// and counted as both an expiry and a miss. Disk-only tiers re-read the
    /// payload file on every get.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.stats.misses += 1;
                debug!("{}: MISS {}", self.name, key);
                return None;
            }
        };

        if expired {
            self.remove_entry(&mut inner, key);
            inner.stats.expired_removals += 1;
            inner.stats.misses += 1;
            debug!("{}: EXPIRED {}", self.name, key);
            return None;
        }

        let value = match self.kind {
            StorageKind::Disk => self.disk.as_ref().and_then(|disk| disk.read(key)),
            StorageKind::Memory | StorageKind::Hybrid => {
                inner.entries.get(key).and_then(|entry| entry.value.clone())
            }
        };

        match value {
            Some(bytes) => {
                if let Some(entry) = inner.entries.get_mut(key) {
                    entry.touch(now);
                }
                inner.stats.hits += 1;
                debug!("{}: HIT {}", self.name, key);
                Some(bytes)
            }
            None => {
                // Entry known but payload unavailable (disk read failure)
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a value, evicting as needed to respect the tier's limits
    ///
    /// Returns false when reclamation cannot make room or the disk write
    /// fails; in either case no in-memory state changes.
    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> bool {
        let ttl = ttl.or(self.default_ttl);
        let size = value.len();
        let now = Instant::now();
        let mut inner = self.inner.write();

        if !self.reclaim_space(&mut inner, size, now) {
            debug!("{}: SET rejected for {} ({} bytes)", self.name, key, size);
            return false;
        }

        if let Some(disk) = &self.disk {
            if !disk.write(key, &value) {
                return false;
            }
        }

        let stored = match self.kind {
            StorageKind::Disk => None,
            StorageKind::Memory | StorageKind::Hybrid => Some(value),
        };

        if let Some(old) = inner.entries.remove(key) {
            inner.stats.total_bytes = inner.stats.total_bytes.saturating_sub(old.size_bytes);
        }
        inner
            .entries
            .insert(key.to_string(), CacheEntry::new(stored, size, ttl));
        inner.stats.total_bytes += size;
        inner.stats.entry_count = inner.entries.len();

        debug!("{}: SET {} ({} bytes, ttl={:?})", self.name, key, size, ttl);
        true
    }

    /// Remove a key; true if something was removed
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(key) {
            self.remove_entry(&mut inner, key);
            debug!("{}: DELETE {}", self.name, key);
            true
        } else {
            false
        }
    }

    /// Remove every entry (and disk file) and reset statistics
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.stats = TierStats::default();
        if let Some(disk) = &self.disk {
            disk.clear();
        }
        debug!("{}: CLEAR ({} entries)", self.name, count);
    }

    /// Remove every currently-expired entry, returning how many were removed
    pub fn expire_sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in &expired {
            self.remove_entry(&mut inner, key);
        }
        inner.stats.expired_removals += count as u64;

        if count > 0 {
            debug!("{}: swept {} expired entries", self.name, count);
        }
        count
    }

    /// Presence check that perturbs no counters or access metadata
    ///
    /// Used by the manager's promotion path to avoid re-warming a tier that
    /// already holds the key.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let inner = self.inner.read();
        inner
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Read-only snapshot of current counters and derived rates
    pub fn stats(&self) -> TierSnapshot {
        let inner = self.inner.read();
        let stats = &inner.stats;
        TierSnapshot {
            name: self.name.clone(),
            kind: self.kind,
            policy: self.policy,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expired_removals: stats.expired_removals,
            entry_count: stats.entry_count,
            total_bytes: stats.total_bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            hit_rate: stats.hit_rate(),
            miss_rate: stats.miss_rate(),
            entry_usage: stats.entry_count as f64 / self.max_entries as f64 * 100.0,
            byte_usage: stats.total_bytes as f64 / self.max_bytes as f64 * 100.0,
        }
    }

    /// Make room for an insertion of `needed` bytes
    ///
    /// Evicts exactly one victim when the entry limit is reached, then evicts
    /// in policy order until the byte limit would hold. Each call computes
    /// how much is required up front and stops once satisfied; it never loops
    /// one-at-a-time against an unbounded deficit.
    fn reclaim_space(&self, inner: &mut TierInner, needed: usize, now: Instant) -> bool {
        // A value larger than the whole tier can never fit; reject before
        // evicting anything
        if needed > self.max_bytes {
            return false;
        }

        if inner.entries.len() >= self.max_entries {
            let order = self.victims_in_order(&inner.entries, now);
            match order.first() {
                Some(victim) => {
                    let victim = victim.clone();
                    self.evict(inner, &victim);
                }
                None => return false,
            }
        }

        if inner.stats.total_bytes + needed > self.max_bytes {
            let excess = inner.stats.total_bytes + needed - self.max_bytes;
            let mut freed = 0usize;
            for victim in self.victims_in_order(&inner.entries, now) {
                if freed >= excess {
                    break;
                }
                freed += self.evict(inner, &victim);
            }
            if freed < excess {
                return false;
            }
        }

        true
    }

    /// Keys in evict-first order under this tier's policy
    fn victims_in_order(&self, entries: &HashMap<String, CacheEntry>, now: Instant) -> Vec<String> {
        let mut candidates: Vec<(&String, &CacheEntry)> = entries.iter().collect();
        match self.policy {
            EvictionPolicy::Lru => candidates.sort_by_key(|(_, entry)| entry.last_accessed),
            EvictionPolicy::Lfu => candidates.sort_by_key(|(_, entry)| entry.access_count),
            EvictionPolicy::Fifo => candidates.sort_by_key(|(_, entry)| entry.created_at),
            EvictionPolicy::TtlFirst => candidates
                .sort_by_key(|(_, entry)| (!entry.is_expired(now), entry.last_accessed)),
        }
        candidates.into_iter().map(|(key, _)| key.clone()).collect()
    }

    fn evict(&self, inner: &mut TierInner, key: &str) -> usize {
        match self.remove_entry(inner, key) {
            Some(size) => {
                inner.stats.evictions += 1;
                debug!("{}: EVICT {}", self.name, key);
                size
            }
            None => 0,
        }
    }

    /// Drop one entry and its disk file, keeping size/count counters current
    fn remove_entry(&self, inner: &mut TierInner, key: &str) -> Option<usize> {
        let entry = inner.entries.remove(key)?;
        inner.stats.total_bytes = inner.stats.total_bytes.saturating_sub(entry.size_bytes);
        inner.stats.entry_count = inner.entries.len();
        if let Some(disk) = &self.disk {
            disk.remove(key);
        }
        Some(entry.size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn memory_tier(name: &str, policy: EvictionPolicy, max_entries: usize) -> Tier {
        let config = TierConfig {
            name: name.to_string(),
            kind: StorageKind::Memory,
            policy,
            max_entries,
            max_size_mb: 1,
            ttl_secs: None,
            disk_path: None,
        };
        Tier::new(&config, Path::new("./unused"), None).unwrap()
    }

    #[test]
    fn test_set_get() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);

        assert!(tier.set("key1", b"value1".to_vec(), None));
        assert_eq!(tier.get("key1"), Some(b"value1".to_vec()));

        let stats = tier.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.total_bytes, 6);
    }

    #[test]
    fn test_get_nonexistent() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);

        assert_eq!(tier.get("nope"), None);
        assert_eq!(tier.stats().misses, 1);
    }

    #[test]
    fn test_replace_same_key() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);

        assert!(tier.set("key1", b"aa".to_vec(), None));
        assert!(tier.set("key1", b"bbbb".to_vec(), None));

        assert_eq!(tier.get("key1"), Some(b"bbbb".to_vec()));
        let stats = tier.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.total_bytes, 4);
    }

    #[test]
    fn test_delete() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);

        tier.set("key1", b"value1".to_vec(), None);
        assert!(tier.delete("key1"));
        assert!(!tier.delete("key1"));
        assert_eq!(tier.get("key1"), None);
        assert_eq!(tier.stats().total_bytes, 0);
    }

    #[test]
    fn test_clear_resets_stats() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);

        tier.set("key1", b"1".to_vec(), None);
        tier.get("key1");
        tier.get("missing");
        tier.clear();

        let stats = tier.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(tier.get("key1"), None);
    }

    #[test]
    fn test_lru_eviction() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 2);

        tier.set("k1", b"1".to_vec(), None);
        tier.set("k2", b"2".to_vec(), None);
        // k1 is now least recently accessed
        tier.set("k3", b"3".to_vec(), None);

        assert_eq!(tier.get("k1"), None, "k1 should be evicted");
        assert!(tier.get("k2").is_some());
        assert!(tier.get("k3").is_some());
        assert_eq!(tier.stats().evictions, 1);
    }

    #[test]
    fn test_lru_access_protects_entry() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 2);

        tier.set("k1", b"1".to_vec(), None);
        tier.set("k2", b"2".to_vec(), None);
        tier.get("k1");
        tier.set("k3", b"3".to_vec(), None);

        assert!(tier.get("k1").is_some(), "k1 was accessed, k2 should go");
        assert_eq!(tier.get("k2"), None);
    }

    #[test]
    fn test_lfu_eviction() {
        let tier = memory_tier("t", EvictionPolicy::Lfu, 2);

        tier.set("k1", b"1".to_vec(), None);
        tier.set("k2", b"2".to_vec(), None);
        tier.get("k1");
        tier.get("k1");
        tier.get("k1");
        tier.get("k2");
        tier.set("k3", b"3".to_vec(), None);

        assert_eq!(tier.get("k2"), None, "k2 is least frequently used");
        assert!(tier.get("k1").is_some());
        assert!(tier.get("k3").is_some());
    }

    #[test]
    fn test_fifo_eviction_ignores_access() {
        let tier = memory_tier("t", EvictionPolicy::Fifo, 2);

        tier.set("k1", b"1".to_vec(), None);
        tier.set("k2", b"2".to_vec(), None);
        // Accessing k1 must not save it under FIFO
        tier.get("k1");
        tier.get("k1");
        tier.set("k3", b"3".to_vec(), None);

        assert_eq!(tier.get("k1"), None, "k1 was inserted first");
        assert!(tier.get("k2").is_some());
    }

    #[test]
    fn test_ttl_first_evicts_expired_before_live() {
        let tier = memory_tier("t", EvictionPolicy::TtlFirst, 2);

        tier.set("live", b"1".to_vec(), None);
        tier.set("dying", b"2".to_vec(), Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));
        tier.set("k3", b"3".to_vec(), None);

        assert!(tier.get("live").is_some(), "live entry must survive");
        assert!(tier.get("k3").is_some());
    }

    #[test]
    fn test_ttl_expiry_counts_once() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);

        tier.set("key1", b"v".to_vec(), Some(Duration::from_millis(20)));
        assert!(tier.get("key1").is_some(), "not expired yet");

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(tier.get("key1"), None);
        assert_eq!(tier.get("key1"), None);

        let stats = tier.stats();
        assert_eq!(stats.expired_removals, 1, "expiry counted exactly once");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_expire_sweep() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);

        tier.set("short1", b"1".to_vec(), Some(Duration::from_millis(10)));
        tier.set("short2", b"2".to_vec(), Some(Duration::from_millis(10)));
        tier.set("long", b"3".to_vec(), Some(Duration::from_secs(300)));

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(tier.expire_sweep(), 2);
        assert_eq!(tier.expire_sweep(), 0, "second sweep finds nothing");

        let stats = tier.stats();
        assert_eq!(stats.expired_removals, 2);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_rejects_oversized_value() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);
        tier.set("small", b"1".to_vec(), None);

        // Tier allows 1 MB; this value can never fit
        let oversized = vec![0u8; 2 * 1024 * 1024];
        assert!(!tier.set("big", oversized, None));

        let stats = tier.stats();
        assert_eq!(stats.entry_count, 1, "rejected set must not change state");
        assert_eq!(tier.get("big"), None);
    }

    #[test]
    fn test_byte_limit_evicts_until_room() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 1000);

        // Fill most of the 1 MB budget with four 256 KiB values
        for i in 0..4 {
            assert!(tier.set(&format!("k{i}"), vec![0u8; 256 * 1024], None));
        }
        // A 512 KiB value needs two victims
        assert!(tier.set("big", vec![0u8; 512 * 1024], None));

        let stats = tier.stats();
        assert!(stats.total_bytes <= 1024 * 1024);
        assert_eq!(stats.evictions, 2);
        assert_eq!(tier.get("k0"), None);
        assert_eq!(tier.get("k1"), None);
        assert!(tier.get("big").is_some());
    }

    #[test]
    fn test_contains_does_not_touch() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 10);
        tier.set("key1", b"v".to_vec(), None);

        assert!(tier.contains("key1"));
        assert!(!tier.contains("other"));

        let stats = tier.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_stats_usage_percentages() {
        let tier = memory_tier("t", EvictionPolicy::Lru, 4);
        tier.set("k1", b"x".to_vec(), None);

        let stats = tier.stats();
        assert!((stats.entry_usage - 25.0).abs() < f64::EPSILON);
        assert!(stats.byte_usage > 0.0);
    }

    #[test]
    fn test_disk_tier_roundtrip() {
        let dir = tempdir().unwrap();
        let config = TierConfig {
            name: "disk".to_string(),
            kind: StorageKind::Disk,
            policy: EvictionPolicy::Lru,
            max_entries: 10,
            max_size_mb: 1,
            ttl_secs: None,
            disk_path: None,
        };
        let tier = Tier::new(&config, dir.path(), None).unwrap();

        assert!(tier.set("key1", b"payload".to_vec(), None));
        // Payload must come back from the file, not memory
        assert_eq!(tier.get("key1"), Some(b"payload".to_vec()));

        let tier_dir = dir.path().join("disk");
        let files = std::fs::read_dir(&tier_dir).unwrap().count();
        assert_eq!(files, 1);

        assert!(tier.delete("key1"));
        assert_eq!(std::fs::read_dir(&tier_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_disk_tier_read_failure_is_miss() {
        let dir = tempdir().unwrap();
        let config = TierConfig {
            name: "disk".to_string(),
            kind: StorageKind::Disk,
            policy: EvictionPolicy::Lru,
            max_entries: 10,
            max_size_mb: 1,
            ttl_secs: None,
            disk_path: None,
        };
        let tier = Tier::new(&config, dir.path(), None).unwrap();
        tier.set("key1", b"payload".to_vec(), None);

        // Remove the file behind the tier's back
        for entry in std::fs::read_dir(dir.path().join("disk")).unwrap().flatten() {
            std::fs::remove_file(entry.path()).unwrap();
        }

        assert_eq!(tier.get("key1"), None);
        assert_eq!(tier.stats().misses, 1);
    }

    #[test]
    fn test_disk_write_failure_leaves_state_unchanged() {
        use sha2::{Digest, Sha256};

        let dir = tempdir().unwrap();
        let config = TierConfig {
            name: "disk".to_string(),
            kind: StorageKind::Disk,
            policy: EvictionPolicy::Lru,
            max_entries: 10,
            max_size_mb: 1,
            ttl_secs: None,
            disk_path: None,
        };
        let tier = Tier::new(&config, dir.path(), None).unwrap();
        assert!(tier.set("ok", b"fine".to_vec(), None));

        // Occupy the payload path for the next key with a directory so the
        // file write fails
        let digest = Sha256::digest("blocked".as_bytes());
        let blocked_path = dir
            .path()
            .join("disk")
            .join(format!("{}.cache", hex::encode(&digest[..16])));
        std::fs::create_dir_all(&blocked_path).unwrap();

        assert!(!tier.set("blocked", b"payload".to_vec(), None));

        let stats = tier.stats();
        assert_eq!(stats.entry_count, 1, "failed write must not change state");
        assert_eq!(stats.total_bytes, 4);
        assert_eq!(tier.get("blocked"), None);
        assert_eq!(tier.get("ok"), Some(b"fine".to_vec()));
    }

    #[test]
    fn test_zero_limits_rejected_at_construction() {
        let mut config = TierConfig {
            name: "bad".to_string(),
            kind: StorageKind::Memory,
            policy: EvictionPolicy::Lru,
            max_entries: 0,
            max_size_mb: 1,
            ttl_secs: None,
            disk_path: None,
        };
        assert!(Tier::new(&config, Path::new("./unused"), None).is_err());

        config.max_entries = 10;
        config.max_size_mb = 0;
        assert!(Tier::new(&config, Path::new("./unused"), None).is_err());
    }

    #[test]
    fn test_hybrid_tier_serves_from_memory_and_mirrors_to_disk() {
        let dir = tempdir().unwrap();
        let config = TierConfig {
            name: "hybrid".to_string(),
            kind: StorageKind::Hybrid,
            policy: EvictionPolicy::Lru,
            max_entries: 10,
            max_size_mb: 1,
            ttl_secs: None,
            disk_path: None,
        };
        let tier = Tier::new(&config, dir.path(), None).unwrap();
        tier.set("key1", b"payload".to_vec(), None);

        // Deleting the mirror file must not break reads: hybrid entries stay
        // memory-resident.
        for entry in std::fs::read_dir(dir.path().join("hybrid")).unwrap().flatten() {
            std::fs::remove_file(entry.path()).unwrap();
        }
        assert_eq!(tier.get("key1"), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_default_ttl_applies() {
        let config = TierConfig {
            name: "t".to_string(),
            kind: StorageKind::Memory,
            policy: EvictionPolicy::Lru,
            max_entries: 10,
            max_size_mb: 1,
            ttl_secs: None,
            disk_path: None,
        };
        let tier = Tier::new(&config, Path::new("./unused"), Some(Duration::from_millis(20)))
            .unwrap();

        tier.set("key1", b"v".to_vec(), None);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(tier.get("key1"), None);
        assert_eq!(tier.stats().expired_removals, 1);
    }
}
