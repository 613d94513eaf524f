use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// A single cached value with its bookkeeping metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Encoded payload. `None` for disk-only tiers, which re-read the
    /// persisted file on every get.
    pub value: Option<Vec<u8>>,
    /// Optional time-to-live; absent means the entry never expires by time
    pub ttl: Option<Duration>,
    /// When the entry was inserted
    pub created_at: Instant,
    /// Last successful read (for LRU ordering)
    pub last_accessed: Instant,
    /// Number of successful reads (for LFU ordering)
    pub access_count: u64,
    /// Encoded payload size, measured at insertion
    pub size_bytes: usize,
}

impl CacheEntry {
    pub fn new(value: Option<Vec<u8>>, size_bytes: usize, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            value,
            ttl,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            size_bytes,
        }
    }

    /// Check if the entry has outlived its TTL
    pub fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(self.created_at) > ttl)
    }

    /// Record a successful read
    pub fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count += 1;
    }
}

/// Eviction policy governing victim selection when a tier is full
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Least Recently Used
    #[default]
    Lru,
    /// Least Frequently Used
    Lfu,
    /// First In, First Out (insertion order)
    Fifo,
    /// Expired entries first, then least recently used
    TtlFirst,
}

/// Backing store layout of a tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Entries live only in memory
    Memory,
    /// Payloads live only on disk; memory holds the metadata
    Disk,
    /// Payloads are memory-resident with a persisted disk mirror
    Hybrid,
}

/// Raw per-tier counters, mutated only by the owning tier
#[derive(Debug, Default, Clone)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removals: u64,
    pub entry_count: usize,
    pub total_bytes: usize,
}

impl TierStats {
    /// Hit rate over all requests so far (0.0 before any request)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }
}

/// Read-only snapshot of one tier's counters and derived rates
#[derive(Debug, Clone, Serialize)]
pub struct TierSnapshot {
    pub name: String,
    pub kind: StorageKind,
    pub policy: EvictionPolicy,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removals: u64,
    pub entry_count: usize,
    pub total_bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hit_rate: f64,
    pub miss_rate: f64,
    /// entry_count / max_entries, as a percentage
    pub entry_usage: f64,
    /// total_bytes / max_bytes, as a percentage
    pub byte_usage: f64,
}

/// Aggregate snapshot across every tier owned by the manager
#[derive(Debug, Clone, Serialize)]
pub struct ManagerSnapshot {
    pub tiers: Vec<TierSnapshot>,
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_evictions: u64,
    pub total_entries: usize,
    pub total_bytes: usize,
    pub overall_hit_rate: f64,
}
