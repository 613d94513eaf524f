//! Multi-tier cache manager
//!
//! Owns the ordered tier set and routes every caller-facing operation:
//! explicit calls go to the named tier, unaddressed reads walk the tiers
//! fastest-first (promoting hits one level up), and unaddressed writes pick a
//! tier by payload size. A background task sweeps expired entries on a timer
//! and stops cooperatively.
//!
//! The manager takes no lock of its own across tiers, so a read that spans
//! lookup and promotion is not atomic with respect to concurrent writes in
//! other tiers. Promotion is best-effort cache warming, never a
//! correctness-critical write.

use parking_lot::{Mutex, RwLock};
use serde::{Serialize, de::DeserializeOwned};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, TierConfig};
use crate::core::codec::Codec;
use crate::core::types::{ManagerSnapshot, TierSnapshot};
use crate::tier::Tier;

/// Automatic write routing: values below each threshold go to the tier at
/// the matching position in the configured order, clamped to the last tier.
const SMALL_VALUE_MAX: usize = 1024;
const MEDIUM_VALUE_MAX: usize = 10 * 1024;
const LARGE_VALUE_MAX: usize = 1024 * 1024;

/// Bound on how long `stop` waits for the maintenance task to exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct CacheManager {
    /// Ordered fastest-first; insertion order is the read/promotion order
    tiers: Arc<RwLock<Vec<Arc<Tier>>>>,
    codec: Codec,
    cache_dir: PathBuf,
    default_ttl: Option<Duration>,
    cleanup_interval: Duration,
    shutdown: watch::Sender<bool>,
    maintenance: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CacheManager {
    /// Build the manager and its tiers from configuration
    ///
    /// A tier whose backing directory cannot be created is skipped with a
    /// warning. When `auto_cleanup` is set and a tokio runtime is available,
    /// the maintenance task starts immediately; otherwise call
    /// [`start`](Self::start) explicitly.
    pub fn new(config: CacheConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let default_ttl = config.default_ttl_secs.map(Duration::from_secs);

        let mut tiers = Vec::new();
        if config.enabled {
            for tier_config in &config.tiers {
                match Tier::new(tier_config, &config.cache_dir, default_ttl) {
                    Ok(tier) => tiers.push(Arc::new(tier)),
                    Err(e) => warn!("skipping cache tier {}: {}", tier_config.name, e),
                }
            }
            info!("cache manager initialized with {} tiers", tiers.len());
        } else {
            info!("caching disabled by configuration");
        }

        let manager = Self {
            tiers: Arc::new(RwLock::new(tiers)),
            codec: config.codec,
            cache_dir: config.cache_dir.clone(),
            default_ttl,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
            shutdown,
            maintenance: Arc::new(Mutex::new(None)),
        };

        if config.enabled
            && config.auto_cleanup
            && tokio::runtime::Handle::try_current().is_ok()
        {
            manager.start();
        }

        manager
    }

    /// Get a value, either from one named tier or by walking the tier order
    ///
    /// An automatic lookup that hits below the first tier promotes the value
    /// one level up (with that tier's default TTL) unless the upper tier
    /// already holds the key. Promotion failures are ignored.
    pub fn get(&self, key: &str, tier_name: Option<&str>) -> Option<Vec<u8>> {
        if let Some(name) = tier_name {
            return match self.tier(name) {
                Some(tier) => tier.get(key),
                None => {
                    warn!("get on unknown cache tier {}", name);
                    None
                }
            };
        }

        let tiers = self.tiers.read().clone();
        for (idx, tier) in tiers.iter().enumerate() {
            if let Some(value) = tier.get(key) {
                if idx > 0 {
                    let upper = &tiers[idx - 1];
                    if !upper.contains(key) && upper.set(key, value.clone(), None) {
                        debug!(
                            "promoted {} from tier {} to {}",
                            key,
                            tier.name(),
                            upper.name()
                        );
                    }
                }
                return Some(value);
            }
        }
        None
    }

    /// Store a value, either in one named tier or by payload size
    pub fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        tier_name: Option<&str>,
    ) -> bool {
        if let Some(name) = tier_name {
            return match self.tier(name) {
                Some(tier) => tier.set(key, value, ttl),
                None => {
                    warn!("set on unknown cache tier {}", name);
                    false
                }
            };
        }

        let tiers = self.tiers.read().clone();
        if tiers.is_empty() {
            return false;
        }

        let idx = match value.len() {
            n if n < SMALL_VALUE_MAX => 0,
            n if n < MEDIUM_VALUE_MAX => 1,
            n if n < LARGE_VALUE_MAX => 2,
            _ => 3,
        }
        .min(tiers.len() - 1);

        tiers[idx].set(key, value, ttl)
    }

    /// Delete a key from one tier or every tier; returns how many tiers
    /// actually held it
    pub fn delete(&self, key: &str, tier_name: Option<&str>) -> usize {
        match tier_name {
            Some(name) => match self.tier(name) {
                Some(tier) => usize::from(tier.delete(key)),
                None => 0,
            },
            None => {
                let tiers = self.tiers.read().clone();
                tiers.iter().filter(|tier| tier.delete(key)).count()
            }
        }
    }

    /// Clear one tier or every tier
    pub fn clear(&self, tier_name: Option<&str>) {
        match tier_name {
            Some(name) => {
                if let Some(tier) = self.tier(name) {
                    tier.clear();
                }
            }
            None => {
                let tiers = self.tiers.read().clone();
                for tier in &tiers {
                    tier.clear();
                }
            }
        }
    }

    /// Sweep expired entries in every tier, returning the total removed
    pub fn clear_expired(&self) -> usize {
        let tiers = self.tiers.read().clone();
        tiers.iter().map(|tier| tier.expire_sweep()).sum()
    }

    /// Per-tier snapshots plus cross-tier totals
    pub fn stats(&self) -> ManagerSnapshot {
        let tiers = self.tiers.read().clone();
        let snapshots: Vec<TierSnapshot> = tiers.iter().map(|tier| tier.stats()).collect();

        let total_hits: u64 = snapshots.iter().map(|s| s.hits).sum();
        let total_misses: u64 = snapshots.iter().map(|s| s.misses).sum();
        let total_requests = total_hits + total_misses;

        ManagerSnapshot {
            total_hits,
            total_misses,
            total_evictions: snapshots.iter().map(|s| s.evictions).sum(),
            total_entries: snapshots.iter().map(|s| s.entry_count).sum(),
            total_bytes: snapshots.iter().map(|s| s.total_bytes).sum(),
            overall_hit_rate: if total_requests == 0 {
                0.0
            } else {
                total_hits as f64 / total_requests as f64
            },
            tiers: snapshots,
        }
    }

    /// Append a tier to the search order; false on duplicate name or
    /// construction failure
    pub fn add_tier(&self, config: &TierConfig) -> bool {
        let mut tiers = self.tiers.write();
        if tiers.iter().any(|tier| tier.name() == config.name) {
            warn!("cache tier {} already exists", config.name);
            return false;
        }
        match Tier::new(config, &self.cache_dir, self.default_ttl) {
            Ok(tier) => {
                tiers.push(Arc::new(tier));
                true
            }
            Err(e) => {
                warn!("failed to add cache tier {}: {}", config.name, e);
                false
            }
        }
    }

    /// Remove a tier by name, clearing its contents first
    pub fn remove_tier(&self, name: &str) -> bool {
        let removed = {
            let mut tiers = self.tiers.write();
            tiers
                .iter()
                .position(|tier| tier.name() == name)
                .map(|idx| tiers.remove(idx))
        };
        match removed {
            Some(tier) => {
                tier.clear();
                info!("removed cache tier {}", name);
                true
            }
            None => false,
        }
    }

    /// Encode a value with the configured codec and cache the bytes
    ///
    /// A value neither codec can encode is skipped (false), never an error.
    pub fn set_value<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tier_name: Option<&str>,
    ) -> bool {
        match self.codec.encode_with_fallback(value) {
            Ok(bytes) => self.set(key, bytes, ttl, tier_name),
            Err(e) => {
                warn!("skipping cache set for {}: {}", key, e);
                false
            }
        }
    }

    /// Fetch and decode a cached value
    pub fn get_value<T: DeserializeOwned>(&self, key: &str, tier_name: Option<&str>) -> Option<T> {
        let bytes = self.get(key, tier_name)?;
        match self.codec.decode_with_fallback(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("failed to decode cached value for {}: {}", key, e);
                None
            }
        }
    }

    /// Start the background maintenance task (idempotent)
    ///
    /// Must be called from within a tokio runtime. The task sweeps expired
    /// entries every `cleanup_interval` until [`stop`](Self::stop) signals it.
    pub fn start(&self) {
        let mut guard = self.maintenance.lock();
        if guard.is_some() {
            return;
        }

        // Reset the flag so the manager can be restarted after a stop
        self.shutdown.send_replace(false);
        let mut shutdown = self.shutdown.subscribe();
        let interval = self.cleanup_interval;
        let manager = self.clone();

        info!("starting cache maintenance task (interval={:?})", interval);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = manager.clear_expired();
                        if removed > 0 {
                            debug!("maintenance pass removed {} expired entries", removed);
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("cache maintenance task stopping");
                        break;
                    }
                }
            }
        });
        *guard = Some(handle);
    }

    /// Signal the maintenance task and wait for it, bounded by
    /// `SHUTDOWN_TIMEOUT`; the task is aborted if it fails to exit in time
    pub async fn stop(&self) {
        let handle = self.maintenance.lock().take();
        let Some(handle) = handle else {
            return;
        };

        let abort = handle.abort_handle();
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
            warn!(
                "cache maintenance task did not stop within {:?}, aborting",
                SHUTDOWN_TIMEOUT
            );
            abort.abort();
        }
    }

    fn tier(&self, name: &str) -> Option<Arc<Tier>> {
        self.tiers
            .read()
            .iter()
            .find(|tier| tier.name() == name)
            .cloned()
    }
}
