use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::codec::Codec;
use crate::core::error::{CacheError, Result};
use crate::core::types::{EvictionPolicy, StorageKind};

/// Top-level cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; a disabled cache accepts every call and stores nothing
    pub enabled: bool,
    /// Fallback TTL for tiers that do not set their own
    pub default_ttl_secs: Option<u64>,
    /// How often the maintenance task sweeps expired entries
    pub cleanup_interval_secs: u64,
    /// Start the maintenance task automatically at construction
    pub auto_cleanup: bool,
    /// Root directory for disk/hybrid tiers (one subdirectory per tier)
    pub cache_dir: PathBuf,
    /// Payload serialization format for the typed API
    pub codec: Codec,
    /// Ordered tier definitions, fastest first
    pub tiers: Vec<TierConfig>,
    /// Per data-type TTL overrides, keyed by label (e.g. "llm_response")
    pub expiration_policies: HashMap<String, u64>,
}

/// Configuration of a single tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub name: String,
    pub kind: StorageKind,
    #[serde(default)]
    pub policy: EvictionPolicy,
    pub max_entries: usize,
    pub max_size_mb: usize,
    /// Tier default TTL; `None` falls back to the manager-wide default
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    /// Override for the tier's disk directory (default: `<cache_dir>/<name>`)
    #[serde(default)]
    pub disk_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: Some(3600),
            cleanup_interval_secs: 300,
            auto_cleanup: true,
            cache_dir: PathBuf::from("./cache_data"),
            codec: Codec::Json,
            tiers: vec![
                TierConfig {
                    name: "fast_memory".to_string(),
                    kind: StorageKind::Memory,
                    policy: EvictionPolicy::Lru,
                    max_entries: 1_000,
                    max_size_mb: 64,
                    ttl_secs: Some(1800),
                    disk_path: None,
                },
                TierConfig {
                    name: "second_memory".to_string(),
                    kind: StorageKind::Memory,
                    policy: EvictionPolicy::Lfu,
                    max_entries: 5_000,
                    max_size_mb: 256,
                    ttl_secs: Some(3600),
                    disk_path: None,
                },
                TierConfig {
                    name: "disk".to_string(),
                    kind: StorageKind::Disk,
                    policy: EvictionPolicy::Lru,
                    max_entries: 20_000,
                    max_size_mb: 1024,
                    ttl_secs: Some(86_400),
                    disk_path: None,
                },
                TierConfig {
                    name: "hybrid".to_string(),
                    kind: StorageKind::Hybrid,
                    policy: EvictionPolicy::Lru,
                    max_entries: 2_000,
                    max_size_mb: 512,
                    ttl_secs: Some(7200),
                    disk_path: None,
                },
            ],
            expiration_policies: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if tier.name.is_empty() {
                return Err(CacheError::InvalidConfig("empty tier name".to_string()));
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(CacheError::InvalidConfig(format!(
                    "duplicate tier name: {}",
                    tier.name
                )));
            }
            if tier.max_entries == 0 || tier.max_size_mb == 0 {
                return Err(CacheError::InvalidConfig(format!(
                    "tier {} must allow at least one entry and one MB",
                    tier.name
                )));
            }
        }
        Ok(())
    }

    /// TTL to use for a given data-type label, falling back to the default
    pub fn ttl_for(&self, data_type: &str) -> Option<Duration> {
        self.expiration_policies
            .get(data_type)
            .copied()
            .or(self.default_ttl_secs)
            .map(Duration::from_secs)
    }
}

impl TierConfig {
    pub fn max_bytes(&self) -> usize {
        self.max_size_mb * 1024 * 1024
    }

    pub(crate) fn resolve_dir(&self, cache_dir: &Path) -> PathBuf {
        self.disk_path
            .clone()
            .unwrap_or_else(|| cache_dir.join(&self.name))
    }
}
