//! stratacache — multi-tier, policy-driven artifact cache
//!
//! Stores computed artifacts (LLM responses, OCR results, file-processing
//! metadata) keyed by opaque strings, across ordered tiers:
//! - Memory tiers for hot data
//! - Disk tiers for large payloads (one file per key)
//! - Hybrid tiers keeping payloads memory-resident with a disk mirror
//!
//! Each tier is bounded by entry count and byte size, owns one eviction
//! policy (LRU, LFU, FIFO or TTL-first) and its own statistics. The
//! [`CacheManager`] routes reads fastest-first with one-level promotion,
//! routes writes by payload size, and runs a background task that sweeps
//! expired entries. Construct one manager at application start and hand it
//! to consumers by reference; there is no global instance.

pub mod config;
pub mod core;
pub mod manager;
pub mod tier;

pub use config::{CacheConfig, TierConfig};
pub use core::{
    CacheError, Codec, EvictionPolicy, ManagerSnapshot, Result, StorageKind, TierSnapshot,
};
pub use manager::CacheManager;
pub use tier::Tier;
