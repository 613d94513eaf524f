pub mod codec;
pub mod error;
pub mod types;

pub use codec::Codec;
pub use error::{CacheError, Result};
pub use types::{
    CacheEntry, EvictionPolicy, ManagerSnapshot, StorageKind, TierSnapshot, TierStats,
};
