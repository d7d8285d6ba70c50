//! marketsync cache layer
//!
//! - **Keys**: canonical [`CacheKey`]s derived from endpoint templates
//! - **Store**: the shared [`CacheStore`] holding one entry per key
//!
//! ## Configuration
//!
//! Cache behavior is controlled by the `[cache]` settings section:
//!
//! ```toml
//! [cache]
//! freshness_ms = 2000
//! idle_retention_ms = 300000
//! sweep_interval_ms = 60000
//! ```

mod config;
mod keys;
mod lock;
mod store;

pub(crate) use self::config::{
    DEFAULT_FRESHNESS_MS, DEFAULT_IDLE_RETENTION_MS, DEFAULT_SWEEP_INTERVAL_MS, duration_ms,
};
pub(crate) use lock::mutex_lock;

pub use self::config::CacheConfig;
pub use keys::{CacheKey, KeyError, Params, PathTemplate, derive_key};
pub use store::{CacheStore, CachedValue, EntryStatus, InFlight, Listener, Unsubscribe};
