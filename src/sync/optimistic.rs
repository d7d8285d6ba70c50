//! Local writes applied ahead of server confirmation, and how they reconcile afterwards.

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use metrics::counter;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore};

const METRIC_OPTIMISTIC_UPDATE: &str = "marketsync_optimistic_update_total";

/// What happens to an optimistic write once the paired action settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Keep the optimistic value until something else writes the key.
    #[default]
    FireAndForget,
    /// Apply the inverse transform when the action fails.
    RollbackOnFailure,
    /// Refetch the key after the action settles, whatever the outcome.
    RevalidateOnSettle,
}

impl ReconcilePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FireAndForget => "fire_and_forget",
            Self::RollbackOnFailure => "rollback_on_failure",
            Self::RevalidateOnSettle => "revalidate_on_settle",
        }
    }
}

impl fmt::Display for ReconcilePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconcilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fire_and_forget" | "none" => Ok(Self::FireAndForget),
            "rollback_on_failure" | "rollback" => Ok(Self::RollbackOnFailure),
            "revalidate_on_settle" | "revalidate" => Ok(Self::RevalidateOnSettle),
            other => Err(format!(
                "unknown reconcile policy `{other}` (expected fire_and_forget, rollback_on_failure or revalidate_on_settle)"
            )),
        }
    }
}

/// Writes a locally predicted value into the cache without touching the network.
#[derive(Clone)]
pub struct OptimisticUpdater {
    store: CacheStore,
}

impl OptimisticUpdater {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Replace the cached value at `key` with `transform(current)` and notify subscribers.
    ///
    /// Returns `false` without notifying when nothing of type `T` is cached at `key`.
    pub fn apply_optimistic<T, F>(&self, key: &CacheKey, transform: F) -> bool
    where
        T: Any + Send + Sync,
        F: FnOnce(&T) -> T,
    {
        let applied = self.store.update(key, transform);
        if applied {
            counter!(METRIC_OPTIMISTIC_UPDATE).increment(1);
            debug!(key = %key, "Optimistic update applied");
        } else {
            warn!(key = %key, "Optimistic update skipped: no cached value");
        }
        applied
    }
}
