//! Cache configuration.
//!
//! Controls revalidation freshness and idle-entry retention. Resolved from the `[cache]` section
//! of the layered settings.

use std::time::Duration;

pub(crate) const DEFAULT_FRESHNESS_MS: u64 = 2_000;
pub(crate) const DEFAULT_IDLE_RETENTION_MS: u64 = 300_000;
pub(crate) const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Runtime cache tuning, built from [`crate::config::CacheSettings`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// A value written within this window is fresh; new subscribers reuse it without fetching.
    pub freshness_ms: u64,
    /// How long an entry with no subscribers is kept before the sweeper evicts it.
    pub idle_retention_ms: u64,
    /// Sweeper cadence.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_ms: DEFAULT_FRESHNESS_MS,
            idle_retention_ms: DEFAULT_IDLE_RETENTION_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            freshness_ms: duration_ms(settings.freshness),
            idle_retention_ms: duration_ms(settings.idle_retention),
            sweep_interval_ms: duration_ms(settings.sweep_interval),
        }
    }
}

impl CacheConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }

    pub fn idle_retention(&self) -> Duration {
        Duration::from_millis(self.idle_retention_ms)
    }

    /// Sweeper cadence, clamped to at least one millisecond.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.freshness(), Duration::from_secs(2));
        assert_eq!(config.idle_retention(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn built_from_resolved_settings() {
        let settings = crate::config::CacheSettings {
            freshness: Duration::from_millis(750),
            idle_retention: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
            reconcile: crate::sync::ReconcilePolicy::default(),
        };

        let config = CacheConfig::from(&settings);
        assert_eq!(config.freshness(), Duration::from_millis(750));
        assert_eq!(config.idle_retention(), Duration::from_secs(30));
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
    }

    #[test]
    fn duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1_500)), 1_500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn sweep_interval_clamps_to_min() {
        let config = CacheConfig {
            sweep_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_millis(1));
    }
}
