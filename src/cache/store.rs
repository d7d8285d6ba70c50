//! Process-wide keyed store of server-derived values.
//!
//! Values are held type-erased behind `Arc` and replaced wholesale on every write, so a reader
//! holding an old `Arc` keeps seeing the old snapshot. All writes go through [`CacheStore::set`],
//! [`CacheStore::update`] and [`CacheStore::settle_revalidation`]. Listeners run after the store
//! lock is released, in registration order, before the writing call returns.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infra::http::NetworkError;

use super::config::duration_ms;
use super::keys::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

const METRIC_CACHE_HIT: &str = "marketsync_cache_hit_total";
const METRIC_CACHE_MISS: &str = "marketsync_cache_miss_total";
const METRIC_CACHE_EVICT: &str = "marketsync_cache_evict_total";

/// A cached value. Concrete types are recovered with [`CacheStore::get`].
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Change callback registered through [`CacheStore::subscribe`].
pub type Listener = Arc<dyn Fn(&CacheKey) + Send + Sync>;

type ListenerId = u64;

struct CacheEntry {
    value: Option<CachedValue>,
    last_updated: Option<OffsetDateTime>,
    listeners: Vec<(ListenerId, Listener)>,
    in_flight: bool,
    last_error: Option<Arc<NetworkError>>,
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            value: None,
            last_updated: None,
            listeners: Vec::new(),
            in_flight: false,
            last_error: None,
        }
    }

    fn replace(&mut self, value: CachedValue) {
        self.value = Some(value);
        self.last_updated = Some(OffsetDateTime::now_utc());
        self.last_error = None;
    }

    fn listeners(&self) -> Vec<Listener> {
        self.listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn is_idle_past(&self, now: OffsetDateTime, retention: Duration) -> bool {
        if !self.listeners.is_empty() || self.in_flight {
            return false;
        }
        match self.last_updated {
            None => true,
            Some(at) => {
                let age = now - at;
                !age.is_negative() && age.unsigned_abs() >= retention
            }
        }
    }
}

/// Point-in-time view of an entry's bookkeeping, without the value.
#[derive(Debug, Clone, Default)]
pub struct EntryStatus {
    pub has_value: bool,
    pub in_flight: bool,
    pub subscribers: usize,
    pub last_updated: Option<OffsetDateTime>,
    pub last_error: Option<Arc<NetworkError>>,
}

struct StoreInner {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    next_listener: AtomicU64,
}

/// Shared handle to the cache. Clones address the same entries.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Read the current value for `key`. Never touches the network.
    ///
    /// Returns `None` for an inactive key, an absent value, or a value of another type.
    pub fn get<T: Any + Send + Sync>(&self, key: &CacheKey) -> Option<Arc<T>> {
        if !key.is_active() {
            return None;
        }

        let value = mutex_lock(&self.inner.entries, SOURCE, "get")
            .get(key)
            .and_then(|entry| entry.value.clone());

        let Some(value) = value else {
            counter!(METRIC_CACHE_MISS).increment(1);
            return None;
        };

        match value.downcast::<T>() {
            Ok(typed) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(typed)
            }
            Err(_) => {
                warn!(
                    key = %key,
                    expected = std::any::type_name::<T>(),
                    "Cached value has a different type than requested"
                );
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Replace the value for `key` and notify its subscribers.
    ///
    /// Identical values still notify: the freshness timestamp moves.
    pub fn set<T: Any + Send + Sync>(&self, key: &CacheKey, value: T) {
        self.set_shared(key, Arc::new(value));
    }

    pub fn set_shared(&self, key: &CacheKey, value: CachedValue) {
        if !key.is_active() {
            debug!("Ignoring write to inactive cache key");
            return;
        }

        let listeners = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "set");
            let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::empty);
            entry.replace(value);
            entry.listeners()
        };

        debug!(key = %key, listeners = listeners.len(), "Cache entry replaced");
        notify(key, &listeners);
    }

    /// Replace the value with `transform(current)` as one step.
    ///
    /// Does nothing and returns `false` when no value of type `T` is cached. `transform` runs
    /// while the store is locked and must not call back into the store.
    pub fn update<T, F>(&self, key: &CacheKey, transform: F) -> bool
    where
        T: Any + Send + Sync,
        F: FnOnce(&T) -> T,
    {
        if !key.is_active() {
            return false;
        }

        let listeners = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "update");
            let Some(entry) = entries.get_mut(key) else {
                return false;
            };
            let Some(current) = entry.value.as_ref() else {
                return false;
            };
            let Some(current) = current.downcast_ref::<T>() else {
                warn!(
                    key = %key,
                    expected = std::any::type_name::<T>(),
                    "Skipping update: cached value has a different type"
                );
                return false;
            };

            let next = transform(current);
            entry.replace(Arc::new(next));
            entry.listeners()
        };

        debug!(key = %key, listeners = listeners.len(), "Cache entry updated");
        notify(key, &listeners);
        true
    }

    /// Register `listener` for changes to `key`.
    ///
    /// The returned handle unregisters on drop. Subscribing to an inactive key registers nothing.
    pub fn subscribe(&self, key: &CacheKey, listener: Listener) -> Unsubscribe {
        if !key.is_active() {
            return Unsubscribe::inert();
        }

        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        let subscribers = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "subscribe");
            let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::empty);
            entry.listeners.push((id, listener));
            entry.listeners.len()
        };
        debug!(key = %key, subscribers, "Subscriber registered");

        Unsubscribe {
            store: Arc::downgrade(&self.inner),
            key: key.clone(),
            id: Some(id),
        }
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        mutex_lock(&self.inner.entries, SOURCE, "subscriber_count")
            .get(key)
            .map_or(0, |entry| entry.listeners.len())
    }

    pub fn last_updated(&self, key: &CacheKey) -> Option<OffsetDateTime> {
        mutex_lock(&self.inner.entries, SOURCE, "last_updated")
            .get(key)
            .and_then(|entry| entry.last_updated)
    }

    /// True when a value is cached and was written less than `window` ago.
    pub fn is_fresh(&self, key: &CacheKey, window: Duration) -> bool {
        let entries = mutex_lock(&self.inner.entries, SOURCE, "is_fresh");
        let Some(entry) = entries.get(key) else {
            return false;
        };
        match (&entry.value, entry.last_updated) {
            (Some(_), Some(at)) => {
                let age = OffsetDateTime::now_utc() - at;
                age.is_negative() || age.unsigned_abs() < window
            }
            _ => false,
        }
    }

    pub fn status(&self, key: &CacheKey) -> EntryStatus {
        mutex_lock(&self.inner.entries, SOURCE, "status")
            .get(key)
            .map(|entry| EntryStatus {
                has_value: entry.value.is_some(),
                in_flight: entry.in_flight,
                subscribers: entry.listeners.len(),
                last_updated: entry.last_updated,
                last_error: entry.last_error.clone(),
            })
            .unwrap_or_default()
    }

    /// Claim the in-flight slot for `key`.
    ///
    /// Returns `false` when a revalidation is already running or the key is inactive; the
    /// caller must then not fetch.
    pub fn begin_revalidation(&self, key: &CacheKey) -> bool {
        if !key.is_active() {
            return false;
        }
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "begin_revalidation");
        let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::empty);
        if entry.in_flight {
            return false;
        }
        entry.in_flight = true;
        true
    }

    /// Claim the in-flight slot for `key` and hold it through the returned guard.
    ///
    /// The slot is released by [`InFlight::settle`], or with [`NetworkError::Interrupted`] when
    /// the guard is dropped first: the owning task was aborted, its runtime shut down, or the
    /// fetch panicked.
    pub fn claim_revalidation(&self, key: &CacheKey) -> Option<InFlight> {
        self.begin_revalidation(key).then(|| InFlight {
            store: self.clone(),
            key: key.clone(),
            settled: false,
        })
    }

    /// Release the in-flight slot and record the outcome.
    ///
    /// Success replaces the value like [`CacheStore::set`]. Failure keeps the previous value
    /// and records the error. Subscribers are notified once either way.
    pub fn settle_revalidation(&self, key: &CacheKey, outcome: Result<CachedValue, NetworkError>) {
        if !key.is_active() {
            return;
        }

        let listeners = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "settle_revalidation");
            let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::empty);
            entry.in_flight = false;
            match outcome {
                Ok(value) => entry.replace(value),
                Err(error) => entry.last_error = Some(Arc::new(error)),
            }
            entry.listeners()
        };

        notify(key, &listeners);
    }

    fn abandon_revalidation(&self, key: &CacheKey) {
        let listeners = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "abandon_revalidation");
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            if !entry.in_flight {
                return;
            }
            entry.in_flight = false;
            entry.last_error = Some(Arc::new(NetworkError::Interrupted));
            entry.listeners()
        };

        warn!(key = %key, "Revalidation dropped before settling; slot released");
        notify(key, &listeners);
    }

    /// Evict entries with no subscribers whose value is older than `retention`.
    pub fn prune_idle(&self, retention: Duration) -> usize {
        let now = OffsetDateTime::now_utc();
        let evicted = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "prune_idle");
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_idle_past(now, retention));
            before - entries.len()
        };

        if evicted > 0 {
            counter!(METRIC_CACHE_EVICT).increment(u64::try_from(evicted).unwrap_or(u64::MAX));
            debug!(evicted, "Evicted idle cache entries");
        }
        evicted
    }

    /// Run [`CacheStore::prune_idle`] every `interval` until the handle is aborted.
    pub fn spawn_sweeper(&self, interval: Duration, retention: Duration) -> JoinHandle<()> {
        let store = self.clone();
        info!(
            interval_ms = duration_ms(interval),
            retention_ms = duration_ms(retention),
            "Starting cache sweeper"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip the first immediate tick
            loop {
                ticker.tick().await;
                store.prune_idle(retention);
            }
        })
    }

    /// Number of entries, including ones without a value.
    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

fn notify(key: &CacheKey, listeners: &[Listener]) {
    for listener in listeners {
        listener(key);
    }
}

/// Exclusive claim on a key's revalidation, returned by [`CacheStore::claim_revalidation`].
#[must_use = "dropping the guard releases the slot as interrupted"]
pub struct InFlight {
    store: CacheStore,
    key: CacheKey,
    settled: bool,
}

impl InFlight {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Record the outcome and release the slot.
    pub fn settle(mut self, outcome: Result<CachedValue, NetworkError>) {
        self.settled = true;
        self.store.settle_revalidation(&self.key, outcome);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            self.store.abandon_revalidation(&self.key);
        }
    }
}

/// Registration handle returned by [`CacheStore::subscribe`].
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct Unsubscribe {
    store: Weak<StoreInner>,
    key: CacheKey,
    id: Option<ListenerId>,
}

impl Unsubscribe {
    fn inert() -> Self {
        Self {
            store: Weak::new(),
            key: CacheKey::Inactive,
            id: None,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Unregister now instead of at drop.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let Some(inner) = self.store.upgrade() else {
            return;
        };

        let mut entries = mutex_lock(&inner.entries, SOURCE, "unsubscribe");
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.listeners.retain(|(listener_id, _)| *listener_id != id);
            debug!(
                key = %self.key,
                subscribers = entry.listeners.len(),
                "Subscriber released"
            );
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.release();
    }
}
