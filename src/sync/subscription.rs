//! View-bound handles on a cache key.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{CacheKey, Listener, Unsubscribe};
use crate::infra::http::NetworkError;

use super::client::SyncClient;

/// Where a subscription's key currently stands.
///
/// Derived from the shared cache entry, so every subscriber of one key observes the same state.
#[derive(Debug, Clone)]
pub enum SubscriptionState {
    /// The key is inactive. Nothing is fetched and no data is ever served.
    Idle,
    /// No value yet; a revalidation is running or about to.
    Pending,
    Ready,
    /// A value is served but the latest revalidation failed.
    Stale(Arc<NetworkError>),
    /// No value and the latest revalidation failed.
    Failed(Arc<NetworkError>),
}

impl SubscriptionState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn error(&self) -> Option<&Arc<NetworkError>> {
        match self {
            Self::Stale(err) | Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Stale(_) => "stale",
            Self::Failed(_) => "failed",
        }
    }
}

/// Live interest in one key's value.
///
/// Dropping the subscription unregisters it from the store.
pub struct Subscription<T> {
    client: SyncClient,
    key: CacheKey,
    registration: Unsubscribe,
    notify: Arc<watch::Sender<u64>>,
    rx: watch::Receiver<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Subscription<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn open(client: SyncClient, key: CacheKey) -> Self {
        let (tx, rx) = watch::channel(0_u64);
        let notify = Arc::new(tx);
        let registration = client
            .store()
            .subscribe(&key, change_listener(Arc::clone(&notify)));

        let subscription = Self {
            client,
            key,
            registration,
            notify,
            rx,
            _marker: PhantomData,
        };
        subscription.revalidate_if_stale();
        subscription
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Current cached value. Never touches the network.
    pub fn data(&self) -> Option<Arc<T>> {
        self.client.store().get::<T>(&self.key)
    }

    pub fn state(&self) -> SubscriptionState {
        if !self.key.is_active() {
            return SubscriptionState::Idle;
        }

        let status = self.client.store().status(&self.key);
        match (status.has_value, status.last_error) {
            (true, None) => SubscriptionState::Ready,
            (true, Some(err)) => SubscriptionState::Stale(err),
            (false, Some(err)) if !status.in_flight => SubscriptionState::Failed(err),
            (false, _) => SubscriptionState::Pending,
        }
    }

    /// Wait for the next change notification.
    ///
    /// Notifications that arrived since the previous call are not lost; several of them are
    /// reported as one.
    pub async fn changed(&mut self) {
        // The sender lives as long as `self`, so this cannot fail.
        let _ = self.rx.changed().await;
    }

    /// Wait until the state is anything but [`SubscriptionState::Pending`].
    pub async fn settle(&mut self) -> SubscriptionState {
        loop {
            self.rx.borrow_and_update();
            let state = self.state();
            if state.is_settled() {
                return state;
            }
            if self.rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Move to another key, releasing interest in the old one.
    ///
    /// A fetch still running for the old key completes into the old entry.
    pub fn set_key(&mut self, key: CacheKey) {
        if key == self.key {
            return;
        }

        debug!(from = %self.key, to = %key, "Subscription key changed");
        self.registration = self
            .client
            .store()
            .subscribe(&key, change_listener(Arc::clone(&self.notify)));
        self.key = key;
        bump(&self.notify);
        self.revalidate_if_stale();
    }

    /// Ask for a revalidation now, whatever the freshness.
    ///
    /// Returns `None` when the key is inactive or a revalidation is already running.
    pub fn revalidate(&self) -> Option<JoinHandle<()>> {
        self.client.revalidate::<T>(&self.key)
    }

    fn revalidate_if_stale(&self) {
        if !self.key.is_active() {
            return;
        }
        let window = self.client.config().freshness();
        if self.client.store().is_fresh(&self.key, window) {
            debug!(key = %self.key, "Serving fresh cached value");
            return;
        }
        // The handle is dropped: the result reaches us through the listener.
        let _ = self.client.revalidate::<T>(&self.key);
    }
}

fn change_listener(notify: Arc<watch::Sender<u64>>) -> Listener {
    Arc::new(move |_: &CacheKey| bump(&notify))
}

fn bump(notify: &watch::Sender<u64>) {
    notify.send_modify(|version| *version = version.wrapping_add(1));
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use serde::Deserialize;
    use tokio::sync::Notify;

    use super::*;
    use crate::cache::{CacheConfig, Params, PathTemplate};
    use crate::infra::http::Transport;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Item {
        name: String,
    }

    /// Serves `{"name": <path>}` once `gate` is opened; fails paths containing `broken`.
    struct Gated {
        gets: AtomicUsize,
        gate: Notify,
    }

    impl Gated {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gets: AtomicUsize::new(0),
                gate: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl Transport for Gated {
        async fn get(&self, path: &str) -> Result<Bytes, NetworkError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            if path.contains("broken") {
                return Err(NetworkError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                });
            }
            Ok(Bytes::from(format!(r#"{{"name":"{path}"}}"#)))
        }

        async fn post(
            &self,
            _path: &str,
            _payload: &serde_json::Value,
        ) -> Result<Bytes, NetworkError> {
            Ok(Bytes::new())
        }
    }

    fn key(id: &str) -> CacheKey {
        PathTemplate::parse("/items/{id}")
            .expect("template")
            .derive(&Params::new().with("id", id))
    }

    async fn release(transport: &Gated, mut sub: Subscription<Item>) -> Subscription<Item> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                transport.gate.notify_waiters();
                if sub.state().is_settled() {
                    break;
                }
                tokio::task::yield_now().await;
            }
            sub.settle().await
        })
        .await
        .expect("subscription settles");
        sub
    }

    #[tokio::test]
    async fn starts_pending_then_becomes_ready() {
        let transport = Gated::new();
        let client = SyncClient::new(transport.clone(), CacheConfig::default());

        let sub = client.subscribe::<Item>(key("1"));
        assert!(matches!(sub.state(), SubscriptionState::Pending));
        assert!(sub.data().is_none());

        let sub = release(&transport, sub).await;
        assert!(matches!(sub.state(), SubscriptionState::Ready));
        assert_eq!(sub.data().expect("data").name, "/items/1");
        assert_eq!(transport.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_without_value_is_failed() {
        let transport = Gated::new();
        let client = SyncClient::new(transport.clone(), CacheConfig::default());

        let sub = release(&transport, client.subscribe::<Item>(key("broken"))).await;

        let state = sub.state();
        assert!(matches!(state, SubscriptionState::Failed(_)));
        assert_eq!(state.error().and_then(|e| e.status()), Some(502));
    }

    #[tokio::test]
    async fn inactive_key_is_idle_and_never_fetches() {
        let transport = Gated::new();
        let client = SyncClient::new(transport.clone(), CacheConfig::default());

        let mut sub = client.subscribe::<Item>(CacheKey::Inactive);

        assert!(matches!(sub.settle().await, SubscriptionState::Idle));
        assert!(sub.data().is_none());
        assert!(sub.revalidate().is_none());
        assert_eq!(transport.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_value_is_served_without_fetching() {
        let transport = Gated::new();
        let client = SyncClient::new(transport.clone(), CacheConfig::default());
        client.store().set(
            &key("1"),
            Item {
                name: "seeded".to_string(),
            },
        );

        let sub = client.subscribe::<Item>(key("1"));

        assert!(matches!(sub.state(), SubscriptionState::Ready));
        assert_eq!(sub.data().expect("data").name, "seeded");
        assert_eq!(transport.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn set_key_moves_interest() {
        let transport = Gated::new();
        let client = SyncClient::new(transport.clone(), CacheConfig::default());
        let mut sub = release(&transport, client.subscribe::<Item>(key("1"))).await;
        assert_eq!(client.store().subscriber_count(&key("1")), 1);

        sub.set_key(key("2"));
        assert_eq!(client.store().subscriber_count(&key("1")), 0);
        assert_eq!(client.store().subscriber_count(&key("2")), 1);

        let sub = release(&transport, sub).await;
        assert_eq!(sub.data().expect("data").name, "/items/2");

        drop(sub);
        assert_eq!(client.store().subscriber_count(&key("2")), 0);
    }

    #[tokio::test]
    async fn changed_wakes_on_write() {
        let client = SyncClient::new(Gated::new(), CacheConfig::default());
        client.store().set(
            &key("1"),
            Item {
                name: "a".to_string(),
            },
        );
        let mut sub = client.subscribe::<Item>(key("1"));

        client.store().set(
            &key("1"),
            Item {
                name: "b".to_string(),
            },
        );

        tokio::time::timeout(Duration::from_secs(1), sub.changed())
            .await
            .expect("notification delivered");
        assert_eq!(sub.data().expect("data").name, "b");
    }
}
