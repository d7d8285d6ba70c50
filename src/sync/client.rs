//! Process-wide entry point tying the cache, fetcher and mutation triggers together.
//!
//! [`SyncClient`] owns the shared [`CacheStore`]. Reads go through subscriptions, which
//! revalidate through [`SyncClient::revalidate`]; writes go through actions and optimistic
//! transforms reconciled by a [`ReconcilePolicy`].

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, CacheKey, CacheStore, CachedValue, duration_ms};
use crate::infra::http::{NetworkError, Transport};

use super::action::ActionTrigger;
use super::fetcher::Fetcher;
use super::optimistic::{OptimisticUpdater, ReconcilePolicy};
use super::subscription::Subscription;

const METRIC_REVALIDATION: &str = "marketsync_revalidation_total";
const METRIC_REVALIDATION_FAILED: &str = "marketsync_revalidation_failed_total";
const METRIC_REVALIDATION_DEDUPED: &str = "marketsync_revalidation_deduped_total";

/// Owner of the cache and entry point for every read, action and optimistic write.
///
/// Cheap to clone; clones share the same [`CacheStore`]. Methods that start network work spawn
/// onto the current Tokio runtime.
#[derive(Clone)]
pub struct SyncClient {
    store: CacheStore,
    fetcher: Fetcher,
    transport: Arc<dyn Transport>,
    config: CacheConfig,
}

impl SyncClient {
    pub fn new(transport: Arc<dyn Transport>, config: CacheConfig) -> Self {
        Self::with_store(CacheStore::new(), transport, config)
    }

    pub fn with_store(
        store: CacheStore,
        transport: Arc<dyn Transport>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            fetcher: Fetcher::new(Arc::clone(&transport)),
            transport,
            config,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.store.get(key)
    }

    /// Open a subscription, fetching unless a fresh value is already cached.
    pub fn subscribe<T>(&self, key: CacheKey) -> Subscription<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Subscription::open(self.clone(), key)
    }

    /// Fetch `key` and write the result into the store.
    ///
    /// At most one revalidation per key runs at a time: while one is in flight this returns
    /// `None` and the caller learns the outcome through its subscription. Aborting the task
    /// releases the slot and records [`NetworkError::Interrupted`].
    pub fn revalidate<T>(&self, key: &CacheKey) -> Option<JoinHandle<()>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        if !key.is_active() {
            return None;
        }
        let Some(claim) = self.store.claim_revalidation(key) else {
            counter!(METRIC_REVALIDATION_DEDUPED).increment(1);
            debug!(key = %key, "Revalidation already in flight");
            return None;
        };
        counter!(METRIC_REVALIDATION).increment(1);

        let fetcher = self.fetcher.clone();
        Some(tokio::spawn(async move {
            let key = claim.key().clone();
            let started = Instant::now();
            let outcome = fetcher.fetch::<T>(&key).await;
            let elapsed_ms = duration_ms(started.elapsed());

            let outcome = match outcome {
                Ok(value) => {
                    info!(key = %key, elapsed_ms, "Revalidation succeeded");
                    Ok(Arc::new(value) as CachedValue)
                }
                Err(err) => {
                    counter!(METRIC_REVALIDATION_FAILED).increment(1);
                    warn!(key = %key, elapsed_ms, error = %err, "Revalidation failed");
                    Err(err)
                }
            };
            claim.settle(outcome);
        }))
    }

    pub fn action(&self, key: CacheKey) -> ActionTrigger {
        ActionTrigger::new(Arc::clone(&self.transport), key)
    }

    pub fn optimistic(&self) -> OptimisticUpdater {
        OptimisticUpdater::new(self.store.clone())
    }

    /// Transform whatever is cached at `key`, from anywhere in the process.
    pub fn mutate<T, F>(&self, key: &CacheKey, transform: F) -> bool
    where
        T: Any + Send + Sync,
        F: FnOnce(&T) -> T,
    {
        self.optimistic().apply_optimistic(key, transform)
    }

    /// Fire `action` and apply `transform` to `key` without waiting for the server.
    ///
    /// The request starts first; the optimistic write lands before this returns, and `policy` is
    /// applied only after that write, however fast the server answers. `revert` is only used by
    /// [`ReconcilePolicy::RollbackOnFailure`]. The handle yields the action's outcome once
    /// `policy` has been applied; dropping it leaves the request running.
    pub fn optimistic_action<T, F, R>(
        &self,
        action: &ActionTrigger,
        payload: Value,
        key: &CacheKey,
        transform: F,
        revert: R,
        policy: ReconcilePolicy,
    ) -> JoinHandle<Result<Value, NetworkError>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
        F: FnOnce(&T) -> T,
        R: FnOnce(&T) -> T + Send + 'static,
    {
        let action = action.clone();
        let client = self.clone();
        let target = key.clone();
        let (applied_tx, applied_rx) = oneshot::channel::<()>();
        let pending = tokio::spawn(async move {
            let outcome = action.trigger(payload).await;
            // Resolves once the optimistic write is in, or if the writer went away.
            let _ = applied_rx.await;
            client.reconcile::<T, R>(&target, &outcome, revert, policy).await;
            outcome
        });

        self.optimistic().apply_optimistic(key, transform);
        let _ = applied_tx.send(());
        pending
    }

    async fn reconcile<T, R>(
        &self,
        key: &CacheKey,
        outcome: &Result<Value, NetworkError>,
        revert: R,
        policy: ReconcilePolicy,
    ) where
        T: DeserializeOwned + Send + Sync + 'static,
        R: FnOnce(&T) -> T,
    {
        match (policy, outcome) {
            (ReconcilePolicy::FireAndForget, Err(err)) => {
                debug!(key = %key, error = %err, "Action failed; optimistic value kept");
            }
            (ReconcilePolicy::FireAndForget, Ok(_)) => {}
            (ReconcilePolicy::RollbackOnFailure, Err(err)) => {
                let reverted = self.store.update(key, revert);
                warn!(
                    key = %key,
                    error = %err,
                    reverted,
                    "Action failed; optimistic value rolled back"
                );
            }
            (ReconcilePolicy::RollbackOnFailure, Ok(_)) => {}
            (ReconcilePolicy::RevalidateOnSettle, _) => {
                let Some(handle) = self.revalidate::<T>(key) else {
                    return;
                };
                if let Err(err) = handle.await {
                    warn!(key = %key, error = %err, "Revalidation task did not complete");
                }
            }
        }
    }

    /// Start the idle-entry sweeper with the configured cadence and retention.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.store
            .spawn_sweeper(self.config.sweep_interval(), self.config.idle_retention())
    }
}
