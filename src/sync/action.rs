//! State-changing requests.
//!
//! An [`ActionTrigger`] is bound to one endpoint key and performs exactly one POST per call.
//! It never reads or writes the cache; callers pair it with an optimistic write.

use std::sync::{Arc, Mutex};

use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheKey, mutex_lock};
use crate::infra::http::{NetworkError, Transport};

const SOURCE: &str = "sync::action";

const METRIC_ACTION_FAILED: &str = "marketsync_action_failed_total";

/// Outcome of the most recent call, for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationState {
    pub loading: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ActionTrigger {
    transport: Arc<dyn Transport>,
    key: CacheKey,
    state: Arc<Mutex<MutationState>>,
}

impl ActionTrigger {
    pub fn new(transport: Arc<dyn Transport>, key: CacheKey) -> Self {
        Self {
            transport,
            key,
            state: Arc::new(Mutex::new(MutationState::default())),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn state(&self) -> MutationState {
        mutex_lock(&self.state, SOURCE, "state").clone()
    }

    /// POST `payload` to the bound endpoint.
    ///
    /// An empty success body decodes to `Value::Null`. Concurrent calls are neither merged nor
    /// queued.
    pub async fn trigger(&self, payload: Value) -> Result<Value, NetworkError> {
        let Some(path) = self.key.path() else {
            debug!("Action skipped: endpoint key is inactive");
            self.record(|state| {
                state.loading = false;
                state.error = Some(NetworkError::InactiveKey.to_string());
            });
            return Err(NetworkError::InactiveKey);
        };

        self.record(|state| state.loading = true);

        let result = match self.transport.post(path, &payload).await {
            Ok(body) if body.is_empty() => Ok(Value::Null),
            Ok(body) => serde_json::from_slice(&body).map_err(NetworkError::from),
            Err(err) => Err(err),
        };

        match &result {
            Ok(data) => {
                debug!(key = %self.key, "Action completed");
                let data = data.clone();
                self.record(move |state| {
                    state.loading = false;
                    state.data = Some(data);
                    state.error = None;
                });
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "Action failed");
                counter!(METRIC_ACTION_FAILED).increment(1);
                let message = err.to_string();
                self.record(move |state| {
                    state.loading = false;
                    state.error = Some(message);
                });
            }
        }

        result
    }

    fn record(&self, apply: impl FnOnce(&mut MutationState)) {
        apply(&mut mutex_lock(&self.state, SOURCE, "record"));
    }
}
