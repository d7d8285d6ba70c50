use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use marketsync::cache::{CacheConfig, CacheKey, Params, PathTemplate};
use marketsync::infra::http::{NetworkError, Transport};
use marketsync::infra::telemetry;
use marketsync::sync::SyncClient;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::{Value, json};

/// Succeeds for `/ok/...` and fails everything else.
struct SplitTransport;

#[async_trait]
impl Transport for SplitTransport {
    async fn get(&self, path: &str) -> Result<Bytes, NetworkError> {
        if path.starts_with("/ok/") {
            return Ok(Bytes::from_static(br#"{"ok":true}"#));
        }
        Err(NetworkError::Status {
            status: 500,
            body: "down".to_string(),
        })
    }

    async fn post(&self, _path: &str, _payload: &Value) -> Result<Bytes, NetworkError> {
        Err(NetworkError::Status {
            status: 500,
            body: "down".to_string(),
        })
    }
}

fn key(prefix: &str, id: &str) -> CacheKey {
    PathTemplate::parse(&format!("/{prefix}/{{id}}"))
        .expect("template")
        .derive(&Params::new().with("id", id))
}

#[tokio::test]
async fn sync_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let client = SyncClient::new(Arc::new(SplitTransport), CacheConfig::default());
    let good = key("ok", "1");
    let bad = key("broken", "1");

    // Miss, then revalidate (one deduped), then hit.
    assert!(client.get::<Value>(&good).is_none());
    let first = client.revalidate::<Value>(&good).expect("claims slot");
    assert!(client.revalidate::<Value>(&good).is_none());
    first.await.expect("join");
    assert!(client.get::<Value>(&good).is_some());

    // Failed revalidation.
    client
        .revalidate::<Value>(&bad)
        .expect("claims slot")
        .await
        .expect("join");

    // Optimistic update and failed action.
    assert!(client.mutate(&good, |prev: &Value| prev.clone()));
    let action = client.action(key("ok", "fav"));
    assert!(action.trigger(json!({})).await.is_err());

    // Eviction of the idle entry.
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(client.store().prune_idle(Duration::from_millis(1)) >= 1);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "marketsync_cache_hit_total",
        "marketsync_cache_miss_total",
        "marketsync_cache_evict_total",
        "marketsync_revalidation_total",
        "marketsync_revalidation_failed_total",
        "marketsync_revalidation_deduped_total",
        "marketsync_optimistic_update_total",
        "marketsync_action_failed_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
