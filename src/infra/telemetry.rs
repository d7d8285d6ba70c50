use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    // Logs go to stderr; stdout carries command output.
    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "marketsync_cache_hit_total",
            Unit::Count,
            "Total number of cache reads that found a value."
        );
        describe_counter!(
            "marketsync_cache_miss_total",
            Unit::Count,
            "Total number of cache reads that found nothing usable."
        );
        describe_counter!(
            "marketsync_cache_evict_total",
            Unit::Count,
            "Total number of idle cache entries evicted by the sweeper."
        );
        describe_counter!(
            "marketsync_revalidation_total",
            Unit::Count,
            "Total number of revalidating reads sent to the network."
        );
        describe_counter!(
            "marketsync_revalidation_failed_total",
            Unit::Count,
            "Total number of revalidating reads that failed."
        );
        describe_counter!(
            "marketsync_revalidation_deduped_total",
            Unit::Count,
            "Total number of revalidation requests absorbed by an in-flight read."
        );
        describe_counter!(
            "marketsync_optimistic_update_total",
            Unit::Count,
            "Total number of optimistic writes applied to a cached value."
        );
        describe_counter!(
            "marketsync_action_failed_total",
            Unit::Count,
            "Total number of state-changing requests that failed."
        );
    });
}
