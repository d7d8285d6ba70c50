//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::{DEFAULT_FRESHNESS_MS, DEFAULT_IDLE_RETENTION_MS, DEFAULT_SWEEP_INTERVAL_MS};
use crate::domain::product::{
    DEFAULT_DETAIL_ROUTE, DEFAULT_FAVORITE_ROUTE, DEFAULT_POSTSCRIPTS_ROUTE,
    DEFAULT_RESERVATION_ROUTE, ProductRoutes,
};
use crate::sync::ReconcilePolicy;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "marketsync";
const ENV_PREFIX: &str = "MARKETSYNC";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Command-line arguments for the marketsync binary.
#[derive(Debug, Parser)]
#[command(
    name = "marketsync",
    version,
    about = "Marketplace product page client"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MARKETSYNC_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the API base URL.
    #[arg(long = "base-url", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Override the request timeout.
    #[arg(long = "timeout-seconds", value_name = "SECONDS", global = true)]
    pub timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the freshness window in milliseconds.
    #[arg(long = "cache-freshness-ms", value_name = "MS", global = true)]
    pub cache_freshness_ms: Option<u64>,

    /// Override how toggles reconcile with the server
    /// (fire_and_forget|rollback_on_failure|revalidate_on_settle).
    #[arg(long = "reconcile", value_name = "POLICY", global = true)]
    pub reconcile: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Product page operations.
    #[command(name = "product")]
    Product(ProductArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ProductArgs {
    #[command(subcommand)]
    pub command: ProductCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ProductCommand {
    /// Load the product detail and its postscripts.
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Toggle the favorite flag.
    Like {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Toggle the reservation flag.
    Reserve {
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Print the product detail every time it changes, until interrupted.
    Watch {
        #[arg(value_name = "ID")]
        id: String,
        /// Revalidate on this cadence; without it only the initial load is printed.
        #[arg(long = "refresh-seconds", value_name = "SECONDS")]
        refresh_seconds: Option<u64>,
    },
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub routes: ProductRoutes,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub freshness: Duration,
    pub idle_retention: Duration,
    pub sweep_interval: Duration,
    pub reconcile: ReconcilePolicy,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api: RawApiSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    routes: RawRouteSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    freshness_ms: Option<u64>,
    idle_retention_ms: Option<u64>,
    sweep_interval_ms: Option<u64>,
    reconcile: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRouteSettings {
    detail: Option<String>,
    postscripts: Option<String>,
    favorite: Option<String>,
    reservation: Option<String>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(url) = overrides.base_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.api.timeout_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(ms) = overrides.cache_freshness_ms {
            self.cache.freshness_ms = Some(ms);
        }
        if let Some(policy) = overrides.reconcile.as_ref() {
            self.cache.reconcile = Some(policy.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            logging,
            cache,
            routes,
        } = raw;

        let api = build_api_settings(api)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let routes = build_route_settings(routes)?;

        Ok(Self {
            api,
            logging,
            cache,
            routes,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let raw_url = api
        .base_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("api.base_url", "must be set"))?;

    let base_url = Url::parse(&raw_url)
        .map_err(|err| LoadError::invalid("api.base_url", format!("failed to parse: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api.base_url",
            format!("unsupported scheme `{}`", base_url.scheme()),
        ));
    }

    let timeout_secs = api.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "api.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ApiSettings {
        base_url,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let freshness = cache.freshness_ms.unwrap_or(DEFAULT_FRESHNESS_MS);
    let idle_retention = cache.idle_retention_ms.unwrap_or(DEFAULT_IDLE_RETENTION_MS);

    let sweep_interval = cache.sweep_interval_ms.unwrap_or(DEFAULT_SWEEP_INTERVAL_MS);
    if sweep_interval == 0 {
        return Err(LoadError::invalid(
            "cache.sweep_interval_ms",
            "must be greater than zero",
        ));
    }

    let reconcile = match cache.reconcile {
        Some(value) => ReconcilePolicy::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.reconcile", reason))?,
        None => ReconcilePolicy::default(),
    };

    Ok(CacheSettings {
        freshness: Duration::from_millis(freshness),
        idle_retention: Duration::from_millis(idle_retention),
        sweep_interval: Duration::from_millis(sweep_interval),
        reconcile,
    })
}

fn build_route_settings(routes: RawRouteSettings) -> Result<ProductRoutes, LoadError> {
    let detail = routes.detail.as_deref().unwrap_or(DEFAULT_DETAIL_ROUTE);
    let postscripts = routes
        .postscripts
        .as_deref()
        .unwrap_or(DEFAULT_POSTSCRIPTS_ROUTE);
    let favorite = routes.favorite.as_deref().unwrap_or(DEFAULT_FAVORITE_ROUTE);
    let reservation = routes
        .reservation
        .as_deref()
        .unwrap_or(DEFAULT_RESERVATION_ROUTE);

    ProductRoutes::parse(detail, postscripts, favorite, reservation)
        .map_err(|err| LoadError::invalid("routes", err.to_string()))
}
