//! Configuration loading
//!
//! Settings come from `config.toml` with `SENTINEL__`-prefixed environment
//! overrides. Every section has workable defaults so a bare file runs.

use crate::error::{Result, SentinelError};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub screener: ScreenerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Optional webhook delivery; reports go to the log when absent.
    pub webhook: Option<WebhookConfig>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SENTINEL").separator("__"))
            .build()
            .map_err(|e| SentinelError::ConfigValidation(e.to_string()))?;

        let mut cfg: Config = settings
            .try_deserialize()
            .map_err(|e| SentinelError::ConfigValidation(e.to_string()))?;

        cfg.database.path = shellexpand::tilde(&cfg.database.path).into_owned();
        cfg.catalog.path = shellexpand::tilde(&cfg.catalog.path).into_owned();
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Instrument catalog CSV path.
    #[serde(default = "default_catalog_path")]
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenerConfig {
    /// Screener API base URL.
    #[serde(default = "default_screener_url")]
    pub base_url: String,
    /// Tickers per batch request. The screener caps queries at 100 symbols.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent in-flight batch requests.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_batches: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            base_url: default_screener_url(),
            batch_size: default_batch_size(),
            max_concurrent_batches: default_max_concurrent(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Wall-clock polling interval in seconds. Minute resolution is enough.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Minute offset past the hour at which auto-scans fire.
    #[serde(default = "default_scan_minute")]
    pub scan_minute: u32,
    /// European market window, inclusive hours.
    #[serde(default = "default_europe_start")]
    pub europe_start_hour: u32,
    #[serde(default = "default_europe_end")]
    pub europe_end_hour: u32,
    /// US/Canada market window, inclusive hours.
    #[serde(default = "default_us_start")]
    pub us_start_hour: u32,
    #[serde(default = "default_us_end")]
    pub us_end_hour: u32,
    /// Days of auto-scan state to retain.
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            scan_minute: default_scan_minute(),
            europe_start_hour: default_europe_start(),
            europe_end_hour: default_europe_end(),
            us_start_hour: default_us_start(),
            us_end_hour: default_us_end(),
            cleanup_days: default_cleanup_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL for oversold alerts.
    pub oversold_url: String,
    /// Webhook URL for overbought alerts.
    pub overbought_url: String,
    /// Webhook URL for the operational status line; skipped when unset.
    pub changelog_url: Option<String>,
    /// Maximum characters per delivered message.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

fn default_db_path() -> String {
    "data/sentinel.db".to_string()
}

fn default_catalog_path() -> String {
    "data/tickers.csv".to_string()
}

fn default_screener_url() -> String {
    "https://scanner.tradingview.com".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_max_concurrent() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    60
}

fn default_scan_minute() -> u32 {
    30
}

fn default_europe_start() -> u32 {
    9
}

fn default_europe_end() -> u32 {
    17
}

fn default_us_start() -> u32 {
    15
}

fn default_us_end() -> u32 {
    22
}

fn default_cleanup_days() -> i64 {
    7
}

fn default_max_message_len() -> usize {
    1900
}
