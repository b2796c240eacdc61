use serde::Deserialize;

use crate::cache::policy::FRESHNESS_WINDOW_SECONDS_DEFAULT;
use crate::store::STORE_KEY_DEFAULT;

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub logging: Option<LoggingConfig>,
}

/// ================================
/// Cache
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// cached payload is served without contacting upstream for this long
    #[serde(default = "default_freshness_window_seconds")]
    pub freshness_window_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_window_seconds: FRESHNESS_WINDOW_SECONDS_DEFAULT,
        }
    }
}

/// ================================
/// Store
/// ================================
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    Memory,
    File,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(rename = "type")]
    pub store_type: StoreType,
    /// directory for `file` stores
    pub path: Option<String>,
    /// well-known key of the shared session record
    #[serde(default = "default_store_key")]
    pub key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Memory,
            path: None,
            key: default_store_key(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info".to_owned(), LogFormat::Compact)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_freshness_window_seconds() -> u64 {
    FRESHNESS_WINDOW_SECONDS_DEFAULT
}

fn default_store_key() -> String {
    STORE_KEY_DEFAULT.to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
