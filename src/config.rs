use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::{km_to_meters, BreakerConfig, QueryLimits};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    #[serde(default)]
    pub signal_log: SignalLogSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub redis_url: String,
    pub ttl_secs: Option<u64>,
    pub l1_cache_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalLogSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_radius_km")]
    pub default_radius_km: f64,
    #[serde(default = "default_max_radius_km")]
    pub max_radius_km: f64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_secondary_candidates")]
    pub secondary_candidates: usize,
    #[serde(default = "default_primary_timeout_ms")]
    pub primary_timeout_ms: u64,
    #[serde(default = "default_secondary_timeout_ms")]
    pub secondary_timeout_ms: u64,
    #[serde(default = "default_tertiary_timeout_ms")]
    pub tertiary_timeout_ms: u64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            default_radius_km: default_radius_km(),
            max_radius_km: default_max_radius_km(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            secondary_candidates: default_secondary_candidates(),
            primary_timeout_ms: default_primary_timeout_ms(),
            secondary_timeout_ms: default_secondary_timeout_ms(),
            tertiary_timeout_ms: default_tertiary_timeout_ms(),
        }
    }
}

impl MatchingSettings {
    pub fn query_limits(&self) -> QueryLimits {
        QueryLimits {
            max_radius_meters: km_to_meters(self.max_radius_km),
            max_limit: self.max_limit,
            ..QueryLimits::default()
        }
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    pub fn secondary_timeout(&self) -> Duration {
        Duration::from_millis(self.secondary_timeout_ms)
    }

    pub fn tertiary_timeout(&self) -> Duration {
        Duration::from_millis(self.tertiary_timeout_ms)
    }
}

fn default_true() -> bool { true }
fn default_radius_km() -> f64 { 50.0 }
fn default_max_radius_km() -> f64 { 500.0 }
fn default_limit() -> usize { 10 }
fn default_max_limit() -> usize { 100 }
fn default_secondary_candidates() -> usize { 10 }
fn default_primary_timeout_ms() -> u64 { 800 }
fn default_secondary_timeout_ms() -> u64 { 300 }
fn default_tertiary_timeout_ms() -> u64 { 1500 }

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

impl BreakerSettings {
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::default()
            .with_failure_threshold(self.failure_threshold)
            .with_reset_timeout(Duration::from_millis(self.reset_timeout_ms))
    }
}

fn default_failure_threshold() -> u32 { 5 }
fn default_reset_timeout_ms() -> u64 { 30_000 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the structs
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with SIGNAL_MATCH)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., SIGNAL_MATCH__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("SIGNAL_MATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        substitute_env_vars(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("SIGNAL_MATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        substitute_env_vars(settings)?.try_deserialize()
    }
}

/// Apply the conventional connection-string variables on top of the layered config
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database.url", database_url)?;
    }
    if let Ok(redis_url) = env::var("REDIS_URL") {
        builder = builder.set_override("cache.redis_url", redis_url)?;
    }
    if let Ok(endpoint) = env::var("SIGNAL_LOG_URL") {
        builder = builder.set_override("signal_log.endpoint", endpoint)?;
    }

    builder.build()
}
