//! Configuration Module
//!
//! Static configuration of the collector, loaded from YAML with environment
//! variable overrides, plus helpers for reading the per-pool runtime settings
//! that operators can retune without a restart.

use crate::collaborators::PoolInventory;
use crate::freed_bytes_histogram::{MAX_BIN_WIDTH_SECS, MAX_NB_BINS};
use crate::{Result, TapeGcError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-pool key holding the minimum number of free bytes to maintain
pub const MIN_FREE_BYTES_KEY: &str = "tgc.minfreebytes";

/// Per-pool key holding the free-space query period in seconds
pub const QUERY_PERIOD_SECS_KEY: &str = "tgc.qryperiodsecs";

/// Per-pool key holding the capacity a pool must reach before collection starts
pub const TOTAL_BYTES_KEY: &str = "tgc.totalbytes";

/// Per-pool key holding the path of a script that reports free bytes
pub const FREE_BYTES_SCRIPT_KEY: &str = "tgc.freebytesscript";

/// Custom deserializer for Duration from string format like "30s", "5m", "1h"
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Empty duration string".to_string());
        }

        let num_end = s
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
            .map(|(i, _)| i)
            .unwrap_or(s.len());

        if num_end == 0 {
            return Err(format!("No number found in duration string: {}", s));
        }

        let num_str = &s[..num_end];
        let unit = s[num_end..].trim();

        let value: f64 = num_str
            .parse()
            .map_err(|e| format!("Failed to parse number '{}': {}", num_str, e))?;

        let duration = match unit {
            "s" | "sec" | "secs" | "second" | "seconds" => Duration::from_secs_f64(value),
            "m" | "min" | "mins" | "minute" | "minutes" => Duration::from_secs_f64(value * 60.0),
            "h" | "hr" | "hrs" | "hour" | "hours" => Duration::from_secs_f64(value * 3600.0),
            "ms" | "millis" | "millisecond" | "milliseconds" => {
                Duration::from_secs_f64(value / 1000.0)
            }
            "" => Duration::from_secs_f64(value), // Default to seconds if no unit
            _ => return Err(format!("Unknown duration unit: {}", unit)),
        };

        Ok(duration)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tape_gc: TapeGcConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Garbage collector tuning that is fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeGcConfig {
    /// Time the worker waits between two garbage collection attempts
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
    /// Maximum age of a cached per-pool configuration value
    #[serde(default = "default_config_cache_max_age", with = "duration_serde")]
    pub config_cache_max_age: Duration,
    /// Free-space query period used when the pool does not configure one
    #[serde(default = "default_query_period", with = "duration_serde")]
    pub default_query_period: Duration,
    /// Minimum free bytes used when the pool does not configure one.
    /// Zero disables garbage collection.
    #[serde(default)]
    pub default_min_free_bytes: u64,
    /// Capacity a pool must have before it is collected, used when the pool
    /// does not configure one. Zero collects pools of any size.
    #[serde(default)]
    pub default_total_bytes: u64,
    /// How long a free bytes script may run before it is killed
    #[serde(default = "default_free_bytes_script_timeout", with = "duration_serde")]
    pub free_bytes_script_timeout: Duration,
    /// Capacity of the access queue
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_histogram_nb_bins")]
    pub freed_bytes_histogram_nb_bins: usize,
    #[serde(default = "default_histogram_bin_width", with = "duration_serde")]
    pub freed_bytes_histogram_bin_width: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_config_cache_max_age() -> Duration {
    Duration::from_secs(10)
}

fn default_query_period() -> Duration {
    Duration::from_secs(320)
}

fn default_free_bytes_script_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_queue_size() -> usize {
    10_000_000
}

fn default_histogram_nb_bins() -> usize {
    600
}

fn default_histogram_bin_width() -> Duration {
    Duration::from_secs(1)
}

impl Default for TapeGcConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            config_cache_max_age: default_config_cache_max_age(),
            default_query_period: default_query_period(),
            default_min_free_bytes: 0,
            default_total_bytes: 0,
            free_bytes_script_timeout: default_free_bytes_script_timeout(),
            max_queue_size: default_max_queue_size(),
            freed_bytes_histogram_nb_bins: default_histogram_nb_bins(),
            freed_bytes_histogram_bin_width: default_histogram_bin_width(),
        }
    }
}

impl TapeGcConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be greater than zero".to_string());
        }

        if self.poll_interval.is_zero() || self.poll_interval > Duration::from_secs(3600) {
            return Err(format!(
                "poll_interval must be between 1ms and 1h, got {:?}",
                self.poll_interval
            ));
        }

        if self.freed_bytes_histogram_nb_bins == 0
            || self.freed_bytes_histogram_nb_bins > MAX_NB_BINS
        {
            return Err(format!(
                "freed_bytes_histogram_nb_bins must be between 1 and {}, got {}",
                MAX_NB_BINS, self.freed_bytes_histogram_nb_bins
            ));
        }

        let bin_width_secs = self.freed_bytes_histogram_bin_width.as_secs();
        if bin_width_secs == 0 || bin_width_secs > u64::from(MAX_BIN_WIDTH_SECS) {
            return Err(format!(
                "freed_bytes_histogram_bin_width must be between 1s and {}s, got {:?}",
                MAX_BIN_WIDTH_SECS, self.freed_bytes_histogram_bin_width
            ));
        }

        if self.free_bytes_script_timeout.is_zero() {
            return Err("free_bytes_script_timeout must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily rolling log files, console only if unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, apply environment overrides and validate
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TapeGcError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_yaml_str(&content).map_err(|e| {
            TapeGcError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.apply_env_overrides();

        config
            .tape_gc
            .validate()
            .map_err(|e| TapeGcError::ConfigError(format!("Invalid tape_gc configuration: {}", e)))?;

        info!("Configuration loaded from file: {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(size) = std::env::var("TGC_MAX_QUEUE_SIZE") {
            match size.parse() {
                Ok(size) => self.tape_gc.max_queue_size = size,
                Err(e) => warn!("Ignoring invalid TGC_MAX_QUEUE_SIZE '{}': {}", size, e),
            }
        }

        if let Ok(interval) = std::env::var("TGC_POLL_INTERVAL") {
            match duration_serde::parse_duration(&interval) {
                Ok(interval) => self.tape_gc.poll_interval = interval,
                Err(e) => warn!("Ignoring invalid TGC_POLL_INTERVAL '{}': {}", interval, e),
            }
        }

        if let Ok(level) = std::env::var("TGC_LOG_LEVEL") {
            self.logging.log_level = level;
        }
    }
}

/// Read a string from the per-pool configuration.
///
/// Surrounding whitespace is trimmed. A missing or empty value or a failed
/// lookup returns `None`.
pub fn pool_config_string(
    inventory: &dyn PoolInventory,
    pool: &str,
    key: &str,
) -> Option<String> {
    match inventory.pool_config_value(pool, key) {
        Ok(Some(raw)) => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Ok(None) => None,
        Err(e) => {
            debug!(pool, key, "Failed to look up pool configuration: {}", e);
            None
        }
    }
}

/// Read an unsigned integer from the per-pool configuration.
///
/// A missing or empty value, an unparsable value, or a failed lookup all
/// return `default`. Parse failures are logged since they point at an
/// operator typo.
pub fn pool_config_u64(
    inventory: &dyn PoolInventory,
    pool: &str,
    key: &str,
    default: u64,
) -> u64 {
    let raw = match inventory.pool_config_value(pool, key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return default,
        Err(e) => {
            debug!(pool, key, "Failed to look up pool configuration: {}", e);
            return default;
        }
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return default;
    }

    match trimmed.parse::<u64>() {
        Ok(value) => value,
        Err(e) => {
            warn!(
                pool,
                key,
                "Invalid value '{}' in pool configuration, using default {}: {}",
                raw,
                default,
                e
            );
            default
        }
    }
}
