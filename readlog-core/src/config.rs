//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/readlog/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/readlog/` (~/.config/readlog/)
//! - Data: `$XDG_DATA_HOME/readlog/` (~/.local/share/readlog/)
//! - State/Logs: `$XDG_STATE_HOME/readlog/` (~/.local/state/readlog/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Reading goals for the statistics dashboard
    #[serde(default)]
    pub goals: GoalConfig,

    /// Forecaster tuning
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Statistics series configuration
    #[serde(default)]
    pub stats: StatsConfig,

    /// Session controller configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Goal configuration for a stats range.
///
/// Unset targets mean "no goal"; progress for them reports zero.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct GoalConfig {
    /// Pages to read within the range
    pub target_pages: Option<u32>,
    /// Minutes to read within the range
    pub target_minutes: Option<u32>,
    /// Daily bite-size target in pages
    pub daily_pages: Option<u32>,
}

/// Progress forecaster configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ForecastConfig {
    /// How many recent qualifying sessions feed the pace average
    #[serde(default = "default_forecast_window")]
    pub window: usize,

    /// Pages per hour above which the pace is `fast`
    #[serde(default = "default_fast_pages_per_hour")]
    pub fast_pages_per_hour: f64,

    /// Pages per hour below which the pace is `slow`
    #[serde(default = "default_slow_pages_per_hour")]
    pub slow_pages_per_hour: f64,

    /// Daily page target when the book stores none
    #[serde(default = "default_daily_target")]
    pub default_daily_target: u32,

    /// Plans longer than this many days are compressed to fit
    #[serde(default = "default_plan_horizon_days")]
    pub plan_horizon_days: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window: default_forecast_window(),
            fast_pages_per_hour: default_fast_pages_per_hour(),
            slow_pages_per_hour: default_slow_pages_per_hour(),
            default_daily_target: default_daily_target(),
            plan_horizon_days: default_plan_horizon_days(),
        }
    }
}

fn default_forecast_window() -> usize {
    10
}

fn default_fast_pages_per_hour() -> f64 {
    40.0
}

fn default_slow_pages_per_hour() -> f64 {
    20.0
}

fn default_daily_target() -> u32 {
    10
}

fn default_plan_horizon_days() -> u32 {
    30
}

/// Statistics series configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StatsConfig {
    /// Length of the trailing sparkline in days
    #[serde(default = "default_sparkline_days")]
    pub sparkline_days: u32,

    /// Size of each window in the week-over-week trend
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            sparkline_days: default_sparkline_days(),
            trend_window_days: default_trend_window_days(),
        }
    }
}

fn default_sparkline_days() -> u32 {
    14
}

fn default_trend_window_days() -> u32 {
    7
}

/// Session controller configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Upper bound for a single store request in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Live timer refresh interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::Config(
                "session.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::Config(
                "session.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        if self.forecast.window == 0 {
            return Err(Error::Config(
                "forecast.window must be at least 1".to_string(),
            ));
        }
        if self.forecast.slow_pages_per_hour > self.forecast.fast_pages_per_hour {
            return Err(Error::Config(
                "forecast.slow_pages_per_hour must not exceed fast_pages_per_hour".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/readlog/config.toml` (~/.config/readlog/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("readlog").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/readlog/` (~/.local/share/readlog/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("readlog")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/readlog/` (~/.local/state/readlog/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("readlog")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/readlog/readlog.db` (~/.local/share/readlog/readlog.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("readlog.db")
    }
}
