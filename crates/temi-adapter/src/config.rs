//! Adapter configuration – reads/writes `temi.toml`.
//!
//! The file path defaults to `./temi.toml` and can be redirected with
//! `TEMI_CONFIG`.  Every field has a default, so a file only needs the keys
//! it changes:
//!
//! ```toml
//! serial = "00119260058"
//!
//! [response]
//! poll_interval_ms = 500
//! max_attempts = 5
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correlation::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, WaitPolicy};

/// Longest total wait `validate` accepts for one correlated command.
pub const MAX_WAIT_BUDGET: Duration = Duration::from_secs(3600);

/// Errors raised while loading, validating or saving the config.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// `[response]` section: how long correlated commands wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Complete adapter configuration.  Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    /// Robot serial; the `<serial>` in `temi/<serial>/…`.
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub response: ResponseConfig,
    /// Query battery and position right after connecting.
    #[serde(default = "default_true")]
    pub prime_on_connect: bool,
    /// Head tilt used when a navigation or map command omits one.
    #[serde(default = "default_tilt_angle")]
    pub default_tilt_angle: f64,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            serial: String::new(),
            response: ResponseConfig::default(),
            prime_on_connect: default_true(),
            default_tilt_angle: default_tilt_angle(),
            log: LogConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Default config for the robot with `serial`.
    pub fn for_serial(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            ..Self::default()
        }
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_millis(self.response.poll_interval_ms),
            self.response.max_attempts,
        )
    }

    /// Reject values the adapter cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.is_empty() {
            return Err(ConfigError::Invalid("serial must be set".into()));
        }
        if self.serial.contains(['/', '+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "serial '{}' must not contain '/', '+' or '#'",
                self.serial
            )));
        }
        if self.response.poll_interval_ms == 0 || self.response.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "response wait budget must be positive".into(),
            ));
        }
        let budget = Duration::from_millis(self.response.poll_interval_ms)
            .checked_mul(self.response.max_attempts);
        if budget.is_none_or(|b| b > MAX_WAIT_BUDGET) {
            return Err(ConfigError::Invalid(format!(
                "response wait budget must not exceed {}s",
                MAX_WAIT_BUDGET.as_secs()
            )));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_true() -> bool {
    true
}
fn default_tilt_angle() -> f64 {
    22.0
}

/// Return the config path: `$TEMI_CONFIG`, else `./temi.toml`.
pub fn config_path() -> PathBuf {
    std::env::var_os("TEMI_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("temi.toml"))
}

/// Load the config from [`config_path`].  Returns `None` if the file does not
/// exist.
pub fn load() -> Result<Option<AdapterConfig>, ConfigError> {
    load_from(&config_path())
}

/// Load the config from a specific path, then apply environment overrides.
pub fn load_from(path: &Path) -> Result<Option<AdapterConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: AdapterConfig = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `TEMI_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TEMI_SERIAL` | `serial` |
/// | `TEMI_POLL_INTERVAL_MS` | `response.poll_interval_ms` |
/// | `TEMI_MAX_ATTEMPTS` | `response.max_attempts` |
/// | `TEMI_LOG_FORMAT` | `log.format` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut AdapterConfig) {
    if let Ok(v) = std::env::var("TEMI_SERIAL") {
        cfg.serial = v;
    }
    if let Ok(v) = std::env::var("TEMI_POLL_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.response.poll_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("TEMI_MAX_ATTEMPTS")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.response.max_attempts = n;
    }
    if let Ok(v) = std::env::var("TEMI_LOG_FORMAT")
        && let Some(format) = LogFormat::parse(&v)
    {
        cfg.log.format = format;
    }
}

/// Save the config to a specific path, creating parent directories.
pub fn save_to(cfg: &AdapterConfig, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(write_err)
}
