//! Configuration management for sqlmem-diag.
//!
//! This module handles loading, merging, and validating configuration from a
//! file and CLI arguments. It supports YAML, JSON, and TOML formats, selected
//! by file extension. Precedence: CLI flags > config file > defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::{Args, LogLevel};
use sqlmem_diag::driver::DEFAULT_DEVICE_PATH;

/// Default seconds between captures in watch mode.
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// On-disk configuration structure. All fields optional so a partial file
/// only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path of the inspector control device
    #[serde(alias = "device-path")]
    pub device_path: Option<PathBuf>,

    /// Whether live event tracking is enabled
    #[serde(alias = "enable-event-tracing")]
    pub enable_event_tracing: Option<bool>,

    /// Seconds between captures in watch mode
    #[serde(alias = "interval-seconds")]
    pub interval_seconds: Option<u64>,

    /// Log level name (off/error/warn/info/debug/trace)
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

/// Fully resolved configuration after merging CLI and file values.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub device_path: PathBuf,
    pub enable_event_tracing: bool,
    pub interval_seconds: u64,
    pub log_level: LogLevel,
}

fn parse_log_level(name: &str) -> Result<LogLevel, Box<dyn std::error::Error>> {
    match name.to_ascii_lowercase().as_str() {
        "off" => Ok(LogLevel::Off),
        "error" => Ok(LogLevel::Error),
        "warn" => Ok(LogLevel::Warn),
        "info" => Ok(LogLevel::Info),
        "debug" => Ok(LogLevel::Debug),
        "trace" => Ok(LogLevel::Trace),
        other => Err(format!("unknown log level '{}'", other).into()),
    }
}

/// Loads a config file, dispatching the parser on the file extension.
/// A `None` path yields the empty default config.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    let raw = fs::read_to_string(path)
        .map_err(|e| format!("cannot read config file {}: {}", path.display(), e))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let config: Config = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&raw)?,
        "json" => serde_json::from_str(&raw)?,
        "toml" => toml::from_str(&raw)?,
        other => {
            return Err(format!(
                "unsupported config format '{}' for {} (expected yaml/json/toml)",
                other,
                path.display()
            )
            .into())
        }
    };

    info!("loaded config file {}", path.display());
    Ok(config)
}

/// Merges CLI arguments over the config file over defaults and validates the
/// result.
pub fn resolve_config(args: &Args) -> Result<EffectiveConfig, Box<dyn std::error::Error>> {
    let file = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    let device_path = args
        .device
        .clone()
        .or(file.device_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE_PATH));

    let enable_event_tracing = if args.no_trace {
        false
    } else {
        file.enable_event_tracing.unwrap_or(true)
    };

    let interval_seconds = file.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS);
    if interval_seconds == 0 {
        return Err("interval_seconds must be at least 1".into());
    }

    let log_level = match (&args.log_level, &file.log_level) {
        (Some(level), _) => level.clone(),
        (None, Some(name)) => parse_log_level(name)?,
        (None, None) => LogLevel::Info,
    };

    Ok(EffectiveConfig {
        device_path,
        enable_event_tracing,
        interval_seconds,
        log_level,
    })
}
