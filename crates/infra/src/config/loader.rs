//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file from the working directory if present
//! 2. Loads from environment variables when `NOVEM_API_BASE_URL` is set
//! 3. Otherwise falls back to a config file found by [`probe_config_paths`]
//! 4. With neither, uses the built-in defaults
//!
//! ## Environment Variables
//! - `NOVEM_API_BASE_URL`: Backend base URL (selects environment loading)
//! - `NOVEM_API_TIMEOUT_SECS`: Request timeout in seconds
//! - `NOVEM_REFRESH_THRESHOLD_SECS`: Proactive refresh window before expiry
//! - `NOVEM_PROACTIVE_INTERVAL_SECS`: Background refresh check interval
//! - `NOVEM_GRACE_PERIOD_DAYS`: Offline grace window in days
//! - `NOVEM_HEALTH_POLL_SECS`: Health poll interval while unreachable
//! - `NOVEM_SESSION_STORE`: `memory`, `file` or `keychain`
//! - `NOVEM_SESSION_PATH`: Session file location for the file store
//! - `NOVEM_KEYCHAIN_SERVICE`: Service name for the keychain store
//! - `NOVEM_LOG_LEVEL`: Default tracing level (`RUST_LOG` still wins)
//! - `NOVEM_LOG_JSON`: Emit JSON log lines (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./novem.json` or `./novem.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use novem_domain::{
    ApiConfig, AuthConfig, Config, LoggingConfig, NovemError, OfflineConfig, Result,
    SessionStoreKind, StorageConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If
/// `NOVEM_API_BASE_URL` is missing, falls back to a config file, then to
/// defaults.
///
/// # Errors
/// Returns `NovemError::Config` if an environment value or the config file
/// is invalid.
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) if std::env::var(BASE_URL_VAR).is_ok() => Err(e),
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            match load_from_file(None) {
                Err(NovemError::NotFound(_)) => {
                    tracing::info!("No configuration found, using defaults");
                    Ok(Config::default())
                }
                other => other,
            }
        }
    }
}

const BASE_URL_VAR: &str = "NOVEM_API_BASE_URL";

/// Load configuration from environment variables
///
/// `NOVEM_API_BASE_URL` is required; every other variable falls back to its
/// default when unset.
///
/// # Errors
/// Returns `NovemError::Config` if the base URL is missing or any variable
/// has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let base_url = env_var(BASE_URL_VAR)?;
    let defaults = Config::default();

    let api = ApiConfig {
        base_url,
        timeout_secs: env_parse("NOVEM_API_TIMEOUT_SECS", defaults.api.timeout_secs)?,
    };
    let auth = AuthConfig {
        refresh_threshold_secs: env_parse(
            "NOVEM_REFRESH_THRESHOLD_SECS",
            defaults.auth.refresh_threshold_secs,
        )?,
        proactive_interval_secs: env_parse(
            "NOVEM_PROACTIVE_INTERVAL_SECS",
            defaults.auth.proactive_interval_secs,
        )?,
    };
    let offline = OfflineConfig {
        grace_period_days: env_parse("NOVEM_GRACE_PERIOD_DAYS", defaults.offline.grace_period_days)?,
        health_poll_secs: env_parse("NOVEM_HEALTH_POLL_SECS", defaults.offline.health_poll_secs)?,
    };
    let storage = StorageConfig {
        session_store: match std::env::var("NOVEM_SESSION_STORE") {
            Ok(value) => SessionStoreKind::from_str(&value).map_err(NovemError::Config)?,
            Err(_) => defaults.storage.session_store,
        },
        session_path: std::env::var("NOVEM_SESSION_PATH").ok().map(PathBuf::from),
        keychain_service: std::env::var("NOVEM_KEYCHAIN_SERVICE")
            .unwrap_or(defaults.storage.keychain_service),
    };
    let logging = LoggingConfig {
        level: std::env::var("NOVEM_LOG_LEVEL").unwrap_or(defaults.logging.level),
        json: env_bool("NOVEM_LOG_JSON", defaults.logging.json),
    };

    Ok(Config { api, auth, offline, storage, logging })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `NovemError::Config` if the file is given but missing, or its
/// format is invalid. Returns `NovemError::NotFound` when probing finds no
/// file.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(NovemError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            NovemError::NotFound("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| NovemError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| NovemError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| NovemError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(NovemError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> Vec<PathBuf> {
    vec![
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("novem.json"),
        dir.join("novem.toml"),
        dir.join("../config.json"),
        dir.join("../config.toml"),
        dir.join("../../config.json"),
        dir.join("../../config.toml"),
    ]
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| NovemError::Config(format!("Missing required environment variable: {}", key)))
}

/// Parse an optional environment variable, using `default` when unset
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| NovemError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
