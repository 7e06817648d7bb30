//! Configuration loading and folder resolution
//!
//! Every setting is resolved in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: the caller gets the
//! compiled defaults and a warning in the log.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name under the platform config/data dirs
pub const APP_DIR: &str = "dubadub";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Default TOML path for a module: `<config dir>/dubadub/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(format!("{}.toml", module_name)))
}

/// Parse a TOML file into `T`
pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load a TOML config with graceful degradation
///
/// - Explicit path that cannot be read or parsed → error (the operator asked for it)
/// - Default path missing → compiled defaults, logged at info
/// - Default path present but invalid → compiled defaults, logged at warn
pub fn load_toml_or_default<T>(explicit: Option<&Path>, module_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if let Some(path) = explicit {
        info!("Loading configuration from {}", path.display());
        return read_toml(path);
    }

    let Some(path) = default_config_path(module_name) else {
        warn!("Could not determine config directory, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        info!(
            "No config file at {}, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    match read_toml(&path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(e) => {
            warn!("{} - using built-in defaults", e);
            Ok(T::default())
        }
    }
}

/// Resolve a folder following CLI → ENV → TOML → default priority
pub fn resolve_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
    default: impl FnOnce() -> PathBuf,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(path) = toml_value {
        return path.to_path_buf();
    }
    default()
}

/// OS-dependent default data folder: `<local data dir>/dubadub/<leaf>`
pub fn default_data_folder(leaf: &str) -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR).join(leaf))
        .unwrap_or_else(|| PathBuf::from("./dubadub_data").join(leaf))
}

/// Resolve a secret following ENV → TOML priority
///
/// Empty or whitespace-only values count as absent. Logs which source won
/// (never the value itself).
pub fn resolve_secret(
    name: &str,
    env_var_name: &str,
    toml_value: Option<&str>,
) -> Option<String> {
    let env_value = std::env::var(env_var_name)
        .ok()
        .filter(|v| is_valid_secret(v));
    let toml_value = toml_value.filter(|v| is_valid_secret(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in both environment and TOML config. Using environment.",
            name
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable", name);
        return Some(value);
    }
    if let Some(value) = toml_value {
        info!("{} loaded from TOML config", name);
        return Some(value.to_string());
    }
    warn!("{} not configured ({} unset)", name, env_var_name);
    None
}

/// Secret values must be non-empty and non-whitespace
pub fn is_valid_secret(value: &str) -> bool {
    !value.trim().is_empty()
}
