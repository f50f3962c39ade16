//! # PMOWall Configuration Module
//!
//! This module provides configuration management for the PMOWall remote control, including:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters for client timings and the wall layout section
//!
//! The configuration is loaded once and never mutated afterwards.
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config();
//! let base_url = config.get_api_base_url();
//! let interval = config.get_poll_interval();
//! let wall = config.get_wall_section()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{env, fs, path::Path, sync::Arc, time::Duration};
use tracing::{info, warn};

mod wall;

pub use wall::{TvSection, WallSection};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmowall.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> = Arc::new(Config::load_config("").unwrap_or_else(|err| {
        warn!(error = %err, "Failed to load PMOWall configuration, using embedded defaults");
        Config::embedded()
    }));
}

const ENV_CONFIG_DIR: &str = "PMOWALL_CONFIG";
const ENV_PREFIX: &str = "PMOWALL_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmowall";
const CONFIG_FILE_NAME: &str = "config.yaml";

// Default values for configuration
const DEFAULT_API_BASE_URL: &str = "http://piwall.tv/api";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_VOLUME_LOCK_MARGIN_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_COLOR_MODE: &str = "color";
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";

/// Macro to generate a `Duration` getter over an integer value with default
macro_rules! impl_duration_config {
    ($getter:ident, $path:expr, $default:expr, $unit:expr) => {
        pub fn $getter(&self) -> Duration {
            let raw = match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_u64() => n.as_u64(),
                Ok(Value::String(s)) => s.trim().parse::<u64>().ok(),
                _ => None,
            };
            match raw {
                Some(value) => $unit(value),
                None => {
                    warn!(
                        path = %$path.join("."),
                        default = $default,
                        "Missing or invalid duration, using default"
                    );
                    $unit($default)
                }
            }
        }
    };
}

/// Macro to generate a `String` getter with default
macro_rules! impl_string_config {
    ($getter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => s,
                _ => $default.to_string(),
            }
        }
    };
}

/// Read-only configuration for PMOWall
///
/// Holds the merged YAML tree (embedded defaults, then `config.yaml`, then
/// environment overrides) together with the directory it was loaded from.
///
/// # Examples
///
/// ```no_run
/// use pmoconfig::Config;
///
/// let config = Config::load_config("/etc/pmowall")?;
/// println!("polling every {:?}", config.get_poll_interval());
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    config_dir: String,
    data: Value,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        CONFIG_DIR_NAME.to_string()
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external `config.yaml` file if present
    /// 4. Applies `PMOWALL_CONFIG__*` environment variable overrides
    ///
    /// A missing directory or file is not an error: the embedded defaults are used.
    ///
    /// # Arguments
    ///
    /// * `directory` - The directory containing the config.yaml file, or empty to search for one
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir).join(CONFIG_FILE_NAME);
        let external = match fs::read_to_string(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                Some(data)
            }
            Err(_) => {
                info!(
                    config_file = %path.display(),
                    "Config file not found, using default embedded config"
                );
                None
            }
        };

        let mut config = Self::from_layers(config_dir, external.as_deref())?;
        apply_env_overrides(&mut config.data, env::vars());
        Ok(config)
    }

    /// Builds a configuration from a YAML document merged over the embedded
    /// defaults, without looking at the filesystem or the environment.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::from_layers(String::new(), Some(yaml))
    }

    /// The embedded default configuration alone.
    pub fn embedded() -> Self {
        let data = serde_yaml::from_str::<Value>(DEFAULT_CONFIG)
            .map(lower_keys)
            .unwrap_or_else(|_| Value::Mapping(Mapping::new()));
        Self {
            config_dir: String::new(),
            data,
        }
    }

    fn from_layers(config_dir: String, external: Option<&str>) -> Result<Self> {
        let mut data = lower_keys(serde_yaml::from_str(DEFAULT_CONFIG)?);
        if let Some(yaml) = external {
            let external: Value = serde_yaml::from_str(yaml)?;
            // Un fichier vide se désérialise en Null : on garde les défauts
            if !external.is_null() {
                merge_yaml(&mut data, &lower_keys(external));
            }
        }
        Ok(Self { config_dir, data })
    }

    /// Directory the configuration was read from (empty for in-memory configs)
    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Gets a configuration value at the specified path
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["client", "poll_interval_ms"]`)
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the YAML value or an error if the path doesn't exist
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let mut current = &self.data;
        for (i, key) in path.iter().enumerate() {
            let Value::Mapping(map) = current else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            };
            current = map
                .get(Value::String(key.to_lowercase()))
                .ok_or_else(|| anyhow!("Path {} does not exist", path[..=i].join(".")))?;
        }
        Ok(current.clone())
    }

    /// Base URL of the wall backend API, e.g. `http://piwall.tv/api`
    pub fn get_api_base_url(&self) -> String {
        match self.get_value(&["host", "api_base_url"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s.trim_end_matches('/').to_string(),
            Ok(_) => {
                warn!("API base URL is not a string or empty, using default");
                DEFAULT_API_BASE_URL.to_string()
            }
            Err(err) => {
                warn!("Failed to get API base URL: {}, using default", err);
                DEFAULT_API_BASE_URL.to_string()
            }
        }
    }

    impl_duration_config!(
        get_poll_interval,
        &["client", "poll_interval_ms"],
        DEFAULT_POLL_INTERVAL_MS,
        Duration::from_millis
    );

    impl_duration_config!(
        get_volume_lock_margin,
        &["client", "volume_lock_margin_ms"],
        DEFAULT_VOLUME_LOCK_MARGIN_MS,
        Duration::from_millis
    );

    impl_duration_config!(
        get_request_timeout,
        &["client", "request_timeout_secs"],
        DEFAULT_REQUEST_TIMEOUT_SECS,
        Duration::from_secs
    );

    impl_string_config!(
        get_default_color_mode,
        &["client", "color_mode"],
        DEFAULT_COLOR_MODE
    );

    impl_string_config!(get_log_min_level, &["log", "min_level"], DEFAULT_LOG_MIN_LEVEL);

    /// Raw `wall` section: physical wall size and screen rectangles.
    ///
    /// Validation of the geometry itself happens where the layout is built.
    pub fn get_wall_section(&self) -> Result<WallSection> {
        let value = self.get_value(&["wall"])?;
        Ok(serde_yaml::from_value(value)?)
    }
}

/// Returns the global configuration instance
///
/// The configuration is lazily loaded on first access; if loading fails the
/// embedded defaults are used and a warning is logged.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings, keys from external are merged recursively into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| match k {
                    Value::String(s) => (Value::String(s.to_lowercase()), lower_keys(v)),
                    other => (other, lower_keys(v)),
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys).collect()),
        other => other,
    }
}

/// Applies `PMOWALL_CONFIG__SECTION__KEY=value` overrides.
///
/// Values are parsed as YAML scalars so `PMOWALL_CONFIG__CLIENT__POLL_INTERVAL_MS=250`
/// yields a number.
fn apply_env_overrides(config: &mut Value, vars: impl IntoIterator<Item = (String, String)>) {
    for (key, value) in vars {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = stripped.split("__").map(str::to_lowercase).collect();
        let parsed = serde_yaml::from_str::<Value>(&value).unwrap_or(Value::String(value));
        if let Err(err) = set_path(config, &path, parsed) {
            warn!(env_var = %key, error = %err, "Ignoring configuration override");
        }
    }
}

fn set_path(data: &mut Value, path: &[String], value: Value) -> Result<()> {
    let Some((head, rest)) = path.split_first() else {
        *data = value;
        return Ok(());
    };
    let Value::Mapping(map) = data else {
        return Err(anyhow!("Current node is not a map"));
    };
    let key = Value::String(head.clone());
    if rest.is_empty() {
        map.insert(key, value);
        return Ok(());
    }
    let entry = map
        .entry(key)
        .or_insert(Value::Mapping(Mapping::new()));
    set_path(entry, rest, value)
}
