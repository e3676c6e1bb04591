//! # PVRCore Configuration Module
//!
//! Settings provider for the PVR orchestration core:
//! - Loading configuration from YAML files
//! - Merging with embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for the recognized options
//!
//! The configuration is an owned value: the host loads it once at startup
//! and hands an `Arc<Config>` to the components that consume it. There is
//! no process-wide singleton.
//!
//! ## Usage
//!
//! ```no_run
//! use pvrconfig::Config;
//!
//! let config = Config::load("")?;
//! let delay = config.get_reminder_auto_close_delay();
//! config.set_instant_record_minutes(30)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::Mutex,
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pvrcore.yaml");

const ENV_CONFIG_DIR: &str = "PVRCORE_CONFIG";
const ENV_PREFIX: &str = "PVRCORE_CONFIG__";

// Default values for configuration
const DEFAULT_REMINDER_AUTO_CLOSE_DELAY: i64 = 10;
const DEFAULT_REMINDER_AUTO_RECORD: bool = false;
const DEFAULT_REMINDER_AUTO_SWITCH: bool = false;
const DEFAULT_INSTANT_RECORD_MINUTES: i64 = 120;
const DEFAULT_LAST_WATCHED_DELAY: i64 = 10;

/// What an instant recording covers when no EPG entry was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstantRecordAction {
    /// Record until the end of the current EPG event.
    CurrentShow,
    /// Record a fixed number of minutes starting now.
    FixedDuration,
    /// Present the choices interactively.
    Ask,
}

impl InstantRecordAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstantRecordAction::CurrentShow => "current_show",
            InstantRecordAction::FixedDuration => "fixed_duration",
            InstantRecordAction::Ask => "ask",
        }
    }

    /// Parse a configuration string; unknown values fall back to `Ask`.
    pub fn from_config_str(value: &str) -> InstantRecordAction {
        match value.trim().to_ascii_lowercase().as_str() {
            "current_show" => InstantRecordAction::CurrentShow,
            "fixed_duration" => InstantRecordAction::FixedDuration,
            "ask" => InstantRecordAction::Ask,
            _ => InstantRecordAction::Ask,
        }
    }
}

/// Macro to generate getter/setter for i64 values with default
macro_rules! impl_i64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> i64 {
            match self.get_value($path) {
                Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap(),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: i64) -> Result<()> {
            let n = Number::from(value);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager for the PVR core.
///
/// Holds the merged YAML tree (embedded defaults + external file + env
/// overrides) behind a mutex so getters and setters can share one value.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        let data = self.data.lock().unwrap().clone();
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(data),
        }
    }
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
        if Path::new(".pvrcore").exists() {
            return ".pvrcore".to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(".pvrcore");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        // Default fallback
        ".pvrcore".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("Le chemin spécifié n'est pas un répertoire"));
        }

        // Test write permission
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        // Test read permission
        fs::read_dir(path)?;

        Ok(())
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory (parameter, then the
    ///    `PVRCORE_CONFIG` environment variable, then `.pvrcore` in the
    ///    current or home directory)
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides (`PVRCORE_CONFIG__...`)
    /// 5. Saves the merged configuration
    pub fn load(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&config_dir))?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        // Charger la configuration par défaut
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        // Essayer de charger le fichier de configuration
        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        // Merger avec la config par défaut
        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        // Appliquer les overrides depuis les variables d'environnement
        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()?;
        Ok(())
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key);
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                let key_path = key
                    .trim_start_matches(ENV_PREFIX)
                    .split("__")
                    .collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        let new_key = Value::String(s.to_lowercase());
                        new_map.insert(new_key, Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    // ---- Typed accessors for the recognized options -------------------

    impl_i64_config!(
        get_reminder_auto_close_delay,
        set_reminder_auto_close_delay,
        &["reminders", "auto_close_delay_seconds"],
        DEFAULT_REMINDER_AUTO_CLOSE_DELAY
    );

    impl_bool_config!(
        get_reminder_auto_record,
        set_reminder_auto_record,
        &["reminders", "auto_record"],
        DEFAULT_REMINDER_AUTO_RECORD
    );

    impl_bool_config!(
        get_reminder_auto_switch,
        set_reminder_auto_switch,
        &["reminders", "auto_switch"],
        DEFAULT_REMINDER_AUTO_SWITCH
    );

    impl_i64_config!(
        get_instant_record_minutes,
        set_instant_record_minutes,
        &["recording", "instant_record_minutes"],
        DEFAULT_INSTANT_RECORD_MINUTES
    );

    impl_i64_config!(
        get_last_watched_delay,
        set_last_watched_delay,
        &["playback", "last_watched_delay_seconds"],
        DEFAULT_LAST_WATCHED_DELAY
    );

    pub fn get_instant_record_action(&self) -> InstantRecordAction {
        match self.get_value(&["recording", "instant_record_action"]) {
            Ok(Value::String(s)) => InstantRecordAction::from_config_str(&s),
            _ => InstantRecordAction::Ask,
        }
    }

    pub fn set_instant_record_action(&self, action: InstantRecordAction) -> Result<()> {
        self.set_value(
            &["recording", "instant_record_action"],
            Value::String(action.as_str().to_string()),
        )
    }
}

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
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}
