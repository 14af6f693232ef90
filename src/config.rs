//! Configuration module for persistent settings.
//!
//! This module handles loading, saving, and validating daemon configuration.
//! Values are read leniently: an option that is missing or has the wrong type
//! keeps its compiled-in default, the way mpv script-opts behave.

use crate::error::ConfigError;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// Default mpv IPC socket path (`--input-ipc-server=/tmp/mpvsocket`).
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/mpvsocket";

/// How visual feedback is rendered inside mpv.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStyle {
    /// mpv's built-in OSD (`show-text`, `show-progress`)
    #[default]
    Osd,
    /// uosc `flash-elements` script messages
    Uosc,
}

impl FeedbackStyle {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "osd" => Some(FeedbackStyle::Osd),
            "uosc" => Some(FeedbackStyle::Uosc),
            _ => None,
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Seconds jumped by a tap. 0 turns the key into a pure fast-forward key.
    pub seek_distance: f64,
    pub speed_increase: f64,
    pub speed_decrease: f64,
    /// Tick period in seconds.
    pub speed_interval: f64,
    pub speed_cap: f64,
    /// `None` means the subtitle cap is disabled and `speed_cap` applies.
    pub subs_speed_cap: Option<f64>,
    /// Steps are `speed * step` instead of `step`.
    pub multiply_modifier: bool,
    pub subs_lookahead: bool,
    pub show_speed: bool,
    pub show_speed_toggled: bool,
    pub show_seek: bool,
    pub feedback: FeedbackStyle,
    pub socket_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seek_distance: 5.0,
            speed_increase: 0.1,
            speed_decrease: 0.1,
            speed_interval: 0.05,
            speed_cap: 2.0,
            subs_speed_cap: Some(1.6),
            multiply_modifier: false,
            subs_lookahead: true,
            show_speed: true,
            show_speed_toggled: true,
            show_seek: true,
            feedback: FeedbackStyle::Osd,
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
        }
    }
}

impl Config {
    /// Build a config from a JSON object, keeping defaults for every key
    /// that is absent or unusable.
    pub fn from_value(value: &Value) -> Self {
        let mut config = Config::default();
        if let Some(map) = value.as_object() {
            for (key, raw) in map {
                if let Err(e) = config.apply(key, raw) {
                    debug!("Ignoring option {}: {}", key, e);
                }
            }
        }
        config
    }

    /// Set a single option from a JSON value.
    pub fn apply(&mut self, key: &str, raw: &Value) -> Result<(), ConfigError> {
        let bad = || ConfigError::ParseError(format!("unusable value {} for {}", raw, key));

        match key {
            "seek_distance" => self.seek_distance = as_number(raw).ok_or_else(bad)?,
            "speed_increase" => self.speed_increase = as_number(raw).ok_or_else(bad)?,
            "speed_decrease" => self.speed_decrease = as_number(raw).ok_or_else(bad)?,
            "speed_interval" => self.speed_interval = as_number(raw).ok_or_else(bad)?,
            "speed_cap" => self.speed_cap = as_number(raw).ok_or_else(bad)?,
            "subs_speed_cap" => self.subs_speed_cap = as_optional_cap(raw).ok_or_else(bad)?,
            "multiply_modifier" => self.multiply_modifier = as_flag(raw).ok_or_else(bad)?,
            "subs_lookahead" => self.subs_lookahead = as_flag(raw).ok_or_else(bad)?,
            "show_speed" => self.show_speed = as_flag(raw).ok_or_else(bad)?,
            "show_speed_toggled" => self.show_speed_toggled = as_flag(raw).ok_or_else(bad)?,
            "show_seek" => self.show_seek = as_flag(raw).ok_or_else(bad)?,
            "feedback" => {
                self.feedback = raw.as_str().and_then(FeedbackStyle::parse).ok_or_else(bad)?
            }
            "socket_path" => {
                self.socket_path = raw
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .ok_or_else(bad)?
            }
            _ => return Err(ConfigError::UnknownOption(key.to_string())),
        }
        Ok(())
    }

    /// Set a single option from its textual form, as sent in a `set` message.
    pub fn apply_str(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        self.apply(key, &value)
    }

    /// Validate configuration values.
    /// Returns Ok(()) if valid, Err with descriptive message if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seek_distance.is_nan() || self.seek_distance < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "seek_distance ({}) must not be negative",
                self.seek_distance
            )));
        }

        for (name, step) in [
            ("speed_increase", self.speed_increase),
            ("speed_decrease", self.speed_decrease),
            ("speed_interval", self.speed_interval),
        ] {
            if step.is_nan() || step <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} ({}) must be greater than 0",
                    name, step
                )));
            }
        }

        if self.speed_cap.is_nan() || self.speed_cap < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "speed_cap ({}) must be at least 1.0",
                self.speed_cap
            )));
        }

        if let Some(cap) = self.subs_speed_cap {
            if cap.is_nan() || cap < 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "subs_speed_cap ({}) must be at least 1.0",
                    cap
                )));
            }
        }

        if self.multiply_modifier && self.speed_decrease >= 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "speed_decrease ({}) must be below 1.0 with multiply_modifier",
                self.speed_decrease
            )));
        }

        Ok(())
    }

    /// Tick period as a Duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.speed_interval)
    }

    /// The cap used while subtitles are shown.
    pub fn subs_cap(&self) -> f64 {
        self.subs_speed_cap.unwrap_or(self.speed_cap)
    }
}

fn as_number(raw: &Value) -> Option<f64> {
    let n = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn as_flag(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// `Some(None)` is a valid "disabled" value; `None` means unusable.
fn as_optional_cap(raw: &Value) -> Option<Option<f64>> {
    match raw {
        Value::Null => Some(None),
        Value::Bool(false) => Some(None),
        Value::String(s) if matches!(s.trim(), "no" | "none" | "") => Some(None),
        _ => as_number(raw).map(|n| if n <= 0.0 { None } else { Some(n) }),
    }
}

/// Configuration manager with file I/O.
pub struct ConfigManager {
    config: RwLock<Config>,
    path: PathBuf,
}

impl ConfigManager {
    /// Load configuration from file or use defaults.
    /// If the file doesn't exist, returns a manager with default config.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                ConfigError::ParseError(format!("Failed to read config file: {}", e))
            })?;

            let value: Value = serde_json::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("Invalid JSON: {}", e)))?;

            let config = Config::from_value(&value);
            config.validate()?;
            config
        } else {
            Config::default()
        };

        Ok(Self {
            config: RwLock::new(config),
            path: path.to_path_buf(),
        })
    }

    /// Save configuration to file using atomic write.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config = self.get();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&config)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {}", e)))?;

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Get current configuration.
    pub fn get(&self) -> Config {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|_| Config::default())
    }

    /// Update configuration with validation, then persist it.
    pub fn update(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;

        let mut current = self.config.write().map_err(|_| {
            ConfigError::ValidationError("Failed to acquire write lock".to_string())
        })?;
        *current = config;
        drop(current);

        self.save()
    }

    /// Change one option by name and return the resulting configuration.
    pub fn set_option(&self, key: &str, raw: &str) -> Result<Config, ConfigError> {
        let mut config = self.get();
        config.apply_str(key, raw)?;
        self.update(config.clone())?;
        Ok(config)
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the default config path (~/.config/seek-ramp/config.json).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("seek-ramp")
            .join("config.json")
    }
}
