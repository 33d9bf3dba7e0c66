//! TOML-based engine configuration.
//!
//! Stores tuning for each engine:
//! - Location sample acceptance and freshness
//! - Platform region cap
//! - Known beacon regions and the staleness window
//! - Sync idle/flush timeouts and the queue file
//! - Dynamic challenge expiry and points
//!
//! Configuration is stored at `~/.config/crawlhunt/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::beacon::BeaconRegion;
use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Oldest sample (seconds) still usable for stamping a challenge.
    #[serde(default = "default_max_sample_age_secs")]
    pub max_sample_age_secs: u64,
    /// Reject fixes whose horizontal accuracy is worse than this (meters).
    #[serde(default)]
    pub max_horizontal_accuracy_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceConfig {
    #[serde(default = "default_max_regions")]
    pub max_regions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default)]
    pub regions: Vec<BeaconRegion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long `synced` lingers before dropping back to `idle`.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
    /// Where the pending queue is persisted across launches.
    #[serde(default)]
    pub queue_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: u32,
    #[serde(default = "default_min_points")]
    pub min_points: u32,
    #[serde(default = "default_max_points")]
    pub max_points: u32,
    /// How long generation waits for a first fix before giving up.
    #[serde(default = "default_location_wait_ms")]
    pub location_wait_ms: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/crawlhunt/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub geofence: GeofenceConfig,
    #[serde(default)]
    pub beacon: BeaconConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub challenge: ChallengeConfig,
}

// Default functions
fn default_max_sample_age_secs() -> u64 {
    300
}
fn default_max_regions() -> usize {
    20
}
fn default_stale_after_secs() -> u64 {
    30
}
fn default_cleanup_interval_secs() -> u64 {
    10
}
fn default_idle_timeout_secs() -> u64 {
    5
}
fn default_flush_timeout_secs() -> u64 {
    30
}
fn default_expiry_minutes() -> u32 {
    60
}
fn default_min_points() -> u32 {
    50
}
fn default_max_points() -> u32 {
    150
}
fn default_location_wait_ms() -> u64 {
    2000
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            max_sample_age_secs: default_max_sample_age_secs(),
            max_horizontal_accuracy_m: None,
        }
    }
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            max_regions: default_max_regions(),
        }
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            regions: Vec::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            flush_timeout_secs: default_flush_timeout_secs(),
            queue_file: None,
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: default_expiry_minutes(),
            min_points: default_min_points(),
            max_points: default_max_points(),
            location_wait_ms: default_location_wait_ms(),
        }
    }
}

/// Seconds as a signed duration, saturating at `TimeDelta::MAX`.
fn saturating_seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl LocationConfig {
    pub fn max_sample_age(&self) -> chrono::Duration {
        saturating_seconds(self.max_sample_age_secs)
    }
}

impl BeaconConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        saturating_seconds(self.stale_after_secs)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

impl SyncConfig {
    pub fn idle_timeout(&self) -> chrono::Duration {
        saturating_seconds(self.idle_timeout_secs)
    }

    pub fn flush_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.flush_timeout_secs)
    }
}

impl ChallengeConfig {
    pub fn expiry(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.expiry_minutes as i64)
    }

    pub fn location_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.location_wait_ms)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                // Optional fields serialize as null, so they are settable too.
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::Null => match value {
                        "" | "none" | "null" => serde_json::Value::Null,
                        _ => serde_json::from_str(value)
                            .unwrap_or_else(|_| serde_json::Value::String(value.into())),
                    },
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Every settable dotted key with its current value, grouped by section.
    /// Lists such as `beacon.regions` are reported as one key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (name, child) in map {
                        let key = if prefix.is_empty() {
                            name.clone()
                        } else {
                            format!("{prefix}.{name}")
                        };
                        walk(&key, child, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Set a value in memory by dot-separated key.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
