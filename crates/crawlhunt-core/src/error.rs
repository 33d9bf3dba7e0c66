//! Core error types for crawlhunt-core.
//!
//! Authorization denial and beacon staleness are intentionally absent here:
//! the first is surfaced as [`AuthorizationStatus`](crate::AuthorizationStatus),
//! the second is pruned silently.

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncError;

/// Core error type for crawlhunt-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Geofencing errors
    #[error("Geofence error: {0}")]
    Geofence(#[from] GeofenceError),

    /// Challenge generation errors
    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),

    /// Sync engine errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The runtime actor is gone (its task ended or panicked)
    #[error("Proximity runtime is not running")]
    RuntimeStopped,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Region registration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeofenceError {
    /// More regions requested than the platform allows
    #[error("Region limit exceeded: at most {limit} regions can be monitored")]
    RegionLimitExceeded { limit: usize },

    /// Radius must be finite and strictly positive
    #[error("Invalid region radius: {0}")]
    InvalidRadius(f64),

    /// Center outside the valid latitude/longitude range
    #[error("Invalid region center: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Region identifier must not be empty")]
    EmptyIdentifier,

    /// The platform monitor refused the registration
    #[error("Platform rejected region '{identifier}': {reason}")]
    Platform { identifier: String, reason: String },
}

/// Dynamic challenge errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChallengeError {
    /// No sample recent enough to stamp the challenge with
    #[error("No recent location sample is available")]
    LocationUnavailable,

    /// Points range in config is inverted
    #[error("Invalid points range: {min}..={max}")]
    InvalidPointsRange { min: u32, max: u32 },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
