mod config;

pub use config::{
    BeaconConfig, ChallengeConfig, Config, GeofenceConfig, LocationConfig, SyncConfig,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/crawlhunt[-dev]/` based on CRAWLHUNT_ENV.
///
/// Set CRAWLHUNT_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("CRAWLHUNT_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("crawlhunt-dev")
    } else {
        base_dir.join("crawlhunt")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
