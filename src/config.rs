//! Shared config utilities for loading/saving JSON config files
//! and resolving the API credential from a field, an environment variable
//! or a key file.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Application data directory; chat logs and settings live here by default.
pub fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.companion.chat")
}

/// Generic load for any Serde config type with a `Default` implementation.
/// Falls back to `T::default()` if the file is missing or unparsable.
pub fn load_json_config<T: DeserializeOwned + Default>(path: &Path, label: &str) -> T {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<T>(&content) {
            Ok(config) => {
                tracing::info!("[{}] Loaded config from {}", label, path.display());
                config
            }
            Err(e) => {
                tracing::warn!(
                    "[{}] Failed to parse config {}: {}, using defaults",
                    label,
                    path.display(),
                    e
                );
                T::default()
            }
        },
        Err(_) => {
            tracing::info!(
                "[{}] No config file at {}, using defaults",
                label,
                path.display()
            );
            T::default()
        }
    }
}

/// Generic save for any Serde config type.
pub fn save_json_config<T: Serialize>(path: &Path, config: &T, label: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(path, json)?;
    tracing::info!("[{}] Saved config to {}", label, path.display());
    Ok(())
}

/// Resolve an API key: the direct `api_key` field first, then the
/// environment variable named in `api_key_env`, then the first line of
/// `api_key_file`. Values are trimmed; blank values do not count.
pub fn resolve_api_key(
    api_key: &Option<String>,
    api_key_env: &Option<String>,
    api_key_file: &Option<PathBuf>,
) -> Option<String> {
    let non_blank = |key: &str| {
        let key = key.trim();
        (!key.is_empty()).then(|| key.to_string())
    };

    if let Some(key) = api_key.as_deref().and_then(non_blank) {
        return Some(key);
    }
    if let Some(ref env_var) = api_key_env {
        if let Some(key) = std::env::var(env_var).ok().as_deref().and_then(non_blank) {
            return Some(key);
        }
    }
    if let Some(ref path) = api_key_file {
        match std::fs::read_to_string(path) {
            Ok(content) => return non_blank(&content),
            Err(e) => tracing::warn!("[Config] Cannot read key file {}: {}", path.display(), e),
        }
    }
    None
}
