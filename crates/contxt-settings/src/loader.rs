//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BusSettings::default()`]
//! 2. If `~/.contxt/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::BusSettings;

/// Overrides `api.baseUrl`.
pub const ENV_BUS_URL: &str = "CONTXT_BUS_URL";
/// Overrides `api.token`.
pub const ENV_API_TOKEN: &str = "CONTXT_API_TOKEN";
/// Overrides `logging.level`.
pub const ENV_LOG_LEVEL: &str = "CONTXT_LOG_LEVEL";

/// Resolve the path to the settings file (`~/.contxt/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".contxt").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BusSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BusSettings> {
    let mut settings = read_layered(path)?;
    apply_overrides(&mut settings, read_env);
    validate(&settings)?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<BusSettings> {
    let defaults = serde_json::to_value(BusSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CONTXT_*` overrides using `lookup` to read variables.
///
/// Empty values are ignored.
pub fn apply_overrides(settings: &mut BusSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read(ENV_BUS_URL) {
        settings.api.base_url = v;
    }
    if let Some(v) = read(ENV_API_TOKEN) {
        settings.api.token = Some(v);
    }
    if let Some(v) = read(ENV_LOG_LEVEL) {
        settings.logging.level = v;
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Check invariants the loader enforces. Run again after applying any
/// overrides from outside the loader.
pub fn validate(settings: &BusSettings) -> Result<()> {
    let url = settings.api.base_url.as_str();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(SettingsError::InvalidValue(format!(
            "api.baseUrl must start with ws:// or wss://, got {url:?}"
        )));
    }
    Ok(())
}
