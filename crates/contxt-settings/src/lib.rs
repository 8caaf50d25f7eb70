//! # contxt-settings
//!
//! Configuration for the contxt message-bus client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BusSettings::default()`]
//! 2. **User file**: `~/.contxt/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CONTXT_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::{ApiSettings, BusSettings, LoggingSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = BusSettings::default();
        assert_eq!(settings.api.base_url, "wss://bus.ndustrial.io");
        assert!(settings.api.token.is_none());
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn settings_path_ends_with_contxt_dir() {
        let path = settings_path();
        assert!(path.ends_with(".contxt/settings.json"));
    }
}
