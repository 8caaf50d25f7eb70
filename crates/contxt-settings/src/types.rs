//! Settings types.
//!
//! Field names are camelCase on disk.

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Message-bus endpoint and credentials.
    pub api: ApiSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Message-bus endpoint and credentials.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// WebSocket base URL; organization streams live under
    /// `<baseUrl>/organizations/<id>/stream`.
    pub base_url: String,
    /// Bearer token sent when opening the socket and with `MessageBus.Authorize`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "wss://bus.ndustrial.io".to_string(),
            token: None,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_produces_defaults() {
        let settings: BusSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.api.base_url, ApiSettings::default().base_url);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let mut settings = BusSettings::default();
        settings.api.token = Some("t".into());
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["api"]["baseUrl"], "wss://bus.ndustrial.io");
        assert_eq!(json["api"]["token"], "t");
    }

    #[test]
    fn missing_token_is_omitted() {
        let json = serde_json::to_value(BusSettings::default()).unwrap();
        assert!(json["api"].get("token").is_none());
    }
}
