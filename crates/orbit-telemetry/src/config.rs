//! Telemetry configuration.
//!
//! Resolved once and cached on the pipeline instance. Telemetry is active
//! only when both conditions hold: the enabled flag is set **and** a
//! non-empty API key is configured. An absent key is treated as disabled,
//! so a misconfigured build can never post events anywhere.
//!
//! Environment variables (highest priority, parsed with the same rules as
//! the rest of the app's env overrides):
//!
//! - `ORBIT_ANALYTICS_ENABLED` — `true`/`1`/`yes`/`on` to enable
//! - `ORBIT_ANALYTICS_API_KEY` — collector API key
//! - `ORBIT_ANALYTICS_ENDPOINT` — delivery URL override

use serde::{Deserialize, Serialize};

/// Default collector endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://analytics.orbit.dev/api/track";

/// Telemetry delivery configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// Master enable flag. Telemetry is fully disabled when false.
    #[serde(default)]
    pub enabled: bool,
    /// Collector API key. An empty key disables telemetry.
    #[serde(default)]
    pub api_key: String,
    /// Delivery endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            endpoint: default_endpoint(),
        }
    }
}

impl TelemetryConfig {
    /// Build a config from `ORBIT_ANALYTICS_*` environment variables.
    ///
    /// Unset or unparseable variables fall back to defaults (disabled,
    /// empty key, default endpoint).
    pub fn from_env() -> Self {
        Self {
            enabled: read_env_bool("ORBIT_ANALYTICS_ENABLED").unwrap_or(false),
            api_key: read_env_string("ORBIT_ANALYTICS_API_KEY").unwrap_or_default(),
            endpoint: read_env_string("ORBIT_ANALYTICS_ENDPOINT").unwrap_or_else(default_endpoint),
        }
    }

    /// Whether telemetry should actually run: enabled flag set **and** a
    /// non-empty API key present.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }

    /// Redacted snapshot for diagnostics. Never exposes the API key itself.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            enabled: self.is_active(),
            endpoint: self.endpoint.clone(),
            has_api_key: !self.api_key.is_empty(),
        }
    }
}

/// Redacted configuration snapshot for debug output.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    /// Effective enabled state (flag and key both present).
    pub enabled: bool,
    /// Delivery endpoint URL.
    pub endpoint: String,
    /// Whether an API key is configured.
    pub has_api_key: bool,
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
