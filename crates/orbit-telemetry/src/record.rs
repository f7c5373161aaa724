//! Event records and parameter sanitization.
//!
//! An [`EventRecord`] is immutable once constructed: the pipeline only ever
//! moves records between the queue, an in-flight batch, and the wire. The
//! `params` map is insertion-ordered (`serde_json` with `preserve_order`),
//! so delivered payloads keep the caller's key order.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::IdentitySnapshot;

/// Sanitized event parameters: insertion-ordered string keys to JSON scalars
/// (string, number, boolean, null) or stringified compound values.
pub type EventParams = serde_json::Map<String, Value>;

/// Placeholder substituted when a compound param value fails to serialize.
const SERIALIZE_PLACEHOLDER: &str = "[Object]";

/// A single telemetry event, enriched and ready for delivery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event name (non-empty identifier).
    pub event: String,
    /// Stable device identifier.
    pub device_id: String,
    /// Platform string, e.g. `darwin-aarch64`.
    pub platform: String,
    /// Application version.
    pub app_version: String,
    /// Sanitized event parameters.
    pub params: EventParams,
    /// RFC 3339 timestamp captured at record creation.
    pub client_timestamp: String,
}

impl EventRecord {
    /// Build a record from a sanitized param map and cached identity values,
    /// stamping the current time.
    pub(crate) fn new(event: &str, identity: &IdentitySnapshot, params: EventParams) -> Self {
        Self {
            event: event.to_string(),
            device_id: identity.device_id.clone(),
            platform: identity.platform.clone(),
            app_version: identity.app_version.clone(),
            params,
            client_timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Reduce arbitrary caller params to wire-safe values.
///
/// Scalars (null, bool, number, string) pass through unchanged. Objects and
/// arrays are serialized to their JSON text, substituting a fixed placeholder
/// if serialization fails. A non-object input is treated as no params.
pub fn sanitize_params(params: Value) -> EventParams {
    let Value::Object(map) = params else {
        return EventParams::new();
    };

    let mut out = EventParams::new();
    for (key, value) in map {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                let _ = out.insert(key, value);
            }
            Value::Object(_) | Value::Array(_) => {
                let text = serde_json::to_string(&value)
                    .unwrap_or_else(|_| SERIALIZE_PLACEHOLDER.to_string());
                let _ = out.insert(key, Value::String(text));
            }
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> IdentitySnapshot {
        IdentitySnapshot {
            device_id: "dev-1".to_string(),
            platform: "darwin-aarch64".to_string(),
            app_version: "1.2.3".to_string(),
        }
    }

    // -- sanitize_params --

    #[test]
    fn scalars_pass_through_in_order() {
        let params = sanitize_params(json!({
            "a": 1,
            "b": "s",
            "c": true,
            "d": null,
        }));

        let keys: Vec<&str> = params.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a", "b", "c", "d"]);
        assert_eq!(params["a"], json!(1));
        assert_eq!(params["b"], json!("s"));
        assert_eq!(params["c"], json!(true));
        assert_eq!(params["d"], Value::Null);
    }

    #[test]
    fn objects_are_stringified() {
        let params = sanitize_params(json!({ "e": { "k": 1 } }));
        assert_eq!(params["e"], json!("{\"k\":1}"));
    }

    #[test]
    fn arrays_are_stringified() {
        let params = sanitize_params(json!({ "list": [1, "two", null] }));
        assert_eq!(params["list"], json!("[1,\"two\",null]"));
    }

    #[test]
    fn non_object_input_yields_empty_params() {
        assert!(sanitize_params(json!(null)).is_empty());
        assert!(sanitize_params(json!("str")).is_empty());
        assert!(sanitize_params(json!(42)).is_empty());
        assert!(sanitize_params(json!([1, 2])).is_empty());
    }

    #[test]
    fn mixed_params_match_wire_expectations() {
        let params = sanitize_params(json!({
            "a": 1, "b": "s", "c": true, "d": null, "e": { "k": 1 }
        }));
        assert_eq!(params.len(), 5);
        assert_eq!(params["e"], json!("{\"k\":1}"));
    }

    // -- EventRecord --

    #[test]
    fn record_carries_identity_and_timestamp() {
        let record = EventRecord::new("message_send", &identity(), EventParams::new());
        assert_eq!(record.event, "message_send");
        assert_eq!(record.device_id, "dev-1");
        assert_eq!(record.platform, "darwin-aarch64");
        assert_eq!(record.app_version, "1.2.3");
        // RFC 3339 with millis and Z suffix, like 2026-01-02T03:04:05.678Z
        assert!(record.client_timestamp.ends_with('Z'));
        assert!(record.client_timestamp.contains('T'));
    }

    #[test]
    fn record_serializes_with_snake_case_fields() {
        let record = EventRecord::new("x", &identity(), sanitize_params(json!({"k": "v"})));
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["event"], "x");
        assert_eq!(wire["device_id"], "dev-1");
        assert_eq!(wire["app_version"], "1.2.3");
        assert_eq!(wire["params"]["k"], "v");
        assert!(wire["client_timestamp"].is_string());
    }
}
