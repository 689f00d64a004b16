//! # API Request/Response Types
//!
//! Wire types for the HTTP endpoints and the WebSocket control protocol.
//! The control message and init-reply shapes are the historical wire
//! format and must not change.

use serde::{Deserialize, Serialize};
use wavegraph_core::SignalEnvelope;

// =============================================================================
// HTTP TYPES
// =============================================================================

/// `GET /health` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `POST /point` request.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddPointRequest {
    pub node_uuid: String,
    /// Event time in epoch seconds; defaults to now.
    #[serde(default)]
    pub timestamp_epoch: Option<f64>,
}

/// `POST /point` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddPointResponse {
    pub node_uuid: String,
    pub point_uuid: String,
    pub timestamp_epoch: f64,
    pub timestamp_utc: String,
}

/// `GET /snapshot/{node}` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub node_uuid: String,
    pub signal: Option<SignalEnvelope>,
}

/// Error payload for non-2xx responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// WEBSOCKET CONTROL PROTOCOL
// =============================================================================

/// Inbound control message.
///
/// ```json
/// {"msg": "SignalConnectionInit",
///  "data": {"session_id": "…", "node_uuid": "…"}}
/// {"msg": "AddPoint",
///  "data": {"session_id": "…", "node_uuid": "…", "point_time": 1700000000000.0}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ControlMessage {
    pub msg: String,
    #[serde(default)]
    pub data: ControlData,
}

/// Payload of a control message; every field optional, validated per
/// message type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlData {
    pub session_id: Option<String>,
    pub node_uuid: Option<String>,
    /// Event time in epoch MILLISECONDS (historical unit).
    pub point_time: Option<f64>,
}

/// Reply to `SignalConnectionInit`; capitalized keys are historical.
#[derive(Debug, Serialize, Deserialize)]
pub struct InitReply {
    #[serde(rename = "Msg")]
    pub msg: String,
    #[serde(rename = "Signal")]
    pub signal: Option<SignalEnvelope>,
}

impl InitReply {
    #[must_use]
    pub fn new(signal: Option<SignalEnvelope>) -> Self {
        Self {
            msg: "SignalConnectionInit".to_string(),
            signal,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn control_message_parses_init() {
        let raw = json!({
            "msg": "SignalConnectionInit",
            "data": {"session_id": "s1", "node_uuid": "n1"}
        });
        let message: ControlMessage = serde_json::from_value(raw).expect("parse");
        assert_eq!(message.msg, "SignalConnectionInit");
        assert_eq!(message.data.session_id.as_deref(), Some("s1"));
        assert_eq!(message.data.node_uuid.as_deref(), Some("n1"));
        assert!(message.data.point_time.is_none());
    }

    #[test]
    fn control_message_tolerates_missing_data() {
        let message: ControlMessage =
            serde_json::from_value(json!({"msg": "AddPoint"})).expect("parse");
        assert!(message.data.session_id.is_none());
    }

    #[test]
    fn init_reply_uses_capitalized_keys() {
        let json = serde_json::to_value(InitReply::new(None)).expect("serialize");
        assert_eq!(json["Msg"], "SignalConnectionInit");
        assert!(json["Signal"].is_null());
    }
}
