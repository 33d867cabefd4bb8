//! CDP wire types (spec §6, §4.4).
//!
//! The envelope rule that matters most: a response echoes the `sessionId`
//! of the request it answers, and an event carries the `sessionId` of the
//! session it is addressed to, but never an `id` (spec §4.4.2, invariants
//! 1 and 3 in §8).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

#[derive(Debug, Clone, Deserialize)]
pub struct CdpRequest {
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CdpResponse {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CdpError>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl CdpResponse {
    pub fn ok(id: i64, session_id: Option<String>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
            session_id,
        }
    }

    pub fn err(id: i64, session_id: Option<String>, err: &BridgeError) -> Self {
        Self {
            id,
            result: None,
            error: Some(CdpError::from_bridge_error(err)),
            session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CdpError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CdpError {
    pub fn from_bridge_error(err: &BridgeError) -> Self {
        Self {
            code: error_code_for(err),
            message: err.to_string(),
            data: None,
        }
    }
}

/// Maps our error taxonomy onto CDP-style integer error codes (spec §7:
/// "for CDP these map to error codes in the `error` envelope"). Chrome
/// itself is not consistent about these; we pick stable values and keep
/// them so clients can match on them across releases of this bridge.
pub fn error_code_for(err: &BridgeError) -> i64 {
    match err {
        BridgeError::BadRequest(_) => -32600,
        BridgeError::UnknownMethod(_) => -32601,
        BridgeError::InvalidSession(_) => -32000,
        BridgeError::TargetGone(_) => -32001,
        BridgeError::ExtensionDisconnected => -32002,
        BridgeError::ExtensionTimeout(_) => -32003,
        BridgeError::ExtensionError(_) => -32004,
        BridgeError::Internal { .. } => -32603,
        BridgeError::Io(_) | BridgeError::Json(_) | BridgeError::Config(_) => -32603,
    }
}

/// An event frame. Never carries `id` (spec invariant 3, §8).
#[derive(Debug, Clone, Serialize)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl CdpEvent {
    pub fn new(method: impl Into<String>, params: Value, session_id: Option<String>) -> Self {
        Self {
            method: method.into(),
            params,
            session_id,
        }
    }
}

/// Synthesized `Browser.getVersion` payload (spec §4.4.1).
pub fn browser_version() -> Value {
    serde_json::json!({
        "product": "BROP-Bridge/1.0",
        "protocolVersion": "1.3",
        "userAgent": "Mozilla/5.0 (compatible; BROP-Bridge)",
        "jsVersion": "0",
    })
}

/// A `Target.TargetInfo` entry, used by `Target.getTargets`,
/// `Target.targetCreated`, and the discovery HTTP endpoint (spec §4.8).
#[derive(Debug, Clone, Serialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: &'static str,
    pub title: String,
    pub url: String,
    pub attached: bool,
    #[serde(rename = "browserContextId")]
    pub browser_context_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_omits_session_id_when_absent() {
        let resp = CdpResponse::ok(1, None, serde_json::json!({}));
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("sessionId").is_none());
    }

    #[test]
    fn response_echoes_session_id_when_present() {
        let resp = CdpResponse::ok(1, Some("S1".to_string()), serde_json::json!({}));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["sessionId"], "S1");
    }

    #[test]
    fn event_serializes_without_an_id_field() {
        let ev = CdpEvent::new("Target.targetDestroyed", serde_json::json!({}), Some("S1".into()));
        let v = serde_json::to_value(&ev).unwrap();
        assert!(v.get("id").is_none());
        assert_eq!(v["sessionId"], "S1");
    }

    #[test]
    fn request_parses_without_session_id() {
        let req: CdpRequest = serde_json::from_str(r#"{"id":1,"method":"Browser.getVersion"}"#).unwrap();
        assert_eq!(req.id, 1);
        assert!(req.session_id.is_none());
    }
}
