//! Wire types for the extension control channel.
//!
//! Request-from-bridge: `{corr, op, params}`.
//! Reply-from-extension: `{corr, ok, result?, error?}`.
//! Event-from-extension: `{event, params}` (no `corr`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::CorrelationId;

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionRequest {
    pub corr: u64,
    pub op: String,
    pub params: Value,
}

impl ExtensionRequest {
    pub fn new(corr: CorrelationId, op: impl Into<String>, params: Value) -> Self {
        Self {
            corr: corr.0,
            op: op.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionError {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

/// An inbound frame from the extension: either a reply to one of our
/// requests (has `corr`) or an unsolicited event (has `event`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtensionInbound {
    Reply(ExtensionReply),
    Event(ExtensionEvent),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionReply {
    pub corr: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ExtensionError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionEvent {
    pub event: String,
    #[serde(default)]
    pub params: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_shape_round_trips_through_untagged_enum() {
        let json = r#"{"corr":7,"ok":true,"result":{"tabId":1}}"#;
        let parsed: ExtensionInbound = serde_json::from_str(json).unwrap();
        match parsed {
            ExtensionInbound::Reply(r) => {
                assert_eq!(r.corr, 7);
                assert!(r.ok);
                assert_eq!(r.result.unwrap()["tabId"], 1);
            }
            ExtensionInbound::Event(_) => panic!("expected a reply"),
        }
    }

    #[test]
    fn event_shape_has_no_corr() {
        let json = r#"{"event":"tab.created","params":{"tabId":5}}"#;
        let parsed: ExtensionInbound = serde_json::from_str(json).unwrap();
        match parsed {
            ExtensionInbound::Event(e) => {
                assert_eq!(e.event, "tab.created");
                assert_eq!(e.params["tabId"], 5);
            }
            ExtensionInbound::Reply(_) => panic!("expected an event"),
        }
    }

    #[test]
    fn request_serializes_with_corr_op_params() {
        let req = ExtensionRequest::new(CorrelationId(3), "navigate", serde_json::json!({"url":"x"}));
        let v: Value = serde_json::to_value(&req).unwrap();
        assert_eq!(v["corr"], 3);
        assert_eq!(v["op"], "navigate");
        assert_eq!(v["params"]["url"], "x");
    }
}
