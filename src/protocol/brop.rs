//! BROP wire types (spec §4.3, §6).
//!
//! Request shape is `{id, method, params}`, but a legacy form,
//! `{id, command:{type, ...params}}`, must still be accepted and is
//! normalized to the same internal shape at the edge (spec §4.3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

#[derive(Debug, Deserialize)]
struct RawBropRequest {
    id: i64,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    command: Option<Value>,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone)]
pub struct BropRequest {
    pub id: i64,
    pub method: String,
    pub params: Value,
}

impl BropRequest {
    /// Parse a frame, normalizing the legacy `command` form. Legacy frames
    /// nest the method under `command.type` with the rest of `command`
    /// as the flat parameter object.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawBropRequest =
            serde_json::from_str(text).map_err(|e| BridgeError::BadRequest(e.to_string()))?;

        if let Some(method) = raw.method {
            return Ok(Self {
                id: raw.id,
                method,
                params: raw.params,
            });
        }

        if let Some(mut command) = raw.command {
            let obj = command
                .as_object_mut()
                .ok_or_else(|| BridgeError::BadRequest("command must be an object".into()))?;
            let method = obj
                .remove("type")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| BridgeError::BadRequest("command.type is required".into()))?;
            return Ok(Self {
                id: raw.id,
                method,
                params: Value::Object(obj.clone()),
            });
        }

        Err(BridgeError::BadRequest(
            "request must have either `method` or `command`".into(),
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BropResponse {
    pub id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BropResponse {
    pub fn ok(id: i64, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: i64, err: &BridgeError) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_method_form() {
        let req = BropRequest::parse(r#"{"id":1,"method":"list_tabs","params":{}}"#).unwrap();
        assert_eq!(req.id, 1);
        assert_eq!(req.method, "list_tabs");
    }

    #[test]
    fn normalizes_legacy_command_form() {
        let req = BropRequest::parse(
            r#"{"id":2,"command":{"type":"navigate","tabId":5,"url":"https://example.com"}}"#,
        )
        .unwrap();
        assert_eq!(req.method, "navigate");
        assert_eq!(req.params["tabId"], 5);
        assert_eq!(req.params["url"], "https://example.com");
        assert!(req.params.get("type").is_none());
    }

    #[test]
    fn missing_method_and_command_is_bad_request() {
        let err = BropRequest::parse(r#"{"id":3}"#).unwrap_err();
        assert!(matches!(err, BridgeError::BadRequest(_)));
    }

    #[test]
    fn error_response_carries_message_not_code() {
        let resp = BropResponse::err(1, &BridgeError::TargetGone("tab-1".into()));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["success"], false);
        assert!(v["error"].as_str().unwrap().contains("target gone"));
        assert!(v.get("result").is_none());
    }
}
