//! The bridge's error taxonomy.
//!
//! Every variant maps onto one of the abstract error kinds the protocol
//! layer needs to translate into a dialect-specific envelope: a CDP
//! `{error:{code,message}}` object or a BROP `{success:false,error:<string>}`
//! string. See `protocol::cdp::error_code_for` for the CDP code mapping and
//! `protocol::brop::BropResponse::err` for the BROP string mapping.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("target gone: {0}")]
    TargetGone(String),

    #[error("extension disconnected")]
    ExtensionDisconnected,

    #[error("extension call timed out after {0:?}")]
    ExtensionTimeout(std::time::Duration),

    #[error("extension error: {0}")]
    ExtensionError(String),

    #[error("internal error ({id}): {message}")]
    Internal { id: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// A stable short id for triage, used by `Internal` and logged
    /// alongside the CallLog entry.
    pub fn internal(message: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::Internal {
            id: id[..8].to_string(),
            message: message.into(),
        }
    }
}
