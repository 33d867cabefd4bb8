//! Entity types for the data model (spec §3).

use serde::{Deserialize, Serialize};

use crate::ids::{BrowserContextId, ClientId, SessionId, TabId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Tab {
    pub tab_id: TabId,
    pub url: String,
    pub title: String,
    pub status: TabStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Created,
    Attached,
    Destroyed,
}

#[derive(Debug, Clone)]
pub struct Target {
    pub target_id: TargetId,
    pub tab_id: TabId,
    pub target_type: &'static str,
    pub browser_context_id: BrowserContextId,
    pub state: TargetState,
}

impl Target {
    pub fn is_attached(&self) -> bool {
        self.state == TargetState::Attached
    }
}

/// A per-client attachment to a target (spec §3, §4.4.4).
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub target_id: TargetId,
    pub owner: ClientId,
    pub flatten: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Info,
    Debug,
}

impl ConsoleLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "log" => Some(Self::Log),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub id: String,
    pub tab_id: TabId,
    pub timestamp_ms: u64,
    pub level: ConsoleLevel,
    pub message: String,
    pub source: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Brop,
    Cdp,
    CdpEvent,
    System,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Brop => "BROP",
            Self::Cdp => "CDP",
            Self::CdpEvent => "CDP_EVENT",
            Self::System => "SYSTEM",
        }
    }
}

/// An operator-facing request/response audit entry (spec §3, §4.7).
#[derive(Debug, Clone)]
pub struct CallLogEntry {
    pub id: u64,
    pub timestamp_ms: u64,
    pub protocol: Protocol,
    pub method: String,
    pub params: String,
    pub outcome: CallOutcome,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum CallOutcome {
    Result(String),
    Error(String),
    Pending,
}

/// Truncate a sanitized payload for the CallLog, per spec §3 ("large
/// payloads truncated with explicit marker").
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}... [truncated, {} bytes total]", &s[..max_len], s.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_strings_are_unchanged() {
        assert_eq!(truncate_for_log("hello", 100), "hello");
    }

    #[test]
    fn truncate_long_strings_carry_a_marker() {
        let long = "x".repeat(5000);
        let out = truncate_for_log(&long, 100);
        assert!(out.starts_with(&"x".repeat(100)));
        assert!(out.contains("truncated"));
        assert!(out.contains("5000 bytes total"));
    }

    #[test]
    fn console_level_parse_rejects_unknown() {
        assert!(ConsoleLevel::parse("trace").is_none());
        assert_eq!(ConsoleLevel::parse("warn"), Some(ConsoleLevel::Warn));
    }
}
