//! Nominal identifier types for the bridge's three address spaces.
//!
//! String-typed identifiers everywhere is a trap: a `TabId` and a
//! `SessionId` are both strings in the wire format but must never be
//! interchangeable in code, so each gets its own type.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A browser tab id, as reported by the extension. Numeric, stable for the
/// life of the tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque CDP target id, stable for the life of a tab. Generated
/// deterministically from the tab id plus a configured prefix so
/// reconnecting to the same tab yields the same target id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn for_tab(prefix: &str, tab: TabId) -> Self {
        Self(format!("{prefix}-{:016x}", tab.0))
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque CDP browser context id; a grouping label only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrowserContextId(pub String);

impl fmt::Display for BrowserContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static BROWSER_CONTEXT_SEQ: AtomicU32 = AtomicU32::new(1);

impl BrowserContextId {
    /// The implicit default context used when a client never creates one
    /// explicitly.
    pub fn default_context() -> Self {
        Self("default".to_string())
    }

    pub fn generate() -> Self {
        let n = BROWSER_CONTEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("ctx-{n:08x}"))
    }
}

/// A per-client-attachment session id. 128-bit random hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        use rand::RngCore;
        rand::thread_rng().fill_bytes(&mut bytes);
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(hex)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client connection id, assigned locally by whichever server endpoint
/// accepted the connection. Never sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

static CLIENT_SEQ: AtomicU64 = AtomicU64::new(1);

impl ClientId {
    pub fn generate() -> Self {
        Self(CLIENT_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// A correlation id on the extension channel. Monotonic per process, not
/// sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_id_is_deterministic_per_tab() {
        let a = TargetId::for_tab("tab", TabId(42));
        let b = TargetId::for_tab("tab", TabId(42));
        assert_eq!(a, b);
        let c = TargetId::for_tab("tab", TabId(43));
        assert_ne!(a, c);
    }

    #[test]
    fn session_id_is_128_bits_of_hex() {
        let id = SessionId::generate();
        assert_eq!(id.0.len(), 32);
        assert!(id.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_ids_do_not_collide_in_a_small_batch() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(SessionId::generate().0));
        }
    }

    #[test]
    fn client_ids_are_unique_and_increasing() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert!(b.0 > a.0);
    }
}
