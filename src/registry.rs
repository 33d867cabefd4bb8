//! Identifier Registry (spec §4.2).
//!
//! A single coarse lock guards four small maps; per the Design Notes
//! (spec §9) operations here must stay non-blocking and do no I/O, so this
//! uses `parking_lot::Mutex`, which cannot be held across an `.await`
//! point by construction — a cheap way to enforce that invariant at
//! compile time rather than by convention.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::ids::{BrowserContextId, ClientId, SessionId, TabId, TargetId};
use crate::model::{Session, Tab, TabStatus, Target, TargetState};

#[derive(Default)]
struct RegistryInner {
    tabs: HashMap<TabId, Tab>,
    tabs_to_targets: HashMap<TabId, TargetId>,
    targets: HashMap<TargetId, Target>,
    browser_contexts: std::collections::HashSet<BrowserContextId>,
    sessions: HashMap<SessionId, Session>,
    /// Index: target -> sessions attached to it, for O(1) fan-out lookup.
    sessions_by_target: HashMap<TargetId, Vec<SessionId>>,
    /// Index: client -> sessions it owns, for O(1) disconnect cleanup.
    sessions_by_client: HashMap<ClientId, Vec<SessionId>>,
}

pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        let mut inner = RegistryInner::default();
        inner
            .browser_contexts
            .insert(BrowserContextId::default_context());
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Register a new tab/target pair (extension reported a new tab).
    /// Idempotent: re-registering an existing tab just refreshes its target.
    pub fn register_tab(&self, tab_id: TabId, url: &str, target_id_prefix: &str) -> TargetId {
        let mut inner = self.inner.lock();
        inner
            .tabs
            .entry(tab_id)
            .or_insert_with(|| Tab {
                tab_id,
                url: url.to_string(),
                title: String::new(),
                status: TabStatus::Loading,
            });
        if let Some(existing) = inner.tabs_to_targets.get(&tab_id) {
            return existing.clone();
        }
        let target_id = TargetId::for_tab(target_id_prefix, tab_id);
        inner
            .tabs_to_targets
            .insert(tab_id, target_id.clone());
        inner.targets.insert(
            target_id.clone(),
            Target {
                target_id: target_id.clone(),
                tab_id,
                target_type: "page",
                browser_context_id: BrowserContextId::default_context(),
                state: TargetState::Created,
            },
        );
        target_id
    }

    /// Update a tab's navigation/title state (extension `tab.updated` event).
    pub fn update_tab(&self, tab_id: TabId, url: Option<&str>, title: Option<&str>, status: Option<TabStatus>) {
        let mut inner = self.inner.lock();
        if let Some(tab) = inner.tabs.get_mut(&tab_id) {
            if let Some(url) = url {
                tab.url = url.to_string();
            }
            if let Some(title) = title {
                tab.title = title.to_string();
            }
            if let Some(status) = status {
                tab.status = status;
            }
        }
    }

    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.inner.lock().tabs.get(&tab_id).cloned()
    }

    pub fn all_tabs(&self) -> Vec<Tab> {
        self.inner.lock().tabs.values().cloned().collect()
    }

    /// Mark a target's browser context (used right after `register_tab`
    /// when a client requested creation inside a specific context).
    pub fn set_target_context(&self, target_id: &TargetId, context: BrowserContextId) {
        let mut inner = self.inner.lock();
        if let Some(t) = inner.targets.get_mut(target_id) {
            t.browser_context_id = context;
        }
    }

    pub fn resolve_tab(&self, tab_id: TabId) -> Option<TargetId> {
        self.inner.lock().tabs_to_targets.get(&tab_id).cloned()
    }

    pub fn target(&self, target_id: &TargetId) -> Option<Target> {
        self.inner.lock().targets.get(target_id).cloned()
    }

    pub fn all_targets(&self) -> Vec<Target> {
        self.inner.lock().targets.values().cloned().collect()
    }

    pub fn create_browser_context(&self) -> BrowserContextId {
        let id = BrowserContextId::generate();
        self.inner.lock().browser_contexts.insert(id.clone());
        id
    }

    pub fn dispose_browser_context(&self, id: &BrowserContextId) -> bool {
        self.inner.lock().browser_contexts.remove(id)
    }

    pub fn context_exists(&self, id: &BrowserContextId) -> bool {
        self.inner.lock().browser_contexts.contains(id)
    }

    /// Attach a new session to a target, owned by `client`. Fails with
    /// `target-gone` if the target is destroyed or unknown.
    pub fn attach_session(
        &self,
        target_id: TargetId,
        owner: ClientId,
        flatten: bool,
    ) -> Result<SessionId> {
        let mut inner = self.inner.lock();
        let target = inner
            .targets
            .get_mut(&target_id)
            .ok_or_else(|| BridgeError::TargetGone(target_id.to_string()))?;
        if target.state == TargetState::Destroyed {
            return Err(BridgeError::TargetGone(target_id.to_string()));
        }
        target.state = TargetState::Attached;

        let session_id = SessionId::generate();
        inner.sessions.insert(
            session_id.clone(),
            Session {
                session_id: session_id.clone(),
                target_id: target_id.clone(),
                owner,
                flatten,
            },
        );
        inner
            .sessions_by_target
            .entry(target_id)
            .or_default()
            .push(session_id.clone());
        inner
            .sessions_by_client
            .entry(owner)
            .or_default()
            .push(session_id.clone());
        Ok(session_id)
    }

    /// Detach a single session. Returns the detached session, if it existed.
    pub fn detach_session(&self, session_id: &SessionId) -> Option<Session> {
        let mut inner = self.inner.lock();
        let session = inner.sessions.remove(session_id)?;
        if let Some(v) = inner.sessions_by_target.get_mut(&session.target_id) {
            v.retain(|s| s != session_id);
        }
        if let Some(v) = inner.sessions_by_client.get_mut(&session.owner) {
            v.retain(|s| s != session_id);
        }
        Some(session)
    }

    /// Detach every session owned by a disconnecting client (spec §4.6).
    pub fn detach_sessions_for_client(&self, client: ClientId) -> Vec<Session> {
        let mut inner = self.inner.lock();
        let session_ids = inner.sessions_by_client.remove(&client).unwrap_or_default();
        let mut removed = Vec::with_capacity(session_ids.len());
        for sid in session_ids {
            if let Some(session) = inner.sessions.remove(&sid) {
                if let Some(v) = inner.sessions_by_target.get_mut(&session.target_id) {
                    v.retain(|s| s != &sid);
                }
                removed.push(session);
            }
        }
        removed
    }

    pub fn session(&self, session_id: &SessionId) -> Option<Session> {
        self.inner.lock().sessions.get(session_id).cloned()
    }

    /// All session ids currently attached to a target, for event fan-out.
    pub fn sessions_for_target(&self, target_id: &TargetId) -> Vec<SessionId> {
        self.inner
            .lock()
            .sessions_by_target
            .get(target_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Close a target directly (CDP `Target.closeTarget` / BROP `close_tab`),
    /// without waiting for the extension's own tab-removed event. Returns
    /// the detached sessions.
    pub fn close_target(&self, target_id: &TargetId) -> Option<(TabId, Vec<Session>)> {
        let mut inner = self.inner.lock();
        let target = inner.targets.get(target_id)?.clone();
        inner.tabs.remove(&target.tab_id);
        inner.tabs_to_targets.remove(&target.tab_id);
        if let Some(t) = inner.targets.get_mut(target_id) {
            t.state = TargetState::Destroyed;
        }
        let session_ids = inner
            .sessions_by_target
            .remove(target_id)
            .unwrap_or_default();
        let mut removed = Vec::with_capacity(session_ids.len());
        for sid in session_ids {
            if let Some(session) = inner.sessions.remove(&sid) {
                if let Some(v) = inner.sessions_by_client.get_mut(&session.owner) {
                    v.retain(|s| s != &sid);
                }
                removed.push(session);
            }
        }
        Some((target.tab_id, removed))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_tab_is_idempotent() {
        let reg = Registry::new();
        let a = reg.register_tab(TabId(1), "about:blank", "tab");
        let b = reg.register_tab(TabId(1), "about:blank", "tab");
        assert_eq!(a, b);
    }

    #[test]
    fn attach_session_fails_on_unknown_target() {
        let reg = Registry::new();
        let err = reg
            .attach_session(TargetId("nope".into()), ClientId(1), true)
            .unwrap_err();
        assert!(matches!(err, BridgeError::TargetGone(_)));
    }

    #[test]
    fn attach_then_destroy_detaches_all_sessions() {
        let reg = Registry::new();
        let target_id = reg.register_tab(TabId(1), "about:blank", "tab");
        let s1 = reg
            .attach_session(target_id.clone(), ClientId(1), true)
            .unwrap();
        let s2 = reg
            .attach_session(target_id.clone(), ClientId(2), true)
            .unwrap();

        assert_eq!(reg.sessions_for_target(&target_id).len(), 2);

        let (destroyed_tab, removed) = reg.close_target(&target_id).unwrap();
        assert_eq!(destroyed_tab, TabId(1));
        let removed_ids: Vec<_> = removed.iter().map(|s| s.session_id.clone()).collect();
        assert!(removed_ids.contains(&s1));
        assert!(removed_ids.contains(&s2));

        // Target is gone: registry no longer resolves the tab.
        assert!(reg.resolve_tab(TabId(1)).is_none());
        assert!(reg.sessions_for_target(&target_id).is_empty());
    }

    #[test]
    fn closing_last_session_does_not_destroy_target() {
        let reg = Registry::new();
        let target_id = reg.register_tab(TabId(1), "about:blank", "tab");
        let s1 = reg
            .attach_session(target_id.clone(), ClientId(1), true)
            .unwrap();
        reg.detach_session(&s1);

        let target = reg.target(&target_id).unwrap();
        assert_eq!(target.state, TargetState::Attached);
        assert!(reg.resolve_tab(TabId(1)).is_some());
    }

    #[test]
    fn detach_sessions_for_client_only_affects_that_client() {
        let reg = Registry::new();
        let target_id = reg.register_tab(TabId(1), "about:blank", "tab");
        let s1 = reg
            .attach_session(target_id.clone(), ClientId(1), true)
            .unwrap();
        let s2 = reg
            .attach_session(target_id.clone(), ClientId(2), true)
            .unwrap();

        let removed = reg.detach_sessions_for_client(ClientId(1));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].session_id, s1);
        assert!(reg.session(&s2).is_some());
        assert_eq!(reg.sessions_for_target(&target_id), vec![s2]);
    }

    #[test]
    fn browser_context_lifecycle() {
        let reg = Registry::new();
        assert!(reg.context_exists(&BrowserContextId::default_context()));
        let ctx = reg.create_browser_context();
        assert!(reg.context_exists(&ctx));
        assert!(reg.dispose_browser_context(&ctx));
        assert!(!reg.context_exists(&ctx));
    }

    #[test]
    fn close_target_detaches_sessions_like_destroy() {
        let reg = Registry::new();
        let target_id = reg.register_tab(TabId(7), "about:blank", "tab");
        let s1 = reg
            .attach_session(target_id.clone(), ClientId(9), true)
            .unwrap();

        let (tab_id, removed) = reg.close_target(&target_id).unwrap();
        assert_eq!(tab_id, TabId(7));
        assert_eq!(removed[0].session_id, s1);
        assert!(reg.resolve_tab(TabId(7)).is_none());
    }

    #[test]
    fn tab_state_tracks_updates_and_clears_on_destroy() {
        let reg = Registry::new();
        reg.register_tab(TabId(1), "about:blank", "tab");
        reg.update_tab(TabId(1), Some("https://example.com"), Some("Example"), Some(TabStatus::Complete));

        let tab = reg.tab(TabId(1)).unwrap();
        assert_eq!(tab.url, "https://example.com");
        assert_eq!(tab.title, "Example");
        assert_eq!(tab.status, TabStatus::Complete);

        let target_id = reg.resolve_tab(TabId(1)).unwrap();
        reg.close_target(&target_id);
        assert!(reg.tab(TabId(1)).is_none());
    }
}
