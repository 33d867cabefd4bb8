//! Session Router (spec §4.5): the only component that translates between
//! the tabId / targetId / sessionId address spaces, fans out extension
//! events to attached CDP sessions, and enforces the backpressure policy
//! (spec §5) on each client's outbound queue.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bridge::{now_ms, Bridge};
use crate::error::{BridgeError, Result};
use crate::extension::ExtensionEvent;
use crate::ids::{BrowserContextId, ClientId, SessionId, TabId, TargetId};
use crate::model::{CallOutcome, ConsoleLevel, Protocol, TabStatus};
use crate::protocol::brop::{BropRequest, BropResponse};
use crate::protocol::cdp::{self, CdpEvent, CdpRequest, CdpResponse, TargetInfo};

#[derive(Clone, Copy)]
struct AutoAttachConfig {
    flatten: bool,
}

struct CdpClientState {
    tx: mpsc::Sender<String>,
    discover_targets: bool,
    auto_attach: Option<AutoAttachConfig>,
}

/// Methods that must carry a `tabId` in their params (spec §4.3: "Missing
/// `tabId` on a tab-scoped request -> *bad-request*").
const BROP_TAB_SCOPED: &[&str] = &[
    "close_tab",
    "navigate",
    "get_console_logs",
    "execute_console",
    "evaluate_js",
    "get_page_content",
    "get_screenshot",
    "get_simplified_dom",
    "click",
    "type",
    "wait_for_element",
    "get_element",
];

pub struct Router {
    bridge: Arc<Bridge>,
    cdp_clients: Mutex<HashMap<ClientId, CdpClientState>>,
}

impl Router {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            bridge,
            cdp_clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_cdp_client(&self, client_id: ClientId, tx: mpsc::Sender<String>) {
        self.cdp_clients.lock().insert(
            client_id,
            CdpClientState {
                tx,
                discover_targets: false,
                auto_attach: None,
            },
        );
    }

    /// Client disconnect cleanup (spec §4.6): every session it owned is
    /// torn down; its outbound queue is dropped.
    pub fn unregister_cdp_client(&self, client_id: ClientId) {
        self.cdp_clients.lock().remove(&client_id);
        self.bridge.registry.detach_sessions_for_client(client_id);
    }

    /// Enqueue an event frame for `client_id`. Per spec §5 backpressure
    /// policy, events are dropped (with a diagnostic CallLog entry) rather
    /// than blocking or disconnecting.
    fn push_event(&self, client_id: ClientId, frame: String) {
        let tx = { self.cdp_clients.lock().get(&client_id).map(|c| c.tx.clone()) };
        let Some(tx) = tx else { return };
        if tx.try_send(frame).is_err() {
            warn!(%client_id, "dropping event: client outbound queue full");
            self.bridge.call_log.push(
                now_ms(),
                Protocol::System,
                "backpressure-drop",
                "{}",
                CallOutcome::Error(format!("dropped event for {client_id}: queue full")),
                None,
            );
        }
    }

    /// Enqueue a response frame. Per spec §5, responses are never dropped:
    /// a full queue means the client is disconnected instead. Returns
    /// `false` when the caller should tear the connection down.
    fn push_response(&self, client_id: ClientId, frame: String) -> bool {
        let tx = { self.cdp_clients.lock().get(&client_id).map(|c| c.tx.clone()) };
        let Some(tx) = tx else { return false };
        if tx.try_send(frame).is_err() {
            warn!(%client_id, "disconnecting client: response queue full");
            false
        } else {
            true
        }
    }

    fn broadcast_to_discovering_clients(&self, frame: &str) {
        let targets: Vec<(ClientId, mpsc::Sender<String>)> = self
            .cdp_clients
            .lock()
            .iter()
            .filter(|(_, c)| c.discover_targets)
            .map(|(id, c)| (*id, c.tx.clone()))
            .collect();
        for (client_id, tx) in targets {
            if tx.try_send(frame.to_string()).is_err() {
                warn!(%client_id, "dropping targetCreated broadcast: queue full");
            }
        }
    }

    // ---- CDP ----------------------------------------------------------

    /// Handle one inbound CDP frame. Enqueues any resulting events, then
    /// the response, onto the requesting client's own outbound channel
    /// (preserving per-socket FIFO order, spec §5). Returns `false` if the
    /// client should be disconnected (response queue was full).
    pub async fn handle_cdp_request(&self, client_id: ClientId, raw: &str) -> bool {
        let req: CdpRequest = match serde_json::from_str(raw) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed CDP frame, dropping connection");
                return false;
            }
        };
        let started = now_ms();
        let method = req.method.clone();
        let session_id = req.session_id.clone();

        let outcome = self.dispatch_cdp(client_id, &req).await;
        let frame = match &outcome {
            Ok(result) => serde_json::to_string(&CdpResponse::ok(req.id, session_id.clone(), result.clone()))
                .unwrap_or_default(),
            Err(e) => serde_json::to_string(&CdpResponse::err(req.id, session_id.clone(), e))
                .unwrap_or_default(),
        };

        if self.bridge.config.enable_request_log {
            let log_outcome = match &outcome {
                Ok(v) => CallOutcome::Result(v.to_string()),
                Err(e) => CallOutcome::Error(e.to_string()),
            };
            self.bridge.call_log.push(
                started,
                Protocol::Cdp,
                method,
                &req.params.to_string(),
                log_outcome,
                Some(now_ms().saturating_sub(started)),
            );
        }

        self.push_response(client_id, frame)
    }

    async fn dispatch_cdp(&self, client_id: ClientId, req: &CdpRequest) -> Result<Value> {
        match req.method.as_str() {
            "Browser.getVersion" => Ok(cdp::browser_version()),

            "Target.setDiscoverTargets" => {
                let discover = bool_param(&req.params, "discover")?;
                let mut clients = self.cdp_clients.lock();
                if let Some(state) = clients.get_mut(&client_id) {
                    state.discover_targets = discover;
                }
                drop(clients);
                if discover {
                    for target in self.bridge.registry.all_targets() {
                        let info = self.target_info(&target.target_id);
                        if let Some(info) = info {
                            let ev = CdpEvent::new(
                                "Target.targetCreated",
                                serde_json::json!({ "targetInfo": info }),
                                None,
                            );
                            self.push_event(client_id, serde_json::to_string(&ev).unwrap());
                        }
                    }
                }
                Ok(serde_json::json!({}))
            }

            "Target.setAutoAttach" => {
                let flatten = bool_param(&req.params, "flatten").unwrap_or(true);
                let mut clients = self.cdp_clients.lock();
                if let Some(state) = clients.get_mut(&client_id) {
                    state.auto_attach = Some(AutoAttachConfig { flatten });
                }
                Ok(serde_json::json!({}))
            }

            "Target.createBrowserContext" => {
                let id = self.bridge.registry.create_browser_context();
                Ok(serde_json::json!({ "browserContextId": id.0 }))
            }

            "Target.disposeBrowserContext" => {
                let id = str_param(&req.params, "browserContextId")?;
                self.bridge
                    .registry
                    .dispose_browser_context(&BrowserContextId(id.to_string()));
                Ok(serde_json::json!({}))
            }

            "Target.getTargets" => {
                let infos: Vec<TargetInfo> = self
                    .bridge
                    .registry
                    .all_targets()
                    .iter()
                    .filter_map(|t| self.target_info(&t.target_id))
                    .collect();
                Ok(serde_json::json!({ "targetInfos": infos }))
            }

            "Target.createTarget" => self.handle_create_target(client_id, req).await,

            "Target.attachToTarget" => {
                let target_id = TargetId(str_param(&req.params, "targetId")?.to_string());
                let flatten = bool_param(&req.params, "flatten").unwrap_or(true);
                let session_id = self
                    .bridge
                    .registry
                    .attach_session(target_id.clone(), client_id, flatten)?;
                if let Some(info) = self.target_info(&target_id) {
                    let ev = CdpEvent::new(
                        "Target.attachedToTarget",
                        serde_json::json!({
                            "sessionId": session_id.0,
                            "targetInfo": info,
                            "waitingForDebugger": false,
                        }),
                        None,
                    );
                    self.push_event(client_id, serde_json::to_string(&ev).unwrap());
                }
                Ok(serde_json::json!({ "sessionId": session_id.0 }))
            }

            "Target.detachFromTarget" => {
                let sid = SessionId(str_param(&req.params, "sessionId")?.to_string());
                let session = self
                    .bridge
                    .registry
                    .detach_session(&sid)
                    .ok_or_else(|| BridgeError::InvalidSession(sid.0.clone()))?;
                let ev = CdpEvent::new(
                    "Target.detachedFromTarget",
                    serde_json::json!({ "sessionId": session.session_id.0 }),
                    None,
                );
                self.push_event(session.owner, serde_json::to_string(&ev).unwrap());
                Ok(serde_json::json!({}))
            }

            "Target.closeTarget" => {
                let target_id = TargetId(str_param(&req.params, "targetId")?.to_string());
                self.close_target_and_notify(&target_id).await?;
                Ok(serde_json::json!({ "success": true }))
            }

            "Page.enable" | "Runtime.enable" | "Network.enable" | "DOM.enable" => {
                Ok(serde_json::json!({}))
            }

            "Page.navigate" => {
                let (_, _, tab_id) = self.resolve_session(req)?;
                let url = str_param(&req.params, "url")?;
                self.bridge
                    .extension
                    .call(
                        "navigate",
                        serde_json::json!({ "tabId": tab_id.0, "url": url }),
                        self.bridge.config.extension_call_timeout(),
                    )
                    .await?;
                Ok(serde_json::json!({ "frameId": format!("frame-{}", tab_id.0) }))
            }

            "Page.captureScreenshot" => {
                let (_, _, tab_id) = self.resolve_session(req)?;
                self.bridge
                    .extension
                    .call(
                        "get_screenshot",
                        serde_json::json!({ "tabId": tab_id.0 }),
                        self.bridge.config.extension_call_timeout(),
                    )
                    .await
            }

            "Page.getFrameTree" => {
                let (_, _, tab_id) = self.resolve_session(req)?;
                let tab = self.bridge.registry.tab(tab_id);
                Ok(serde_json::json!({
                    "frameTree": {
                        "frame": {
                            "id": format!("frame-{}", tab_id.0),
                            "url": tab.map(|t| t.url).unwrap_or_default(),
                        }
                    }
                }))
            }

            "Runtime.evaluate" => self.handle_runtime_evaluate(req).await,

            "DOM.getDocument" => {
                let (_, _, tab_id) = self.resolve_session(req)?;
                self.bridge
                    .extension
                    .call(
                        "get_simplified_dom",
                        serde_json::json!({ "tabId": tab_id.0 }),
                        self.bridge.config.extension_call_timeout(),
                    )
                    .await
            }

            "DOM.querySelector" => {
                let (_, _, tab_id) = self.resolve_session(req)?;
                let mut params = req.params.clone();
                merge_tab_id(&mut params, tab_id);
                self.bridge
                    .extension
                    .call("get_element", params, self.bridge.config.extension_call_timeout())
                    .await
            }

            "Input.dispatchMouseEvent" => {
                let (_, _, tab_id) = self.resolve_session(req)?;
                let mut params = req.params.clone();
                merge_tab_id(&mut params, tab_id);
                self.bridge
                    .extension
                    .call("click", params, self.bridge.config.extension_call_timeout())
                    .await
            }

            "Input.insertText" => {
                let (_, _, tab_id) = self.resolve_session(req)?;
                let mut params = req.params.clone();
                merge_tab_id(&mut params, tab_id);
                self.bridge
                    .extension
                    .call("type", params, self.bridge.config.extension_call_timeout())
                    .await
            }

            other => Err(BridgeError::UnknownMethod(other.to_string())),
        }
    }

    async fn handle_create_target(&self, client_id: ClientId, req: &CdpRequest) -> Result<Value> {
        let url = str_param(&req.params, "url")?;
        let context_id = match req.params.get("browserContextId").and_then(Value::as_str) {
            Some(s) => BrowserContextId(s.to_string()),
            None => BrowserContextId::default_context(),
        };
        if !self.bridge.registry.context_exists(&context_id) {
            return Err(BridgeError::BadRequest(format!(
                "unknown browserContextId: {}",
                context_id.0
            )));
        }

        let result = self
            .bridge
            .extension
            .call(
                "create_tab",
                serde_json::json!({ "url": url }),
                self.bridge.config.extension_call_timeout(),
            )
            .await?;
        let tab_id = TabId(
            result
                .get("tabId")
                .and_then(Value::as_u64)
                .ok_or_else(|| BridgeError::ExtensionError("create_tab missing tabId".into()))?,
        );

        let target_id = self
            .bridge
            .registry
            .register_tab(tab_id, url, &self.bridge.config.target_id_prefix);
        self.bridge.registry.set_target_context(&target_id, context_id);

        if let Some(info) = self.target_info(&target_id) {
            self.broadcast_to_discovering_clients(
                &serde_json::to_string(&CdpEvent::new(
                    "Target.targetCreated",
                    serde_json::json!({ "targetInfo": info }),
                    None,
                ))
                .unwrap(),
            );
        }

        let auto_attach = self.cdp_clients.lock().get(&client_id).and_then(|c| c.auto_attach);
        if let Some(cfg) = auto_attach {
            let session_id = self
                .bridge
                .registry
                .attach_session(target_id.clone(), client_id, cfg.flatten)?;
            if let Some(info) = self.target_info(&target_id) {
                let ev = CdpEvent::new(
                    "Target.attachedToTarget",
                    serde_json::json!({
                        "sessionId": session_id.0,
                        "targetInfo": info,
                        "waitingForDebugger": false,
                    }),
                    None,
                );
                self.push_event(client_id, serde_json::to_string(&ev).unwrap());
            }
        }

        Ok(serde_json::json!({ "targetId": target_id.0 }))
    }

    async fn handle_runtime_evaluate(&self, req: &CdpRequest) -> Result<Value> {
        let (_, _, tab_id) = self.resolve_session(req)?;
        let code = str_param(&req.params, "expression")?;
        match self
            .bridge
            .extension
            .call(
                "evaluate_js",
                serde_json::json!({ "tabId": tab_id.0, "code": code }),
                self.bridge.config.extension_call_timeout(),
            )
            .await
        {
            Ok(value) => Ok(serde_json::json!({ "result": { "type": "object", "value": value } })),
            // SPEC_FULL.md Open Question 3: CSP/evaluation failures surface
            // as `exceptionDetails` in a success response, not a protocol error.
            Err(BridgeError::ExtensionError(message)) => Ok(serde_json::json!({
                "result": { "type": "undefined" },
                "exceptionDetails": { "text": message },
            })),
            Err(other) => Err(other),
        }
    }

    /// Resolve a CDP request's `sessionId` to (session, target, tab).
    fn resolve_session(&self, req: &CdpRequest) -> Result<(SessionId, TargetId, TabId)> {
        let sid = req
            .session_id
            .as_ref()
            .ok_or_else(|| BridgeError::BadRequest("missing sessionId".into()))?;
        let sid = SessionId(sid.clone());
        let session = self
            .bridge
            .registry
            .session(&sid)
            .ok_or_else(|| BridgeError::InvalidSession(sid.0.clone()))?;
        let target = self
            .bridge
            .registry
            .target(&session.target_id)
            .ok_or_else(|| BridgeError::TargetGone(session.target_id.to_string()))?;
        if !target.is_attached() {
            return Err(BridgeError::TargetGone(session.target_id.to_string()));
        }
        Ok((sid, session.target_id, target.tab_id))
    }

    fn target_info(&self, target_id: &TargetId) -> Option<TargetInfo> {
        let target = self.bridge.registry.target(target_id)?;
        let tab = self.bridge.registry.tab(target.tab_id);
        Some(TargetInfo {
            target_id: target.target_id.0.clone(),
            target_type: target.target_type,
            title: tab.as_ref().map(|t| t.title.clone()).unwrap_or_default(),
            url: tab.map(|t| t.url).unwrap_or_default(),
            attached: target.is_attached(),
            browser_context_id: target.browser_context_id.0.clone(),
        })
    }

    /// Shared teardown for CDP `Target.closeTarget`, BROP `close_tab`, and
    /// an external tab close reported by the extension. Notifies every
    /// attached session's owning client before returning (spec §4.4.2,
    /// §4.6, scenario S4).
    async fn close_target_and_notify(&self, target_id: &TargetId) -> Result<TabId> {
        let target = self
            .bridge
            .registry
            .target(target_id)
            .ok_or_else(|| BridgeError::TargetGone(target_id.to_string()))?;
        let tab_id = target.tab_id;

        let _ = self
            .bridge
            .extension
            .call(
                "close_tab",
                serde_json::json!({ "tabId": tab_id.0 }),
                self.bridge.config.extension_call_timeout(),
            )
            .await;

        self.notify_target_destroyed(target_id, tab_id);
        Ok(tab_id)
    }

    fn notify_target_destroyed(&self, target_id: &TargetId, tab_id: TabId) {
        let (_, removed) = match self.bridge.registry.close_target(target_id) {
            Some(v) => v,
            None => return,
        };
        self.bridge.console_logs.clear_tab(tab_id);

        let destroyed = CdpEvent::new(
            "Target.targetDestroyed",
            serde_json::json!({ "targetId": target_id.0 }),
            None,
        );
        let destroyed_json = serde_json::to_string(&destroyed).unwrap();
        self.broadcast_to_discovering_clients(&destroyed_json);

        for session in removed {
            let detached = CdpEvent::new(
                "Target.detachedFromTarget",
                serde_json::json!({ "sessionId": session.session_id.0, "targetId": target_id.0 }),
                None,
            );
            self.push_event(session.owner, serde_json::to_string(&detached).unwrap());
        }
    }

    // ---- BROP -----------------------------------------------------------

    pub async fn handle_brop_request(&self, raw: &str) -> String {
        let started = now_ms();
        let req = match BropRequest::parse(raw) {
            Ok(r) => r,
            Err(e) => {
                let resp = BropResponse::err(0, &e);
                return serde_json::to_string(&resp).unwrap_or_default();
            }
        };
        let method = req.method.clone();
        let outcome = self.dispatch_brop(&req).await;
        let frame = match &outcome {
            Ok(result) => BropResponse::ok(req.id, result.clone()),
            Err(e) => BropResponse::err(req.id, e),
        };

        if self.bridge.config.enable_request_log {
            let log_outcome = match &outcome {
                Ok(v) => CallOutcome::Result(v.to_string()),
                Err(e) => CallOutcome::Error(e.to_string()),
            };
            self.bridge.call_log.push(
                started,
                Protocol::Brop,
                method,
                &req.params.to_string(),
                log_outcome,
                Some(now_ms().saturating_sub(started)),
            );
        }

        serde_json::to_string(&frame).unwrap_or_default()
    }

    async fn dispatch_brop(&self, req: &BropRequest) -> Result<Value> {
        if BROP_TAB_SCOPED.contains(&req.method.as_str()) && req.params.get("tabId").is_none() {
            return Err(BridgeError::BadRequest(format!(
                "{} requires tabId",
                req.method
            )));
        }

        match req.method.as_str() {
            "list_tabs" => {
                let tabs: Vec<Value> = self
                    .bridge
                    .registry
                    .all_tabs()
                    .into_iter()
                    .map(|t| {
                        serde_json::json!({
                            "tabId": t.tab_id.0,
                            "url": t.url,
                            "title": t.title,
                            "status": t.status,
                        })
                    })
                    .collect();
                Ok(serde_json::json!({ "tabs": tabs }))
            }

            "create_tab" => {
                let url = str_param(&req.params, "url")?;
                let result = self
                    .bridge
                    .extension
                    .call(
                        "create_tab",
                        serde_json::json!({ "url": url }),
                        self.bridge.config.extension_call_timeout(),
                    )
                    .await?;
                let tab_id = TabId(
                    result
                        .get("tabId")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| BridgeError::ExtensionError("create_tab missing tabId".into()))?,
                );
                self.bridge
                    .registry
                    .register_tab(tab_id, url, &self.bridge.config.target_id_prefix);
                Ok(serde_json::json!({ "tabId": tab_id.0 }))
            }

            "close_tab" => {
                let tab_id = TabId(u64_param(&req.params, "tabId")?);
                let target_id = self
                    .bridge
                    .registry
                    .resolve_tab(tab_id)
                    .ok_or_else(|| BridgeError::TargetGone(tab_id.to_string()))?;
                self.close_target_and_notify(&target_id).await?;
                Ok(serde_json::json!({}))
            }

            "navigate" => {
                let tab_id = TabId(u64_param(&req.params, "tabId")?);
                let url = str_param(&req.params, "url")?;
                let result = self
                    .bridge
                    .extension
                    .call(
                        "navigate",
                        serde_json::json!({ "tabId": tab_id.0, "url": url }),
                        self.bridge.config.extension_call_timeout(),
                    )
                    .await?;
                Ok(result)
            }

            "get_console_logs" => {
                let tab_id = TabId(u64_param(&req.params, "tabId")?);
                let limit = req.params.get("limit").and_then(Value::as_u64).map(|n| n as usize);
                let level = req
                    .params
                    .get("level")
                    .and_then(Value::as_str)
                    .and_then(ConsoleLevel::parse);
                let logs = self.bridge.console_logs.query(tab_id, limit, level);
                Ok(serde_json::json!({ "logs": logs }))
            }

            "execute_console" | "evaluate_js" => self.forward_tab_scoped(req, "evaluate_js").await,
            "get_page_content" => self.forward_tab_scoped(req, "get_page_content").await,
            "get_screenshot" => self.forward_tab_scoped(req, "get_screenshot").await,
            "get_simplified_dom" => self.forward_tab_scoped(req, "get_simplified_dom").await,
            "click" => self.forward_tab_scoped(req, "click").await,
            "type" => self.forward_tab_scoped(req, "type").await,
            "wait_for_element" => self.forward_tab_scoped(req, "wait_for_element").await,
            "get_element" => self.forward_tab_scoped(req, "get_element").await,

            "get_extension_version" | "get_extension_errors" | "clear_extension_errors" => {
                let op = req.method.clone();
                self.bridge
                    .extension
                    .call(&op, req.params.clone(), self.bridge.config.extension_call_timeout())
                    .await
            }

            other => Err(BridgeError::UnknownMethod(other.to_string())),
        }
    }

    async fn forward_tab_scoped(&self, req: &BropRequest, op: &str) -> Result<Value> {
        self.bridge
            .extension
            .call(op, req.params.clone(), self.bridge.config.extension_call_timeout())
            .await
    }

    // ---- Extension events -----------------------------------------------

    /// Classify and route one unsolicited extension event (spec §4.5).
    pub fn handle_extension_event(&self, event: ExtensionEvent) {
        if self.bridge.config.enable_request_log {
            self.bridge.call_log.push(
                now_ms(),
                Protocol::CdpEvent,
                event.event.clone(),
                &event.params.to_string(),
                CallOutcome::Result("fanned out".to_string()),
                None,
            );
        }

        match event.event.as_str() {
            "tab_created" => {
                let Some(tab_id) = event.params.get("tabId").and_then(Value::as_u64) else {
                    return;
                };
                let url = event.params.get("url").and_then(Value::as_str).unwrap_or("");
                self.bridge
                    .registry
                    .register_tab(TabId(tab_id), url, &self.bridge.config.target_id_prefix);
            }

            "tab_updated" => {
                let Some(tab_id) = event.params.get("tabId").and_then(Value::as_u64) else {
                    return;
                };
                let tab_id = TabId(tab_id);
                let url = event.params.get("url").and_then(Value::as_str);
                let title = event.params.get("title").and_then(Value::as_str);
                let status = event
                    .params
                    .get("status")
                    .and_then(Value::as_str)
                    .and_then(parse_tab_status);
                self.bridge.registry.update_tab(tab_id, url, title, status);
                if let Some(url) = url {
                    self.fan_out_to_tab(
                        tab_id,
                        "Page.frameNavigated",
                        serde_json::json!({ "frame": { "url": url } }),
                    );
                }
            }

            "tab_removed" => {
                let Some(tab_id) = event.params.get("tabId").and_then(Value::as_u64) else {
                    return;
                };
                let tab_id = TabId(tab_id);
                if let Some(target_id) = self.bridge.registry.resolve_tab(tab_id) {
                    self.notify_target_destroyed(&target_id, tab_id);
                }
            }

            "console_message" => {
                let Some(tab_id) = event.params.get("tabId").and_then(Value::as_u64) else {
                    return;
                };
                let tab_id = TabId(tab_id);
                let level = event
                    .params
                    .get("level")
                    .and_then(Value::as_str)
                    .and_then(ConsoleLevel::parse)
                    .unwrap_or(ConsoleLevel::Log);
                let message = event
                    .params
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let source = event.params.get("source").and_then(Value::as_str).map(str::to_string);
                let line = event.params.get("line").and_then(Value::as_u64).map(|n| n as u32);
                let column = event.params.get("column").and_then(Value::as_u64).map(|n| n as u32);

                self.bridge.console_logs.append(
                    tab_id,
                    now_ms(),
                    level,
                    message.clone(),
                    source.clone(),
                    line,
                    column,
                );

                self.fan_out_to_tab(
                    tab_id,
                    "Runtime.consoleAPICalled",
                    serde_json::json!({
                        "type": level,
                        "args": [{ "type": "string", "value": message }],
                    }),
                );
            }

            "navigation_committed" => {
                let Some(tab_id) = event.params.get("tabId").and_then(Value::as_u64) else {
                    return;
                };
                let tab_id = TabId(tab_id);
                let url = event.params.get("url").and_then(Value::as_str).unwrap_or("");
                self.bridge.registry.update_tab(tab_id, Some(url), None, None);
                self.fan_out_to_tab(
                    tab_id,
                    "Page.frameNavigated",
                    serde_json::json!({ "frame": { "url": url } }),
                );
            }

            other => debug!(event = other, "unrecognized extension event, ignoring"),
        }
    }

    /// Extension channel dropped (spec §4.1, §4.6): every live target is
    /// torn down and its attached sessions notified, mirroring an external
    /// tab close for each one. The registry ends up empty; a fresh
    /// extension connection repopulates it from `list_tabs` (spec §4.1:
    /// "the registry is rebuilt from a fresh extension-provided target
    /// list").
    pub fn handle_extension_disconnected(&self) {
        for target in self.bridge.registry.all_targets() {
            if target.state != crate::model::TargetState::Destroyed {
                self.notify_target_destroyed(&target.target_id, target.tab_id);
            }
        }
    }

    fn fan_out_to_tab(&self, tab_id: TabId, method: &str, params: Value) {
        let Some(target_id) = self.bridge.registry.resolve_tab(tab_id) else {
            return;
        };
        for session_id in self.bridge.registry.sessions_for_target(&target_id) {
            let Some(session) = self.bridge.registry.session(&session_id) else {
                continue;
            };
            let ev = CdpEvent::new(method, params.clone(), Some(session_id.0.clone()));
            self.push_event(session.owner, serde_json::to_string(&ev).unwrap());
        }
    }
}

fn parse_tab_status(s: &str) -> Option<TabStatus> {
    match s {
        "loading" => Some(TabStatus::Loading),
        "complete" => Some(TabStatus::Complete),
        "closed" => Some(TabStatus::Closed),
        _ => None,
    }
}

fn merge_tab_id(params: &mut Value, tab_id: TabId) {
    if let Some(obj) = params.as_object_mut() {
        obj.insert("tabId".to_string(), serde_json::json!(tab_id.0));
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::BadRequest(format!("missing required field: {key}")))
}

fn bool_param(params: &Value, key: &str) -> Result<bool> {
    params
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| BridgeError::BadRequest(format!("missing required field: {key}")))
}

fn u64_param(params: &Value, key: &str) -> Result<u64> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| BridgeError::BadRequest(format!("missing required field: {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn router() -> Router {
        Router::new(Arc::new(Bridge::new(Config::default())))
    }

    #[tokio::test]
    async fn browser_get_version_needs_no_extension() {
        let r = router();
        let raw = r#"{"id":1,"method":"Browser.getVersion"}"#;
        let (tx, mut rx) = mpsc::channel(8);
        r.register_cdp_client(ClientId(1), tx);
        assert!(r.handle_cdp_request(ClientId(1), raw).await);
        let sent = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(v["id"], 1);
        assert!(v.get("sessionId").is_none());
        assert!(v["result"]["product"].is_string());
    }

    #[tokio::test]
    async fn unknown_cdp_method_replies_with_error_envelope() {
        let r = router();
        let (tx, mut rx) = mpsc::channel(8);
        r.register_cdp_client(ClientId(1), tx);
        r.handle_cdp_request(ClientId(1), r#"{"id":9,"method":"Nonsense.thing"}"#)
            .await;
        let sent = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(v["id"], 9);
        assert!(v["error"]["code"].is_i64());
    }

    #[tokio::test]
    async fn brop_list_tabs_with_no_tabs_returns_empty() {
        let r = router();
        let out = r.handle_brop_request(r#"{"id":1,"method":"list_tabs"}"#).await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["result"]["tabs"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn brop_legacy_command_form_navigate_requires_tab_id() {
        let r = router();
        let out = r
            .handle_brop_request(r#"{"id":2,"command":{"type":"navigate","url":"https://x"}}"#)
            .await;
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["success"], false);
        assert!(v["error"].as_str().unwrap().contains("tabId"));
    }

    #[tokio::test]
    async fn console_event_fans_out_to_attached_session() {
        let r = router();
        let (tx, mut rx) = mpsc::channel(8);
        r.register_cdp_client(ClientId(1), tx);

        r.bridge.registry.register_tab(TabId(1), "about:blank", "tab");
        let target_id = r.bridge.registry.resolve_tab(TabId(1)).unwrap();
        r.bridge
            .registry
            .attach_session(target_id, ClientId(1), true)
            .unwrap();

        r.handle_extension_event(ExtensionEvent {
            event: "console_message".into(),
            params: serde_json::json!({ "tabId": 1, "level": "log", "message": "hi" }),
        });

        let sent = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(v["method"], "Runtime.consoleAPICalled");
        assert!(v.get("id").is_none());
        assert_eq!(r.bridge.console_logs.len_for_tab(TabId(1)), 1);
    }

    #[tokio::test]
    async fn external_tab_close_notifies_attached_session_and_marks_target_gone() {
        let r = router();
        let (tx, mut rx) = mpsc::channel(8);
        r.register_cdp_client(ClientId(1), tx);

        r.bridge.registry.register_tab(TabId(5), "about:blank", "tab");
        let target_id = r.bridge.registry.resolve_tab(TabId(5)).unwrap();
        let session_id = r
            .bridge
            .registry
            .attach_session(target_id.clone(), ClientId(1), true)
            .unwrap();

        r.handle_extension_event(ExtensionEvent {
            event: "tab_removed".into(),
            params: serde_json::json!({ "tabId": 5 }),
        });

        let first = rx.recv().await.unwrap();
        assert!(first.contains("Target.targetDestroyed"));
        let second = rx.recv().await.unwrap();
        assert!(second.contains("Target.detachedFromTarget"));

        assert!(r.bridge.registry.session(&session_id).is_none());
    }
}
