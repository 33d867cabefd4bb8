//! Discovery HTTP endpoint (spec.md §2 item 6, §4.8, §6).
//!
//! Byte-compatible with Chrome's own `/json*` surface so that Playwright-
//! style clients that probe it before opening the CDP websocket see exactly
//! the documents they expect. Built with `axum`, grounded on the same
//! crate the pack's `dialog-remote` reaches for when it needs an HTTP
//! surface (spec.md's ambient-stack precedent), one handler per route,
//! sharing the `Bridge` via `axum::extract::State`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, put};
use serde_json::{json, Value};
use tracing::info;

use crate::bridge::Bridge;
use crate::error::Result;
use crate::ids::{TabId, TargetId};

pub async fn serve(bridge: Arc<Bridge>) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], bridge.config.http_port));
    let app = axum::Router::new()
        .route("/json/version", get(version))
        .route("/json", get(list))
        .route("/json/list", get(list))
        .route("/json/new", put(new_target))
        .route("/json/activate/:target_id", get(activate))
        .route("/json/close/:target_id", get(close))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(bridge.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "discovery HTTP endpoint listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::BridgeError::internal(e.to_string()))?;
    Ok(())
}

fn ws_url_for(bridge: &Bridge, target_id: &TargetId) -> String {
    format!(
        "ws://127.0.0.1:{}/devtools/page/{}",
        bridge.config.cdp_port, target_id.0
    )
}

fn target_entry(bridge: &Bridge, target_id: &TargetId) -> Option<Value> {
    let target = bridge.registry.target(target_id)?;
    let tab = bridge.registry.tab(target.tab_id);
    Some(json!({
        "id": target.target_id.0,
        "title": tab.as_ref().map(|t| t.title.clone()).unwrap_or_default(),
        "type": "page",
        "url": tab.map(|t| t.url).unwrap_or_default(),
        "webSocketDebuggerUrl": ws_url_for(bridge, &target.target_id),
    }))
}

async fn version(State(bridge): State<Arc<Bridge>>) -> Json<Value> {
    Json(json!({
        "Browser": "BROP-Bridge/1.0",
        "Protocol-Version": "1.3",
        "User-Agent": "Mozilla/5.0 (compatible; BROP-Bridge)",
        "V8-Version": "0",
        "WebKit-Version": "0",
        "webSocketDebuggerUrl": format!("ws://127.0.0.1:{}", bridge.config.cdp_port),
    }))
}

async fn list(State(bridge): State<Arc<Bridge>>) -> Json<Vec<Value>> {
    let entries: Vec<Value> = bridge
        .registry
        .all_targets()
        .iter()
        .filter_map(|t| target_entry(&bridge, &t.target_id))
        .collect();
    Json(entries)
}

async fn new_target(
    State(bridge): State<Arc<Bridge>>,
    axum::extract::RawQuery(raw_query): axum::extract::RawQuery,
) -> impl IntoResponse {
    let url = raw_query
        .as_deref()
        .filter(|q| !q.is_empty())
        .unwrap_or("about:blank");

    let result = bridge
        .extension
        .call(
            "create_tab",
            json!({ "url": url }),
            bridge.config.extension_call_timeout(),
        )
        .await;

    let result = match result {
        Ok(v) => v,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response(),
    };

    let Some(tab_id) = result.get("tabId").and_then(Value::as_u64) else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "create_tab missing tabId" })),
        )
            .into_response();
    };

    let target_id = bridge
        .registry
        .register_tab(TabId(tab_id), url, &bridge.config.target_id_prefix);

    match target_entry(&bridge, &target_id) {
        Some(entry) => (StatusCode::OK, Json(entry)).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "target not found" }))).into_response(),
    }
}

async fn activate(
    State(bridge): State<Arc<Bridge>>,
    Path(target_id): Path<String>,
) -> impl IntoResponse {
    let target_id = TargetId(target_id);
    let Some(target) = bridge.registry.target(&target_id) else {
        return (StatusCode::NOT_FOUND, "No such target id".to_string());
    };
    let _ = bridge
        .extension
        .call(
            "activate_tab",
            json!({ "tabId": target.tab_id.0 }),
            bridge.config.extension_call_timeout(),
        )
        .await;
    (StatusCode::OK, "Target activated".to_string())
}

async fn close(
    State(bridge): State<Arc<Bridge>>,
    Path(target_id): Path<String>,
) -> impl IntoResponse {
    let target_id = TargetId(target_id);
    let Some(target) = bridge.registry.target(&target_id) else {
        return (StatusCode::NOT_FOUND, "No such target id".to_string());
    };
    let _ = bridge
        .extension
        .call(
            "close_tab",
            json!({ "tabId": target.tab_id.0 }),
            bridge.config.extension_call_timeout(),
        )
        .await;
    bridge.registry.close_target(&target_id);
    bridge.console_logs.clear_tab(target.tab_id);
    (StatusCode::OK, "Target is closing".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn ws_url_uses_cdp_port_and_target_id() {
        let bridge = Bridge::new(Config::default());
        let url = ws_url_for(&bridge, &TargetId("tab-deadbeef".into()));
        assert_eq!(url, "ws://127.0.0.1:9222/devtools/page/tab-deadbeef");
    }
}
