//! Extension control endpoint (spec.md §2 item 2, §4.1, §6): the one
//! persistent connection the browser extension itself initiates.
//!
//! Shaped after `extension_bridge.rs`'s `serve`/`handle_connection`: a bare
//! `TcpListener::accept` loop, `accept_async` on each socket, a dedicated
//! write task fed by an `mpsc` channel. Unlike the teacher (which
//! multiplexes CLI one-shot callers and the extension over the same
//! listener), this endpoint exists solely for the extension, so there is no
//! first-message client-type sniff.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::bridge::Bridge;
use crate::error::Result;
use crate::extension::ExtensionInbound;
use crate::ids::TabId;
use crate::router::Router;

pub async fn serve(bridge: Arc<Bridge>, router: Arc<Router>) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], bridge.config.ext_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "extension control endpoint listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        if bridge.extension.is_connected() {
            warn!(%peer, "rejecting second extension connection: one is already attached");
            continue;
        }
        let bridge = bridge.clone();
        let router = router.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, bridge, router).await {
                warn!(error = %e, "extension connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    bridge: Arc<Bridge>,
    router: Arc<Router>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| crate::error::BridgeError::Internal {
            id: "ext-handshake".to_string(),
            message: e.to_string(),
        })?;
    let (mut write, mut read) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    bridge.extension.on_connect(tx).await;
    info!("extension connected");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Seed the registry with whatever tabs the extension already knows
    // about (spec §4.1: registry rebuild on (re)connect).
    seed_registry_from_extension(&bridge).await;

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ExtensionInbound>(&text) {
                Ok(inbound) => {
                    if let Some(event) = bridge.extension.dispatch_inbound(inbound).await {
                        router.handle_extension_event(event);
                    }
                }
                Err(e) => warn!(error = %e, "malformed frame from extension"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "extension websocket error");
                break;
            }
        }
    }

    info!("extension disconnected");
    bridge.extension.on_disconnect().await;
    router.handle_extension_disconnected();
    writer.abort();
    Ok(())
}

async fn seed_registry_from_extension(bridge: &Arc<Bridge>) {
    let Ok(result) = bridge
        .extension
        .call("list_tabs", serde_json::json!({}), bridge.config.extension_call_timeout())
        .await
    else {
        return;
    };
    let Some(tabs) = result.get("tabs").and_then(|v| v.as_array()) else {
        return;
    };
    for tab in tabs {
        let Some(tab_id) = tab.get("tabId").and_then(|v| v.as_u64()) else {
            continue;
        };
        let url = tab.get("url").and_then(|v| v.as_str()).unwrap_or("");
        bridge
            .registry
            .register_tab(TabId(tab_id), url, &bridge.config.target_id_prefix);
    }
}
