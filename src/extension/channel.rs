//! Extension Channel: the sole conduit to the browser extension.
//! Singleton, serial on write, concurrent on read.
//!
//! Shaped after a connection type with an atomic correlation counter, a
//! oneshot-per-call pending map, broadcast event fan-out, and an
//! `mpsc`-fed writer task — adapted from a client that dials out to a
//! server that instead accepts the extension's single inbound connection
//! and routes replies by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::ids::CorrelationId;
use crate::extension::wire::{ExtensionEvent, ExtensionInbound, ExtensionReply, ExtensionRequest};

const EVENT_CHANNEL_SIZE: usize = 1024;
const LIFECYCLE_CHANNEL_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionLifecycle {
    Connected,
    Disconnected,
}

struct PendingCall {
    reply_tx: oneshot::Sender<ExtensionReply>,
}

pub struct ExtensionChannel {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_id: AtomicU64,
    events: broadcast::Sender<ExtensionEvent>,
    lifecycle: broadcast::Sender<ExtensionLifecycle>,
    connected: AtomicBool,
}

impl ExtensionChannel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_CHANNEL_SIZE);
        Self {
            tx: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
            lifecycle,
            connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExtensionEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<ExtensionLifecycle> {
        self.lifecycle.subscribe()
    }

    /// Called by the extension server when a new extension connection is
    /// accepted. `writer` feeds the single write task for that socket.
    pub async fn on_connect(&self, writer: mpsc::UnboundedSender<String>) {
        *self.tx.lock().await = Some(writer);
        self.connected.store(true, Ordering::Release);
        let _ = self.lifecycle.send(ExtensionLifecycle::Connected);
    }

    /// Called when the extension connection drops. Fails every outstanding
    /// `PendingCall` with `extension-disconnected`.
    pub async fn on_disconnect(&self) {
        *self.tx.lock().await = None;
        self.connected.store(false, Ordering::Release);
        let mut pending = self.pending.lock().await;
        for (id, call) in pending.drain() {
            debug!(corr = id, "abandoning pending extension call: disconnected");
            // Dropping the sender (rather than sending) causes `call()`'s
            // await on the receiver to observe a RecvError, which it maps
            // to ExtensionDisconnected — matches the BridgeError variant.
            drop(call.reply_tx);
        }
        let _ = self.lifecycle.send(ExtensionLifecycle::Disconnected);
    }

    /// Dispatch one inbound frame from the extension: route replies to
    /// their pending call, broadcast events to subscribers. An orphan
    /// reply (no matching pending call) is discarded, never routed.
    pub async fn dispatch_inbound(&self, frame: ExtensionInbound) -> Option<ExtensionEvent> {
        match frame {
            ExtensionInbound::Reply(reply) => {
                let mut pending = self.pending.lock().await;
                if let Some(call) = pending.remove(&reply.corr) {
                    let _ = call.reply_tx.send(reply);
                } else {
                    warn!(corr = reply.corr, "orphan extension reply discarded");
                }
                None
            }
            ExtensionInbound::Event(event) => {
                let _ = self.events.send(event.clone());
                Some(event)
            }
        }
    }

    /// Issue a call to the extension and await its reply, subject to
    /// `timeout`. Fails fast with `extension-disconnected` if no
    /// connection is currently attached.
    pub async fn call(
        &self,
        op: &str,
        params: serde_json::Value,
        timeout: std::time::Duration,
    ) -> Result<serde_json::Value> {
        let writer = {
            let guard = self.tx.lock().await;
            guard.clone()
        };
        let Some(writer) = writer else {
            return Err(BridgeError::ExtensionDisconnected);
        };

        let corr = CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = ExtensionRequest::new(corr, op, params);
        let json = serde_json::to_string(&request)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(corr.0, PendingCall { reply_tx });
        }

        if writer.send(json).is_err() {
            self.pending.lock().await.remove(&corr.0);
            return Err(BridgeError::ExtensionDisconnected);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => {
                if reply.ok {
                    Ok(reply.result.unwrap_or(serde_json::Value::Null))
                } else {
                    let message = reply
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unknown extension error".to_string());
                    Err(BridgeError::ExtensionError(message))
                }
            }
            Ok(Err(_)) => Err(BridgeError::ExtensionDisconnected),
            Err(_) => {
                self.pending.lock().await.remove(&corr.0);
                Err(BridgeError::ExtensionTimeout(timeout))
            }
        }
    }
}

impl Default for ExtensionChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn call_fails_fast_when_not_connected() {
        let channel = ExtensionChannel::new();
        let err = channel
            .call("Extension.ping", serde_json::json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ExtensionDisconnected));
    }

    #[tokio::test]
    async fn call_round_trips_through_a_fake_extension() {
        let channel = ExtensionChannel::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        channel.on_connect(tx).await;
        assert!(channel.is_connected());

        let call_fut = channel.call(
            "list_tabs",
            serde_json::json!({}),
            Duration::from_secs(5),
        );

        // Drive the "fake extension" concurrently: read the outbound
        // request, reply with a matching corr.
        let responder = async {
            let sent = rx.recv().await.unwrap();
            let req: serde_json::Value = serde_json::from_str(&sent).unwrap();
            assert_eq!(req["op"], "list_tabs");
            let corr = req["corr"].as_u64().unwrap();
            let reply = ExtensionInbound::Reply(ExtensionReply {
                corr,
                ok: true,
                result: Some(serde_json::json!({"tabs": []})),
                error: None,
            });
            channel.dispatch_inbound(reply).await;
        };

        let (result, _) = tokio::join!(call_fut, responder);
        let value = result.unwrap();
        assert_eq!(value["tabs"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn call_surfaces_structured_extension_errors() {
        let channel = ExtensionChannel::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        channel.on_connect(tx).await;

        let call_fut = channel.call("navigate", serde_json::json!({}), Duration::from_secs(5));
        let responder = async {
            let sent = rx.recv().await.unwrap();
            let req: serde_json::Value = serde_json::from_str(&sent).unwrap();
            let corr = req["corr"].as_u64().unwrap();
            channel
                .dispatch_inbound(ExtensionInbound::Reply(ExtensionReply {
                    corr,
                    ok: false,
                    result: None,
                    error: Some(crate::extension::wire::ExtensionError {
                        message: "tab closed".into(),
                        code: None,
                    }),
                }))
                .await;
        };
        let (result, _) = tokio::join!(call_fut, responder);
        let err = result.unwrap_err();
        assert!(matches!(err, BridgeError::ExtensionError(m) if m == "tab closed"));
    }

    #[tokio::test]
    async fn call_times_out_and_removes_pending_entry() {
        let channel = ExtensionChannel::new();
        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        channel.on_connect(tx).await;

        let err = channel
            .call("slow_op", serde_json::json!({}), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ExtensionTimeout(_)));
        assert!(channel.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_fails_all_pending_calls() {
        let channel = std::sync::Arc::new(ExtensionChannel::new());
        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        channel.on_connect(tx).await;

        let c1 = channel.clone();
        let handle = tokio::spawn(async move {
            c1.call("op", serde_json::json!({}), Duration::from_secs(5))
                .await
        });

        // Give the call a moment to register itself as pending.
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.on_disconnect().await;

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::ExtensionDisconnected));
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn orphan_reply_is_discarded_not_routed() {
        let channel = ExtensionChannel::new();
        // No call was ever made for corr=999; dispatching a reply for it
        // must not panic and must not be observable anywhere.
        channel
            .dispatch_inbound(ExtensionInbound::Reply(ExtensionReply {
                corr: 999,
                ok: true,
                result: Some(serde_json::json!(null)),
                error: None,
            }))
            .await;
        assert!(channel.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn events_are_broadcast_to_subscribers() {
        let channel = ExtensionChannel::new();
        let mut rx1 = channel.subscribe_events();
        let mut rx2 = channel.subscribe_events();

        channel
            .dispatch_inbound(ExtensionInbound::Event(ExtensionEvent {
                event: "tab.created".into(),
                params: serde_json::json!({"tabId": 1}),
            }))
            .await;

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event, "tab.created");
        assert_eq!(e2.event, "tab.created");
    }
}
