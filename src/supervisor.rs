//! Supervisor (spec.md §2 item 8): process lifecycle, port binding,
//! graceful shutdown, and the entry point that wires the Identifier
//! Registry, Extension Channel, and the four network endpoints together
//! through one `Bridge` value (spec.md §9: no process-wide globals).

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::bridge::Bridge;
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::router::Router;
use crate::servers::{brop_server, cdp_server, discovery_http, extension_server};

/// Grace window for in-flight responses to flush before the process exits
/// (spec.md §5: "Process shutdown cancels all tasks with a 2-second grace
/// window for flushing in-flight responses").
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Supervisor {
    bridge: Arc<Bridge>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self {
            bridge: Arc::new(Bridge::new(config)),
        }
    }

    pub async fn run(self) -> Result<()> {
        let router = Arc::new(Router::new(self.bridge.clone()));

        let cdp = tokio::spawn(bind_or_exit(cdp_server::serve(
            self.bridge.clone(),
            router.clone(),
        )));
        let brop = tokio::spawn(bind_or_exit(brop_server::serve(
            self.bridge.clone(),
            router.clone(),
        )));
        let ext = tokio::spawn(bind_or_exit(extension_server::serve(
            self.bridge.clone(),
            router.clone(),
        )));
        let http = tokio::spawn(bind_or_exit(discovery_http::serve(self.bridge.clone())));

        wait_for_shutdown_signal().await;
        info!("shutdown signal received, flushing in-flight work");
        tokio::time::sleep(SHUTDOWN_GRACE).await;

        cdp.abort();
        brop.abort();
        ext.abort();
        http.abort();

        Ok(())
    }
}

/// Each listener task runs forever on success; a bind failure is the one
/// outcome the Supervisor treats as fatal (spec.md §6 exit code 64).
async fn bind_or_exit(fut: impl std::future::Future<Output = Result<()>>) {
    if let Err(e) = fut.await {
        error!(error = %e, "endpoint failed to bind or crashed");
        if matches!(e, BridgeError::Io(_)) {
            std::process::exit(64);
        }
        std::process::exit(70);
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
