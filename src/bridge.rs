//! The explicit `Bridge` value: no process-wide globals, every
//! sub-component reached through one constructed struct passed by `Arc`
//! reference to each server task.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::call_log::CallLogStore;
use crate::config::Config;
use crate::console_log::ConsoleLogStore;
use crate::extension::ExtensionChannel;
use crate::registry::Registry;

pub struct Bridge {
    pub config: Config,
    pub registry: Registry,
    pub extension: ExtensionChannel,
    pub console_logs: ConsoleLogStore,
    pub call_log: CallLogStore,
}

impl Bridge {
    pub fn new(config: Config) -> Self {
        let console_logs = ConsoleLogStore::new(config.max_console_entries_per_tab);
        let call_log = CallLogStore::new(config.max_call_log_entries);
        Self {
            config,
            registry: Registry::new(),
            extension: ExtensionChannel::new(),
            console_logs,
            call_log,
        }
    }
}

/// Milliseconds since the Unix epoch, used for ConsoleEntry/CallLog
/// timestamps. Never a source of ids by itself (see `ids::SessionId` and
/// the various `AtomicU64` sequences for uniqueness).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
