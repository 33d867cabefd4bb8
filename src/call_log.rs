//! CallLog: a bounded, operator-facing audit ring of every request/response
//! cycle across all dialects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::model::{truncate_for_log, CallLogEntry, CallOutcome, Protocol};

const MAX_PAYLOAD_LEN: usize = 2048;

static CALL_LOG_SEQ: AtomicU64 = AtomicU64::new(1);

pub struct CallLogStore {
    max_entries: usize,
    entries: Mutex<VecDeque<CallLogEntry>>,
}

impl CallLogStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(
        &self,
        timestamp_ms: u64,
        protocol: Protocol,
        method: impl Into<String>,
        params: &str,
        outcome: CallOutcome,
        duration_ms: Option<u64>,
    ) -> u64 {
        let id = CALL_LOG_SEQ.fetch_add(1, Ordering::Relaxed);
        let outcome = match outcome {
            CallOutcome::Result(s) => CallOutcome::Result(truncate_for_log(&s, MAX_PAYLOAD_LEN)),
            CallOutcome::Error(s) => CallOutcome::Error(truncate_for_log(&s, MAX_PAYLOAD_LEN)),
            CallOutcome::Pending => CallOutcome::Pending,
        };
        let entry = CallLogEntry {
            id,
            timestamp_ms,
            protocol,
            method: method.into(),
            params: truncate_for_log(params, MAX_PAYLOAD_LEN),
            outcome,
            duration_ms,
        };

        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
        id
    }

    pub fn recent(&self, limit: usize) -> Vec<CallLogEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_ring_evicts_oldest() {
        let log = CallLogStore::new(2);
        log.push(1, Protocol::Brop, "m1", "{}", CallOutcome::Pending, None);
        log.push(2, Protocol::Brop, "m2", "{}", CallOutcome::Pending, None);
        log.push(3, Protocol::Brop, "m3", "{}", CallOutcome::Pending, None);
        assert_eq!(log.len(), 2);
        let recent = log.recent(10);
        assert_eq!(recent[0].method, "m3");
        assert_eq!(recent[1].method, "m2");
    }

    #[test]
    fn large_payloads_are_truncated() {
        let log = CallLogStore::new(10);
        let huge = "x".repeat(5000);
        log.push(
            1,
            Protocol::Cdp,
            "Runtime.evaluate",
            &huge,
            CallOutcome::Result(huge.clone()),
            Some(5),
        );
        let entry = &log.recent(1)[0];
        assert!(entry.params.len() < huge.len());
        assert!(entry.params.contains("truncated"));
    }
}
