//! Console Log Store: a per-tab bounded ring of console lines fed by
//! extension events, queryable by clients.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::ids::TabId;
use crate::model::{ConsoleEntry, ConsoleLevel};

static ENTRY_SEQ: AtomicU64 = AtomicU64::new(1);

pub struct ConsoleLogStore {
    max_per_tab: usize,
    tabs: Mutex<HashMap<TabId, VecDeque<ConsoleEntry>>>,
}

impl ConsoleLogStore {
    pub fn new(max_per_tab: usize) -> Self {
        Self {
            max_per_tab,
            tabs: Mutex::new(HashMap::new()),
        }
    }

    /// Append an entry, evicting the oldest if the per-tab ring is full.
    pub fn append(
        &self,
        tab_id: TabId,
        timestamp_ms: u64,
        level: ConsoleLevel,
        message: String,
        source: Option<String>,
        line: Option<u32>,
        column: Option<u32>,
    ) {
        let nonce = ENTRY_SEQ.fetch_add(1, Ordering::Relaxed);
        let entry = ConsoleEntry {
            id: format!("{timestamp_ms}-{nonce}"),
            tab_id,
            timestamp_ms,
            level,
            message,
            source,
            line,
            column,
        };

        let mut tabs = self.tabs.lock();
        let ring = tabs.entry(tab_id).or_default();
        if ring.len() >= self.max_per_tab {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    /// Return up to `limit` most-recent-first entries, optionally filtered
    /// by level.
    pub fn query(
        &self,
        tab_id: TabId,
        limit: Option<usize>,
        level: Option<ConsoleLevel>,
    ) -> Vec<ConsoleEntry> {
        let tabs = self.tabs.lock();
        let Some(ring) = tabs.get(&tab_id) else {
            return Vec::new();
        };
        let limit = limit.unwrap_or(ring.len());
        ring.iter()
            .rev()
            .filter(|e| level.map(|l| l == e.level).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len_for_tab(&self, tab_id: TabId) -> usize {
        self.tabs.lock().get(&tab_id).map_or(0, VecDeque::len)
    }

    /// Drop all entries for a tab on its destruction.
    pub fn clear_tab(&self, tab_id: TabId) {
        self.tabs.lock().remove(&tab_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(store: &ConsoleLogStore, tab: TabId, n: u64, msg: &str) {
        store.append(tab, n, ConsoleLevel::Log, msg.to_string(), None, None, None);
    }

    #[test]
    fn ring_is_bounded_with_fifo_eviction() {
        let store = ConsoleLogStore::new(3);
        for i in 0..5 {
            push(&store, TabId(1), i, &format!("line{i}"));
        }
        assert_eq!(store.len_for_tab(TabId(1)), 3);
        let entries = store.query(TabId(1), None, None);
        // most-recent-first
        assert_eq!(entries[0].message, "line4");
        assert_eq!(entries[2].message, "line2");
    }

    #[test]
    fn query_respects_limit_and_recency() {
        let store = ConsoleLogStore::new(2000);
        for i in 0..2000u64 {
            push(&store, TabId(1), i, &format!("l{i}"));
        }
        assert_eq!(store.len_for_tab(TabId(1)), 2000);
        let top50 = store.query(TabId(1), Some(50), None);
        assert_eq!(top50.len(), 50);
        assert_eq!(top50[0].message, "l1999");
        assert_eq!(top50[49].message, "l1950");
    }

    #[test]
    fn query_filters_by_level() {
        let store = ConsoleLogStore::new(10);
        store.append(TabId(1), 1, ConsoleLevel::Log, "a".into(), None, None, None);
        store.append(
            TabId(1),
            2,
            ConsoleLevel::Error,
            "b".into(),
            None,
            None,
            None,
        );
        let errors = store.query(TabId(1), None, Some(ConsoleLevel::Error));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "b");
    }

    #[test]
    fn clear_tab_drops_entries() {
        let store = ConsoleLogStore::new(10);
        push(&store, TabId(1), 1, "a");
        store.clear_tab(TabId(1));
        assert_eq!(store.len_for_tab(TabId(1)), 0);
    }

    #[test]
    fn tabs_are_isolated_from_each_other() {
        let store = ConsoleLogStore::new(10);
        push(&store, TabId(1), 1, "a");
        push(&store, TabId(2), 1, "b");
        assert_eq!(store.len_for_tab(TabId(1)), 1);
        assert_eq!(store.len_for_tab(TabId(2)), 1);
    }
}
