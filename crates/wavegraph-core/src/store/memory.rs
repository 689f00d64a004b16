//! # In-Memory Store Backend
//!
//! BTreeMaps behind a mutex. The backend of choice for tests and for
//! ephemeral runs; state is lost on process exit.

use super::{LogEntry, LogId, SignalStore};
use crate::WavegraphError;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// One per-key log stream.
#[derive(Debug, Default)]
struct LogState {
    next_id: LogId,
    entries: VecDeque<LogEntry>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    kv: BTreeMap<String, Vec<u8>>,
    logs: BTreeMap<String, LogState>,
    zsets: BTreeMap<String, BTreeMap<String, f64>>,
}

/// In-memory implementation of the store adapter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    watchers: Mutex<BTreeMap<String, watch::Sender<LogId>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // A poisoned lock only means a panicking test thread; the data is
        // still coherent for our single-map operations.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watch_sender(&self, key: &str, current: LogId) -> watch::Sender<LogId> {
        let mut watchers = self
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        watchers
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(current).0)
            .clone()
    }
}

impl SignalStore for MemoryStore {
    fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, WavegraphError> {
        Ok(self.lock().kv.get(key).cloned())
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), WavegraphError> {
        self.lock().kv.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn kv_exists(&self, key: &str) -> Result<bool, WavegraphError> {
        Ok(self.lock().kv.contains_key(key))
    }

    fn log_append(
        &self,
        key: &str,
        payload: &[u8],
        maxlen: Option<usize>,
    ) -> Result<LogId, WavegraphError> {
        let id = {
            let mut inner = self.lock();
            let log = inner.logs.entry(key.to_string()).or_default();
            log.next_id += 1;
            let id = log.next_id;
            log.entries.push_back(LogEntry {
                id,
                payload: payload.to_vec(),
            });

            if let Some(maxlen) = maxlen {
                while log.entries.len() > maxlen {
                    log.entries.pop_front();
                }
            }
            id
        };

        // Wake tailers after the lock is released.
        self.watch_sender(key, 0).send_replace(id);
        Ok(id)
    }

    fn log_latest(&self, key: &str) -> Result<Option<LogEntry>, WavegraphError> {
        Ok(self
            .lock()
            .logs
            .get(key)
            .and_then(|log| log.entries.back().cloned()))
    }

    fn log_read_after(
        &self,
        key: &str,
        after: Option<LogId>,
    ) -> Result<Vec<LogEntry>, WavegraphError> {
        let floor = after.unwrap_or(0);
        Ok(self
            .lock()
            .logs
            .get(key)
            .map(|log| {
                log.entries
                    .iter()
                    .filter(|entry| entry.id > floor)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn log_watch(&self, key: &str) -> watch::Receiver<LogId> {
        let current = self
            .lock()
            .logs
            .get(key)
            .map(|log| log.next_id)
            .unwrap_or(0);
        self.watch_sender(key, current).subscribe()
    }

    fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<bool, WavegraphError> {
        let mut inner = self.lock();
        let zset = inner.zsets.entry(key.to_string()).or_default();
        Ok(zset.insert(member.to_string(), score).is_none())
    }

    fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>, WavegraphError> {
        Ok(self
            .lock()
            .zsets
            .get(key)
            .and_then(|zset| zset.get(member).copied()))
    }

    fn zset_range_rev(
        &self,
        key: &str,
        max: f64,
        min: f64,
        limit: Option<usize>,
    ) -> Result<Vec<(String, f64)>, WavegraphError> {
        let inner = self.lock();
        let mut hits: Vec<(String, f64)> = inner
            .zsets
            .get(key)
            .map(|zset| {
                zset.iter()
                    .filter(|&(_, &score)| score >= min && score <= max)
                    .map(|(member, &score)| (member.clone(), score))
                    .collect()
            })
            .unwrap_or_default();

        // Highest score first; ties break on member for determinism.
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });

        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_round_trip() {
        let store = MemoryStore::new();
        assert!(!store.kv_exists("k").expect("exists"));

        store.kv_set("k", b"value").expect("set");
        assert!(store.kv_exists("k").expect("exists"));
        assert_eq!(store.kv_get("k").expect("get"), Some(b"value".to_vec()));
    }

    #[test]
    fn log_ids_are_monotonic_per_key() {
        let store = MemoryStore::new();
        let a = store.log_append("log", b"1", None).expect("append");
        let b = store.log_append("log", b"2", None).expect("append");
        let other = store.log_append("other", b"x", None).expect("append");

        assert!(b > a);
        assert_eq!(other, 1);
    }

    #[test]
    fn log_read_after_skips_consumed_entries() {
        let store = MemoryStore::new();
        let first = store.log_append("log", b"1", None).expect("append");
        store.log_append("log", b"2", None).expect("append");
        store.log_append("log", b"3", None).expect("append");

        let entries = store.log_read_after("log", Some(first)).expect("read");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload, b"2");
        assert_eq!(entries[1].payload, b"3");

        let all = store.log_read_after("log", None).expect("read");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn maxlen_trims_oldest_exactly() {
        let store = MemoryStore::new();
        store.log_append("sig", b"old", Some(1)).expect("append");
        store.log_append("sig", b"new", Some(1)).expect("append");

        let latest = store.log_latest("sig").expect("latest").expect("entry");
        assert_eq!(latest.payload, b"new");
        assert_eq!(store.log_read_after("sig", None).expect("read").len(), 1);
    }

    #[tokio::test]
    async fn watch_fires_on_append() {
        let store = MemoryStore::new();
        let mut rx = store.log_watch("log");

        store.log_append("log", b"1", None).expect("append");
        rx.changed().await.expect("changed");
        assert_eq!(*rx.borrow_and_update(), 1);
    }

    #[test]
    fn zset_add_reports_new_vs_rewrite() {
        let store = MemoryStore::new();
        assert!(store.zset_add("z", "m", 1.0).expect("add"));
        assert!(!store.zset_add("z", "m", 2.0).expect("add"));
        assert_eq!(store.zset_score("z", "m").expect("score"), Some(2.0));
    }

    #[test]
    fn zset_range_rev_orders_and_windows() {
        let store = MemoryStore::new();
        for (member, score) in [("a", 10.0), ("b", 30.0), ("c", 20.0), ("d", 99.0)] {
            store.zset_add("z", member, score).expect("add");
        }

        let hits = store.zset_range_rev("z", 30.0, 10.0, None).expect("range");
        let members: Vec<_> = hits.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["b", "c", "a"]);

        let capped = store
            .zset_range_rev("z", 30.0, 10.0, Some(2))
            .expect("range");
        assert_eq!(capped.len(), 2);
    }
}
