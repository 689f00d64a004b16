//! # redb-backed Store
//!
//! A disk-backed implementation of the store adapter using the redb
//! embedded database: ACID transactions, crash safety, MVCC, zero
//! configuration.
//!
//! Logs live in one table keyed by `(stream key, entry id)`; the head id
//! of each stream is tracked separately so ids stay monotonic across
//! trims. Sorted-set scores are postcard-encoded f64 values keyed by
//! `(set key, member)`.
//!
//! Wake-up channels are process-local: a restart reattaches tailers via
//! their first `log_latest` read, so watch state needs no persistence.

use super::{LogEntry, LogId, SignalStore};
use crate::WavegraphError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

/// Table for keyed values: key -> bytes.
const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Table for log entries: (stream key, entry id) -> payload.
const LOGS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("logs");

/// Table for log heads: stream key -> last assigned id.
const LOG_HEADS: TableDefinition<&str, u64> = TableDefinition::new("log_heads");

/// Table for sorted sets: (set key, member) -> postcard-encoded f64 score.
const ZSETS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("zsets");

/// A disk-backed store using redb.
pub struct RedbStore {
    db: Database,
    watchers: Mutex<BTreeMap<String, watch::Sender<LogId>>>,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

fn store_err(e: impl std::fmt::Display) -> WavegraphError {
    WavegraphError::Store(e.to_string())
}

fn encode_score(score: f64) -> Result<Vec<u8>, WavegraphError> {
    postcard::to_allocvec(&score).map_err(|e| WavegraphError::Serialization(e.to_string()))
}

fn decode_score(bytes: &[u8]) -> Result<f64, WavegraphError> {
    postcard::from_bytes(bytes).map_err(|e| WavegraphError::Serialization(e.to_string()))
}

impl RedbStore {
    /// Open or create a store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WavegraphError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| WavegraphError::Io(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(store_err)?;
            let _ = write_txn.open_table(KV).map_err(store_err)?;
            let _ = write_txn.open_table(LOGS).map_err(store_err)?;
            let _ = write_txn.open_table(LOG_HEADS).map_err(store_err)?;
            let _ = write_txn.open_table(ZSETS).map_err(store_err)?;
            write_txn.commit().map_err(store_err)?;
        }

        Ok(Self {
            db,
            watchers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Compact the database (optional maintenance).
    pub fn compact(&mut self) -> Result<(), WavegraphError> {
        self.db.compact().map_err(store_err)?;
        Ok(())
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

    fn log_head(&self, key: &str) -> Result<LogId, WavegraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(LOG_HEADS).map_err(store_err)?;
        Ok(table
            .get(key)
            .map_err(store_err)?
            .map(|v| v.value())
            .unwrap_or(0))
    }
}

impl SignalStore for RedbStore {
    fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, WavegraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(KV).map_err(store_err)?;
        Ok(table
            .get(key)
            .map_err(store_err)?
            .map(|v| v.value().to_vec()))
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), WavegraphError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write_txn.open_table(KV).map_err(store_err)?;
            table.insert(key, value).map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;
        Ok(())
    }

    fn kv_exists(&self, key: &str) -> Result<bool, WavegraphError> {
        Ok(self.kv_get(key)?.is_some())
    }

    fn log_append(
        &self,
        key: &str,
        payload: &[u8],
        maxlen: Option<usize>,
    ) -> Result<LogId, WavegraphError> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        let id = {
            let mut heads = write_txn.open_table(LOG_HEADS).map_err(store_err)?;
            let head = heads
                .get(key)
                .map_err(store_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let id = head + 1;
            heads.insert(key, id).map_err(store_err)?;

            let mut logs = write_txn.open_table(LOGS).map_err(store_err)?;
            logs.insert((key, id), payload).map_err(store_err)?;

            if let Some(maxlen) = maxlen {
                // Exact trim: drop oldest entries beyond the cap.
                let ids: Vec<u64> = logs
                    .range((key, 0u64)..=(key, u64::MAX))
                    .map_err(store_err)?
                    .filter_map(|entry| entry.ok().map(|(k, _)| k.value().1))
                    .collect();
                if ids.len() > maxlen {
                    for old_id in &ids[..ids.len() - maxlen] {
                        logs.remove((key, *old_id)).map_err(store_err)?;
                    }
                }
            }
            id
        };
        write_txn.commit().map_err(store_err)?;

        self.watch_sender(key, 0).send_replace(id);
        Ok(id)
    }

    fn log_latest(&self, key: &str) -> Result<Option<LogEntry>, WavegraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(LOGS).map_err(store_err)?;
        let mut range = table
            .range((key, 0u64)..=(key, u64::MAX))
            .map_err(store_err)?;

        match range.next_back() {
            Some(entry) => {
                let (k, v) = entry.map_err(store_err)?;
                Ok(Some(LogEntry {
                    id: k.value().1,
                    payload: v.value().to_vec(),
                }))
            }
            None => Ok(None),
        }
    }

    fn log_read_after(
        &self,
        key: &str,
        after: Option<LogId>,
    ) -> Result<Vec<LogEntry>, WavegraphError> {
        let floor = after.unwrap_or(0);
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(LOGS).map_err(store_err)?;

        let mut entries = Vec::new();
        for entry in table
            .range((key, floor + 1)..=(key, u64::MAX))
            .map_err(store_err)?
        {
            let (k, v) = entry.map_err(store_err)?;
            entries.push(LogEntry {
                id: k.value().1,
                payload: v.value().to_vec(),
            });
        }
        Ok(entries)
    }

    fn log_watch(&self, key: &str) -> watch::Receiver<LogId> {
        let current = self.log_head(key).unwrap_or(0);
        self.watch_sender(key, current).subscribe()
    }

    fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<bool, WavegraphError> {
        let encoded = encode_score(score)?;
        let write_txn = self.db.begin_write().map_err(store_err)?;
        let inserted = {
            let mut table = write_txn.open_table(ZSETS).map_err(store_err)?;
            let existing = table.get((key, member)).map_err(store_err)?.is_some();
            table
                .insert((key, member), encoded.as_slice())
                .map_err(store_err)?;
            !existing
        };
        write_txn.commit().map_err(store_err)?;
        Ok(inserted)
    }

    fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>, WavegraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(ZSETS).map_err(store_err)?;
        match table.get((key, member)).map_err(store_err)? {
            Some(v) => Ok(Some(decode_score(v.value())?)),
            None => Ok(None),
        }
    }

    fn zset_range_rev(
        &self,
        key: &str,
        max: f64,
        min: f64,
        limit: Option<usize>,
    ) -> Result<Vec<(String, f64)>, WavegraphError> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(ZSETS).map_err(store_err)?;

        let mut hits: Vec<(String, f64)> = Vec::new();
        for entry in table.range((key, "")..).map_err(store_err)? {
            let (k, v) = entry.map_err(store_err)?;
            let (set_key, member) = k.value();
            if set_key != key {
                break;
            }
            let score = decode_score(v.value())?;
            if score >= min && score <= max {
                hits.push((member.to_string(), score));
            }
        }

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
