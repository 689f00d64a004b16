//! # Store Adapter
//!
//! The narrow contract the kernel requires from a durable keyed store:
//! get/set by key, append-only per-key log streams with tail notification
//! and bounded trimming, and per-key sorted sets scored by time.
//!
//! Two backends implement the trait:
//! - [`MemoryStore`] — BTreeMaps behind a mutex, for tests and ephemeral runs
//! - [`RedbStore`] — redb embedded database, for durable runs
//!
//! ## Tailing
//!
//! A blocking tail read is expressed as a loop over `log_read_after` plus
//! an await on the `log_watch` channel, which fires on every append to the
//! key. This keeps the suspension point cancellable: a tailer selects on
//! the watch and on process shutdown.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::WavegraphError;
use crate::types::NodeUuid;
use tokio::sync::watch;

// =============================================================================
// KEY FAMILIES
// =============================================================================
//
// One family per node identifier; the shapes are the historical persisted
// format and must not change.

/// Key of the serialized node record.
#[must_use]
pub fn node_key(uuid: &NodeUuid) -> String {
    format!("NODE-{uuid}")
}

/// Key of the general delta log (unbounded stream).
#[must_use]
pub fn node_stream_key(uuid: &NodeUuid) -> String {
    format!("NODE-STREAM-{uuid}")
}

/// Key of the signal log (latest-value-only stream).
#[must_use]
pub fn node_signal_key(uuid: &NodeUuid) -> String {
    format!("NODE-SIGNAL-{uuid}")
}

/// Key of the point index (sorted set: point uuid -> timestamp).
#[must_use]
pub fn node_points_key(uuid: &NodeUuid) -> String {
    format!("NODE_POINTS-{uuid}")
}

// =============================================================================
// LOG ENTRIES
// =============================================================================

/// Identifier a log stream assigns to an entry; strictly increasing per key.
pub type LogId = u64;

/// One entry of a per-key log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: LogId,
    pub payload: Vec<u8>,
}

// =============================================================================
// SIGNALSTORE TRAIT
// =============================================================================

/// The store adapter contract.
///
/// Implementations must be safe to share across tasks; every method takes
/// `&self`. Failures are reported as `WavegraphError::Store` and are never
/// retried by the kernel.
pub trait SignalStore: Send + Sync + 'static {
    // --- keyed values ---

    /// Fetch the value at `key`, if any.
    fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, WavegraphError>;

    /// Store `value` at `key`, overwriting.
    fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), WavegraphError>;

    /// Whether `key` holds a value.
    fn kv_exists(&self, key: &str) -> Result<bool, WavegraphError>;

    // --- append-only logs ---

    /// Append `payload` to the log at `key` and return its assigned id.
    ///
    /// When `maxlen` is given, oldest entries are trimmed so that at most
    /// `maxlen` remain (exact, not approximate).
    fn log_append(
        &self,
        key: &str,
        payload: &[u8],
        maxlen: Option<usize>,
    ) -> Result<LogId, WavegraphError>;

    /// The most recent entry of the log at `key`, if any.
    fn log_latest(&self, key: &str) -> Result<Option<LogEntry>, WavegraphError>;

    /// All entries with id strictly greater than `after` (all entries when
    /// `after` is `None`), oldest first.
    fn log_read_after(
        &self,
        key: &str,
        after: Option<LogId>,
    ) -> Result<Vec<LogEntry>, WavegraphError>;

    /// Wake-up channel for the log at `key`; the carried value is the id
    /// of the most recent append (0 before any append).
    fn log_watch(&self, key: &str) -> watch::Receiver<LogId>;

    // --- sorted sets ---

    /// Insert or update `member` with `score`. Returns `true` when the
    /// member was newly inserted, `false` when an existing score was
    /// rewritten.
    fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<bool, WavegraphError>;

    /// The score of `member`, if present.
    fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>, WavegraphError>;

    /// Members with score in `[min, max]`, highest score first, capped at
    /// `limit` when given.
    fn zset_range_rev(
        &self,
        key: &str,
        max: f64,
        min: f64,
        limit: Option<usize>,
    ) -> Result<Vec<(String, f64)>, WavegraphError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_families_keep_historical_shapes() {
        let uuid = NodeUuid::from("abc");
        assert_eq!(node_key(&uuid), "NODE-abc");
        assert_eq!(node_stream_key(&uuid), "NODE-STREAM-abc");
        assert_eq!(node_signal_key(&uuid), "NODE-SIGNAL-abc");
        assert_eq!(node_points_key(&uuid), "NODE_POINTS-abc");
    }
}
