//! # Live Signal Fan-out
//!
//! One tailer task per subscribed node. The tailer follows the node's
//! signal log, caches the most recent wave function, and hands every update
//! to the broadcast callback wrapped in the wire envelope.
//!
//! Tailers are spawned lazily on first subscribe, are idempotent on
//! repeats, and live until process shutdown; there is no per-subscriber
//! teardown. A shared shutdown watch channel makes the tail wait
//! cancellable.

use crate::WavegraphError;
use crate::points::PointStore;
use crate::primitives::ENVELOPE_VERSION;
use crate::store::{SignalStore, node_signal_key};
use crate::types::{NodeUuid, epoch_now};
use crate::wave::WaveExpr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

// =============================================================================
// ENVELOPE
// =============================================================================

/// The wire envelope wrapping every signal pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub action: String,
    pub data: WaveExpr,
}

impl SignalEnvelope {
    /// Wrap a wave function as an update push.
    #[must_use]
    pub fn update(data: WaveExpr) -> Self {
        Self {
            kind: "WaveFunc".to_string(),
            version: ENVELOPE_VERSION.to_string(),
            action: "Update".to_string(),
            data,
        }
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Receives `(node, envelope)` for every decoded signal update.
pub type Broadcast = Arc<dyn Fn(NodeUuid, SignalEnvelope) + Send + Sync>;

struct TailerHandle {
    snapshot: Arc<RwLock<Option<SignalEnvelope>>>,
    task: JoinHandle<()>,
}

/// Registry of per-node signal tailers.
pub struct SignalFanout<S: SignalStore> {
    store: Arc<S>,
    points: PointStore<S>,
    broadcast: Broadcast,
    tailers: Mutex<BTreeMap<NodeUuid, TailerHandle>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<S: SignalStore> SignalFanout<S> {
    /// Create a fan-out over the given store, pushing updates into
    /// `broadcast`.
    #[must_use]
    pub fn new(store: Arc<S>, broadcast: Broadcast) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            points: PointStore::new(Arc::clone(&store)),
            store,
            broadcast,
            tailers: Mutex::new(BTreeMap::new()),
            shutdown_tx,
        }
    }

    fn lock_tailers(&self) -> MutexGuard<'_, BTreeMap<NodeUuid, TailerHandle>> {
        self.tailers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensure a tailer exists for `node_uuid` and return the current
    /// envelope, if any.
    ///
    /// The registry lock serializes concurrent subscribes, so at most one
    /// tailer per node exists. Must run inside a tokio runtime.
    pub fn subscribe(
        &self,
        node_uuid: &NodeUuid,
    ) -> Result<Option<SignalEnvelope>, WavegraphError> {
        let mut tailers = self.lock_tailers();
        if let Some(handle) = tailers.get(node_uuid) {
            return Ok(snapshot_of(&handle.snapshot));
        }

        let key = node_signal_key(node_uuid);

        // Watch before the snapshot read: an append landing in between
        // still wakes the loop.
        let wake = self.store.log_watch(&key);
        let initial = self.store.log_latest(&key)?;
        let mut last_id = None;

        let snapshot = Arc::new(RwLock::new(None));
        if let Some(entry) = initial {
            last_id = Some(entry.id);
            if let Some(envelope) = decode_signal(node_uuid, &entry.payload) {
                set_snapshot(&snapshot, envelope);
            }
        }

        let current = snapshot_of(&snapshot);
        let task = tokio::spawn(tail_signal_log(
            Arc::clone(&self.store),
            node_uuid.clone(),
            key,
            wake,
            last_id,
            Arc::clone(&snapshot),
            Arc::clone(&self.broadcast),
            self.shutdown_tx.subscribe(),
        ));
        tailers.insert(node_uuid.clone(), TailerHandle { snapshot, task });
        tracing::info!(node = %node_uuid, "signal tailer started");

        Ok(current)
    }

    /// The current envelope for `node_uuid`.
    ///
    /// Served from the tailer's cache when one runs; otherwise synthesized
    /// on demand from current history.
    pub fn snapshot(
        &self,
        node_uuid: &NodeUuid,
    ) -> Result<Option<SignalEnvelope>, WavegraphError> {
        if let Some(handle) = self.lock_tailers().get(node_uuid) {
            if let Some(envelope) = snapshot_of(&handle.snapshot) {
                return Ok(Some(envelope));
            }
        }

        Ok(self
            .points
            .derive_current(node_uuid, epoch_now().ceil())?
            .map(|wave| SignalEnvelope::update(WaveExpr::from(wave))))
    }

    /// Number of live tailers.
    #[must_use]
    pub fn active_tailers(&self) -> usize {
        self.lock_tailers().len()
    }

    /// Signal every tailer to stop and wait for them to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<TailerHandle> = {
            let mut tailers = self.lock_tailers();
            std::mem::take(&mut *tailers).into_values().collect()
        };
        for handle in handles {
            let _ = handle.task.await;
        }
    }
}

fn snapshot_of(slot: &RwLock<Option<SignalEnvelope>>) -> Option<SignalEnvelope> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn set_snapshot(slot: &RwLock<Option<SignalEnvelope>>, envelope: SignalEnvelope) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(envelope);
}

/// Decode a signal-log payload (`{"wave_func": …}`) into an envelope.
///
/// Malformed payloads are logged and dropped; they never stop a tailer.
fn decode_signal(node_uuid: &NodeUuid, payload: &[u8]) -> Option<SignalEnvelope> {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(node = %node_uuid, error = %e, "undecodable signal payload");
            return None;
        }
    };
    match serde_json::from_value::<WaveExpr>(value["wave_func"].clone()) {
        Ok(expr) => Some(SignalEnvelope::update(expr)),
        Err(e) => {
            tracing::warn!(node = %node_uuid, error = %e, "signal payload is not a wave function");
            None
        }
    }
}

async fn tail_signal_log<S: SignalStore>(
    store: Arc<S>,
    node_uuid: NodeUuid,
    key: String,
    mut wake: watch::Receiver<u64>,
    mut last_id: Option<u64>,
    snapshot: Arc<RwLock<Option<SignalEnvelope>>>,
    broadcast: Broadcast,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = wake.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                break;
            }
        }

        let entries = match store.log_read_after(&key, last_id) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(node = %node_uuid, error = %e, "signal log read failed");
                continue;
            }
        };

        for entry in entries {
            last_id = Some(entry.id);
            if let Some(envelope) = decode_signal(&node_uuid, &entry.payload) {
                set_snapshot(&snapshot, envelope.clone());
                broadcast(node_uuid.clone(), envelope);
            }
        }
    }
    tracing::debug!(node = %node_uuid, "signal tailer stopped");
}

// =============================================================================
// TESTS
// =============================================================================
