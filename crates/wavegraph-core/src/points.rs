//! # Point Store
//!
//! Timestamped events against the store adapter. A point is indexed in its
//! node's sorted set (`NODE_POINTS-{uuid}`, member = point uuid, score =
//! epoch timestamp); the index IS the record, there is no separate blob.
//!
//! Creating a point also refreshes the node's derived signal: the deriver
//! runs over current history and, when it yields a wave function, the
//! result lands on the node's signal log (`NODE-SIGNAL-{uuid}`), which
//! retains only the latest entry. Tailers pick it up from there.

use crate::WavegraphError;
use crate::delta::{DeltaRecord, append_delta};
use crate::deriver::derive_signal;
use crate::primitives::{DEFAULT_HISTORY_WINDOW_SECS, SIGNAL_LOG_MAXLEN};
use crate::store::{SignalStore, node_points_key, node_signal_key};
use crate::types::{NodeUuid, Point, PointUuid, epoch_now};
use crate::wave::WaveFunc;
use std::sync::Arc;

/// Point operations over a store adapter.
#[derive(Debug)]
pub struct PointStore<S: SignalStore> {
    store: Arc<S>,
}

impl<S: SignalStore> Clone for PointStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SignalStore> PointStore<S> {
    /// Create a point store over the given adapter.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record a point for `node_uuid`, defaulting the timestamp to now.
    ///
    /// The index insert must confirm as new (`PointSave` otherwise). On
    /// success an `AddPoint` delta is appended, the deriver runs, and any
    /// resulting signal is published to the node's signal log.
    pub fn create_point(
        &self,
        node_uuid: &NodeUuid,
        timestamp_epoch: Option<f64>,
    ) -> Result<Point, WavegraphError> {
        let timestamp = timestamp_epoch.unwrap_or_else(epoch_now);
        let point = Point::new(PointUuid::generate(), node_uuid.clone(), timestamp);

        let inserted = self
            .store
            .zset_add(&node_points_key(node_uuid), point.uuid.as_str(), timestamp)
            .map_err(|e| WavegraphError::PointSave(e.to_string()))?;
        if !inserted {
            return Err(WavegraphError::PointSave(format!(
                "point {} already indexed for node {node_uuid}",
                point.uuid
            )));
        }

        append_delta(
            &*self.store,
            &DeltaRecord::AddPoint {
                node_uuid: node_uuid.clone(),
                point_uuid: point.uuid.clone(),
                timestamp,
            },
        )?;
        tracing::debug!(node = %node_uuid, point = %point.uuid, timestamp, "point created");

        if let Some(wave) = self.derive_current(node_uuid, epoch_now().ceil())? {
            self.publish_signal(node_uuid, &wave)?;
        }
        Ok(point)
    }

    /// Fetch a point by identifier; `PointNotFound` when absent.
    pub fn get_point(
        &self,
        node_uuid: &NodeUuid,
        point_uuid: &PointUuid,
    ) -> Result<Point, WavegraphError> {
        let score = self
            .store
            .zset_score(&node_points_key(node_uuid), point_uuid.as_str())?
            .ok_or_else(|| WavegraphError::PointNotFound {
                node: node_uuid.clone(),
                point: point_uuid.clone(),
            })?;
        Ok(Point::new(point_uuid.clone(), node_uuid.clone(), score))
    }

    /// Rewrite a point's indexed timestamp and append an `UpdatePoint`
    /// delta.
    pub fn update_point(&self, point: &Point) -> Result<(), WavegraphError> {
        self.store
            .zset_add(
                &node_points_key(&point.node_uuid),
                point.uuid.as_str(),
                point.timestamp_epoch,
            )
            .map_err(|e| WavegraphError::PointSave(e.to_string()))?;

        append_delta(
            &*self.store,
            &DeltaRecord::UpdatePoint {
                node_uuid: point.node_uuid.clone(),
                point_uuid: point.uuid.clone(),
                timestamp: point.timestamp_epoch,
            },
        )
    }

    /// Points in `[anchor - window, anchor]`, newest first.
    ///
    /// `anchor` defaults to now; an omitted `window` leaves the range
    /// unbounded below.
    pub fn history(
        &self,
        node_uuid: &NodeUuid,
        anchor: Option<f64>,
        window: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<Point>, WavegraphError> {
        let anchor = anchor.unwrap_or_else(epoch_now);
        let floor = window.map_or(f64::NEG_INFINITY, |w| anchor - w);

        let hits = self
            .store
            .zset_range_rev(&node_points_key(node_uuid), anchor, floor, limit)?;
        Ok(hits
            .into_iter()
            .map(|(member, score)| {
                Point::new(PointUuid(member), node_uuid.clone(), score)
            })
            .collect())
    }

    /// Run the deriver over the node's recent history at `anchor`.
    pub fn derive_current(
        &self,
        node_uuid: &NodeUuid,
        anchor: f64,
    ) -> Result<Option<WaveFunc>, WavegraphError> {
        let history = self.history(
            node_uuid,
            Some(anchor),
            Some(DEFAULT_HISTORY_WINDOW_SECS),
            None,
        )?;
        let timestamps: Vec<f64> = history.iter().map(|p| p.timestamp_epoch).collect();
        Ok(derive_signal(&timestamps, anchor))
    }

    /// Publish a wave function to the node's latest-value signal log.
    pub fn publish_signal(
        &self,
        node_uuid: &NodeUuid,
        wave: &WaveFunc,
    ) -> Result<(), WavegraphError> {
        let payload = serde_json::to_vec(&serde_json::json!({ "wave_func": wave }))
            .map_err(|e| WavegraphError::Serialization(e.to_string()))?;
        self.store.log_append(
            &node_signal_key(node_uuid),
            &payload,
            Some(SIGNAL_LOG_MAXLEN),
        )?;
        tracing::debug!(node = %node_uuid, "signal published");
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
