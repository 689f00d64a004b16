//! # Delta Records
//!
//! Immutable append-only log entries describing state changes. Every node
//! has one unbounded stream (`NODE-STREAM-{uuid}`) carrying its deltas in
//! store-assigned order.

use crate::WavegraphError;
use crate::store::{SignalStore, node_stream_key};
use crate::types::{NodeUuid, PointUuid, epoch_now};
use serde::{Deserialize, Serialize};

/// A state-change record, one variant per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum DeltaRecord {
    AddPoint {
        node_uuid: NodeUuid,
        point_uuid: PointUuid,
        timestamp: f64,
    },
    UpdatePoint {
        node_uuid: NodeUuid,
        point_uuid: PointUuid,
        timestamp: f64,
    },
    AddOutgoingConnection {
        node_uuid: NodeUuid,
        outgoing_node_uuid: NodeUuid,
        timestamp: f64,
    },
    AddIncomingConnection {
        node_uuid: NodeUuid,
        incoming_node_uuid: NodeUuid,
        timestamp: f64,
    },
}

impl DeltaRecord {
    /// The node whose stream carries this record.
    #[must_use]
    pub fn node_uuid(&self) -> &NodeUuid {
        match self {
            Self::AddPoint { node_uuid, .. }
            | Self::UpdatePoint { node_uuid, .. }
            | Self::AddOutgoingConnection { node_uuid, .. }
            | Self::AddIncomingConnection { node_uuid, .. } => node_uuid,
        }
    }

    /// An outgoing-connection record stamped with the current time.
    #[must_use]
    pub fn outgoing_connection(node_uuid: NodeUuid, outgoing_node_uuid: NodeUuid) -> Self {
        Self::AddOutgoingConnection {
            node_uuid,
            outgoing_node_uuid,
            timestamp: epoch_now(),
        }
    }

    /// An incoming-connection record stamped with the current time.
    #[must_use]
    pub fn incoming_connection(node_uuid: NodeUuid, incoming_node_uuid: NodeUuid) -> Self {
        Self::AddIncomingConnection {
            node_uuid,
            incoming_node_uuid,
            timestamp: epoch_now(),
        }
    }
}

/// Append a delta to its node's stream.
pub fn append_delta<S: SignalStore>(
    store: &S,
    record: &DeltaRecord,
) -> Result<(), WavegraphError> {
    let key = node_stream_key(record.node_uuid());
    let payload = serde_json::to_vec(record)
        .map_err(|e| WavegraphError::Serialization(e.to_string()))?;
    store.log_append(&key, &payload, None)?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
