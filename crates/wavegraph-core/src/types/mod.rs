//! # Core Type Definitions
//!
//! This module contains all core types for the Wavegraph signal kernel:
//! - Node and point identifiers (`NodeUuid`, `PointUuid`)
//! - The graph entity (`Node`) and its timestamped events (`Point`)
//! - Error types (`WavegraphError`)
//! - Epoch/calendar time helpers
//!
//! ## Ordering Guarantees
//!
//! All collection-valued fields use `BTreeMap`/`BTreeSet` so that
//! serialization and iteration order are deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a node in the graph.
///
/// Opaque string, produced as a v4 UUID. Nodes created elsewhere may carry
/// any identifier the store accepts; the server validates UUID shape before
/// touching the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeUuid(pub String);

impl NodeUuid {
    /// Generate a fresh v4 identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Check that the identifier parses as a UUID.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        uuid::Uuid::parse_str(&self.0).is_ok()
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeUuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a point owned by a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointUuid(pub String);

impl PointUuid {
    /// Generate a fresh v4 identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PointUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PointUuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// TIME HELPERS
// =============================================================================

/// Current wall-clock time as fractional epoch seconds.
#[must_use]
pub fn epoch_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// UTC calendar representation of fractional epoch seconds.
///
/// Out-of-range inputs collapse to the epoch rather than failing; the
/// calendar form is presentational, the f64 is authoritative.
#[must_use]
pub fn utc_from_epoch(secs: f64) -> DateTime<Utc> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos).unwrap_or(DateTime::UNIX_EPOCH)
}

// =============================================================================
// NODE
// =============================================================================

/// A Node, the backbone of the data structure.
///
/// Carries directed edges to and from other nodes, free-form attributes,
/// and an opaque `synthesis` field reserved for future aggregate state
/// (stored and round-tripped, never computed here).
///
/// The three transient flags track store consistency:
/// - `loaded`: fields were populated from the store
/// - `saved`: the store reflects the current in-memory state
/// - `dirty`: in-memory mutations not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// The node identifier.
    pub uuid: NodeUuid,
    /// Identifiers this node points to.
    pub outgoing: BTreeSet<NodeUuid>,
    /// Identifiers pointing to this node.
    pub incoming: BTreeSet<NodeUuid>,
    /// Free-form metadata.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Opaque derived field, round-tripped untouched.
    #[serde(default)]
    pub synthesis: Option<serde_json::Value>,

    #[serde(skip)]
    pub loaded: bool,
    #[serde(skip)]
    pub saved: bool,
    #[serde(skip)]
    pub dirty: bool,
}

impl Node {
    /// Create an in-memory node with a fresh identifier. Unsaved.
    #[must_use]
    pub fn new() -> Self {
        Self::with_uuid(NodeUuid::generate())
    }

    /// Create an in-memory node with a known identifier. Unsaved.
    #[must_use]
    pub fn with_uuid(uuid: NodeUuid) -> Self {
        Self {
            uuid,
            outgoing: BTreeSet::new(),
            incoming: BTreeSet::new(),
            attributes: BTreeMap::new(),
            synthesis: None,
            loaded: false,
            saved: false,
            dirty: false,
        }
    }

    /// Whether this node satisfies the connect precondition.
    #[must_use]
    pub fn is_connectable(&self) -> bool {
        self.saved && !self.dirty
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// POINT
// =============================================================================

/// A Point, a timestamped event owned by a node.
///
/// Immutable in content except for timestamp correction via
/// `PointStore::update_point`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// The point identifier.
    pub uuid: PointUuid,
    /// The owning node.
    pub node_uuid: NodeUuid,
    /// Event time, fractional epoch seconds.
    pub timestamp_epoch: f64,
    /// UTC calendar form of `timestamp_epoch`.
    pub timestamp_utc: DateTime<Utc>,
}

impl Point {
    /// Build a point, deriving the calendar form from the epoch form.
    #[must_use]
    pub fn new(uuid: PointUuid, node_uuid: NodeUuid, timestamp_epoch: f64) -> Self {
        Self {
            uuid,
            node_uuid,
            timestamp_epoch,
            timestamp_utc: utc_from_epoch(timestamp_epoch),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Wavegraph kernel.
///
/// Store-layer failures are never retried here; they propagate to the
/// caller under this taxonomy.
#[derive(Debug, Error)]
pub enum WavegraphError {
    /// The requested node does not exist in the store.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeUuid),

    /// The requested point does not exist, or its lookup failed.
    #[error("Point not found: {point} (node {node})")]
    PointNotFound { node: NodeUuid, point: PointUuid },

    /// A persisted record could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A store write failed or was not confirmed.
    #[error("Save failed: {0}")]
    Save(String),

    /// A point index write failed or was not confirmed.
    #[error("Point save failed: {0}")]
    PointSave(String),

    /// Connect precondition violated: node unsaved or dirty.
    #[error("Node not saved or has unsaved mutations: {0}")]
    NotSaved(NodeUuid),

    /// A node may not connect to itself.
    #[error("Self connection rejected: {0}")]
    SelfConnection(NodeUuid),

    /// The second save of a two-node connect failed; the edge is
    /// asymmetric and the caller must reconcile.
    #[error("Partial connection {from} -> {to}: {source}")]
    PartialConnection {
        from: NodeUuid,
        to: NodeUuid,
        #[source]
        source: Box<WavegraphError>,
    },

    /// A node load failed during graph traversal.
    #[error("Traversal failed at {node}: {source}")]
    Traversal {
        node: NodeUuid,
        #[source]
        source: Box<WavegraphError>,
    },

    /// Malformed wave-function parameters (e.g. non-positive period).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A wave function with no basis terms cannot be resolved.
    #[error("Wave function has no basis terms")]
    EmptyBasis,

    /// Store adapter failure outside a save path.
    #[error("Store error: {0}")]
    Store(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================
