//! # Engine Facade
//!
//! `SignalEngine` owns the store, the node and point stores, and the
//! fan-out, and exposes the inbound surface the interface layer calls.
//! One engine per process; cheap to share behind an `Arc`.

use crate::WavegraphError;
use crate::fanout::{Broadcast, SignalEnvelope, SignalFanout};
use crate::graph::NodeStore;
use crate::points::PointStore;
use crate::store::SignalStore;
use crate::types::{Node, NodeUuid, Point, PointUuid};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The kernel behind one running process.
pub struct SignalEngine<S: SignalStore> {
    nodes: NodeStore<S>,
    points: PointStore<S>,
    fanout: SignalFanout<S>,
}

impl<S: SignalStore> SignalEngine<S> {
    /// Build an engine over `store`, delivering fan-out pushes to
    /// `broadcast`.
    #[must_use]
    pub fn new(store: Arc<S>, broadcast: Broadcast) -> Self {
        Self {
            nodes: NodeStore::new(Arc::clone(&store)),
            points: PointStore::new(Arc::clone(&store)),
            fanout: SignalFanout::new(store, broadcast),
        }
    }

    /// Create a node, or with `uuid` given, create it under that
    /// identifier.
    pub fn create_node(&self, uuid: Option<NodeUuid>) -> Result<Node, WavegraphError> {
        self.nodes.create(uuid)
    }

    /// Load a node record.
    pub fn get_node(&self, uuid: &NodeUuid) -> Result<Node, WavegraphError> {
        self.nodes.load(uuid)
    }

    /// Record a point, creating the node first when it does not exist yet.
    pub fn add_point(
        &self,
        node_uuid: &NodeUuid,
        timestamp_epoch: Option<f64>,
    ) -> Result<Point, WavegraphError> {
        if !self.nodes.exists(node_uuid)? {
            self.nodes.create(Some(node_uuid.clone()))?;
            tracing::info!(node = %node_uuid, "node created on first point");
        }
        self.points.create_point(node_uuid, timestamp_epoch)
    }

    /// Fetch a point by identifier.
    pub fn get_point(
        &self,
        node_uuid: &NodeUuid,
        point_uuid: &PointUuid,
    ) -> Result<Point, WavegraphError> {
        self.points.get_point(node_uuid, point_uuid)
    }

    /// Rewrite a point's timestamp.
    pub fn update_point(&self, point: &Point) -> Result<(), WavegraphError> {
        self.points.update_point(point)
    }

    /// Ensure a tailer runs for the node and return the current envelope.
    pub fn init_subscription(
        &self,
        node_uuid: &NodeUuid,
    ) -> Result<Option<SignalEnvelope>, WavegraphError> {
        self.fanout.subscribe(node_uuid)
    }

    /// Current envelope for the node, cached or synthesized.
    pub fn snapshot(
        &self,
        node_uuid: &NodeUuid,
    ) -> Result<Option<SignalEnvelope>, WavegraphError> {
        self.fanout.snapshot(node_uuid)
    }

    /// Connect two existing nodes, `from -> to`.
    pub fn connect(&self, from: &NodeUuid, to: &NodeUuid) -> Result<(), WavegraphError> {
        let mut a = self.nodes.load(from)?;
        let mut b = self.nodes.load(to)?;
        self.nodes.connect_to(&mut a, &mut b)
    }

    /// All nodes reachable from `start` over outgoing edges.
    pub fn query_outgoing(
        &self,
        start: &NodeUuid,
    ) -> Result<BTreeMap<NodeUuid, Node>, WavegraphError> {
        self.nodes.query_outgoing(start)
    }

    /// Set and persist a node attribute.
    pub fn set_attribute(
        &self,
        node_uuid: &NodeUuid,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), WavegraphError> {
        let mut node = self.nodes.load(node_uuid)?;
        self.nodes.set_attribute(&mut node, key, value, true)
    }

    /// Point history, newest first.
    pub fn history(
        &self,
        node_uuid: &NodeUuid,
        anchor: Option<f64>,
        window: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<Point>, WavegraphError> {
        self.points.history(node_uuid, anchor, window, limit)
    }

    /// Stop every tailer and wait for them to finish.
    pub async fn shutdown(&self) {
        self.fanout.shutdown().await;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::epoch_now;
    use tokio::sync::mpsc;

    fn engine() -> (
        SignalEngine<MemoryStore>,
        mpsc::UnboundedReceiver<(NodeUuid, SignalEnvelope)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let broadcast: Broadcast = Arc::new(move |node, envelope| {
            let _ = tx.send((node, envelope));
        });
        (SignalEngine::new(Arc::new(MemoryStore::new()), broadcast), rx)
    }

    #[tokio::test]
    async fn add_point_creates_node_on_demand() {
        let (engine, _rx) = engine();
        let node = NodeUuid::generate();

        engine.add_point(&node, Some(100.0)).expect("add");
        let loaded = engine.get_node(&node).expect("load");
        assert_eq!(loaded.uuid, node);

        // A second point reuses the node
        engine.add_point(&node, Some(110.0)).expect("add");
        assert_eq!(engine.history(&node, None, None, None).expect("history").len(), 2);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn subscription_sees_points_added_after_init() {
        let (engine, mut rx) = engine();
        let node = NodeUuid::generate();

        assert!(engine.init_subscription(&node).expect("init").is_none());

        let now = epoch_now();
        engine.add_point(&node, Some(now - 30.0)).expect("add");
        engine.add_point(&node, Some(now - 10.0)).expect("add");

        let (pushed_node, envelope) = rx.recv().await.expect("push");
        assert_eq!(pushed_node, node);
        assert!(envelope.data.wave().period > 0.0);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn connect_and_traverse_through_the_facade() {
        let (engine, _rx) = engine();
        let a = engine.create_node(None).expect("create").uuid;
        let b = engine.create_node(None).expect("create").uuid;

        engine.connect(&a, &b).expect("connect");
        let reached = engine.query_outgoing(&a).expect("traverse");
        assert_eq!(reached.len(), 2);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn set_attribute_persists() {
        let (engine, _rx) = engine();
        let node = engine.create_node(None).expect("create").uuid;

        engine
            .set_attribute(&node, "label", serde_json::json!("pulse"))
            .expect("set");
        let loaded = engine.get_node(&node).expect("load");
        assert_eq!(loaded.attributes["label"], serde_json::json!("pulse"));

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn connect_requires_existing_nodes() {
        let (engine, _rx) = engine();
        let a = engine.create_node(None).expect("create").uuid;

        let err = engine
            .connect(&a, &NodeUuid::generate())
            .expect_err("must fail");
        assert!(matches!(err, WavegraphError::NodeNotFound(_)));

        engine.shutdown().await;
    }
}
