//! # Graph Store
//!
//! Node lifecycle against the store adapter: creation, load/save,
//! bidirectional edge maintenance, reachability traversal, and attribute
//! storage.
//!
//! ## Consistency
//!
//! Connecting two nodes performs two independent saves; it is NOT a single
//! atomic transaction. A failure between the saves leaves the edge
//! asymmetric and is surfaced as `PartialConnection` so callers can
//! reconcile. Connect preconditions (`saved && !dirty` on both sides, no
//! self-loops) are enforced before any mutation.

use crate::WavegraphError;
use crate::delta::{DeltaRecord, append_delta};
use crate::store::{SignalStore, node_key};
use crate::types::{Node, NodeUuid};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Node operations over a store adapter.
#[derive(Debug)]
pub struct NodeStore<S: SignalStore> {
    store: Arc<S>,
}

impl<S: SignalStore> Clone for NodeStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SignalStore> NodeStore<S> {
    /// Create a node store over the given adapter.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create a node and persist an empty record immediately.
    ///
    /// Allocates a fresh identifier when none is given.
    pub fn create(&self, uuid: Option<NodeUuid>) -> Result<Node, WavegraphError> {
        let mut node = match uuid {
            Some(uuid) => Node::with_uuid(uuid),
            None => Node::new(),
        };
        self.save(&mut node)?;
        Ok(node)
    }

    /// Fetch and deserialize a node record.
    pub fn load(&self, uuid: &NodeUuid) -> Result<Node, WavegraphError> {
        let key = node_key(uuid);
        let bytes = self
            .store
            .kv_get(&key)?
            .ok_or_else(|| WavegraphError::NodeNotFound(uuid.clone()))?;

        let mut node: Node = serde_json::from_slice(&bytes)
            .map_err(|e| WavegraphError::Serialization(format!("node {uuid}: {e}")))?;
        node.loaded = true;
        node.saved = true;
        node.dirty = false;
        Ok(node)
    }

    /// Whether a record exists for the identifier.
    pub fn exists(&self, uuid: &NodeUuid) -> Result<bool, WavegraphError> {
        self.store.kv_exists(&node_key(uuid))
    }

    /// Persist the node's full current state; clears `dirty` on success.
    pub fn save(&self, node: &mut Node) -> Result<(), WavegraphError> {
        let bytes = serde_json::to_vec(node)
            .map_err(|e| WavegraphError::Serialization(e.to_string()))?;

        self.store
            .kv_set(&node_key(&node.uuid), &bytes)
            .map_err(|e| WavegraphError::Save(e.to_string()))?;

        node.saved = true;
        node.dirty = false;
        Ok(())
    }

    /// Add a directed edge `a -> b`, maintained on both sides.
    ///
    /// Requires both nodes saved and clean; rejects self-loops; idempotent
    /// on repeats. Emits one connection delta per side, then persists both
    /// nodes. A failure after the first save surfaces as
    /// `PartialConnection`.
    pub fn connect_to(&self, a: &mut Node, b: &mut Node) -> Result<(), WavegraphError> {
        if a.uuid == b.uuid {
            return Err(WavegraphError::SelfConnection(a.uuid.clone()));
        }
        if !a.is_connectable() {
            return Err(WavegraphError::NotSaved(a.uuid.clone()));
        }
        if !b.is_connectable() {
            return Err(WavegraphError::NotSaved(b.uuid.clone()));
        }

        // Idempotent: BTreeSet insertion cannot duplicate an edge.
        a.outgoing.insert(b.uuid.clone());
        b.incoming.insert(a.uuid.clone());
        a.dirty = true;
        b.dirty = true;

        append_delta(
            &*self.store,
            &DeltaRecord::outgoing_connection(a.uuid.clone(), b.uuid.clone()),
        )?;
        append_delta(
            &*self.store,
            &DeltaRecord::incoming_connection(b.uuid.clone(), a.uuid.clone()),
        )?;

        self.save(a)?;
        self.save(b).map_err(|e| WavegraphError::PartialConnection {
            from: a.uuid.clone(),
            to: b.uuid.clone(),
            source: Box::new(e),
        })?;
        Ok(())
    }

    /// `connect_from(b, a)` is `connect_to(a, b)` with arguments reversed.
    pub fn connect_from(&self, b: &mut Node, a: &mut Node) -> Result<(), WavegraphError> {
        self.connect_to(a, b)
    }

    /// Depth-first reachability over `outgoing` edges.
    ///
    /// Returns every reachable node keyed by identifier, the start node
    /// included. The visited set makes cycles terminate; each node costs
    /// one store round-trip, acceptable at this design's scale.
    pub fn query_outgoing(
        &self,
        start: &NodeUuid,
    ) -> Result<BTreeMap<NodeUuid, Node>, WavegraphError> {
        let mut visited = BTreeSet::new();
        let mut reached = BTreeMap::new();
        self.walk_outgoing(start, &mut visited, &mut reached)?;
        Ok(reached)
    }

    fn walk_outgoing(
        &self,
        uuid: &NodeUuid,
        visited: &mut BTreeSet<NodeUuid>,
        reached: &mut BTreeMap<NodeUuid, Node>,
    ) -> Result<(), WavegraphError> {
        if !visited.insert(uuid.clone()) {
            return Ok(());
        }

        let node = self.load(uuid).map_err(|e| WavegraphError::Traversal {
            node: uuid.clone(),
            source: Box::new(e),
        })?;
        let outgoing: Vec<NodeUuid> = node.outgoing.iter().cloned().collect();
        reached.insert(uuid.clone(), node);

        for next in &outgoing {
            self.walk_outgoing(next, visited, reached)?;
        }
        Ok(())
    }

    /// Set an in-memory attribute, marking the node dirty; optionally
    /// persist immediately.
    pub fn set_attribute(
        &self,
        node: &mut Node,
        key: &str,
        value: serde_json::Value,
        persist: bool,
    ) -> Result<(), WavegraphError> {
        node.attributes.insert(key.to_string(), value);
        node.dirty = true;

        if persist {
            self.save(node)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LogEntry, LogId, MemoryStore, node_stream_key};
    use std::sync::Mutex;
    use tokio::sync::watch;

    fn node_store() -> NodeStore<MemoryStore> {
        NodeStore::new(Arc::new(MemoryStore::new()))
    }

    /// In-memory store whose `kv_set` can be made to refuse one key.
    struct FailingSaves {
        inner: MemoryStore,
        deny: Mutex<Option<String>>,
    }

    impl FailingSaves {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                deny: Mutex::new(None),
            }
        }

        fn deny_key(&self, key: String) {
            *self.deny.lock().expect("lock") = Some(key);
        }
    }

    impl SignalStore for FailingSaves {
        fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, WavegraphError> {
            self.inner.kv_get(key)
        }

        fn kv_set(&self, key: &str, value: &[u8]) -> Result<(), WavegraphError> {
            if self.deny.lock().expect("lock").as_deref() == Some(key) {
                return Err(WavegraphError::Store(format!("write refused: {key}")));
            }
            self.inner.kv_set(key, value)
        }

        fn kv_exists(&self, key: &str) -> Result<bool, WavegraphError> {
            self.inner.kv_exists(key)
        }

        fn log_append(
            &self,
            key: &str,
            payload: &[u8],
            maxlen: Option<usize>,
        ) -> Result<LogId, WavegraphError> {
            self.inner.log_append(key, payload, maxlen)
        }

        fn log_latest(&self, key: &str) -> Result<Option<LogEntry>, WavegraphError> {
            self.inner.log_latest(key)
        }

        fn log_read_after(
            &self,
            key: &str,
            after: Option<LogId>,
        ) -> Result<Vec<LogEntry>, WavegraphError> {
            self.inner.log_read_after(key, after)
        }

        fn log_watch(&self, key: &str) -> watch::Receiver<LogId> {
            self.inner.log_watch(key)
        }

        fn zset_add(&self, key: &str, member: &str, score: f64) -> Result<bool, WavegraphError> {
            self.inner.zset_add(key, member, score)
        }

        fn zset_score(&self, key: &str, member: &str) -> Result<Option<f64>, WavegraphError> {
            self.inner.zset_score(key, member)
        }

        fn zset_range_rev(
            &self,
            key: &str,
            max: f64,
            min: f64,
            limit: Option<usize>,
        ) -> Result<Vec<(String, f64)>, WavegraphError> {
            self.inner.zset_range_rev(key, max, min, limit)
        }
    }

    #[test]
    fn create_persists_immediately() {
        let nodes = node_store();
        let node = nodes.create(None).expect("create");

        assert!(node.saved);
        assert!(!node.dirty);

        let loaded = nodes.load(&node.uuid).expect("load");
        assert_eq!(loaded.uuid, node.uuid);
        assert!(loaded.loaded);
    }

    #[test]
    fn create_with_known_identifier() {
        let nodes = node_store();
        let uuid = NodeUuid::generate();
        let node = nodes.create(Some(uuid.clone())).expect("create");
        assert_eq!(node.uuid, uuid);
        assert!(nodes.exists(&uuid).expect("exists"));
    }

    #[test]
    fn load_missing_node_fails() {
        let nodes = node_store();
        let err = nodes.load(&NodeUuid::generate()).expect_err("must fail");
        assert!(matches!(err, WavegraphError::NodeNotFound(_)));
    }

    #[test]
    fn load_malformed_record_is_serialization_error() {
        let store = Arc::new(MemoryStore::new());
        let nodes = NodeStore::new(Arc::clone(&store));
        let uuid = NodeUuid::generate();

        store
            .kv_set(&node_key(&uuid), b"{not json")
            .expect("poison record");

        let err = nodes.load(&uuid).expect_err("must fail");
        assert!(matches!(err, WavegraphError::Serialization(_)));
    }

    #[test]
    fn connect_maintains_both_sides() {
        let nodes = node_store();
        let mut a = nodes.create(None).expect("create");
        let mut b = nodes.create(None).expect("create");

        nodes.connect_to(&mut a, &mut b).expect("connect");

        assert!(a.outgoing.contains(&b.uuid));
        assert!(b.incoming.contains(&a.uuid));

        // Persisted, not just in memory
        let a2 = nodes.load(&a.uuid).expect("load");
        let b2 = nodes.load(&b.uuid).expect("load");
        assert!(a2.outgoing.contains(&b.uuid));
        assert!(b2.incoming.contains(&a.uuid));
    }

    #[test]
    fn connect_is_idempotent() {
        let nodes = node_store();
        let mut a = nodes.create(None).expect("create");
        let mut b = nodes.create(None).expect("create");

        nodes.connect_to(&mut a, &mut b).expect("connect");
        nodes.connect_to(&mut a, &mut b).expect("connect again");

        assert_eq!(a.outgoing.len(), 1);
        assert_eq!(b.incoming.len(), 1);
    }

    #[test]
    fn connect_rejects_self_loop() {
        let nodes = node_store();
        let mut a = nodes.create(None).expect("create");
        let mut a_again = a.clone();

        let err = nodes
            .connect_to(&mut a, &mut a_again)
            .expect_err("must fail");
        assert!(matches!(err, WavegraphError::SelfConnection(_)));
    }

    #[test]
    fn connect_requires_saved_clean_nodes() {
        let nodes = node_store();
        let mut unsaved = Node::new();
        let mut saved = nodes.create(None).expect("create");

        let err = nodes
            .connect_to(&mut unsaved, &mut saved)
            .expect_err("must fail");
        assert!(matches!(err, WavegraphError::NotSaved(_)));

        let mut dirty = nodes.create(None).expect("create");
        nodes
            .set_attribute(&mut dirty, "k", serde_json::json!(1), false)
            .expect("set");
        let err = nodes
            .connect_to(&mut dirty, &mut saved)
            .expect_err("must fail");
        assert!(matches!(err, WavegraphError::NotSaved(_)));
    }

    #[test]
    fn connect_from_reverses_arguments() {
        let nodes = node_store();
        let mut a = nodes.create(None).expect("create");
        let mut b = nodes.create(None).expect("create");

        nodes.connect_from(&mut b, &mut a).expect("connect");

        assert!(a.outgoing.contains(&b.uuid));
        assert!(b.incoming.contains(&a.uuid));
    }

    #[test]
    fn connect_emits_delta_per_side() {
        let store = Arc::new(MemoryStore::new());
        let nodes = NodeStore::new(Arc::clone(&store));
        let mut a = nodes.create(None).expect("create");
        let mut b = nodes.create(None).expect("create");

        nodes.connect_to(&mut a, &mut b).expect("connect");

        let a_stream = store
            .log_read_after(&node_stream_key(&a.uuid), None)
            .expect("read");
        let b_stream = store
            .log_read_after(&node_stream_key(&b.uuid), None)
            .expect("read");
        assert_eq!(a_stream.len(), 1);
        assert_eq!(b_stream.len(), 1);

        let record: DeltaRecord = serde_json::from_slice(&a_stream[0].payload).expect("decode");
        assert!(matches!(record, DeltaRecord::AddOutgoingConnection { .. }));
    }

    #[test]
    fn failed_second_save_surfaces_partial_connection() {
        let store = Arc::new(FailingSaves::new());
        let nodes = NodeStore::new(Arc::clone(&store));
        let mut a = nodes.create(None).expect("create");
        let mut b = nodes.create(None).expect("create");

        store.deny_key(node_key(&b.uuid));

        let err = nodes.connect_to(&mut a, &mut b).expect_err("must fail");
        assert!(matches!(
            &err,
            WavegraphError::PartialConnection { from, to, .. }
                if *from == a.uuid && *to == b.uuid
        ));

        // The persisted edge is one-sided: a's save landed, b's did not.
        let a2 = nodes.load(&a.uuid).expect("load");
        let b2 = nodes.load(&b.uuid).expect("load");
        assert!(a2.outgoing.contains(&b.uuid));
        assert!(b2.incoming.is_empty());
    }

    #[test]
    fn traversal_on_cycle_terminates() {
        let nodes = node_store();
        let mut a = nodes.create(None).expect("create");
        let mut b = nodes.create(None).expect("create");

        nodes.connect_to(&mut a, &mut b).expect("connect");
        nodes.connect_to(&mut b, &mut a).expect("connect back");

        let reached = nodes.query_outgoing(&a.uuid).expect("traverse");
        assert_eq!(reached.len(), 2);
        assert!(reached.contains_key(&a.uuid));
        assert!(reached.contains_key(&b.uuid));
    }

    #[test]
    fn traversal_follows_outgoing_only() {
        let nodes = node_store();
        let mut a = nodes.create(None).expect("create");
        let mut b = nodes.create(None).expect("create");
        let mut c = nodes.create(None).expect("create");

        nodes.connect_to(&mut a, &mut b).expect("connect");
        // c -> a: reachable from c, but a must not see c
        nodes.connect_to(&mut c, &mut a).expect("connect");

        let from_a = nodes.query_outgoing(&a.uuid).expect("traverse");
        assert_eq!(from_a.len(), 2);
        assert!(!from_a.contains_key(&c.uuid));

        let from_c = nodes.query_outgoing(&c.uuid).expect("traverse");
        assert_eq!(from_c.len(), 3);
    }

    #[test]
    fn traversal_wraps_load_failures() {
        let store = Arc::new(MemoryStore::new());
        let nodes = NodeStore::new(Arc::clone(&store));
        let mut a = nodes.create(None).expect("create");
        let mut b = nodes.create(None).expect("create");
        nodes.connect_to(&mut a, &mut b).expect("connect");

        // Corrupt b's record so the walk fails mid-traversal
        store
            .kv_set(&node_key(&b.uuid), b"garbage")
            .expect("poison record");

        let err = nodes.query_outgoing(&a.uuid).expect_err("must fail");
        assert!(matches!(err, WavegraphError::Traversal { .. }));
    }

    #[test]
    fn set_attribute_marks_dirty_and_optionally_persists() {
        let nodes = node_store();
        let mut node = nodes.create(None).expect("create");

        nodes
            .set_attribute(&mut node, "color", serde_json::json!("teal"), false)
            .expect("set");
        assert!(node.dirty);
        assert!(nodes.load(&node.uuid).expect("load").attributes.is_empty());

        nodes
            .set_attribute(&mut node, "color", serde_json::json!("teal"), true)
            .expect("set persist");
        assert!(!node.dirty);
        assert_eq!(
            nodes.load(&node.uuid).expect("load").attributes["color"],
            serde_json::json!("teal")
        );
    }
}
