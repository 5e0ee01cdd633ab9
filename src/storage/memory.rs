//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//!
//! ## Transactions
//!
//! - Every transaction works on a private snapshot of the committed graph.
//!   Reads see the snapshot plus the transaction's own writes.
//! - Commit publishes the snapshot only if no other read-write transaction
//!   committed since it was taken (first committer wins). The loser gets
//!   `Error::StoreFailure` and none of its writes become visible. This makes
//!   read-write transactions serializable.
//! - Rollback, or dropping the transaction, discards the snapshot.
//! - Read-only transactions reject writes.
//!
//! ## Limitations
//!
//! - Whole-graph snapshots: every `begin_tx` clones the graph. Fine for tests
//!   and embedding, not for large graphs.
//! - Conflicts are detected per store, not per key, so unrelated concurrent
//!   writers also conflict.
//! - No property indexes: property lookups scan the label index.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::model::*;
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};
use super::{BackendCapabilities, ConstraintType, StorageBackend};

// ============================================================================
// Graph state
// ============================================================================

#[derive(Debug, Clone, Default)]
struct GraphState {
    nodes: HashMap<NodeId, Node>,
    relationships: HashMap<RelId, Relationship>,
    /// node_id → list of relationship IDs
    adjacency: HashMap<NodeId, Vec<RelId>>,
    /// label → node IDs
    label_index: HashMap<String, Vec<NodeId>>,
    /// (label, property) pairs under a unique constraint
    unique: Vec<(String, String)>,
}

impl GraphState {
    /// Check every unique constraint that applies to `id`'s current state.
    fn check_unique(&self, id: NodeId) -> Result<()> {
        let Some(node) = self.nodes.get(&id) else { return Ok(()) };
        for (label, key) in &self.unique {
            if !node.has_label(label) {
                continue;
            }
            let Some(value) = node.get(key) else { continue };
            let clash = self
                .label_index
                .get(label)
                .into_iter()
                .flatten()
                .filter(|other| **other != id)
                .filter_map(|other| self.nodes.get(other))
                .any(|other| other.get(key) == Some(value));
            if clash {
                return Err(Error::StoreFailure(format!(
                    "unique constraint violated on :{label}({key}) = {value}"
                )));
            }
        }
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }
}

#[derive(Debug, Default)]
struct Committed {
    /// Bumped on every successful read-write commit.
    revision: u64,
    graph: GraphState,
}

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    committed: RwLock<Committed>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                committed: RwLock::new(Committed::default()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }

    /// Number of read-write commits so far.
    pub fn revision(&self) -> u64 {
        self.inner.committed.read().revision
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction: a private snapshot of the graph.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    base_revision: u64,
    graph: GraphState,
    dirty: bool,
}

impl MemoryTx {
    fn writable(&mut self) -> Result<&mut GraphState> {
        if self.mode == TxMode::ReadOnly {
            return Err(Error::StoreFailure(format!("{} is read-only", self.id)));
        }
        self.dirty = true;
        Ok(&mut self.graph)
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn shutdown(&self) -> Result<()> { Ok(()) }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        let committed = self.inner.committed.read();
        Ok(MemoryTx {
            id,
            mode,
            base_revision: committed.revision,
            graph: committed.graph.clone(),
            dirty: false,
        })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        if !tx.dirty {
            return Ok(());
        }
        let mut committed = self.inner.committed.write();
        if committed.revision != tx.base_revision {
            warn!(tx = %tx.id, base = tx.base_revision, current = committed.revision, "serialization conflict");
            return Err(Error::StoreFailure(format!(
                "serialization conflict: {} read revision {} but store is at revision {}",
                tx.id, tx.base_revision, committed.revision
            )));
        }
        committed.revision += 1;
        committed.graph = tx.graph;
        debug!(tx = %tx.id, revision = committed.revision, "committed");
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        debug!(tx = %tx.id, dirty = tx.dirty, "rolled back");
        Ok(())
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        let graph = tx.writable()?;
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Node::new(id, labels, props);

        for label in &node.labels {
            graph.label_index.entry(label.clone()).or_default().push(id);
        }
        graph.nodes.insert(id, node);
        graph.adjacency.insert(id, Vec::new());

        if let Err(e) = graph.check_unique(id) {
            // Undo inside the snapshot so the transaction stays usable.
            if let Some(node) = graph.nodes.remove(&id) {
                for label in &node.labels {
                    if let Some(ids) = graph.label_index.get_mut(label) {
                        ids.retain(|nid| *nid != id);
                    }
                }
            }
            graph.adjacency.remove(&id);
            return Err(e);
        }

        Ok(id)
    }

    async fn get_node(&self, tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        Ok(tx.graph.nodes.get(&id).cloned())
    }

    async fn set_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        let graph = tx.writable()?;
        let previous = graph.node_mut(id)?.properties.insert(key.to_string(), val);
        if let Err(e) = graph.check_unique(id) {
            let node = graph.node_mut(id)?;
            match previous {
                Some(old) => node.properties.insert(key.to_string(), old),
                None => node.properties.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
    ) -> Result<()> {
        let graph = tx.writable()?;
        graph.node_mut(id)?.properties.remove(key);
        Ok(())
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        let graph = tx.writable()?;
        if !graph.nodes.contains_key(&src) {
            return Err(Error::NotFound(format!("Source node {src}")));
        }
        if !graph.nodes.contains_key(&dst) {
            return Err(Error::NotFound(format!("Target node {dst}")));
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        let rel = Relationship::new(id, src, dst, rel_type, props);
        graph.relationships.insert(id, rel);

        graph.adjacency.entry(src).or_default().push(id);
        if src != dst {
            graph.adjacency.entry(dst).or_default().push(id);
        }

        Ok(id)
    }

    async fn get_relationship(&self, tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        Ok(tx.graph.relationships.get(&id).cloned())
    }

    async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        let graph = tx.writable()?;
        let removed = graph.relationships.remove(&id);
        if let Some(rel) = &removed {
            for endpoint in [rel.src, rel.dst] {
                if let Some(rels) = graph.adjacency.get_mut(&endpoint) {
                    rels.retain(|rid| *rid != id);
                }
            }
        }
        Ok(removed.is_some())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let graph = &tx.graph;
        let Some(rel_ids) = graph.adjacency.get(&node) else { return Ok(Vec::new()) };

        Ok(rel_ids
            .iter()
            .filter_map(|rid| graph.relationships.get(rid))
            .filter(|rel| rel.touches(node, dir))
            .filter(|rel| rel_type.is_none_or(|t| rel.rel_type == t))
            .cloned()
            .collect())
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn nodes_by_label(&self, tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        let graph = &tx.graph;
        Ok(graph
            .label_index
            .get(label)
            .into_iter()
            .flatten()
            .filter_map(|id| graph.nodes.get(id).cloned())
            .collect())
    }

    async fn nodes_by_property(
        &self,
        tx: &MemoryTx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>> {
        let graph = &tx.graph;
        Ok(graph
            .label_index
            .get(label)
            .into_iter()
            .flatten()
            .filter_map(|id| graph.nodes.get(id))
            .filter(|n| n.get(key) == Some(value))
            .cloned()
            .collect())
    }

    async fn relationships_by_property(
        &self,
        tx: &MemoryTx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Relationship>> {
        let graph = &tx.graph;
        Ok(graph
            .relationships
            .values()
            .filter(|r| r.properties.get(key) == Some(value))
            .filter(|r| graph.nodes.get(&r.src).is_some_and(|n| n.has_label(label)))
            .cloned()
            .collect())
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    async fn node_count(&self, tx: &MemoryTx) -> Result<u64> {
        Ok(tx.graph.nodes.len() as u64)
    }

    async fn relationship_count(&self, tx: &MemoryTx) -> Result<u64> {
        Ok(tx.graph.relationships.len() as u64)
    }

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Applied directly to the committed graph. Bumps the revision so that
    /// transactions started before the constraint existed cannot commit.
    async fn create_constraint(
        &self,
        label: &str,
        property: &str,
        constraint_type: ConstraintType,
    ) -> Result<()> {
        let ConstraintType::Unique = constraint_type;
        let mut committed = self.inner.committed.write();
        let entry = (label.to_string(), property.to_string());
        if committed.graph.unique.contains(&entry) {
            return Ok(());
        }

        committed.graph.unique.push(entry);
        let ids = committed.graph.label_index.get(label).cloned().unwrap_or_default();
        for id in ids {
            if let Err(e) = committed.graph.check_unique(id) {
                committed.graph.unique.pop();
                return Err(e);
            }
        }
        committed.revision += 1;
        debug!(label, property, "unique constraint installed");
        Ok(())
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            serializable: true,
            unique_constraints: true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
