//! # Storage Backend Trait
//!
//! This is THE contract between the versioning engine and any graph store.
//! The engine needs very little: node and relationship creation, indexed
//! lookups, a handful of in-place property writes (closing a validity
//! window) and transactions that commit or abort as a unit.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | Snapshot-isolated in-memory store for testing/embedding |

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub use memory::MemoryBackend;

// ============================================================================
// Backend Configuration
// ============================================================================

/// Which storage backend to open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-memory (no persistence)
    #[default]
    Memory,
}

// ============================================================================
// Constraint types
// ============================================================================

/// Type of constraint to create on a label+property pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    /// Property value must be unique among nodes with this label that
    /// carry the property. Nodes without the property are unconstrained.
    Unique,
}

// ============================================================================
// Backend capabilities
// ============================================================================

/// What a backend guarantees. Checked once when a `VersionGraph` is opened.
///
/// The uniqueness check in `versioning::add` is a read followed by a write.
/// It is only race-free if the backend is serializable, or if the backend
/// enforces a unique constraint on the active key as a backstop.
#[derive(Debug, Clone, Default)]
pub struct BackendCapabilities {
    /// A read-write transaction's reads and writes are serializable against
    /// every other read-write transaction.
    pub serializable: bool,
    /// `create_constraint(.., ConstraintType::Unique)` is enforced.
    pub unique_constraints: bool,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The storage contract.
///
/// Reads take `&Self::Tx`, writes take `&mut Self::Tx`. Every write made
/// through a transaction must be discarded if the transaction is rolled back
/// or dropped without commit.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shut down the backend, flushing any pending writes.
    async fn shutdown(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction. On error nothing from the transaction is visible.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Set a property on a node (upsert).
    async fn set_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()>;

    /// Remove a property from a node.
    async fn remove_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
    ) -> Result<()>;

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    async fn get_relationship(&self, tx: &Self::Tx, id: RelId) -> Result<Option<Relationship>>;

    /// Delete a relationship. Returns true if it existed.
    async fn delete_relationship(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and type.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Scan
    // ========================================================================

    /// Find all nodes with a given label.
    async fn nodes_by_label(&self, tx: &Self::Tx, label: &str) -> Result<Vec<Node>>;

    /// Find nodes by label + property value (index-backed if available).
    async fn nodes_by_property(
        &self,
        tx: &Self::Tx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>>;

    /// Find relationships carrying a property value, e.g. an edge uuid.
    ///
    /// Default: scans the outgoing relationships of every node with `label`.
    async fn relationships_by_property(
        &self,
        tx: &Self::Tx,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Relationship>> {
        let mut result = Vec::new();
        for node in self.nodes_by_label(tx, label).await? {
            let rels = self.get_relationships(tx, node.id, Direction::Outgoing, None).await?;
            result.extend(rels.into_iter().filter(|r| r.properties.get(key) == Some(value)));
        }
        Ok(result)
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    /// Total number of nodes.
    async fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// Total number of relationships.
    async fn relationship_count(&self, tx: &Self::Tx) -> Result<u64>;

    // ========================================================================
    // Constraints
    // ========================================================================

    /// Create a schema constraint. Idempotent.
    ///
    /// Default returns "not supported".
    async fn create_constraint(
        &self,
        _label: &str,
        _property: &str,
        _constraint_type: ConstraintType,
    ) -> Result<()> {
        Err(Error::StoreFailure("constraints not supported".into()))
    }

    // ========================================================================
    // Capability negotiation
    // ========================================================================

    /// Report what this backend guarantees.
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }
}
