//! # provenance-graph: versioned entities over a property graph
//!
//! A provenance-aware versioning layer on top of a graph store. Entities
//! (resources, components, relationships) are never updated in place: every
//! change closes the validity window of the current version and adds a new
//! version in the same transaction, then notifies dependents across typed
//! dependency edges.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the engine and the store
//! 2. **Insert + invalidate**: no in-place mutation of entity state
//! 3. **Explicit transactions**: every engine function takes `&mut B::Tx`
//! 4. **Single-hop propagation**: multi-hop cascades are composed on top, with a visited set
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provenance_graph::{VersionGraph, NewEntity, PropertyMap, Value};
//!
//! # async fn example() -> provenance_graph::Result<()> {
//! let graph = VersionGraph::open_memory().await?;
//!
//! graph.create_entity(NewEntity::resource("lab")).await?;
//! let created = graph
//!     .create_entity(NewEntity::component("lab", "comp-a").with_attribute("rows", 10))
//!     .await?;
//!
//! let mut attrs = PropertyMap::new();
//! attrs.insert("rows".into(), Value::from(12));
//! let transition = graph.replace_entity(&created.entity, attrs).await?;
//! assert_eq!(transition.new.map(|e| e.version), Some(2));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Role |
//! |--------|------|
//! | `tx` | Transaction mode and identity |
//! | `storage` | `StorageBackend` trait + in-memory reference backend |
//! | `model` | Store DTOs, entity and edge model |
//! | `versioning` | add / invalidate / set / retire |
//! | `ownership` | `manages` / `includes` edges and owner resolution |
//! | `propagation` | Single-hop dependency change fan-out |
//! | `cascade` | Multi-hop re-versioning built on `set` |
//! | `provenance` | Audit records for every event |
//! | `edges` | User edges: link, unlink, listing |
//! | `config` | `GraphConfig` |
//! | `graph` | `VersionGraph` handle and `ExplicitTx` |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod tx;
pub mod config;
pub mod provenance;
pub mod edges;
pub mod versioning;
pub mod ownership;
pub mod propagation;
pub mod cascade;
pub mod graph;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    Node, Relationship, Value, PropertyMap, NodeId, RelId, Direction,
    Entity, EntityKind, Variant, Validity, Lineage, NewEntity,
    Edge, EdgeDirection, Dependence, Endpoint,
};

// ============================================================================
// Re-exports: Storage & Transactions
// ============================================================================

pub use storage::{StorageBackend, BackendConfig, BackendCapabilities, ConstraintType, MemoryBackend};
pub use tx::{Transaction, TxMode, TxId};

// ============================================================================
// Re-exports: Engine
// ============================================================================

pub use config::GraphConfig;
pub use provenance::{Provenance, ProvEvent};
pub use versioning::{Context, Created, Transition};
pub use propagation::{ChangeHook, DependencyChange};
pub use graph::{VersionGraph, ExplicitTx};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Conflict: {kind} '{id}' already has a valid version in scope '{scope}'")]
    Conflict { kind: EntityKind, scope: String, id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store failure: {0}")]
    StoreFailure(String),

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure was caused by the request rather than the store.
    ///
    /// Service layers map these to client errors and everything else to
    /// server errors.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Conflict { .. }
                | Error::NotFound(_)
                | Error::InvalidEntity(_)
                | Error::CyclicDependency(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        let conflict = Error::Conflict {
            kind: EntityKind::Component,
            scope: "lab".into(),
            id: "comp-a".into(),
        };
        assert!(conflict.is_client_error());
        assert!(Error::NotFound("x".into()).is_client_error());
        assert!(!Error::StoreFailure("disk".into()).is_client_error());
        assert!(!Error::Config("bad".into()).is_client_error());
    }

    #[test]
    fn test_conflict_message_names_scope() {
        let err = Error::Conflict {
            kind: EntityKind::Component,
            scope: "lab".into(),
            id: "comp-a".into(),
        };
        assert_eq!(
            err.to_string(),
            "Conflict: component 'comp-a' already has a valid version in scope 'lab'"
        );
    }
}
