//! Dependency propagation: single-hop fan-out of a version transition.
//!
//! Given an `(old, new)` transition, every edge touching `old` is checked
//! against its [`Dependence`](crate::model::Dependence). Each endpoint that
//! must hear about the change gets a `DependencyChanged` provenance record
//! and is handed to the registered [`ChangeHook`]s, all inside the caller's
//! transaction.
//!
//! Propagation never re-versions a dependent itself. Deeper cascades are
//! composed by calling `versioning::set` for the dependents, see
//! [`crate::cascade`].

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::edges;
use crate::model::{Edge, Entity};
use crate::provenance::{self, ProvEvent, Provenance};
use crate::storage::StorageBackend;
use crate::tx::{Transaction, TxId};
use crate::versioning::{self, Context};
use crate::Result;

/// One dependent notified about a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyChange {
    /// The edge the change travelled along.
    pub edge: Edge,
    /// The version that was replaced (already closed).
    pub old: Entity,
    /// Its successor, or `None` when `old` was retired.
    pub new: Option<Entity>,
    /// Uuid of the endpoint being notified. Always a valid version.
    pub dependent: Uuid,
    pub provenance: Provenance,
}

/// Hook point for dependents reacting to a change.
///
/// Hooks run inside the transaction of the change. Returning an error aborts
/// the whole operation, including the transition that triggered it. The
/// `VersionGraph` handle reports how each transaction ended through
/// `committed` and `rolled_back`.
#[async_trait]
pub trait ChangeHook<B: StorageBackend>: Send + Sync {
    async fn dependency_changed(
        &self,
        backend: &B,
        tx: &mut B::Tx,
        change: &DependencyChange,
    ) -> Result<()>;

    async fn committed(&self, _tx: TxId) {}

    async fn rolled_back(&self, _tx: TxId) {}
}

/// A hook that keeps the changes of committed transactions.
///
/// Changes are staged per transaction and published when it commits. A
/// transaction that rolls back, or is dropped unfinished, publishes nothing.
#[derive(Debug, Default)]
pub struct ChangeLog {
    staged: Mutex<HashMap<TxId, Vec<DependencyChange>>>,
    committed: Mutex<Vec<DependencyChange>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<DependencyChange> {
        self.committed.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.committed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.lock().is_empty()
    }

    /// Changes seen in transactions that have not finished yet.
    pub fn staged(&self) -> usize {
        self.staged.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl<B: StorageBackend> ChangeHook<B> for ChangeLog {
    async fn dependency_changed(
        &self,
        _backend: &B,
        tx: &mut B::Tx,
        change: &DependencyChange,
    ) -> Result<()> {
        self.staged.lock().entry(tx.id()).or_default().push(change.clone());
        Ok(())
    }

    async fn committed(&self, tx: TxId) {
        let staged = self.staged.lock().remove(&tx);
        if let Some(changes) = staged {
            self.committed.lock().extend(changes);
        }
    }

    async fn rolled_back(&self, tx: TxId) {
        self.staged.lock().remove(&tx);
    }
}

/// Notify every dependent of `old` that it transitioned to `new`.
pub async fn trigger_change<B: StorageBackend>(
    cx: &Context<'_, B>,
    tx: &mut B::Tx,
    old: &Entity,
    new: Option<&Entity>,
) -> Result<Vec<DependencyChange>> {
    let (node, _) = versioning::locate(cx.backend, tx, old.uuid).await?;
    let successor = new.map(|e| e.uuid);

    let mut changes = Vec::new();
    for edge in edges::incident(cx.backend, tx, node).await? {
        let Some(dependent) = edge.cascade_target(old.uuid) else { continue };
        // Edges into closed versions have been carried forward with them.
        let (_, target) = versioning::locate(cx.backend, tx, dependent).await?;
        if !target.is_valid() {
            continue;
        }

        let (old_uuid, edge_uuid) = (old.uuid, edge.uuid);
        let provenance = provenance::record(cx, tx, ProvEvent::DependencyChanged, dependent, |p| {
            p.with_previous(old_uuid).with_successor(successor).with_edge(edge_uuid)
        })
        .await?;
        debug!(%dependent, edge = %edge, "dependency changed");

        let change = DependencyChange {
            edge,
            old: old.clone(),
            new: new.cloned(),
            dependent,
            provenance,
        };
        for hook in cx.hooks {
            hook.dependency_changed(cx.backend, tx, &change).await?;
        }
        changes.push(change);
    }
    Ok(changes)
}
