//! # VersionGraph
//!
//! The primary entry point. A `VersionGraph` wraps a storage backend, the
//! registered change hooks and the configuration. Every operation runs in
//! its own transaction: committed on success, rolled back on any error, so
//! a failing hook or a conflict leaves nothing behind.
//!
//! Several operations can share one transaction through [`ExplicitTx`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cascade;
use crate::config::GraphConfig;
use crate::edges;
use crate::model::keys;
use crate::model::{Edge, Entity, EntityKind, NewEntity, PropertyMap};
use crate::ownership;
use crate::propagation::ChangeHook;
use crate::provenance::{self, Provenance};
use crate::storage::{BackendConfig, ConstraintType, MemoryBackend, StorageBackend};
use crate::tx::{Transaction, TxId, TxMode};
use crate::versioning::{self, Context, Created, Transition};
use crate::{Error, Result};

// ============================================================================
// VersionGraph
// ============================================================================

pub struct VersionGraph<B: StorageBackend> {
    backend: B,
    config: GraphConfig,
    hooks: Vec<Arc<dyn ChangeHook<B>>>,
}

impl<B: StorageBackend> VersionGraph<B> {
    /// Wrap `backend`.
    ///
    /// Fails with `Config` if the backend can guarantee neither serializable
    /// transactions nor the active-key unique constraint, since uniqueness
    /// within scope could not hold under concurrency.
    pub async fn with_backend(backend: B, config: GraphConfig) -> Result<Self> {
        let caps = backend.capabilities();
        let backstop = config.unique_backstop && caps.unique_constraints;
        if !caps.serializable && !backstop {
            return Err(Error::Config(
                "backend offers neither serializable transactions nor a unique constraint backstop"
                    .into(),
            ));
        }
        if backstop {
            backend
                .create_constraint(keys::ENTITY_LABEL, keys::ACTIVE_KEY, ConstraintType::Unique)
                .await?;
        }
        info!(
            serializable = caps.serializable,
            backstop,
            provenance = config.record_provenance,
            "version graph opened"
        );
        Ok(Self { backend, config, hooks: Vec::new() })
    }

    /// Register a hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn ChangeHook<B>>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn context(&self) -> Context<'_, B> {
        Context {
            backend: &self.backend,
            hooks: &self.hooks,
            record_provenance: self.config.record_provenance,
        }
    }

    /// Begin an explicit transaction.
    pub async fn begin(&self, mode: TxMode) -> Result<ExplicitTx<'_, B>> {
        let tx = self.backend.begin_tx(mode).await?;
        Ok(ExplicitTx { graph: self, tx })
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Add the first version of an entity.
    #[instrument(skip(self, new), fields(kind = %new.variant.kind(), id = %new.id))]
    pub async fn create_entity(&self, new: NewEntity) -> Result<Created> {
        let mut tx = self.begin(TxMode::ReadWrite).await?;
        let result = tx.create_entity(new).await;
        tx.finish(result).await
    }

    /// Replace `old` with a successor carrying `attributes`.
    #[instrument(skip(self, old, attributes), fields(lineage = %old.lineage(), version = old.version))]
    pub async fn replace_entity(&self, old: &Entity, attributes: PropertyMap) -> Result<Transition> {
        let mut tx = self.begin(TxMode::ReadWrite).await?;
        let result = tx.replace_entity(old, attributes).await;
        tx.finish(result).await
    }

    /// Invalidate `entity` without a successor.
    #[instrument(skip(self, entity), fields(lineage = %entity.lineage(), version = entity.version))]
    pub async fn retire_entity(&self, entity: &Entity) -> Result<Transition> {
        let mut tx = self.begin(TxMode::ReadWrite).await?;
        let result = tx.retire_entity(entity).await;
        tx.finish(result).await
    }

    /// Replace `root` and re-version everything depending on it.
    #[instrument(skip(self, root, attributes), fields(lineage = %root.lineage()))]
    pub async fn replace_cascading(
        &self,
        root: &Entity,
        attributes: PropertyMap,
    ) -> Result<Vec<Transition>> {
        let mut tx = self.begin(TxMode::ReadWrite).await?;
        let result = tx.replace_cascading(root, attributes).await;
        tx.finish(result).await
    }

    #[instrument(skip(self, edge), fields(edge = %edge))]
    pub async fn link(&self, edge: Edge) -> Result<Edge> {
        let mut tx = self.begin(TxMode::ReadWrite).await?;
        let result = tx.link(edge).await;
        tx.finish(result).await
    }

    #[instrument(skip(self))]
    pub async fn unlink(&self, edge: Uuid) -> Result<Edge> {
        let mut tx = self.begin(TxMode::ReadWrite).await?;
        let result = tx.unlink(edge).await;
        tx.finish(result).await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The valid resource version managing `uuid`.
    #[instrument(skip(self))]
    pub async fn resolve_owner(&self, uuid: Uuid) -> Result<Entity> {
        let tx = self.begin(TxMode::ReadOnly).await?;
        let result = tx.resolve_owner(uuid).await;
        tx.finish(result).await
    }

    /// The valid version of `id` in a scope. `resource` is the owning
    /// resource's id for components and relationships, `None` for resources.
    #[instrument(skip(self))]
    pub async fn get_by_scope_id(
        &self,
        kind: EntityKind,
        id: &str,
        resource: Option<&str>,
    ) -> Result<Entity> {
        let tx = self.begin(TxMode::ReadOnly).await?;
        let result = tx.get_by_scope_id(kind, id, resource).await;
        tx.finish(result).await
    }

    /// Every version of a lineage, oldest first.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        kind: EntityKind,
        id: &str,
        resource: Option<&str>,
    ) -> Result<Vec<Entity>> {
        let tx = self.begin(TxMode::ReadOnly).await?;
        let result = tx.history(kind, id, resource).await;
        tx.finish(result).await
    }

    #[instrument(skip(self))]
    pub async fn edges(&self, uuid: Uuid) -> Result<Vec<Edge>> {
        let tx = self.begin(TxMode::ReadOnly).await?;
        let result = tx.edges(uuid).await;
        tx.finish(result).await
    }

    #[instrument(skip(self, resource), fields(lineage = %resource.lineage()))]
    pub async fn members(&self, resource: &Entity, include_history: bool) -> Result<Vec<Entity>> {
        let tx = self.begin(TxMode::ReadOnly).await?;
        let result = tx.members(resource, include_history).await;
        tx.finish(result).await
    }

    /// Stored provenance records about entity version `uuid`, oldest first.
    #[instrument(skip(self))]
    pub async fn provenance(&self, uuid: Uuid) -> Result<Vec<Provenance>> {
        let tx = self.begin(TxMode::ReadOnly).await?;
        let result = tx.provenance(uuid).await;
        tx.finish(result).await
    }
}

/// In-memory graph for testing and embedding.
impl VersionGraph<MemoryBackend> {
    pub async fn open_memory() -> Result<Self> {
        Self::open(GraphConfig::default()).await
    }

    pub async fn open(config: GraphConfig) -> Result<Self> {
        match config.backend {
            BackendConfig::Memory => Self::with_backend(MemoryBackend::new(), config).await,
        }
    }
}

// ============================================================================
// ExplicitTx
// ============================================================================

/// Explicit transaction handle.
///
/// Dropping it without `commit` discards its writes.
pub struct ExplicitTx<'g, B: StorageBackend> {
    graph: &'g VersionGraph<B>,
    tx: B::Tx,
}

impl<'g, B: StorageBackend> ExplicitTx<'g, B> {
    pub fn id(&self) -> TxId {
        self.tx.id()
    }

    pub async fn create_entity(&mut self, new: NewEntity) -> Result<Created> {
        let entity = new.into_entity(Utc::now());
        versioning::add(&self.graph.context(), &mut self.tx, entity).await
    }

    pub async fn replace_entity(&mut self, old: &Entity, attributes: PropertyMap) -> Result<Transition> {
        versioning::set(&self.graph.context(), &mut self.tx, old, old.successor(attributes)).await
    }

    pub async fn retire_entity(&mut self, entity: &Entity) -> Result<Transition> {
        versioning::retire(&self.graph.context(), &mut self.tx, entity).await
    }

    pub async fn replace_cascading(
        &mut self,
        root: &Entity,
        attributes: PropertyMap,
    ) -> Result<Vec<Transition>> {
        cascade::replace_cascading(&self.graph.context(), &mut self.tx, root, attributes).await
    }

    pub async fn link(&mut self, edge: Edge) -> Result<Edge> {
        edges::link(&self.graph.context(), &mut self.tx, edge).await
    }

    pub async fn unlink(&mut self, edge: Uuid) -> Result<Edge> {
        edges::unlink(&self.graph.context(), &mut self.tx, edge).await
    }

    pub async fn resolve_owner(&self, uuid: Uuid) -> Result<Entity> {
        ownership::resource(&self.graph.backend, &self.tx, uuid).await
    }

    pub async fn get_by_scope_id(
        &self,
        kind: EntityKind,
        id: &str,
        resource: Option<&str>,
    ) -> Result<Entity> {
        versioning::get_by_scope_id(&self.graph.backend, &self.tx, kind, id, resource).await
    }

    pub async fn history(
        &self,
        kind: EntityKind,
        id: &str,
        resource: Option<&str>,
    ) -> Result<Vec<Entity>> {
        versioning::history(&self.graph.backend, &self.tx, kind, id, resource).await
    }

    pub async fn edges(&self, uuid: Uuid) -> Result<Vec<Edge>> {
        edges::of_entity(&self.graph.backend, &self.tx, uuid).await
    }

    pub async fn members(&self, resource: &Entity, include_history: bool) -> Result<Vec<Entity>> {
        ownership::members(&self.graph.backend, &self.tx, resource, include_history).await
    }

    pub async fn provenance(&self, uuid: Uuid) -> Result<Vec<Provenance>> {
        provenance::about(&self.graph.backend, &self.tx, uuid).await
    }

    /// Commit, then tell every hook. A failed commit is reported to the
    /// hooks as a rollback.
    pub async fn commit(self) -> Result<()> {
        let id = self.id();
        match self.graph.backend.commit_tx(self.tx).await {
            Ok(()) => {
                for hook in &self.graph.hooks {
                    hook.committed(id).await;
                }
                Ok(())
            }
            Err(e) => {
                for hook in &self.graph.hooks {
                    hook.rolled_back(id).await;
                }
                Err(e)
            }
        }
    }

    pub async fn rollback(self) -> Result<()> {
        let id = self.id();
        let result = self.graph.backend.rollback_tx(self.tx).await;
        for hook in &self.graph.hooks {
            hook.rolled_back(id).await;
        }
        result
    }

    /// Commit if `result` is `Ok`, otherwise roll back and return the error.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                let id = self.id();
                if e.is_client_error() {
                    debug!(tx = %id, error = %e, "rolling back");
                } else {
                    warn!(tx = %id, error = %e, "rolling back");
                }
                if let Err(rollback) = self.rollback().await {
                    warn!(tx = %id, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}
