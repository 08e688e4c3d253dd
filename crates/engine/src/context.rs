//! Unit of work
//!
//! A context pairs one change tracker with the shared database. Entities
//! enter through Add / Attach / Update, queries and Find; SaveChanges
//! writes the tracked changes to the store.

use crate::config::{ContextConfig, QueryTrackingBehavior};
use crate::database::Database;
use crate::save;
use changetrack_core::{Entity, EntityState, EntityType, EntityTypeId, Error, KeyValue, Result, Value};
use changetrack_tracking::{ChangeTracker, DiagnosticEvent, EntityEntry, GraphMode};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// One unit of work over a [`Database`]
pub struct Context {
    database: Arc<Database>,
    tracker: ChangeTracker,
    config: ContextConfig,
}

impl Context {
    /// Context with the database's config
    pub fn new(database: Arc<Database>) -> Self {
        let config = database.config().clone();
        let mut tracker = ChangeTracker::with_options(
            Arc::clone(database.model()),
            config.tracking,
            Arc::clone(database.generators()),
        );
        tracker.set_diagnostics(Arc::clone(database.diagnostics()));
        debug!(target: "changetrack::engine", "Context created");
        Self {
            database,
            tracker,
            config,
        }
    }

    /// The database this context writes to
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Current config
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Change the tracking behavior of later queries
    pub fn set_query_tracking(&mut self, behavior: QueryTrackingBehavior) {
        self.config.query_tracking = behavior;
    }

    /// The context's registry
    pub fn change_tracker(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    /// Read-only access to the registry
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Restore config and registry to the database defaults
    pub(crate) fn reset(&mut self) {
        self.config = self.database.config().clone();
        self.tracker.reset(self.config.tracking);
        self.tracker
            .set_diagnostics(Arc::clone(self.database.diagnostics()));
    }

    pub(crate) fn log_disposed(&self) {
        self.tracker
            .diagnostics()
            .log(&DiagnosticEvent::ContextDisposed);
    }

    fn ensure_keyed(entity_type: &EntityType) -> Result<()> {
        if entity_type.is_keyless() {
            return Err(Error::InvalidSetKeylessOperation {
                entity_type: entity_type.name().to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Graph operations
    // ========================================================================

    /// Track `entity` and everything reachable from it as Added
    pub fn add(&mut self, entity: &Entity) -> Result<()> {
        Self::ensure_keyed(entity.entity_type())?;
        self.tracker.track_graph(entity, GraphMode::Add)
    }

    /// Like [`add`](Self::add), using registered async value generators
    pub async fn add_async(&mut self, entity: &Entity) -> Result<()> {
        Self::ensure_keyed(entity.entity_type())?;
        self.tracker
            .track_graph_async(entity, GraphMode::Add)
            .await
    }

    /// Track the graph as Unchanged (Added where keys are not set)
    pub fn attach(&mut self, entity: &Entity) -> Result<()> {
        Self::ensure_keyed(entity.entity_type())?;
        self.tracker.track_graph(entity, GraphMode::Attach)
    }

    /// Track the graph as Modified (Added where keys are not set)
    pub fn update(&mut self, entity: &Entity) -> Result<()> {
        Self::ensure_keyed(entity.entity_type())?;
        self.tracker.track_graph(entity, GraphMode::Update)
    }

    /// Mark `entity` for deletion
    ///
    /// An Added entity is detached instead; an untracked one is attached
    /// first.
    pub fn remove(&mut self, entity: &Entity) -> Result<()> {
        Self::ensure_keyed(entity.entity_type())?;
        let target = match self.tracker.state_of(entity) {
            EntityState::Added => EntityState::Detached,
            EntityState::Detached => {
                self.tracker.track_graph(entity, GraphMode::Attach)?;
                EntityState::Deleted
            }
            _ => EntityState::Deleted,
        };
        self.tracker.entry(entity)?.set_state(target)
    }

    /// Entry handle for `entity`
    pub fn entry(&mut self, entity: &Entity) -> Result<EntityEntry<'_>> {
        self.tracker.entry(entity)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    fn types_assignable_to(&self, ty: EntityTypeId) -> Vec<Arc<EntityType>> {
        let model = self.database.model();
        model
            .entity_types()
            .iter()
            .filter(|et| model.is_assignable(ty, et.id()))
            .cloned()
            .collect()
    }

    /// Entity of `type_name` with primary key `key`
    ///
    /// The tracked instance is returned if there is one; otherwise the row
    /// is loaded from the store and tracked as Unchanged.
    pub fn find(&mut self, type_name: &str, key: &KeyValue) -> Result<Option<Entity>> {
        let ty = self.database.model().find_entity_type(type_name)?.clone();
        Self::ensure_keyed(&ty)?;
        if let Some(tracked) = self.tracker.find_tracked(type_name, key)? {
            return Ok(Some(tracked));
        }
        for et in self.types_assignable_to(ty.id()) {
            if let Some(values) = self.database.store().get(et.name(), key) {
                return self.tracker.track_from_query(&et, &values).map(Some);
            }
        }
        Ok(None)
    }

    /// Every stored entity of `type_name` and its derived types
    ///
    /// Tracking follows the configured [`QueryTrackingBehavior`].
    pub fn query(&mut self, type_name: &str) -> Result<Vec<Entity>> {
        let ty = self.database.model().find_entity_type(type_name)?.clone();
        let behavior = self.config.query_tracking;
        let mut resolved: FxHashMap<(EntityTypeId, KeyValue), Entity> = FxHashMap::default();
        let mut out = Vec::new();

        for et in self.types_assignable_to(ty.id()) {
            for (key, values) in self.database.store().scan(et.name()) {
                let entity = match behavior {
                    QueryTrackingBehavior::TrackAll => {
                        self.tracker.track_from_query(&et, &values)?
                    }
                    QueryTrackingBehavior::NoTracking => materialize(&et, &values),
                    QueryTrackingBehavior::NoTrackingWithIdentityResolution => resolved
                        .entry((et.root_type(), key))
                        .or_insert_with(|| materialize(&et, &values))
                        .clone(),
                };
                out.push(entity);
            }
        }
        debug!(
            target: "changetrack::engine",
            entity_type = %type_name,
            rows = out.len(),
            behavior = ?behavior,
            "Query materialized"
        );
        Ok(out)
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Write the tracked changes and accept them
    pub fn save_changes(&mut self) -> Result<usize> {
        save::save_changes(&mut self.tracker, self.database.store(), true)
    }

    /// Write the tracked changes; states are only accepted when asked
    pub fn save_changes_with(&mut self, accept_all_changes_on_success: bool) -> Result<usize> {
        save::save_changes(
            &mut self.tracker,
            self.database.store(),
            accept_all_changes_on_success,
        )
    }

    /// Async form of [`save_changes`](Self::save_changes)
    pub async fn save_changes_async(&mut self) -> Result<usize> {
        self.save_changes()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.log_disposed();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("tracked", &self.tracker.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Untracked instance holding a row's values; shadow columns are dropped
fn materialize(entity_type: &Arc<EntityType>, values: &[Value]) -> Entity {
    let entity = Entity::new(entity_type.clone());
    for p in entity_type.properties() {
        if !p.is_shadow() {
            entity.store_value_at(p.index(), values[p.index()].clone());
        }
    }
    entity
}
