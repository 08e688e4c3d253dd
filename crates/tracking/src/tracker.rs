//! Tracker registry
//!
//! `ChangeTracker` owns every entry of one unit of work. Entries live in an
//! arena addressed by [`EntryId`]; instances are mapped to entries by
//! pointer identity and keys are mapped to entries per hierarchy root.
//!
//! The algorithms are spread over sibling modules, each adding an `impl
//! ChangeTracker` block:
//! - `state`: state transitions, modified flags, accept
//! - `detector`: snapshot diffing and notification draining
//! - `fixup`: foreign key and navigation consistency
//! - `graph`: graph traversal, identity resolution, value generation
//! - `cascade`: cascade deletes and orphan handling
//! - `commit`: support for the commit pipeline

use crate::diagnostics::{DiagnosticEvent, DiagnosticsLogger, TracingDiagnostics};
use crate::entry::{EntryId, InternalEntry};
use crate::entry_api::{EntityEntry, Entries};
use crate::events::{EntityStateChangedEvent, EntityTrackedEvent, HandlerId, TrackerEvents};
use crate::options::TrackerOptions;
use crate::value_generation::ValueGeneratorCache;
use changetrack_core::{
    Entity, EntityState, EntityType, EntityTypeId, Error, ForeignKey, InstanceId, KeyValue, Model,
    Result, Value,
};
use rustc_hash::FxHashMap;
use std::ops::{Index, IndexMut};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Entry arena
// ============================================================================

/// Slot storage for entries; slots of detached entries are reused
#[derive(Debug, Default)]
pub(crate) struct EntryArena {
    slots: Vec<Option<InternalEntry>>,
    free: Vec<usize>,
    len: usize,
}

impl EntryArena {
    pub(crate) fn insert(&mut self, entry: InternalEntry) -> EntryId {
        self.len += 1;
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                EntryId(slot)
            }
            None => {
                self.slots.push(Some(entry));
                EntryId(self.slots.len() - 1)
            }
        }
    }

    pub(crate) fn remove(&mut self, id: EntryId) -> Option<InternalEntry> {
        let removed = self.slots.get_mut(id.0).and_then(Option::take);
        if removed.is_some() {
            self.len -= 1;
            self.free.push(id.0);
        }
        removed
    }

    pub(crate) fn get(&self, id: EntryId) -> Option<&InternalEntry> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut InternalEntry> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Ids of live entries, in slot order
    pub(crate) fn ids(&self) -> Vec<EntryId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| EntryId(i))
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EntryId, &InternalEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (EntryId(i), e)))
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}

impl Index<EntryId> for EntryArena {
    type Output = InternalEntry;

    fn index(&self, id: EntryId) -> &InternalEntry {
        match self.get(id) {
            Some(e) => e,
            None => panic!("entry slot {} is vacant", id.0),
        }
    }
}

impl IndexMut<EntryId> for EntryArena {
    fn index_mut(&mut self, id: EntryId) -> &mut InternalEntry {
        match self.get_mut(id) {
            Some(e) => e,
            None => panic!("entry slot {} is vacant", id.0),
        }
    }
}

// ============================================================================
// ChangeTracker
// ============================================================================

/// Registry of tracked entities for one unit of work
///
/// A tracker is used from one thread at a time (`&mut self` API) and can
/// be moved between threads, which is what context pooling relies on.
pub struct ChangeTracker {
    pub(crate) model: Arc<Model>,
    pub(crate) arena: EntryArena,
    pub(crate) by_instance: FxHashMap<InstanceId, EntryId>,
    pub(crate) identity: FxHashMap<(EntityTypeId, KeyValue), EntryId>,
    /// Untracked instance -> tracked instances whose navigation points at it
    pub(crate) pending_referrers: FxHashMap<InstanceId, Vec<(Entity, usize)>>,
    /// Values produced by async generators, consumed when the instance is added
    pub(crate) pregenerated: FxHashMap<InstanceId, Vec<(usize, Value, bool)>>,
    pub(crate) options: TrackerOptions,
    pub(crate) generators: Arc<ValueGeneratorCache>,
    pub(crate) events: TrackerEvents,
    pub(crate) diagnostics: Arc<dyn DiagnosticsLogger>,
    pub(crate) deferring_orphans: bool,
    pub(crate) deferred_orphans: Vec<Entity>,
}

impl ChangeTracker {
    /// Empty tracker with default options and a private generator cache
    pub fn new(model: Arc<Model>) -> Self {
        Self::with_options(
            model,
            TrackerOptions::default(),
            Arc::new(ValueGeneratorCache::new()),
        )
    }

    /// Empty tracker sharing `generators` with other trackers of the same model
    pub fn with_options(
        model: Arc<Model>,
        options: TrackerOptions,
        generators: Arc<ValueGeneratorCache>,
    ) -> Self {
        Self {
            model,
            arena: EntryArena::default(),
            by_instance: FxHashMap::default(),
            identity: FxHashMap::default(),
            pending_referrers: FxHashMap::default(),
            pregenerated: FxHashMap::default(),
            options,
            generators,
            events: TrackerEvents::default(),
            diagnostics: Arc::new(TracingDiagnostics),
            deferring_orphans: false,
            deferred_orphans: Vec::new(),
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Model this tracker tracks instances of
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Current options
    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    /// Mutable options; changes apply to subsequent operations
    pub fn options_mut(&mut self) -> &mut TrackerOptions {
        &mut self.options
    }

    /// Value generators used for added entities
    pub fn generators(&self) -> &Arc<ValueGeneratorCache> {
        &self.generators
    }

    /// Diagnostics sink
    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticsLogger> {
        &self.diagnostics
    }

    /// Replace the diagnostics sink
    pub fn set_diagnostics(&mut self, diagnostics: Arc<dyn DiagnosticsLogger>) {
        self.diagnostics = diagnostics;
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Register a handler for entities starting to be tracked
    pub fn on_tracked(
        &mut self,
        handler: impl FnMut(&EntityTrackedEvent) + Send + 'static,
    ) -> HandlerId {
        self.events.add_tracked(Box::new(handler))
    }

    /// Register a handler for state transitions of tracked entities
    pub fn on_state_changed(
        &mut self,
        handler: impl FnMut(&EntityStateChangedEvent) + Send + 'static,
    ) -> HandlerId {
        self.events.add_state_changed(Box::new(handler))
    }

    /// Unregister a handler; false if it was not registered
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        self.events.remove(id)
    }

    /// Unregister every handler
    pub fn clear_handlers(&mut self) {
        self.events.clear();
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.events.handler_count()
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Start tracking `entity` alone (no graph traversal) in `state`
    ///
    /// `from_query` marks entities materialized by a query; it is reported
    /// on the tracked event.
    pub fn track(&mut self, entity: &Entity, state: EntityState, from_query: bool) -> Result<()> {
        self.set_state_of(
            entity,
            state,
            StateOptions {
                from_query,
                ..StateOptions::default()
            },
        )
        .map(|_| ())
    }

    /// Entry handle for `entity`; reports Detached if it is not tracked
    pub fn entry(&mut self, entity: &Entity) -> Result<EntityEntry<'_>> {
        self.ensure_keyed(entity.entity_type())?;
        if self.options.auto_detect_changes {
            if let Some(id) = self.id_of(entity) {
                self.detect_entry_changes(id)?;
            }
        }
        Ok(EntityEntry::new(self, entity.clone()))
    }

    /// Lazy iterator over every tracked entry
    pub fn entries(&mut self) -> Result<Entries<'_>> {
        if self.options.auto_detect_changes {
            self.detect_changes()?;
        }
        Ok(Entries::new(self, None))
    }

    /// Lazy iterator over tracked entries of `type_name` and derived types
    pub fn entries_of(&mut self, type_name: &str) -> Result<Entries<'_>> {
        let ty = self.model.find_entity_type(type_name)?.id();
        if self.options.auto_detect_changes {
            self.detect_changes()?;
        }
        Ok(Entries::new(self, Some(ty)))
    }

    /// Number of tracked entries
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// True if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    /// State of `entity`; Detached when untracked
    pub fn state_of(&self, entity: &Entity) -> EntityState {
        self.id_of(entity)
            .map(|id| self.arena[id].state)
            .unwrap_or(EntityState::Detached)
    }

    /// Tracked instance of `type_name` (or a derived type) with `key`
    pub fn find_tracked(&self, type_name: &str, key: &KeyValue) -> Result<Option<Entity>> {
        let ty = self.model.find_entity_type(type_name)?.id();
        Ok(self.find_by_key(ty, key).map(|id| self.arena[id].entity.clone()))
    }

    /// True if any tracked entry is Added, Modified or Deleted
    pub fn has_changes(&mut self) -> Result<bool> {
        if self.options.auto_detect_changes {
            self.detect_changes()?;
        }
        Ok(self.arena.iter().any(|(_, e)| e.state.has_changes()))
    }

    /// Stop tracking everything
    ///
    /// No events are raised. Handlers and options are kept; instances keep
    /// their data.
    pub fn clear(&mut self) {
        for (_, e) in self.arena.iter() {
            e.entity.take_notifications();
        }
        let count = self.arena.len();
        self.arena.clear();
        self.by_instance.clear();
        self.identity.clear();
        self.pending_referrers.clear();
        self.pregenerated.clear();
        self.deferred_orphans.clear();
        self.deferring_orphans = false;
        debug!(target: "changetrack::tracking", entries = count, "Tracker cleared");
    }

    /// Clear, drop every handler and install `options`
    ///
    /// Used when a pooled context is returned.
    pub fn reset(&mut self, options: TrackerOptions) {
        self.clear();
        self.events.clear();
        self.options = options;
    }

    // ========================================================================
    // Internal lookups
    // ========================================================================

    pub(crate) fn id_of(&self, entity: &Entity) -> Option<EntryId> {
        self.by_instance.get(&entity.instance_id()).copied()
    }

    pub(crate) fn ensure_keyed(&self, entity_type: &EntityType) -> Result<()> {
        if entity_type.is_keyless() {
            return Err(Error::KeylessTypeTracked {
                entity_type: entity_type.name().to_string(),
            });
        }
        Ok(())
    }

    /// Entry of type `ty` (or derived) with primary key `key`
    pub(crate) fn find_by_key(&self, ty: EntityTypeId, key: &KeyValue) -> Option<EntryId> {
        let root = self.model.entity_type(ty).root_type();
        let id = *self.identity.get(&(root, key.clone()))?;
        let entry = self.arena.get(id)?;
        self.model
            .is_assignable(ty, entry.entity_type.id())
            .then_some(id)
    }

    /// Tracked principal of `fk` whose key equals `key`
    pub(crate) fn find_principal(&self, fk: &ForeignKey, key: &KeyValue) -> Option<EntryId> {
        let principal_type = self.model.entity_type(fk.principal_type());
        let is_primary = principal_type
            .primary_key()
            .is_some_and(|pk| pk == fk.principal_key());
        if is_primary {
            return self.find_by_key(fk.principal_type(), key);
        }
        self.arena
            .iter()
            .find(|(_, e)| {
                self.model
                    .is_assignable(fk.principal_type(), e.entity_type.id())
                    && values_of(e, fk.principal_key()).as_ref() == Some(key)
            })
            .map(|(id, _)| id)
    }

    /// Value of `props` on the entry; `None` if any part is null
    pub(crate) fn key_of(&self, id: EntryId, props: &[usize]) -> Option<KeyValue> {
        values_of(&self.arena[id], props)
    }

    pub(crate) fn sensitive(&self) -> bool {
        self.options.sensitive_data_logging
    }

    pub(crate) fn sensitive_value(&self, value: &Value) -> Option<Value> {
        self.sensitive().then(|| value.clone())
    }

    pub(crate) fn log(&self, event: DiagnosticEvent) {
        self.diagnostics.log(&event);
    }

    // ========================================================================
    // Identity map
    // ========================================================================

    pub(crate) fn identity_conflict(&self, entry: &InternalEntry) -> Error {
        Error::IdentityConflict {
            entity_type: entry.entity_type.name().to_string(),
            key_values: self.sensitive().then(|| entry.key_string()),
        }
    }

    /// Fails if another entry already holds the entry's key
    pub(crate) fn check_identity(&self, entry: &InternalEntry, own: Option<EntryId>) -> Result<()> {
        if let Some(key) = entry.key().filter(|k| !k.has_null()) {
            let slot = (entry.entity_type.root_type(), key);
            if let Some(&existing) = self.identity.get(&slot) {
                if Some(existing) != own {
                    return Err(self.identity_conflict(entry));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn register_identity(&mut self, id: EntryId) {
        let entry = &self.arena[id];
        if let Some(key) = entry.key().filter(|k| !k.has_null()) {
            self.identity
                .insert((entry.entity_type.root_type(), key), id);
        }
    }

    pub(crate) fn unregister_identity(&mut self, root: EntityTypeId, key: Option<KeyValue>, id: EntryId) {
        if let Some(key) = key {
            let slot = (root, key);
            if self.identity.get(&slot) == Some(&id) {
                self.identity.remove(&slot);
            }
        }
    }

    /// Remove the entry from every map; no events
    pub(crate) fn stop_tracking(&mut self, id: EntryId) -> Option<InternalEntry> {
        let entry = self.arena.remove(id)?;
        self.by_instance.remove(&entry.entity.instance_id());
        self.unregister_identity(entry.entity_type.root_type(), entry.key(), id);
        self.pregenerated.remove(&entry.entity.instance_id());
        entry.entity.take_notifications();
        Some(entry)
    }

    pub(crate) fn raise_tracked(&mut self, entity: &Entity, state: EntityState, from_query: bool) {
        self.log(DiagnosticEvent::StartedTracking {
            entity_type: entity.type_name().to_string(),
            state,
        });
        self.events.raise_tracked(&EntityTrackedEvent {
            entity: entity.clone(),
            state,
            from_query,
        });
    }

    pub(crate) fn raise_state_changed(&mut self, entity: &Entity, old: EntityState, new: EntityState) {
        self.log(DiagnosticEvent::StateChanged {
            entity_type: entity.type_name().to_string(),
            old_state: old,
            new_state: new,
        });
        self.events.raise_state_changed(&EntityStateChangedEvent {
            entity: entity.clone(),
            old_state: old,
            new_state: new,
        });
    }
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("entries", &self.arena.len())
            .field("options", &self.options)
            .field("events", &self.events)
            .finish()
    }
}

/// Values of `props` on `entry`; `None` if any part is null or conceptually null
pub(crate) fn values_of(entry: &InternalEntry, props: &[usize]) -> Option<KeyValue> {
    let mut parts = Vec::with_capacity(props.len());
    for &p in props {
        if entry.flags[p].conceptual_null {
            return None;
        }
        let v = entry.value(p);
        if v.is_null() {
            return None;
        }
        parts.push(v);
    }
    Some(KeyValue::new(parts))
}

// ============================================================================
// Operation options
// ============================================================================

/// How a state assignment behaves
#[derive(Clone, Copy, Debug)]
pub(crate) struct StateOptions {
    /// Explicit Modified marks every non-key property modified
    pub(crate) modify_properties: bool,
    /// Reported on the tracked event
    pub(crate) from_query: bool,
    /// Deleted cascades to dependents under immediate timing
    pub(crate) cascade: bool,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            modify_properties: true,
            from_query: false,
            cascade: true,
        }
    }
}

/// Which relationship fixup a property write triggers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Fixup {
    /// Key propagation and navigation fixup
    Full,
    /// Key propagation to dependents only
    KeysOnly,
    /// Snapshot update only
    None,
}

/// How a property write behaves
#[derive(Clone, Copy, Debug)]
pub(crate) struct WriteOptions {
    /// Flag the property modified if the value differs from its original
    pub(crate) set_modified: bool,
    /// Conceptual nulls are resolved by the caller
    pub(crate) is_cascade_delete: bool,
    pub(crate) fixup: Fixup,
    /// New temporary flag; unchanged when `None`
    pub(crate) temporary: Option<bool>,
}

impl WriteOptions {
    /// A write made through the public API
    pub(crate) fn user() -> Self {
        Self {
            set_modified: true,
            is_cascade_delete: false,
            fixup: Fixup::Full,
            temporary: Some(false),
        }
    }
}
