//! Commit support
//!
//! The tracker does not write anywhere itself. A commit pipeline asks it
//! for the pending changes, validates preconditions, feeds back values the
//! store generated and finally accepts the changes.

use crate::entry::EntryId;
use crate::tracker::{ChangeTracker, Fixup, StateOptions, WriteOptions};
use changetrack_core::{
    Entity, EntityState, EntityType, Error, KeyValue, NavigationValue, Result, Value,
    ValueGeneration,
};
use std::sync::Arc;
use tracing::debug;

/// One entity to be written by a commit
#[derive(Debug, Clone)]
pub struct PendingChange {
    /// Tracked instance
    pub entity: Entity,
    /// Its entity type
    pub entity_type: Arc<EntityType>,
    /// Added, Modified or Deleted
    pub state: EntityState,
    /// Primary key; the original key for Modified and Deleted entries
    pub key: KeyValue,
    /// Every property value, shadow properties included
    pub values: Vec<Value>,
    /// Indexes of modified properties (Modified entries only)
    pub modified: Vec<usize>,
}

impl ChangeTracker {
    /// Entries that a commit has to write, in tracking order
    pub fn pending_changes(&self) -> Vec<PendingChange> {
        self.arena
            .iter()
            .filter(|(_, e)| e.state.has_changes())
            .filter_map(|(_, e)| {
                let pk = e.entity_type.primary_key()?;
                let key = match e.state {
                    EntityState::Added => e.key()?,
                    _ => KeyValue::new(
                        pk.iter()
                            .map(|&p| e.original(p).unwrap_or_else(|| e.value(p))),
                    ),
                };
                let modified = if e.state == EntityState::Modified {
                    (0..e.flags.len()).filter(|&p| e.flags[p].modified).collect()
                } else {
                    Vec::new()
                };
                Some(PendingChange {
                    entity: e.entity.clone(),
                    entity_type: e.entity_type.clone(),
                    state: e.state,
                    key,
                    values: e.current_values(),
                    modified,
                })
            })
            .collect()
    }

    /// Fail if an owned entity is written without a tracked owner
    pub fn check_owned(&self) -> Result<()> {
        for (id, entry) in self.arena.iter() {
            if !entry.entity_type.is_owned()
                || !matches!(entry.state, EntityState::Added | EntityState::Modified)
            {
                continue;
            }
            let has_owner = entry.entity_type.foreign_keys().iter().any(|&fk_id| {
                let fk = self.model.foreign_key(fk_id);
                fk.is_ownership() && self.tracked_principal(id, fk_id).is_some()
            });
            if !has_owner {
                return Err(Error::SaveOwnedWithoutOwner {
                    entity_type: entry.entity_type.name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn tracked_principal(&self, id: EntryId, fk_id: usize) -> Option<EntryId> {
        let fk = self.model.foreign_key(fk_id);
        let entry = &self.arena[id];
        let via_navigation = fk
            .dependent_to_principal()
            .and_then(|n| match entry.entity.navigation_at(n) {
                NavigationValue::Reference(r) => r,
                NavigationValue::Collection(_) => None,
            })
            .and_then(|p| self.id_of(&p));
        via_navigation.or_else(|| {
            entry
                .foreign_key_value(fk)
                .and_then(|k| self.find_principal(fk, &k))
        })
    }

    /// Added entries holding temporary values the store has to generate
    pub fn store_generated_properties(&self) -> Vec<(Entity, usize)> {
        let mut out = Vec::new();
        for (_, entry) in self.arena.iter() {
            if entry.state != EntityState::Added {
                continue;
            }
            for p in entry.entity_type.properties() {
                if p.value_generation() == ValueGeneration::OnSave
                    && entry.flags[p.index()].temporary
                {
                    out.push((entry.entity.clone(), p.index()));
                }
            }
        }
        out
    }

    /// Replace a temporary value with the one the store generated
    ///
    /// The value is propagated to dependents whose foreign keys hold the
    /// placeholder.
    pub fn set_store_generated_value(
        &mut self,
        entity: &Entity,
        property: usize,
        value: Value,
    ) -> Result<()> {
        let Some(id) = self.id_of(entity) else {
            return Ok(());
        };
        self.set_property(
            id,
            property,
            value,
            WriteOptions {
                set_modified: false,
                is_cascade_delete: false,
                fixup: Fixup::KeysOnly,
                temporary: Some(false),
            },
        )
    }

    /// Fail if a key still holds a placeholder no principal will replace
    pub fn check_unknown_keys(&self) -> Result<()> {
        for (_, entry) in self.arena.iter() {
            if !matches!(entry.state, EntityState::Added | EntityState::Modified) {
                continue;
            }
            let ty = &entry.entity_type;
            for p in ty.properties() {
                if !(p.is_primary_key() && p.is_foreign_key()) || !entry.flags[p.index()].temporary
                {
                    continue;
                }
                let owned = p
                    .foreign_keys()
                    .iter()
                    .any(|&fk| self.model.foreign_key(fk).is_ownership());
                return Err(if owned {
                    Error::SaveOwnedWithoutOwner {
                        entity_type: ty.name().to_string(),
                    }
                } else {
                    Error::UnknownKeyValue {
                        entity_type: ty.name().to_string(),
                        property: p.name().to_string(),
                    }
                });
            }
        }
        Ok(())
    }

    /// Track a row materialized by a tracking query
    ///
    /// `values` holds every property, shadow properties included. If an
    /// instance with the same key is already tracked, that instance is
    /// returned unchanged.
    pub fn track_from_query(
        &mut self,
        entity_type: &Arc<EntityType>,
        values: &[Value],
    ) -> Result<Entity> {
        self.ensure_keyed(entity_type)?;
        if let Some(pk) = entity_type.primary_key() {
            let key = KeyValue::new(pk.iter().map(|&p| values[p].clone()));
            if let Some(id) = self.find_by_key(entity_type.id(), &key) {
                return Ok(self.arena[id].entity.clone());
            }
        }

        let entity = Entity::new(entity_type.clone());
        let mut shadow = Vec::new();
        for p in entity_type.properties() {
            if p.is_shadow() {
                shadow.push((p.index(), values[p.index()].clone()));
            } else {
                entity.store_value_at(p.index(), values[p.index()].clone());
            }
        }
        self.start_tracking(
            &entity,
            EntityState::Unchanged,
            StateOptions {
                from_query: true,
                ..StateOptions::default()
            },
            &shadow,
        )?;
        debug!(
            target: "changetrack::tracking",
            entity_type = %entity_type.name(),
            "Materialized tracked entity"
        );
        Ok(entity)
    }
}
