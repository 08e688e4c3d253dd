//! State machine
//!
//! Every transition between the five states is allowed. A transition to
//! the current state is a no-op and raises no event. Entering Added runs
//! key propagation and value generation; entering Unchanged accepts the
//! current values as originals; entering Detached removes the entry.

use crate::diagnostics::DiagnosticEvent;
use crate::entry::{EntryId, InternalEntry};
use crate::tracker::{ChangeTracker, Fixup, StateOptions, WriteOptions};
use changetrack_core::{CascadeTiming, Entity, EntityState, Error, Result, Value};

impl ChangeTracker {
    /// Assign `new` to `entity`, tracking it first if needed
    ///
    /// Returns the entry id, or `None` when the entity ends up Detached.
    pub(crate) fn set_state_of(
        &mut self,
        entity: &Entity,
        new: EntityState,
        options: StateOptions,
    ) -> Result<Option<EntryId>> {
        self.ensure_keyed(entity.entity_type())?;
        match self.id_of(entity) {
            Some(id) => {
                self.set_state(id, new, options)?;
                Ok(self.arena.get(id).map(|_| id))
            }
            None if new == EntityState::Detached => Ok(None),
            None => self.start_tracking(entity, new, options, &[]).map(Some),
        }
    }

    /// Create the entry; `shadow` holds values for shadow properties
    pub(crate) fn start_tracking(
        &mut self,
        entity: &Entity,
        state: EntityState,
        options: StateOptions,
        shadow: &[(usize, Value)],
    ) -> Result<EntryId> {
        let mut entry = InternalEntry::new(entity.clone(), state);
        if !shadow.is_empty() {
            for (p, value) in shadow {
                entry.write(*p, value.clone());
            }
            entry.refresh_relationship_values();
        }
        if state == EntityState::Added {
            self.propagate_from_principals(&mut entry);
            self.generate_values(&mut entry);
            entry.refresh_relationship_values();
        }
        // Nothing is mutated before the identity check
        self.check_identity(&entry, None)?;

        if state != EntityState::Added {
            entry.ensure_originals();
        }
        entity.take_notifications();

        let id = self.arena.insert(entry);
        self.by_instance.insert(entity.instance_id(), id);
        self.register_identity(id);
        self.raise_tracked(entity, state, options.from_query);

        self.initial_fixup(id)?;

        if state == EntityState::Modified && options.modify_properties {
            self.flag_all_modified(id);
        }
        if state == EntityState::Deleted
            && options.cascade
            && self.options.cascade_delete_timing == CascadeTiming::Immediate
        {
            self.cascade_delete(id, false)?;
        }
        Ok(id)
    }

    /// Transition a tracked entry
    pub(crate) fn set_state(
        &mut self,
        id: EntryId,
        new: EntityState,
        options: StateOptions,
    ) -> Result<()> {
        let old = self.arena[id].state;
        if old == new {
            if new == EntityState::Modified && options.modify_properties {
                self.flag_all_modified(id);
            }
            return Ok(());
        }

        let entity = self.arena[id].entity.clone();
        if new == EntityState::Detached {
            self.stop_tracking(id);
            self.raise_state_changed(&entity, old, new);
            return Ok(());
        }

        match new {
            EntityState::Added => {
                if old == EntityState::Modified {
                    self.arena[id].clear_modified();
                }
                self.generate_values_for(id);
                self.reindex_after_generation(id)?;
            }
            EntityState::Unchanged => {
                let entry = &mut self.arena[id];
                entry.clear_modified();
                entry.accept_originals();
            }
            EntityState::Deleted => {
                for f in &mut self.arena[id].flags {
                    f.conceptual_null = false;
                }
            }
            EntityState::Modified | EntityState::Detached => {}
        }

        let entry = &mut self.arena[id];
        if old == EntityState::Added && new != EntityState::Added {
            entry.ensure_originals();
        }
        entry.state = new;
        self.raise_state_changed(&entity, old, new);

        if new == EntityState::Modified && options.modify_properties {
            self.flag_all_modified(id);
        }
        if new == EntityState::Deleted
            && options.cascade
            && self.options.cascade_delete_timing == CascadeTiming::Immediate
        {
            self.cascade_delete(id, false)?;
        }
        Ok(())
    }

    /// Keys generated on re-add may change the identity slot
    fn reindex_after_generation(&mut self, id: EntryId) -> Result<()> {
        let root = self.arena[id].entity_type.root_type();
        self.identity.retain(|(r, _), e| !(*r == root && *e == id));
        self.check_identity(&self.arena[id], Some(id))?;
        self.register_identity(id);
        self.arena[id].refresh_relationship_values();
        Ok(())
    }

    fn flag_all_modified(&mut self, id: EntryId) {
        let entry = &mut self.arena[id];
        let ty = entry.entity_type.clone();
        for p in ty.properties() {
            if !p.is_primary_key() {
                entry.flags[p.index()].modified = true;
            }
        }
    }

    // ========================================================================
    // Modified flags
    // ========================================================================

    /// Set or clear the modified flag of one property
    ///
    /// Clearing restores the original value. The entry moves between
    /// Unchanged and Modified as the flags require.
    pub(crate) fn set_property_modified(
        &mut self,
        id: EntryId,
        property: usize,
        is_modified: bool,
    ) -> Result<()> {
        let entry = &self.arena[id];
        let state = entry.state;
        if matches!(state, EntityState::Added | EntityState::Detached) {
            return Ok(());
        }
        let prop = entry.entity_type.property(property);
        if is_modified && prop.is_primary_key() {
            return Err(Error::KeyReadOnly {
                property: prop.name().to_string(),
                entity_type: entry.entity_type.name().to_string(),
            });
        }
        if state == EntityState::Deleted {
            return Ok(());
        }

        if !is_modified {
            if let Some(original) = entry.original(property) {
                self.set_property(
                    id,
                    property,
                    original,
                    WriteOptions {
                        set_modified: false,
                        is_cascade_delete: false,
                        fixup: Fixup::Full,
                        temporary: None,
                    },
                )?;
            }
        }
        let Some(entry) = self.arena.get_mut(id) else {
            return Ok(());
        };
        entry.flags[property].modified = is_modified;
        let state = entry.state;
        let any_modified = entry.has_modified_properties();

        if is_modified && state == EntityState::Unchanged {
            self.set_state(id, EntityState::Modified, no_modify())?;
        } else if !is_modified && state == EntityState::Modified && !any_modified {
            self.set_state(id, EntityState::Unchanged, no_modify())?;
        }
        Ok(())
    }

    /// Mark a property modified after a write or a detected change
    pub(crate) fn mark_modified(&mut self, id: EntryId, property: usize) -> Result<()> {
        let entry = &mut self.arena[id];
        entry.flags[property].modified = true;
        if entry.state == EntityState::Unchanged {
            self.set_state(id, EntityState::Modified, no_modify())?;
        }
        Ok(())
    }

    /// True if any member of the complex property is modified
    pub(crate) fn is_complex_modified(&self, id: EntryId, complex: usize) -> bool {
        let entry = &self.arena[id];
        complex_members(&entry.entity_type, complex)
            .into_iter()
            .any(|p| entry.is_property_modified(p))
    }

    /// Set or clear the modified flag of every member of a complex property
    pub(crate) fn set_complex_modified(
        &mut self,
        id: EntryId,
        complex: usize,
        is_modified: bool,
    ) -> Result<()> {
        let members = complex_members(&self.arena[id].entity_type, complex);
        for p in members {
            if self.arena.get(id).is_none() {
                break;
            }
            self.set_property_modified(id, p, is_modified)?;
        }
        Ok(())
    }

    // ========================================================================
    // Accept
    // ========================================================================

    /// Make the tracked state match a successful commit
    ///
    /// Added and Modified entries become Unchanged; Deleted entries are
    /// removed from tracked navigations and become Detached.
    pub fn accept_all_changes(&mut self) -> Result<()> {
        for id in self.arena.ids() {
            let Some(entry) = self.arena.get_mut(id) else {
                continue;
            };
            for f in &mut entry.flags {
                f.temporary = false;
            }
            let state = entry.state;
            match state {
                EntityState::Added | EntityState::Modified => {
                    self.set_state(id, EntityState::Unchanged, no_modify())?;
                }
                EntityState::Deleted => {
                    self.unfix_deleted(id);
                    self.set_state(id, EntityState::Detached, no_modify())?;
                }
                EntityState::Unchanged | EntityState::Detached => {}
            }
        }
        Ok(())
    }

    pub(crate) fn log_cascade(&self, dependent: EntryId, principal_type: &str, state: EntityState, orphan: bool) {
        let dependent_type = self.arena[dependent].entity_type.name().to_string();
        let principal_type = principal_type.to_string();
        self.log(if orphan {
            DiagnosticEvent::CascadeDeleteOrphan {
                dependent_type,
                principal_type,
                state,
            }
        } else {
            DiagnosticEvent::CascadeDelete {
                dependent_type,
                principal_type,
                state,
            }
        });
    }
}

pub(crate) fn no_modify() -> StateOptions {
    StateOptions {
        modify_properties: false,
        ..StateOptions::default()
    }
}

/// Scalar members of a complex property, nested members included
pub(crate) fn complex_members(
    entity_type: &changetrack_core::EntityType,
    complex: usize,
) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![complex];
    while let Some(c) = stack.pop() {
        let cp = entity_type.complex_property(c);
        out.extend_from_slice(cp.properties());
        stack.extend_from_slice(cp.complex_properties());
    }
    out
}
