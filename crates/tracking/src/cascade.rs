//! Cascade deletes and orphan handling
//!
//! Deleting a principal deletes its cascade dependents (Added ones are
//! detached instead) and nulls the foreign keys of the others. A required
//! foreign key that ends up null is a conceptual null: the dependent is
//! either deleted as an orphan or the operation fails.

use crate::entry::EntryId;
use crate::state::no_modify;
use crate::tracker::{ChangeTracker, StateOptions, WriteOptions};
use changetrack_core::{
    CascadeTiming, DeleteBehavior, EntityState, Error, ForeignKeyId, Result, Value,
};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::debug;

impl ChangeTracker {
    /// Apply cascade deletes and resolve conceptual nulls now
    ///
    /// Runs regardless of the configured timings.
    pub fn cascade_changes(&mut self) -> Result<()> {
        if self.options.auto_detect_changes {
            self.detect_changes()?;
        }
        self.run_cascade_pass(true)
    }

    /// Resolve conceptual nulls on Added and Modified entries, then cascade
    /// every Deleted entry
    pub fn run_cascade_pass(&mut self, force: bool) -> Result<()> {
        let with_nulls: Vec<EntryId> = self
            .arena
            .iter()
            .filter(|(_, e)| {
                matches!(e.state, EntityState::Added | EntityState::Modified)
                    && e.has_conceptual_null()
            })
            .map(|(id, _)| id)
            .collect();
        for id in with_nulls {
            if self.arena.get(id).is_some() {
                self.handle_conceptual_nulls(id, force, false)?;
            }
        }

        let deleted: Vec<EntryId> = self
            .arena
            .iter()
            .filter(|(_, e)| e.state == EntityState::Deleted)
            .map(|(id, _)| id)
            .collect();
        debug!(
            target: "changetrack::tracking",
            deleted = deleted.len(),
            force,
            "Cascade pass"
        );
        for id in deleted {
            if self.arena.get(id).is_some() {
                self.cascade_delete(id, force)?;
            }
        }
        Ok(())
    }

    /// Cascade the deletion of `id` to its tracked dependents
    pub(crate) fn cascade_delete(&mut self, id: EntryId, force: bool) -> Result<()> {
        let mut visited = FxHashSet::default();
        visited.insert(id);
        self.cascade_delete_from(id, force, &mut visited)
    }

    /// `visited` holds every entry this cascade has already reached, so
    /// cycles of Added dependents terminate
    fn cascade_delete_from(
        &mut self,
        id: EntryId,
        force: bool,
        visited: &mut FxHashSet<EntryId>,
    ) -> Result<()> {
        let do_cascade = force || self.options.cascade_delete_timing != CascadeTiming::Never;
        let model = Arc::clone(&self.model);
        let ty = self.arena[id].entity_type.clone();

        for &fk_id in ty.referencing_foreign_keys() {
            let fk = model.foreign_key(fk_id);
            if fk.delete_behavior() == DeleteBehavior::ClientNoAction {
                continue;
            }
            let Some(principal_key) = self.key_of(id, fk.principal_key()) else {
                continue;
            };
            for dependent in self.dependents_of(id, fk, Some(&principal_key)) {
                if visited.contains(&dependent) {
                    continue;
                }
                let Some(entry) = self.arena.get(dependent) else {
                    continue;
                };
                let state = entry.state;
                let keys_equal = entry.foreign_key_value(fk).as_ref() == Some(&principal_key);
                if state == EntityState::Deleted || !(state == EntityState::Added || keys_equal) {
                    continue;
                }

                if fk.delete_behavior().cascades() && do_cascade {
                    let cascade_state = if state == EntityState::Added {
                        EntityState::Detached
                    } else {
                        EntityState::Deleted
                    };
                    visited.insert(dependent);
                    self.log_cascade(dependent, ty.name(), cascade_state, false);
                    if cascade_state == EntityState::Detached {
                        // Added dependents leave the tracker; their own
                        // dependents are handled first
                        self.cascade_delete_from(dependent, force, visited)?;
                        if self.arena.get(dependent).is_some() {
                            self.set_state(dependent, EntityState::Detached, no_modify())?;
                        }
                    } else {
                        self.set_state(
                            dependent,
                            EntityState::Deleted,
                            StateOptions {
                                cascade: false,
                                ..no_modify()
                            },
                        )?;
                        self.cascade_delete_from(dependent, force, visited)?;
                    }
                } else {
                    for &p in fk.properties() {
                        if self.arena.get(dependent).is_none() {
                            break;
                        }
                        self.set_property(
                            dependent,
                            p,
                            Value::Null,
                            WriteOptions {
                                is_cascade_delete: true,
                                ..WriteOptions::user()
                            },
                        )?;
                    }
                    if self
                        .arena
                        .get(dependent)
                        .is_some_and(|e| e.has_conceptual_null())
                    {
                        self.handle_conceptual_nulls(dependent, force, true)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve the conceptual nulls of one entry
    ///
    /// Nullable parts of a non-cascading key are nulled for real. A
    /// cascading key deletes the entry as an orphan when allowed; any other
    /// remaining conceptual null fails with
    /// [`Error::RelationshipConceptualNull`].
    pub(crate) fn handle_conceptual_nulls(
        &mut self,
        id: EntryId,
        force: bool,
        is_cascade_delete: bool,
    ) -> Result<()> {
        let model = Arc::clone(&self.model);
        let ty = self.arena[id].entity_type.clone();
        let mut failing: Vec<ForeignKeyId> = Vec::new();

        for &fk_id in ty.foreign_keys() {
            let fk = model.foreign_key(fk_id);
            let Some(entry) = self.arena.get(id) else {
                return Ok(());
            };
            let Some(&flagged) = fk
                .properties()
                .iter()
                .find(|&&p| entry.flags[p].conceptual_null)
            else {
                continue;
            };
            let any_nullable = fk
                .properties()
                .iter()
                .any(|&p| ty.property(p).is_nullable());
            if any_nullable && !fk.delete_behavior().cascades() {
                for &p in fk.properties() {
                    if ty.property(p).is_nullable() {
                        self.set_property(id, p, Value::Null, WriteOptions::user())?;
                    } else if let Some(e) = self.arena.get_mut(id) {
                        e.flags[p].conceptual_null = false;
                    }
                }
            } else if entry.state != EntityState::Modified || entry.flags[flagged].modified {
                failing.push(fk_id);
            }
        }

        let Some(entry) = self.arena.get(id) else {
            return Ok(());
        };
        let cascade_fk = failing
            .iter()
            .map(|&fk| model.foreign_key(fk))
            .find(|fk| fk.delete_behavior().cascades());
        let orphans_allowed = force
            || (!is_cascade_delete
                && self.options.delete_orphans_timing != CascadeTiming::Never);

        if let (Some(fk), true) = (cascade_fk, orphans_allowed) {
            let state = if entry.state == EntityState::Added {
                EntityState::Detached
            } else {
                EntityState::Deleted
            };
            let principal_type = model.entity_type(fk.principal_type()).name().to_string();
            self.log_cascade(id, &principal_type, state, true);
            return self.set_state(id, state, no_modify());
        }
        if let Some(&fk_id) = failing.first() {
            let fk = model.foreign_key(fk_id);
            return Err(Error::RelationshipConceptualNull {
                principal_type: model.entity_type(fk.principal_type()).name().to_string(),
                dependent_type: ty.name().to_string(),
                key_values: self.sensitive().then(|| entry.key_string()),
            });
        }
        Ok(())
    }
}
