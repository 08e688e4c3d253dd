//! Change detection
//!
//! Snapshot entries are diffed against their original values and their
//! relationship snapshot. Notifying entries only look at the members they
//! reported. A pass runs in two phases: scalar properties first, then
//! navigations, so a dependent moved between two principals in the same
//! pass sees its new foreign key before the old principal lets go of it.
//!
//! Orphans created during a pass are resolved once the pass is over.

use crate::diagnostics::DiagnosticEvent;
use crate::entry::EntryId;
use crate::snapshot::collection_delta;
use crate::tracker::{ChangeTracker, Fixup};
use changetrack_core::{EntityState, Error, MemberChange, NavigationValue, Result};
use tracing::trace;

impl ChangeTracker {
    /// Detect changes on every tracked entry
    pub fn detect_changes(&mut self) -> Result<()> {
        self.log(DiagnosticEvent::DetectChangesStarting);
        let ids = self.arena.ids();
        self.detect_in(ids)?;
        self.log(DiagnosticEvent::DetectChangesCompleted);
        Ok(())
    }

    /// Detect changes on one entry
    pub(crate) fn detect_entry_changes(&mut self, id: EntryId) -> Result<()> {
        self.detect_in(vec![id])
    }

    fn detect_in(&mut self, ids: Vec<EntryId>) -> Result<()> {
        let was_deferring = self.deferring_orphans;
        self.deferring_orphans = true;
        let result = self.detect_phases(&ids);
        self.deferring_orphans = was_deferring;
        if was_deferring {
            return result;
        }
        let deferred = std::mem::take(&mut self.deferred_orphans);
        result?;

        for entity in deferred {
            let Some(id) = self.id_of(&entity) else {
                continue;
            };
            let entry = &self.arena[id];
            if entry.state != EntityState::Deleted && entry.has_conceptual_null() {
                self.handle_conceptual_nulls(id, false, false)?;
            }
        }
        Ok(())
    }

    fn detect_phases(&mut self, ids: &[EntryId]) -> Result<()> {
        let mut navigations: Vec<(EntryId, Vec<usize>)> = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(entry) = self.arena.get(id) else {
                continue;
            };
            if entry.state == EntityState::Deleted {
                continue;
            }
            let ty = entry.entity_type.clone();
            let (properties, navs) = if ty.change_tracking_strategy().uses_notifications() {
                let mut properties = Vec::new();
                let mut navs = Vec::new();
                for change in entry.entity.take_notifications() {
                    match change {
                        MemberChange::Property(p) => properties.push(p),
                        MemberChange::Navigation(n) => navs.push(n),
                    }
                }
                (properties, navs)
            } else {
                (
                    (0..ty.properties().len()).collect(),
                    (0..ty.navigations().len()).collect(),
                )
            };
            for p in properties {
                if self.arena.get(id).is_none() {
                    break;
                }
                self.property_changed(id, p)?;
            }
            if !navs.is_empty() {
                navigations.push((id, navs));
            }
        }

        for (id, navs) in navigations {
            for nav in navs {
                if self
                    .arena
                    .get(id)
                    .map_or(true, |e| e.state == EntityState::Deleted)
                {
                    break;
                }
                self.navigation_changed(id, nav)?;
            }
        }
        Ok(())
    }

    /// Compare one property with its snapshots and react to a difference
    fn property_changed(&mut self, id: EntryId, property: usize) -> Result<()> {
        let entry = &self.arena[id];
        let ty = entry.entity_type.clone();
        let prop = ty.property(property);
        let current = entry.value(property);

        if prop.is_key_or_foreign_key() {
            let previous = entry.relationships.value(property).cloned();
            if !previous.as_ref().is_some_and(|p| p.same_as(&current)) {
                if prop.is_primary_key() && entry.state != EntityState::Added {
                    return Err(Error::KeyReadOnly {
                        property: prop.name().to_string(),
                        entity_type: ty.name().to_string(),
                    });
                }
                if prop.is_foreign_key() {
                    self.log(DiagnosticEvent::ForeignKeyChangeDetected {
                        entity_type: ty.name().to_string(),
                        property: prop.name().to_string(),
                        old_value: previous.and_then(|v| self.sensitive_value(&v)),
                        new_value: self.sensitive_value(&current),
                    });
                }
                self.key_value_changed(id, property, Fixup::Full)?;
            }
        }

        let Some(entry) = self.arena.get(id) else {
            return Ok(());
        };
        if prop.is_primary_key()
            || entry.flags[property].modified
            || !matches!(entry.state, EntityState::Unchanged | EntityState::Modified)
        {
            return Ok(());
        }
        let original = entry.original(property);
        let changed = match &original {
            Some(o) => !prop.comparer().equals(o, &current),
            // Notified without originals
            None => true,
        };
        if changed {
            if !prop.is_foreign_key() {
                self.log(DiagnosticEvent::PropertyChangeDetected {
                    entity_type: ty.name().to_string(),
                    property: prop.name().to_string(),
                    old_value: original.and_then(|v| self.sensitive_value(&v)),
                    new_value: self.sensitive_value(&current),
                });
            }
            self.mark_modified(id, property)?;
        }
        Ok(())
    }

    /// Compare one navigation with the relationship snapshot
    fn navigation_changed(&mut self, id: EntryId, nav: usize) -> Result<()> {
        let entry = &self.arena[id];
        let ty = entry.entity_type.clone();
        let navigation = ty.navigation(nav);
        let current = entry.entity.navigation_at(nav);
        match (entry.relationships.navigation(nav).clone(), current) {
            (NavigationValue::Reference(old), NavigationValue::Reference(new)) => {
                let same = match (&old, &new) {
                    (Some(a), Some(b)) => a.ptr_eq(b),
                    (None, None) => true,
                    _ => false,
                };
                if same {
                    return Ok(());
                }
                self.log(DiagnosticEvent::ReferenceChangeDetected {
                    entity_type: ty.name().to_string(),
                    navigation: navigation.name().to_string(),
                });
                self.navigation_reference_changed(id, nav, old, new)
            }
            (NavigationValue::Collection(old), NavigationValue::Collection(new)) => {
                let (added, removed) = collection_delta(&old, &new);
                if added.is_empty() && removed.is_empty() {
                    return Ok(());
                }
                self.log(DiagnosticEvent::CollectionChangeDetected {
                    entity_type: ty.name().to_string(),
                    navigation: navigation.name().to_string(),
                    added: added.len(),
                    removed: removed.len(),
                });
                self.navigation_collection_changed(id, nav, added, removed)
            }
            _ => {
                trace!(
                    target: "changetrack::tracking",
                    navigation = %navigation.name(),
                    "Navigation shape differs from snapshot"
                );
                Ok(())
            }
        }
    }
}
