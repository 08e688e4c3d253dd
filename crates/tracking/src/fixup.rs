//! Relationship fixup
//!
//! Keeps foreign keys and navigations of tracked entries consistent:
//! after fixup a linked dependent's foreign key equals its principal's
//! key, and the navigations on both sides point at each other.
//!
//! Every write made here goes through the `store_*` accessors so it is
//! not reported as a user change, and updates the relationship snapshot
//! so the detector does not see it either.

use crate::entry::EntryId;
use crate::tracker::{ChangeTracker, Fixup, WriteOptions};
use changetrack_core::{
    CascadeTiming, Entity, EntityState, Error, ForeignKey, ForeignKeyId, KeyValue, NavigationValue,
    Result, Value,
};
use std::sync::Arc;

impl ChangeTracker {
    // ========================================================================
    // Property writes
    // ========================================================================

    /// Write one property of a tracked entry and run the requested fixup
    ///
    /// Null on a non-nullable foreign key property is recorded as a
    /// conceptual null instead of being written.
    pub(crate) fn set_property(
        &mut self,
        id: EntryId,
        property: usize,
        value: Value,
        options: WriteOptions,
    ) -> Result<()> {
        let ty = self.arena[id].entity_type.clone();
        let prop = ty.property(property);

        if value.is_null() && !prop.is_nullable() {
            if !prop.is_foreign_key() {
                return Err(Error::WrongGenericPropertyType {
                    property: prop.name().to_string(),
                    entity_type: ty.name().to_string(),
                    actual: prop.kind().to_string(),
                    expected: value.type_name().to_string(),
                });
            }
            return self.write_conceptual_null(id, property, options);
        }
        if !prop.accepts(&value) {
            return Err(Error::WrongGenericPropertyType {
                property: prop.name().to_string(),
                entity_type: ty.name().to_string(),
                actual: prop.kind().to_string(),
                expected: value.type_name().to_string(),
            });
        }

        // Identity is checked before anything is written
        if prop.is_primary_key() && options.fixup != Fixup::None {
            let entry = &self.arena[id];
            if let Some(pk) = ty.primary_key() {
                let key = KeyValue::new(pk.iter().map(|&p| {
                    if p == property {
                        value.clone()
                    } else {
                        entry.value(p)
                    }
                }));
                if !key.has_null() {
                    if let Some(&other) = self.identity.get(&(ty.root_type(), key)) {
                        if other != id {
                            return Err(self.identity_conflict(entry));
                        }
                    }
                }
            }
        }

        let entry = &mut self.arena[id];
        let was_conceptual_null = entry.flags[property].conceptual_null;
        entry.write(property, value.clone());
        entry.flags[property].conceptual_null = false;
        if let Some(temporary) = options.temporary {
            entry.flags[property].temporary = temporary;
        }
        let state = entry.state;
        if options.set_modified
            && !prop.is_primary_key()
            && matches!(state, EntityState::Unchanged | EntityState::Modified)
            && !entry.flags[property].modified
        {
            let changed = match entry.original(property) {
                Some(original) => !prop.comparer().equals(&original, &value),
                None => true,
            };
            if changed {
                self.mark_modified(id, property)?;
            }
        }

        if prop.is_key_or_foreign_key() {
            self.key_value_changed(id, property, options.fixup)?;
        }
        // Writing the pre-null value back leaves the snapshot unchanged
        if was_conceptual_null && options.fixup == Fixup::Full {
            for &fk in prop.foreign_keys() {
                if self.arena.get(id).is_some() {
                    self.foreign_key_changed(id, fk, None)?;
                }
            }
        }
        Ok(())
    }

    fn write_conceptual_null(
        &mut self,
        id: EntryId,
        property: usize,
        options: WriteOptions,
    ) -> Result<()> {
        let entry = &self.arena[id];
        let ty = entry.entity_type.clone();
        let old_fks: Vec<(ForeignKeyId, Option<KeyValue>)> = ty
            .property(property)
            .foreign_keys()
            .iter()
            .map(|&fk| (fk, entry.foreign_key_value(self.model.foreign_key(fk))))
            .collect();
        let entry = &mut self.arena[id];
        entry.flags[property].conceptual_null = true;
        let state = entry.state;
        if options.set_modified && matches!(state, EntityState::Unchanged | EntityState::Modified) {
            self.mark_modified(id, property)?;
        }
        if options.fixup == Fixup::Full {
            for (fk, old) in old_fks {
                self.foreign_key_changed(id, fk, old)?;
            }
        }
        if !options.is_cascade_delete {
            self.conceptual_null_written(id)?;
        }
        Ok(())
    }

    /// Resolve a new conceptual null according to the orphan timing
    pub(crate) fn conceptual_null_written(&mut self, id: EntryId) -> Result<()> {
        if self.options.delete_orphans_timing != CascadeTiming::Immediate {
            return Ok(());
        }
        if self.deferring_orphans {
            let entity = self.arena[id].entity.clone();
            self.deferred_orphans.push(entity);
            return Ok(());
        }
        self.handle_conceptual_nulls(id, false, false)
    }

    /// React to a key or foreign key value differing from the snapshot
    ///
    /// The relationship snapshot still holds the previous values when this
    /// runs, so old keys are read from it.
    pub(crate) fn key_value_changed(
        &mut self,
        id: EntryId,
        property: usize,
        fixup: Fixup,
    ) -> Result<()> {
        let entry = &self.arena[id];
        let ty = entry.entity_type.clone();
        let prop = ty.property(property);
        let current = entry.value(property);
        if entry.relationships.value(property) == Some(&current) {
            return Ok(());
        }

        let old_key = ty.primary_key().and_then(|pk| snapshot_key(self, id, pk));
        let old_principal_keys: Vec<(ForeignKeyId, Option<KeyValue>)> = ty
            .referencing_foreign_keys()
            .iter()
            .filter(|&&fk| self.model.foreign_key(fk).principal_key().contains(&property))
            .map(|&fk| (fk, snapshot_key(self, id, self.model.foreign_key(fk).principal_key())))
            .collect();
        let old_fks: Vec<(ForeignKeyId, Option<KeyValue>)> = prop
            .foreign_keys()
            .iter()
            .map(|&fk| (fk, snapshot_key(self, id, self.model.foreign_key(fk).properties())))
            .collect();

        self.arena[id].relationships.set_value(property, current);

        if fixup == Fixup::None {
            return Ok(());
        }
        if prop.is_primary_key() {
            self.unregister_identity(ty.root_type(), old_key, id);
            self.check_identity(&self.arena[id], Some(id))?;
            self.register_identity(id);
        }
        for (fk_id, old) in old_principal_keys {
            let fk = self.model.foreign_key(fk_id).clone();
            for dependent in self.dependents_of(id, &fk, old.as_ref()) {
                self.set_foreign_key(dependent, &fk, id)?;
            }
        }
        if fixup == Fixup::Full {
            for (fk, old) in old_fks {
                self.foreign_key_changed(id, fk, old)?;
            }
        }
        Ok(())
    }

    /// Move a dependent whose foreign key changed to its new principal
    pub(crate) fn foreign_key_changed(
        &mut self,
        dependent: EntryId,
        fk_id: ForeignKeyId,
        old_key: Option<KeyValue>,
    ) -> Result<()> {
        let model = Arc::clone(&self.model);
        let fk = model.foreign_key(fk_id);
        let Some(entry) = self.arena.get(dependent) else {
            return Ok(());
        };
        let new_key = entry.foreign_key_value(fk);

        let old_principal = fk
            .dependent_to_principal()
            .and_then(|n| match entry.relationships.navigation(n) {
                NavigationValue::Reference(r) => r.clone(),
                NavigationValue::Collection(_) => None,
            })
            .and_then(|t| self.id_of(&t))
            .or_else(|| old_key.as_ref().and_then(|k| self.find_principal(fk, k)));
        let new_principal = new_key.as_ref().and_then(|k| self.find_principal(fk, k));

        if let Some(old) = old_principal {
            if Some(old) != new_principal {
                self.unlink(dependent, fk, old);
            }
        }
        match new_principal {
            Some(principal) => self.link(dependent, fk, principal)?,
            None => {
                if let Some(nav) = fk.dependent_to_principal() {
                    let entry = &mut self.arena[dependent];
                    if entry.entity.reference_at(nav).is_some() {
                        entry.entity.store_reference_at(nav, None);
                        entry.relationships.set_reference(nav, None);
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Point the navigations of both sides at each other
    pub(crate) fn link(&mut self, dependent: EntryId, fk: &ForeignKey, principal: EntryId) -> Result<()> {
        let dep = self.arena[dependent].entity.clone();
        let pri = self.arena[principal].entity.clone();

        if let Some(nav) = fk.dependent_to_principal() {
            if !dep.reference_at(nav).is_some_and(|t| t.ptr_eq(&pri)) {
                dep.store_reference_at(nav, Some(pri.clone()));
            }
            self.arena[dependent]
                .relationships
                .set_reference(nav, Some(pri.clone()));
        }

        if let Some(nav) = fk.principal_to_dependent() {
            if fk.is_unique() {
                if let Some(previous) = pri.reference_at(nav).filter(|p| !p.ptr_eq(&dep)) {
                    if let Some(prev_id) = self.id_of(&previous) {
                        self.sever(prev_id, fk, principal)?;
                    }
                }
                pri.store_reference_at(nav, Some(dep.clone()));
                if let Some(entry) = self.arena.get_mut(principal) {
                    entry.relationships.set_reference(nav, Some(dep.clone()));
                }
            } else {
                pri.store_collection_add(nav, &dep);
                if let Some(entry) = self.arena.get_mut(principal) {
                    entry.relationships.collection_add(nav, &dep);
                }
            }
        }

        // A unique principal keeps only one dependent, found by key as well
        if fk.is_unique() && self.arena.get(principal).is_some() {
            let key = self.key_of(principal, fk.principal_key());
            for other in self.dependents_of(principal, fk, key.as_ref()) {
                if other != dependent && self.arena.get(principal).is_some() {
                    self.sever(other, fk, principal)?;
                }
            }
        }
        Ok(())
    }

    /// Remove the link between a dependent and its principal
    pub(crate) fn unlink(&mut self, dependent: EntryId, fk: &ForeignKey, principal: EntryId) {
        let dep = self.arena[dependent].entity.clone();
        let pri = self.arena[principal].entity.clone();
        if let Some(nav) = fk.principal_to_dependent() {
            if fk.is_unique() {
                if pri.reference_at(nav).is_some_and(|d| d.ptr_eq(&dep)) {
                    pri.store_reference_at(nav, None);
                    self.arena[principal].relationships.set_reference(nav, None);
                }
            } else if pri.store_collection_remove(nav, &dep) {
                self.arena[principal]
                    .relationships
                    .collection_remove(nav, &dep);
            }
        }
        if let Some(nav) = fk.dependent_to_principal() {
            if dep.reference_at(nav).is_some_and(|p| p.ptr_eq(&pri)) {
                dep.store_reference_at(nav, None);
                self.arena[dependent].relationships.set_reference(nav, None);
            }
        }
    }

    /// Detach a previous dependent of a unique relationship
    fn sever(&mut self, dependent: EntryId, fk: &ForeignKey, principal: EntryId) -> Result<()> {
        let pri = self.arena[principal].entity.clone();
        let Some(entry) = self.arena.get_mut(dependent) else {
            return Ok(());
        };
        if matches!(entry.state, EntityState::Deleted) {
            return Ok(());
        }
        if let Some(nav) = fk.dependent_to_principal() {
            if entry.entity.reference_at(nav).is_some_and(|p| p.ptr_eq(&pri)) {
                entry.entity.store_reference_at(nav, None);
                entry.relationships.set_reference(nav, None);
            }
        }
        let principal_key = self.key_of(principal, fk.principal_key());
        if principal_key.is_some() && self.arena[dependent].foreign_key_value(fk) == principal_key {
            self.null_foreign_key(dependent, fk, false)?;
        }
        Ok(())
    }

    /// Link through one navigation of `referrer` to `other`
    pub(crate) fn fixup_navigation_link(
        &mut self,
        referrer: EntryId,
        nav: usize,
        other: EntryId,
    ) -> Result<()> {
        let navigation = self.arena[referrer].entity_type.navigation(nav).clone();
        let fk = self.model.foreign_key(navigation.foreign_key()).clone();
        let (dependent, principal) = if navigation.is_on_dependent() {
            (referrer, other)
        } else {
            (other, referrer)
        };
        if !self
            .model
            .is_assignable(fk.dependent_type(), self.arena[dependent].entity_type.id())
        {
            return Ok(());
        }
        self.set_foreign_key(dependent, &fk, principal)?;
        if self.arena.get(dependent).is_some() && self.arena.get(principal).is_some() {
            self.link(dependent, &fk, principal)?;
        }
        Ok(())
    }

    // ========================================================================
    // Foreign key values
    // ========================================================================

    /// Copy the principal's key (and its temporary flags) into the dependent
    pub(crate) fn set_foreign_key(
        &mut self,
        dependent: EntryId,
        fk: &ForeignKey,
        principal: EntryId,
    ) -> Result<()> {
        for (i, &dp) in fk.properties().iter().enumerate() {
            let pk = fk.principal_key()[i];
            let (value, temporary) = {
                let p = &self.arena[principal];
                (p.value(pk), p.flags[pk].temporary)
            };
            let Some(dep) = self.arena.get(dependent) else {
                return Ok(());
            };
            let flags = dep.flags[dp];
            if dep.value(dp) == value && !flags.conceptual_null && flags.temporary == temporary {
                continue;
            }
            self.set_property(
                dependent,
                dp,
                value,
                WriteOptions {
                    set_modified: true,
                    is_cascade_delete: false,
                    fixup: Fixup::KeysOnly,
                    temporary: Some(temporary),
                },
            )?;
        }
        Ok(())
    }

    /// Null every foreign key property; required ones become conceptual nulls
    pub(crate) fn null_foreign_key(
        &mut self,
        dependent: EntryId,
        fk: &ForeignKey,
        is_cascade_delete: bool,
    ) -> Result<()> {
        for &p in fk.properties() {
            if self.arena.get(dependent).is_none() {
                return Ok(());
            }
            self.set_property(
                dependent,
                p,
                Value::Null,
                WriteOptions {
                    set_modified: true,
                    is_cascade_delete: true,
                    fixup: Fixup::None,
                    temporary: Some(false),
                },
            )?;
        }
        if !is_cascade_delete
            && self
                .arena
                .get(dependent)
                .is_some_and(|e| e.has_conceptual_null())
        {
            self.conceptual_null_written(dependent)?;
        }
        Ok(())
    }

    /// Tracked dependents of `principal` through `fk`
    ///
    /// A dependent is found through the principal's navigation, its own
    /// navigation, or a foreign key equal to `key` when its navigation is
    /// unset.
    pub(crate) fn dependents_of(
        &self,
        principal: EntryId,
        fk: &ForeignKey,
        key: Option<&KeyValue>,
    ) -> Vec<EntryId> {
        let mut out = Vec::new();
        let pri = &self.arena[principal].entity;
        if let Some(nav) = fk.principal_to_dependent() {
            let targets = match pri.navigation_at(nav) {
                NavigationValue::Reference(r) => r.into_iter().collect(),
                NavigationValue::Collection(c) => c,
            };
            for t in targets {
                if let Some(d) = self.id_of(&t) {
                    if d != principal && !out.contains(&d) {
                        out.push(d);
                    }
                }
            }
        }
        for (id, entry) in self.arena.iter() {
            if id == principal
                || out.contains(&id)
                || !self
                    .model
                    .is_assignable(fk.dependent_type(), entry.entity_type.id())
            {
                continue;
            }
            let navigation_target = fk
                .dependent_to_principal()
                .and_then(|n| entry.entity.reference_at(n));
            let matches = match navigation_target {
                Some(t) => t.ptr_eq(pri),
                None => key.is_some() && entry.foreign_key_value(fk).as_ref() == key,
            };
            if matches {
                out.push(id);
            }
        }
        out
    }

    // ========================================================================
    // Newly tracked entries
    // ========================================================================

    /// Link a newly tracked entry with the tracked graph
    pub(crate) fn initial_fixup(&mut self, id: EntryId) -> Result<()> {
        let model = Arc::clone(&self.model);
        let entity = self.arena[id].entity.clone();
        let ty = entity.entity_type().clone();

        // As dependent
        for &fk_id in ty.foreign_keys() {
            let fk = model.foreign_key(fk_id);
            let target = fk.dependent_to_principal().and_then(|n| entity.reference_at(n));
            match (target, fk.dependent_to_principal()) {
                (Some(t), Some(nav)) => match self.id_of(&t) {
                    Some(principal) => {
                        self.set_foreign_key(id, fk, principal)?;
                        self.link(id, fk, principal)?;
                    }
                    None => self.add_pending(&t, &entity, nav),
                },
                _ => {
                    let key = self.arena[id].foreign_key_value(fk);
                    if let Some(principal) = key.and_then(|k| self.find_principal(fk, &k)) {
                        if principal != id {
                            self.link(id, fk, principal)?;
                        }
                    }
                }
            }
            if self.arena.get(id).is_none() {
                return Ok(());
            }
        }

        // As principal
        for &fk_id in ty.referencing_foreign_keys() {
            let fk = model.foreign_key(fk_id);
            if let Some(nav) = fk.principal_to_dependent() {
                let targets = match entity.navigation_at(nav) {
                    NavigationValue::Reference(r) => r.into_iter().collect(),
                    NavigationValue::Collection(c) => c,
                };
                for t in targets {
                    match self.id_of(&t) {
                        Some(dependent) => {
                            if model.is_assignable(fk.dependent_type(), t.entity_type().id()) {
                                self.set_foreign_key(dependent, fk, id)?;
                                self.link(dependent, fk, id)?;
                            }
                        }
                        None => self.add_pending(&t, &entity, nav),
                    }
                }
            }
            if let Some(key) = self.key_of(id, fk.principal_key()) {
                let waiting: Vec<EntryId> = self
                    .arena
                    .iter()
                    .filter(|(other, e)| {
                        *other != id
                            && model.is_assignable(fk.dependent_type(), e.entity_type.id())
                            && !matches!(e.state, EntityState::Deleted)
                            && e.foreign_key_value(fk).as_ref() == Some(&key)
                            && fk.dependent_to_principal().map_or(true, |n| {
                                e.entity
                                    .reference_at(n)
                                    .map_or(true, |p| p.ptr_eq(&entity))
                            })
                    })
                    .map(|(other, _)| other)
                    .collect();
                for dependent in waiting {
                    self.link(dependent, fk, id)?;
                }
            }
        }

        // Tracked entries that referenced this instance while it was untracked
        if let Some(referrers) = self.pending_referrers.remove(&entity.instance_id()) {
            for (referrer, nav) in referrers {
                let Some(rid) = self.id_of(&referrer) else {
                    continue;
                };
                let still_points = match referrer.navigation_at(nav) {
                    NavigationValue::Reference(r) => r.is_some_and(|t| t.ptr_eq(&entity)),
                    NavigationValue::Collection(c) => c.iter().any(|t| t.ptr_eq(&entity)),
                };
                if still_points && self.arena.get(id).is_some() {
                    self.fixup_navigation_link(rid, nav, id)?;
                }
            }
        }
        Ok(())
    }

    fn add_pending(
        &mut self,
        target: &Entity,
        referrer: &Entity,
        nav: usize,
    ) {
        let list = self
            .pending_referrers
            .entry(target.instance_id())
            .or_default();
        if !list.iter().any(|(r, n)| r.ptr_eq(referrer) && *n == nav) {
            list.push((referrer.clone(), nav));
        }
    }

    // ========================================================================
    // Navigation changes
    // ========================================================================

    /// A reference navigation now points at `new` instead of `old`
    pub(crate) fn navigation_reference_changed(
        &mut self,
        id: EntryId,
        nav: usize,
        old: Option<Entity>,
        new: Option<Entity>,
    ) -> Result<()> {
        let navigation = self.arena[id].entity_type.navigation(nav).clone();
        let fk = self.model.foreign_key(navigation.foreign_key()).clone();
        self.arena[id].relationships.set_reference(nav, new.clone());

        if navigation.is_on_dependent() {
            if let Some(old_principal) = old.as_ref().and_then(|o| self.id_of(o)) {
                if new.as_ref().map_or(true, |n| !n.ptr_eq(&self.arena[old_principal].entity)) {
                    self.unlink(id, &fk, old_principal);
                }
            }
            match new {
                Some(target) => {
                    if let Some(principal) = self.track_reachable(id, nav, &target)? {
                        if self.arena.get(id).is_some() {
                            self.set_foreign_key(id, &fk, principal)?;
                            self.link(id, &fk, principal)?;
                        }
                    }
                }
                None => {
                    let old_key = old
                        .as_ref()
                        .and_then(|o| self.id_of(o))
                        .and_then(|p| self.key_of(p, fk.principal_key()));
                    let current = self.arena[id].foreign_key_value(&fk);
                    if old_key.is_some() && current == old_key {
                        self.null_foreign_key(id, &fk, false)?;
                    }
                }
            }
        } else {
            if let Some(old_dependent) = old.as_ref().and_then(|o| self.id_of(o)) {
                let replaced = new
                    .as_ref()
                    .map_or(true, |n| !n.ptr_eq(&self.arena[old_dependent].entity));
                if replaced {
                    self.sever(old_dependent, &fk, id)?;
                }
            }
            if let Some(target) = new {
                if let Some(dependent) = self.track_reachable(id, nav, &target)? {
                    self.fixup_navigation_link(id, nav, dependent)?;
                }
            }
        }
        Ok(())
    }

    /// Items were added to or removed from a collection navigation
    pub(crate) fn navigation_collection_changed(
        &mut self,
        id: EntryId,
        nav: usize,
        added: Vec<Entity>,
        removed: Vec<Entity>,
    ) -> Result<()> {
        let navigation = self.arena[id].entity_type.navigation(nav).clone();
        let fk = self.model.foreign_key(navigation.foreign_key()).clone();
        let principal_entity = self.arena[id].entity.clone();
        let current = principal_entity.collection_at(nav);
        self.arena[id]
            .relationships
            .set_navigation(nav, NavigationValue::Collection(current));

        for item in removed {
            let Some(dependent) = self.id_of(&item) else {
                continue;
            };
            if let Some(dn) = fk.dependent_to_principal() {
                let entry = &mut self.arena[dependent];
                if entry
                    .entity
                    .reference_at(dn)
                    .is_some_and(|p| p.ptr_eq(&principal_entity))
                {
                    entry.entity.store_reference_at(dn, None);
                    entry.relationships.set_reference(dn, None);
                }
            }
            let key = self.key_of(id, fk.principal_key());
            let entry = &self.arena[dependent];
            if key.is_some()
                && entry.foreign_key_value(&fk) == key
                && !matches!(entry.state, EntityState::Deleted)
            {
                self.null_foreign_key(dependent, &fk, false)?;
            }
        }
        for item in added {
            if self.arena.get(id).is_none() {
                break;
            }
            if let Some(dependent) = self.track_reachable(id, nav, &item)? {
                self.fixup_navigation_link(id, nav, dependent)?;
            }
        }
        Ok(())
    }

    /// Remove a deleted entry from tracked navigations before it is detached
    pub(crate) fn unfix_deleted(&mut self, id: EntryId) {
        let model = Arc::clone(&self.model);
        let entity = self.arena[id].entity.clone();
        let ty = entity.entity_type().clone();

        for &fk_id in ty.foreign_keys() {
            let fk = model.foreign_key(fk_id);
            let principal = fk
                .dependent_to_principal()
                .and_then(|n| entity.reference_at(n))
                .and_then(|p| self.id_of(&p))
                .or_else(|| {
                    self.arena[id]
                        .foreign_key_value(fk)
                        .and_then(|k| self.find_principal(fk, &k))
                });
            if let Some(principal) = principal {
                self.unlink(id, fk, principal);
            }
            if let Some(nav) = fk.dependent_to_principal() {
                entity.store_reference_at(nav, None);
                self.arena[id].relationships.set_reference(nav, None);
            }
        }

        for &fk_id in ty.referencing_foreign_keys() {
            let fk = model.foreign_key(fk_id);
            let Some(nav) = fk.dependent_to_principal() else {
                continue;
            };
            let pointing: Vec<EntryId> = self
                .arena
                .iter()
                .filter(|(other, e)| {
                    *other != id
                        && model.is_assignable(fk.dependent_type(), e.entity_type.id())
                        && e.entity.reference_at(nav).is_some_and(|p| p.ptr_eq(&entity))
                })
                .map(|(other, _)| other)
                .collect();
            for dependent in pointing {
                let entry = &mut self.arena[dependent];
                entry.entity.store_reference_at(nav, None);
                entry.relationships.set_reference(nav, None);
            }
        }
    }
}

/// Snapshot values of `props`; `None` if any part is null
fn snapshot_key(tracker: &ChangeTracker, id: EntryId, props: &[usize]) -> Option<KeyValue> {
    let entry = &tracker.arena[id];
    let mut parts = Vec::with_capacity(props.len());
    for &p in props {
        let v = match entry.relationships.value(p) {
            Some(v) => v.clone(),
            None => entry.value(p),
        };
        if v.is_null() {
            return None;
        }
        parts.push(v);
    }
    Some(KeyValue::new(parts))
}
