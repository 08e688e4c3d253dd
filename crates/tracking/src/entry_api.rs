//! Entry handles
//!
//! Handles borrow the tracker mutably for their lifetime and address the
//! entity by instance, so a handle whose entity was detached keeps working
//! and reports `Detached`.

use crate::entry::{EntryId, InternalEntry};
use crate::state::complex_members;
use crate::tracker::{ChangeTracker, StateOptions, WriteOptions};
use changetrack_core::{
    ComplexProperty, Entity, EntityState, EntityType, EntityTypeId, Error, FromValue, Navigation,
    Property, Result, Value,
};
use std::sync::Arc;

// ============================================================================
// Name resolution
// ============================================================================

fn resolve_property<'t>(ty: &'t EntityType, name: &str) -> Result<&'t Property> {
    match ty.find_property(name) {
        Some(p) => Ok(p),
        None if ty.find_navigation(name).is_some() => Err(Error::PropertyIsNavigation {
            property: name.to_string(),
            entity_type: ty.name().to_string(),
        }),
        None => Err(Error::property_not_found(name, ty.name())),
    }
}

fn resolve_complex<'t>(ty: &'t EntityType, path: &str) -> Result<&'t ComplexProperty> {
    ty.find_complex_property(path)
        .ok_or_else(|| Error::ComplexPropertyNotFound {
            property: path.to_string(),
            entity_type: ty.name().to_string(),
        })
}

fn resolve_navigation<'t>(ty: &'t EntityType, name: &str, collection: bool) -> Result<&'t Navigation> {
    let nav = match ty.find_navigation(name) {
        Some(n) => n,
        None if ty.find_property(name).is_some() => {
            return Err(Error::NavigationIsProperty {
                property: name.to_string(),
                entity_type: ty.name().to_string(),
            })
        }
        None => {
            return Err(Error::NavigationNotFound {
                navigation: name.to_string(),
                entity_type: ty.name().to_string(),
            })
        }
    };
    match (nav.is_collection(), collection) {
        (true, false) => Err(Error::ReferenceIsCollection {
            navigation: name.to_string(),
            entity_type: ty.name().to_string(),
        }),
        (false, true) => Err(Error::CollectionIsReference {
            navigation: name.to_string(),
            entity_type: ty.name().to_string(),
        }),
        _ => Ok(nav),
    }
}

/// Current value of an untracked instance; shadow properties hold their sentinel
fn untracked_value(entity: &Entity, property: &Property) -> Value {
    if property.is_shadow() {
        property.sentinel()
    } else {
        entity.value_at(property.index())
    }
}

fn current_value_of(tracker: &ChangeTracker, entity: &Entity, property: usize) -> Value {
    match tracker.id_of(entity) {
        Some(id) => tracker.arena[id].value(property),
        None => untracked_value(entity, entity.entity_type().property(property)),
    }
}

fn original_not_tracked(entry: &InternalEntry, property: usize) -> Error {
    Error::OriginalValueNotTracked {
        property: entry.entity_type.property(property).name().to_string(),
        entity_type: entry.entity_type.name().to_string(),
    }
}

fn original_value_of(tracker: &ChangeTracker, entity: &Entity, property: usize) -> Result<Value> {
    match tracker.id_of(entity) {
        Some(id) => {
            let entry = &tracker.arena[id];
            entry
                .original(property)
                .ok_or_else(|| original_not_tracked(entry, property))
        }
        None => Ok(untracked_value(entity, entity.entity_type().property(property))),
    }
}

// ============================================================================
// EntityEntry
// ============================================================================

/// Change-tracking view of one entity instance
pub struct EntityEntry<'a> {
    tracker: &'a mut ChangeTracker,
    entity: Entity,
}

impl<'a> EntityEntry<'a> {
    pub(crate) fn new(tracker: &'a mut ChangeTracker, entity: Entity) -> Self {
        Self { tracker, entity }
    }

    fn id(&self) -> Option<EntryId> {
        self.tracker.id_of(&self.entity)
    }

    /// The instance
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Entity type of the instance
    pub fn metadata(&self) -> &Arc<EntityType> {
        self.entity.entity_type()
    }

    /// Current state; Detached when not tracked
    pub fn state(&self) -> EntityState {
        self.tracker.state_of(&self.entity)
    }

    /// Assign a state, tracking the instance if needed
    pub fn set_state(&mut self, state: EntityState) -> Result<()> {
        self.tracker
            .set_state_of(&self.entity, state, StateOptions::default())
            .map(|_| ())
    }

    /// True if every store-generated key property holds a non-sentinel value
    pub fn is_key_set(&self) -> bool {
        self.tracker.is_key_set(&self.entity)
    }

    /// Detect changes for this entry only
    pub fn detect_changes(&mut self) -> Result<()> {
        match self.id() {
            Some(id) => self.tracker.detect_entry_changes(id),
            None => Ok(()),
        }
    }

    /// Handle for a scalar property, shadow properties included
    pub fn property(&mut self, name: &str) -> Result<PropertyEntry<'_>> {
        let property = resolve_property(self.entity.entity_type(), name)?.index();
        Ok(PropertyEntry {
            tracker: &mut *self.tracker,
            entity: self.entity.clone(),
            property,
        })
    }

    /// Handle for a complex property by path (`Activity.Champions`)
    pub fn complex_property(&mut self, path: &str) -> Result<ComplexPropertyEntry<'_>> {
        let complex = resolve_complex(self.entity.entity_type(), path)?.index();
        Ok(ComplexPropertyEntry {
            tracker: &mut *self.tracker,
            entity: self.entity.clone(),
            complex,
        })
    }

    /// Handle for a reference navigation
    pub fn reference(&mut self, name: &str) -> Result<ReferenceEntry<'_>> {
        let navigation = resolve_navigation(self.entity.entity_type(), name, false)?.index();
        Ok(ReferenceEntry {
            tracker: &mut *self.tracker,
            entity: self.entity.clone(),
            navigation,
        })
    }

    /// Handle for a collection navigation
    pub fn collection(&mut self, name: &str) -> Result<CollectionEntry<'_>> {
        let navigation = resolve_navigation(self.entity.entity_type(), name, true)?.index();
        Ok(CollectionEntry {
            tracker: &mut *self.tracker,
            entity: self.entity.clone(),
            navigation,
        })
    }

    /// Current values of every property
    pub fn current_values(&mut self) -> PropertyValues<'_> {
        PropertyValues::new(&mut *self.tracker, self.entity.clone(), ValueSet::Current, None)
    }

    /// Original values of every property
    pub fn original_values(&mut self) -> PropertyValues<'_> {
        PropertyValues::new(&mut *self.tracker, self.entity.clone(), ValueSet::Original, None)
    }
}

impl std::fmt::Debug for EntityEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityEntry")
            .field("entity_type", &self.entity.type_name())
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// PropertyEntry
// ============================================================================

/// Change-tracking view of one scalar property
#[derive(Debug)]
pub struct PropertyEntry<'a> {
    tracker: &'a mut ChangeTracker,
    entity: Entity,
    property: usize,
}

impl PropertyEntry<'_> {
    fn id(&self) -> Option<EntryId> {
        self.tracker.id_of(&self.entity)
    }

    /// Property metadata
    pub fn metadata(&self) -> &Property {
        self.entity.entity_type().property(self.property)
    }

    /// Property name
    pub fn name(&self) -> &str {
        self.metadata().name()
    }

    /// Current value
    pub fn current_value(&self) -> Value {
        current_value_of(self.tracker, &self.entity, self.property)
    }

    /// Current value converted to `T`; `None` for null
    pub fn current_value_as<T: FromValue>(&self) -> Result<Option<T>> {
        let prop = self.metadata();
        if prop.kind() != T::KIND {
            return Err(Error::WrongGenericPropertyType {
                property: prop.name().to_string(),
                entity_type: self.entity.type_name().to_string(),
                actual: prop.kind().to_string(),
                expected: T::KIND.to_string(),
            });
        }
        Ok(T::from_value(&self.current_value()))
    }

    /// Write the current value, running fixup for keys and foreign keys
    pub fn set_current_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.id() {
            Some(id) => self
                .tracker
                .set_property(id, self.property, value, WriteOptions::user()),
            None => {
                let prop = self.metadata();
                if !prop.accepts(&value) {
                    return Err(Error::WrongGenericPropertyType {
                        property: prop.name().to_string(),
                        entity_type: self.entity.type_name().to_string(),
                        actual: prop.kind().to_string(),
                        expected: value.type_name().to_string(),
                    });
                }
                if !prop.is_shadow() {
                    self.entity.store_value_at(self.property, value);
                }
                Ok(())
            }
        }
    }

    /// Original value; fails when the strategy does not keep originals
    pub fn original_value(&self) -> Result<Value> {
        original_value_of(self.tracker, &self.entity, self.property)
    }

    /// Overwrite the original value
    ///
    /// The property becomes modified if the new original differs from the
    /// current value.
    pub fn set_original_value(&mut self, value: impl Into<Value>) -> Result<()> {
        let Some(id) = self.id() else {
            return Ok(());
        };
        set_original(self.tracker, id, self.property, value.into())
    }

    /// True if the property is flagged modified
    pub fn is_modified(&self) -> bool {
        self.id()
            .is_some_and(|id| self.tracker.arena[id].is_property_modified(self.property))
    }

    /// Flag or unflag the property; clearing restores the original value
    pub fn set_is_modified(&mut self, is_modified: bool) -> Result<()> {
        match self.id() {
            Some(id) => self
                .tracker
                .set_property_modified(id, self.property, is_modified),
            None => Ok(()),
        }
    }

    /// True if the current value is a placeholder
    pub fn is_temporary(&self) -> bool {
        self.id()
            .is_some_and(|id| self.tracker.arena[id].flags[self.property].temporary)
    }

    /// Mark the current value as a placeholder or as permanent
    pub fn set_is_temporary(&mut self, is_temporary: bool) {
        if let Some(id) = self.id() {
            self.tracker.arena[id].flags[self.property].temporary = is_temporary;
        }
    }
}

fn set_original(tracker: &mut ChangeTracker, id: EntryId, property: usize, value: Value) -> Result<()> {
    let entry = &mut tracker.arena[id];
    let ty = entry.entity_type.clone();
    let prop = ty.property(property);
    if !prop.accepts(&value) {
        return Err(Error::WrongGenericPropertyType {
            property: prop.name().to_string(),
            entity_type: ty.name().to_string(),
            actual: prop.kind().to_string(),
            expected: value.type_name().to_string(),
        });
    }
    if !ty.change_tracking_strategy().keeps_original_values() {
        return Err(original_not_tracked(entry, property));
    }
    entry.ensure_originals();
    let differs = !prop.comparer().equals(&value, &entry.value(property));
    if let Some(originals) = entry.originals.as_mut() {
        originals.set(property, value);
    }
    if differs
        && !prop.is_primary_key()
        && matches!(entry.state, EntityState::Unchanged | EntityState::Modified)
    {
        tracker.mark_modified(id, property)?;
    }
    Ok(())
}

// ============================================================================
// ComplexPropertyEntry
// ============================================================================

/// Change-tracking view of one complex property
#[derive(Debug)]
pub struct ComplexPropertyEntry<'a> {
    tracker: &'a mut ChangeTracker,
    entity: Entity,
    complex: usize,
}

impl ComplexPropertyEntry<'_> {
    /// Complex property metadata
    pub fn metadata(&self) -> &ComplexProperty {
        self.entity.entity_type().complex_property(self.complex)
    }

    /// Full path of the complex property
    pub fn path(&self) -> &str {
        self.metadata().path()
    }

    /// True if any contained scalar is modified
    pub fn is_modified(&self) -> bool {
        self.tracker
            .id_of(&self.entity)
            .is_some_and(|id| self.tracker.is_complex_modified(id, self.complex))
    }

    /// Flag or unflag every contained scalar, nested ones included
    pub fn set_is_modified(&mut self, is_modified: bool) -> Result<()> {
        match self.tracker.id_of(&self.entity) {
            Some(id) => self
                .tracker
                .set_complex_modified(id, self.complex, is_modified),
            None => Ok(()),
        }
    }

    /// Handle for a member scalar, by name relative to this property
    pub fn property(&mut self, name: &str) -> Result<PropertyEntry<'_>> {
        let path = format!("{}.{}", self.path(), name);
        let property = resolve_property(self.entity.entity_type(), &path)?.index();
        Ok(PropertyEntry {
            tracker: &mut *self.tracker,
            entity: self.entity.clone(),
            property,
        })
    }

    /// Handle for a nested complex property
    pub fn complex_property(&mut self, name: &str) -> Result<ComplexPropertyEntry<'_>> {
        let path = format!("{}.{}", self.path(), name);
        let complex = resolve_complex(self.entity.entity_type(), &path)?.index();
        Ok(ComplexPropertyEntry {
            tracker: &mut *self.tracker,
            entity: self.entity.clone(),
            complex,
        })
    }

    /// Current values of the contained scalars
    pub fn current_values(&mut self) -> PropertyValues<'_> {
        let scope = complex_members(self.entity.entity_type(), self.complex);
        PropertyValues::new(&mut *self.tracker, self.entity.clone(), ValueSet::Current, Some(scope))
    }

    /// Original values of the contained scalars
    pub fn original_values(&mut self) -> PropertyValues<'_> {
        let scope = complex_members(self.entity.entity_type(), self.complex);
        PropertyValues::new(&mut *self.tracker, self.entity.clone(), ValueSet::Original, Some(scope))
    }
}

// ============================================================================
// Navigations
// ============================================================================

/// Change-tracking view of a reference navigation
#[derive(Debug)]
pub struct ReferenceEntry<'a> {
    tracker: &'a mut ChangeTracker,
    entity: Entity,
    navigation: usize,
}

impl ReferenceEntry<'_> {
    /// Navigation metadata
    pub fn metadata(&self) -> &Navigation {
        self.entity.entity_type().navigation(self.navigation)
    }

    /// Current target
    pub fn current_value(&self) -> Option<Entity> {
        self.entity.reference_at(self.navigation)
    }

    /// Point the navigation at `target` and fix up both sides now
    pub fn set_current_value(&mut self, target: Option<&Entity>) -> Result<()> {
        let old = self.entity.reference_at(self.navigation);
        let new = target.cloned();
        self.entity.store_reference_at(self.navigation, new.clone());
        match self.tracker.id_of(&self.entity) {
            Some(id) => self
                .tracker
                .navigation_reference_changed(id, self.navigation, old, new),
            None => Ok(()),
        }
    }
}

/// Change-tracking view of a collection navigation
#[derive(Debug)]
pub struct CollectionEntry<'a> {
    tracker: &'a mut ChangeTracker,
    entity: Entity,
    navigation: usize,
}

impl CollectionEntry<'_> {
    /// Navigation metadata
    pub fn metadata(&self) -> &Navigation {
        self.entity.entity_type().navigation(self.navigation)
    }

    /// Current members
    pub fn current_value(&self) -> Vec<Entity> {
        self.entity.collection_at(self.navigation)
    }

    /// True if `item` is a member
    pub fn contains(&self, item: &Entity) -> bool {
        self.entity.collection_contains(self.navigation, item)
    }

    /// Add `item` and fix up now; false if already a member
    pub fn add(&mut self, item: &Entity) -> Result<bool> {
        if !self.entity.store_collection_add(self.navigation, item) {
            return Ok(false);
        }
        if let Some(id) = self.tracker.id_of(&self.entity) {
            self.tracker
                .navigation_collection_changed(id, self.navigation, vec![item.clone()], Vec::new())?;
        }
        Ok(true)
    }

    /// Remove `item` and fix up now; false if not a member
    pub fn remove(&mut self, item: &Entity) -> Result<bool> {
        if !self.entity.store_collection_remove(self.navigation, item) {
            return Ok(false);
        }
        if let Some(id) = self.tracker.id_of(&self.entity) {
            self.tracker
                .navigation_collection_changed(id, self.navigation, Vec::new(), vec![item.clone()])?;
        }
        Ok(true)
    }
}

// ============================================================================
// PropertyValues
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueSet {
    Current,
    Original,
}

/// Current or original values of an entry, optionally scoped to a complex property
pub struct PropertyValues<'a> {
    tracker: &'a mut ChangeTracker,
    entity: Entity,
    set: ValueSet,
    scope: Option<Vec<usize>>,
}

impl<'a> PropertyValues<'a> {
    fn new(
        tracker: &'a mut ChangeTracker,
        entity: Entity,
        set: ValueSet,
        scope: Option<Vec<usize>>,
    ) -> Self {
        Self {
            tracker,
            entity,
            set,
            scope,
        }
    }

    fn in_scope(&self, property: usize) -> bool {
        self.scope.as_ref().map_or(true, |s| s.contains(&property))
    }

    fn indexes(&self) -> Vec<usize> {
        match &self.scope {
            Some(s) => s.clone(),
            None => (0..self.entity.entity_type().properties().len()).collect(),
        }
    }

    fn resolve(&self, name: &str) -> Result<usize> {
        let ty = self.entity.entity_type();
        let index = resolve_property(ty, name)?.index();
        if !self.in_scope(index) {
            return Err(Error::property_not_found(name, ty.name()));
        }
        Ok(index)
    }

    /// Names of the properties in this set
    pub fn properties(&self) -> Vec<String> {
        let ty = self.entity.entity_type();
        self.indexes()
            .into_iter()
            .map(|p| ty.property(p).name().to_string())
            .collect()
    }

    /// Value of one property
    pub fn get(&self, name: &str) -> Result<Value> {
        let index = self.resolve(name)?;
        self.value_at(index)
    }

    fn value_at(&self, index: usize) -> Result<Value> {
        match self.set {
            ValueSet::Current => Ok(current_value_of(self.tracker, &self.entity, index)),
            ValueSet::Original => original_value_of(self.tracker, &self.entity, index),
        }
    }

    /// Write one property
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.resolve(name)?;
        self.set_at(index, value.into())
    }

    fn set_at(&mut self, index: usize, value: Value) -> Result<()> {
        match (self.set, self.tracker.id_of(&self.entity)) {
            (ValueSet::Current, Some(id)) => {
                self.tracker
                    .set_property(id, index, value, WriteOptions::user())
            }
            (ValueSet::Original, Some(id)) => set_original(self.tracker, id, index, value),
            (_, None) => {
                if !self.entity.entity_type().property(index).is_shadow() {
                    self.entity.store_value_at(index, value);
                }
                Ok(())
            }
        }
    }

    /// Copy every non-key property from `other`
    ///
    /// Used for disconnected updates: values that differ mark properties
    /// modified and foreign keys run fixup. A differing key value fails
    /// with [`Error::KeyReadOnly`] on tracked entries.
    pub fn set_values_from(&mut self, other: &Entity) -> Result<()> {
        let ty = self.entity.entity_type().clone();
        for index in self.indexes() {
            let prop = ty.property(index);
            let Some(source) = other.entity_type().find_property(prop.name()) else {
                continue;
            };
            if source.is_shadow() {
                continue;
            }
            let value = other.value_at(source.index());
            if prop.is_primary_key() {
                if self.value_at(index)? != value && self.tracker.id_of(&self.entity).is_some() {
                    return Err(Error::KeyReadOnly {
                        property: prop.name().to_string(),
                        entity_type: ty.name().to_string(),
                    });
                }
                continue;
            }
            self.set_at(index, value)?;
        }
        Ok(())
    }

    /// New untracked instance holding these values
    pub fn to_object(&self) -> Result<Entity> {
        let ty = self.entity.entity_type();
        if !ty.has_parameterless_constructor() {
            return Err(Error::NoParameterlessConstructor {
                entity_type: ty.name().to_string(),
            });
        }
        let copy = Entity::new(ty.clone());
        for index in self.indexes() {
            if !ty.property(index).is_shadow() {
                copy.store_value_at(index, self.value_at(index)?);
            }
        }
        Ok(copy)
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Lazy iterator over tracked entries
pub struct Entries<'a> {
    tracker: &'a ChangeTracker,
    filter: Option<EntityTypeId>,
    ids: Vec<EntryId>,
    pos: usize,
}

impl<'a> Entries<'a> {
    pub(crate) fn new(tracker: &'a ChangeTracker, filter: Option<EntityTypeId>) -> Self {
        Self {
            tracker,
            filter,
            ids: tracker.arena.ids(),
            pos: 0,
        }
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = EntryView<'a>;

    fn next(&mut self) -> Option<EntryView<'a>> {
        while self.pos < self.ids.len() {
            let id = self.ids[self.pos];
            self.pos += 1;
            let Some(entry) = self.tracker.arena.get(id) else {
                continue;
            };
            if let Some(ty) = self.filter {
                if !self.tracker.model.is_assignable(ty, entry.entity_type.id()) {
                    continue;
                }
            }
            return Some(EntryView {
                tracker: self.tracker,
                id,
            });
        }
        None
    }
}

/// Read-only view of one tracked entry
#[derive(Clone, Copy)]
pub struct EntryView<'a> {
    tracker: &'a ChangeTracker,
    id: EntryId,
}

impl<'a> EntryView<'a> {
    fn entry(&self) -> &'a InternalEntry {
        &self.tracker.arena[self.id]
    }

    /// The instance
    pub fn entity(&self) -> &'a Entity {
        &self.entry().entity
    }

    /// Entity type
    pub fn metadata(&self) -> &'a Arc<EntityType> {
        &self.entry().entity_type
    }

    /// Current state
    pub fn state(&self) -> EntityState {
        self.entry().state
    }

    /// Current value of a property by name
    pub fn current_value(&self, name: &str) -> Result<Value> {
        let index = resolve_property(self.metadata(), name)?.index();
        Ok(self.entry().value(index))
    }

    /// Original value of a property by name
    pub fn original_value(&self, name: &str) -> Result<Value> {
        let index = resolve_property(self.metadata(), name)?.index();
        let entry = self.entry();
        entry
            .original(index)
            .ok_or_else(|| original_not_tracked(entry, index))
    }

    /// True if the named property is flagged modified
    pub fn is_modified(&self, name: &str) -> Result<bool> {
        let index = resolve_property(self.metadata(), name)?.index();
        Ok(self.entry().is_property_modified(index))
    }
}

impl std::fmt::Debug for EntryView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryView")
            .field("entity_type", &self.metadata().name())
            .field("state", &self.state())
            .finish()
    }
}
