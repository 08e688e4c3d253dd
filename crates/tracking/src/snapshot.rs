//! Snapshot store
//!
//! Two snapshots are kept per entry:
//! - `OriginalValues`: every property as last accepted, diffed to find
//!   modified properties
//! - `RelationshipSnapshot`: key/foreign key values and navigation
//!   contents as last seen by fixup, diffed to find relationship changes
//!
//! The relationship snapshot is updated every time fixup writes, so the
//! detector never reports the tracker's own writes as user changes.

use changetrack_core::{Entity, EntityType, NavigationValue, Value};

/// Original property values, index-aligned with the entity type's properties
#[derive(Debug, Clone)]
pub(crate) struct OriginalValues {
    values: Vec<Value>,
}

impl OriginalValues {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub(crate) fn get(&self, index: usize) -> &Value {
        &self.values[index]
    }

    pub(crate) fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }
}

/// Last values seen by relationship fixup
#[derive(Debug, Clone)]
pub(crate) struct RelationshipSnapshot {
    /// `Some` for key and foreign key properties only
    values: Vec<Option<Value>>,
    navigations: Vec<NavigationValue>,
}

impl RelationshipSnapshot {
    pub(crate) fn capture(entity_type: &EntityType, values: &[Value], entity: &Entity) -> Self {
        let values = entity_type
            .properties()
            .iter()
            .map(|p| p.is_key_or_foreign_key().then(|| values[p.index()].clone()))
            .collect();
        let navigations = (0..entity_type.navigations().len())
            .map(|i| entity.navigation_at(i))
            .collect();
        Self {
            values,
            navigations,
        }
    }

    pub(crate) fn value(&self, index: usize) -> Option<&Value> {
        self.values[index].as_ref()
    }

    pub(crate) fn set_value(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.values[index].as_mut() {
            *slot = value;
        }
    }

    pub(crate) fn navigation(&self, index: usize) -> &NavigationValue {
        &self.navigations[index]
    }

    pub(crate) fn set_navigation(&mut self, index: usize, value: NavigationValue) {
        self.navigations[index] = value;
    }

    pub(crate) fn set_reference(&mut self, index: usize, target: Option<Entity>) {
        self.navigations[index] = NavigationValue::Reference(target);
    }

    pub(crate) fn collection_add(&mut self, index: usize, item: &Entity) {
        if let NavigationValue::Collection(items) = &mut self.navigations[index] {
            if !items.iter().any(|e| e.ptr_eq(item)) {
                items.push(item.clone());
            }
        }
    }

    pub(crate) fn collection_remove(&mut self, index: usize, item: &Entity) {
        if let NavigationValue::Collection(items) = &mut self.navigations[index] {
            items.retain(|e| !e.ptr_eq(item));
        }
    }
}

/// Items added to and removed from a collection since the snapshot
pub(crate) fn collection_delta(before: &[Entity], after: &[Entity]) -> (Vec<Entity>, Vec<Entity>) {
    let added = after
        .iter()
        .filter(|a| !before.iter().any(|b| b.ptr_eq(a)))
        .cloned()
        .collect();
    let removed = before
        .iter()
        .filter(|b| !after.iter().any(|a| a.ptr_eq(b)))
        .cloned()
        .collect();
    (added, removed)
}
