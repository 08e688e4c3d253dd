//! Tracked entries
//!
//! An entry pairs an instance handle with the tracking data the registry
//! keeps for it. Entries live in the registry's arena and are addressed
//! by [`EntryId`].

use crate::snapshot::{OriginalValues, RelationshipSnapshot};
use changetrack_core::{Entity, EntityState, EntityType, ForeignKey, KeyValue, Value};
use std::fmt::Write;
use std::sync::Arc;

/// Slot of an entry in the registry's arena
///
/// Ids are only meaningful while the entry is tracked; a slot may be
/// reused after its entry is detached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

/// Per-property tracking flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PropertyFlags {
    pub(crate) modified: bool,
    pub(crate) temporary: bool,
    pub(crate) conceptual_null: bool,
}

/// Tracking data for one instance
#[derive(Debug)]
pub(crate) struct InternalEntry {
    pub(crate) entity: Entity,
    pub(crate) entity_type: Arc<EntityType>,
    pub(crate) state: EntityState,
    pub(crate) flags: Vec<PropertyFlags>,
    pub(crate) originals: Option<OriginalValues>,
    pub(crate) shadow_values: Vec<Value>,
    pub(crate) relationships: RelationshipSnapshot,
}

impl InternalEntry {
    /// Entry in the given state; snapshots reflect the instance as it is now
    pub(crate) fn new(entity: Entity, state: EntityState) -> Self {
        let entity_type = entity.entity_type().clone();
        let shadow_values = entity_type
            .properties()
            .iter()
            .filter(|p| p.is_shadow())
            .map(|p| p.sentinel())
            .collect();
        let flags = vec![PropertyFlags::default(); entity_type.properties().len()];
        let mut entry = Self {
            relationships: RelationshipSnapshot::capture(&entity_type, &entity.values(), &entity),
            entity,
            entity_type,
            state,
            flags,
            originals: None,
            shadow_values,
        };
        // Shadow slots on the instance are unused; snapshot the entry's values
        entry.refresh_relationship_values();
        entry
    }

    pub(crate) fn refresh_relationship_values(&mut self) {
        let values = self.current_values();
        for p in self.entity_type.properties() {
            if p.is_key_or_foreign_key() {
                self.relationships.set_value(p.index(), values[p.index()].clone());
            }
        }
    }

    /// Current value of a property, shadow-aware
    pub(crate) fn value(&self, index: usize) -> Value {
        match self.entity_type.property(index).shadow_index() {
            Some(s) => self.shadow_values[s].clone(),
            None => self.entity.value_at(index),
        }
    }

    /// Write a property without raising a notification
    pub(crate) fn write(&mut self, index: usize, value: Value) {
        match self.entity_type.property(index).shadow_index() {
            Some(s) => self.shadow_values[s] = value,
            None => self.entity.store_value_at(index, value),
        }
    }

    /// All current values, shadow slots filled from the entry
    pub(crate) fn current_values(&self) -> Vec<Value> {
        let mut values = self.entity.values();
        for p in self.entity_type.properties() {
            if let Some(s) = p.shadow_index() {
                values[p.index()] = self.shadow_values[s].clone();
            }
        }
        values
    }

    /// Record originals if the strategy keeps them and none exist yet
    pub(crate) fn ensure_originals(&mut self) {
        if self.originals.is_none()
            && self
                .entity_type
                .change_tracking_strategy()
                .keeps_original_values()
        {
            self.originals = Some(OriginalValues::new(self.current_values()));
        }
    }

    /// Replace originals with current values
    pub(crate) fn accept_originals(&mut self) {
        if self
            .entity_type
            .change_tracking_strategy()
            .keeps_original_values()
        {
            self.originals = Some(OriginalValues::new(self.current_values()));
        }
    }

    /// Original value if recorded; current value when not yet recorded
    pub(crate) fn original(&self, index: usize) -> Option<Value> {
        if !self
            .entity_type
            .change_tracking_strategy()
            .keeps_original_values()
        {
            return None;
        }
        Some(match &self.originals {
            Some(o) => o.get(index).clone(),
            None => self.value(index),
        })
    }

    /// Primary key value; `None` for keyless types
    pub(crate) fn key(&self) -> Option<KeyValue> {
        self.entity_type
            .primary_key()
            .map(|key| KeyValue::new(key.iter().map(|&i| self.value(i))))
    }

    /// Foreign key value; `None` if any part is null or conceptually null
    pub(crate) fn foreign_key_value(&self, fk: &ForeignKey) -> Option<KeyValue> {
        let mut parts = Vec::with_capacity(fk.properties().len());
        for &p in fk.properties() {
            if self.flags[p].conceptual_null {
                return None;
            }
            let v = self.value(p);
            if v.is_null() {
                return None;
            }
            parts.push(v);
        }
        Some(KeyValue::new(parts))
    }

    /// True if the entry is Modified and the property is flagged
    ///
    /// Flags left on Added or Deleted entries are not reported.
    pub(crate) fn is_property_modified(&self, index: usize) -> bool {
        self.state == EntityState::Modified && self.flags[index].modified
    }

    /// True if any property is flagged modified
    pub(crate) fn has_modified_properties(&self) -> bool {
        self.flags.iter().any(|f| f.modified)
    }

    /// True if any property holds a conceptual null
    pub(crate) fn has_conceptual_null(&self) -> bool {
        self.flags.iter().any(|f| f.conceptual_null)
    }

    pub(crate) fn clear_modified(&mut self) {
        for f in &mut self.flags {
            f.modified = false;
            f.conceptual_null = false;
        }
    }

    /// Key rendered as `{Id: 1, Name: 'x'}`
    pub(crate) fn key_string(&self) -> String {
        let mut out = String::from("{");
        if let Some(key) = self.entity_type.primary_key() {
            for (n, &i) in key.iter().enumerate() {
                if n > 0 {
                    out.push_str(", ");
                }
                let _ = write!(
                    out,
                    "{}: {}",
                    self.entity_type.property(i).name(),
                    self.value(i)
                );
            }
        }
        out.push('}');
        out
    }
}
