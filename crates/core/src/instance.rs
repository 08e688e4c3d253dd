//! Entity instances
//!
//! An [`Entity`] is a shared handle to one instance's data. Cloning the
//! handle does not copy the data; two handles are the same instance iff
//! they point at the same allocation. The tracker never owns instances, it
//! only holds handles to them while they are tracked.
//!
//! Properties and navigations are addressed through the entity type's
//! accessor table: a name is resolved to a slot index once, and reads and
//! writes go straight to the slot. Each accessor takes the instance lock
//! for the duration of a single read or write, so two instances are never
//! locked at the same time.

use crate::error::{Error, Result};
use crate::model::{EntityType, Navigation, Property};
use crate::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Current value of a navigation slot
#[derive(Clone, Debug)]
pub enum NavigationValue {
    /// Reference navigation
    Reference(Option<Entity>),
    /// Collection navigation
    Collection(Vec<Entity>),
}

/// Member changed on an instance whose type uses change notifications
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberChange {
    /// Scalar property slot
    Property(usize),
    /// Navigation slot
    Navigation(usize),
}

#[derive(Debug)]
struct EntityData {
    values: Vec<Value>,
    navigations: Vec<NavigationValue>,
    notifications: Vec<MemberChange>,
}

/// Stable identity of an instance while at least one handle is alive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

/// Shared handle to an entity instance
#[derive(Clone)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    data: Arc<RwLock<EntityData>>,
}

impl Entity {
    /// Fresh instance with every property at its default value
    pub fn new(entity_type: Arc<EntityType>) -> Self {
        let navigations = entity_type
            .navigations()
            .iter()
            .map(|n| {
                if n.is_collection() {
                    NavigationValue::Collection(Vec::new())
                } else {
                    NavigationValue::Reference(None)
                }
            })
            .collect();
        let values = entity_type.initial_values();
        Self {
            entity_type,
            data: Arc::new(RwLock::new(EntityData {
                values,
                navigations,
                notifications: Vec::new(),
            })),
        }
    }

    /// Entity type metadata
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Entity type name
    pub fn type_name(&self) -> &str {
        self.entity_type.name()
    }

    /// Identity of the underlying allocation
    pub fn instance_id(&self) -> InstanceId {
        InstanceId(Arc::as_ptr(&self.data) as *const () as usize)
    }

    /// True if both handles refer to the same instance
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    // ========================================================================
    // Name-based accessors
    // ========================================================================

    fn resolve_property(&self, name: &str) -> Result<&Property> {
        match self.entity_type.find_property(name) {
            Some(p) if !p.is_shadow() => Ok(p),
            _ if self.entity_type.find_navigation(name).is_some() => {
                Err(Error::PropertyIsNavigation {
                    property: name.to_string(),
                    entity_type: self.type_name().to_string(),
                })
            }
            _ => Err(Error::property_not_found(name, self.type_name())),
        }
    }

    fn resolve_navigation(&self, name: &str, collection: bool) -> Result<&Navigation> {
        let nav = match self.entity_type.find_navigation(name) {
            Some(n) => n,
            None if self.entity_type.find_property(name).is_some() => {
                return Err(Error::NavigationIsProperty {
                    property: name.to_string(),
                    entity_type: self.type_name().to_string(),
                })
            }
            None => {
                return Err(Error::NavigationNotFound {
                    navigation: name.to_string(),
                    entity_type: self.type_name().to_string(),
                })
            }
        };
        match (nav.is_collection(), collection) {
            (true, false) => Err(Error::ReferenceIsCollection {
                navigation: name.to_string(),
                entity_type: self.type_name().to_string(),
            }),
            (false, true) => Err(Error::CollectionIsReference {
                navigation: name.to_string(),
                entity_type: self.type_name().to_string(),
            }),
            _ => Ok(nav),
        }
    }

    /// Read a property by name
    pub fn get(&self, name: &str) -> Result<Value> {
        let index = self.resolve_property(name)?.index();
        Ok(self.value_at(index))
    }

    /// Write a property by name
    ///
    /// The value must match the property's kind; null is only accepted for
    /// nullable properties.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let prop = self.resolve_property(name)?;
        if !prop.accepts(&value) {
            return Err(Error::WrongGenericPropertyType {
                property: name.to_string(),
                entity_type: self.type_name().to_string(),
                actual: prop.kind().to_string(),
                expected: value.type_name().to_string(),
            });
        }
        self.set_value_at(prop.index(), value);
        Ok(())
    }

    /// Read a reference navigation by name
    pub fn reference(&self, name: &str) -> Result<Option<Entity>> {
        let index = self.resolve_navigation(name, false)?.index();
        Ok(self.reference_at(index))
    }

    /// Point a reference navigation at `target`
    pub fn set_reference(&self, name: &str, target: Option<&Entity>) -> Result<()> {
        let index = self.resolve_navigation(name, false)?.index();
        self.set_reference_at(index, target.cloned());
        Ok(())
    }

    /// Current members of a collection navigation
    pub fn collection(&self, name: &str) -> Result<Vec<Entity>> {
        let index = self.resolve_navigation(name, true)?.index();
        Ok(self.collection_at(index))
    }

    /// Add `item` to a collection navigation; false if already present
    pub fn add_to(&self, name: &str, item: &Entity) -> Result<bool> {
        let index = self.resolve_navigation(name, true)?.index();
        let added = self.store_collection_add(index, item);
        if added {
            self.notify(MemberChange::Navigation(index));
        }
        Ok(added)
    }

    /// Remove `item` from a collection navigation; false if absent
    pub fn remove_from(&self, name: &str, item: &Entity) -> Result<bool> {
        let index = self.resolve_navigation(name, true)?.index();
        let removed = self.store_collection_remove(index, item);
        if removed {
            self.notify(MemberChange::Navigation(index));
        }
        Ok(removed)
    }

    // ========================================================================
    // Slot accessors
    // ========================================================================

    /// Value of a property slot
    pub fn value_at(&self, index: usize) -> Value {
        self.data.read().values[index].clone()
    }

    /// All property slots, in index order
    pub fn values(&self) -> Vec<Value> {
        self.data.read().values.clone()
    }

    /// Write a property slot as user code does, raising a notification
    pub fn set_value_at(&self, index: usize, value: Value) {
        self.data.write().values[index] = value;
        self.notify(MemberChange::Property(index));
    }

    /// Write a property slot without raising a notification
    pub fn store_value_at(&self, index: usize, value: Value) {
        self.data.write().values[index] = value;
    }

    /// Target of a reference slot
    pub fn reference_at(&self, index: usize) -> Option<Entity> {
        match &self.data.read().navigations[index] {
            NavigationValue::Reference(r) => r.clone(),
            NavigationValue::Collection(_) => None,
        }
    }

    /// Write a reference slot as user code does, raising a notification
    pub fn set_reference_at(&self, index: usize, target: Option<Entity>) {
        self.store_reference_at(index, target);
        self.notify(MemberChange::Navigation(index));
    }

    /// Write a reference slot without raising a notification
    pub fn store_reference_at(&self, index: usize, target: Option<Entity>) {
        if let NavigationValue::Reference(r) = &mut self.data.write().navigations[index] {
            *r = target;
        }
    }

    /// Members of a collection slot
    pub fn collection_at(&self, index: usize) -> Vec<Entity> {
        match &self.data.read().navigations[index] {
            NavigationValue::Collection(c) => c.clone(),
            NavigationValue::Reference(_) => Vec::new(),
        }
    }

    /// True if `item` is in the collection slot
    pub fn collection_contains(&self, index: usize, item: &Entity) -> bool {
        match &self.data.read().navigations[index] {
            NavigationValue::Collection(c) => c.iter().any(|e| e.ptr_eq(item)),
            NavigationValue::Reference(_) => false,
        }
    }

    /// Add to a collection slot without raising a notification
    pub fn store_collection_add(&self, index: usize, item: &Entity) -> bool {
        match &mut self.data.write().navigations[index] {
            NavigationValue::Collection(c) if !c.iter().any(|e| e.ptr_eq(item)) => {
                c.push(item.clone());
                true
            }
            _ => false,
        }
    }

    /// Remove from a collection slot without raising a notification
    pub fn store_collection_remove(&self, index: usize, item: &Entity) -> bool {
        match &mut self.data.write().navigations[index] {
            NavigationValue::Collection(c) => {
                let before = c.len();
                c.retain(|e| !e.ptr_eq(item));
                c.len() != before
            }
            NavigationValue::Reference(_) => false,
        }
    }

    /// Replace a whole navigation slot without raising a notification
    pub fn store_navigation_at(&self, index: usize, value: NavigationValue) {
        self.data.write().navigations[index] = value;
    }

    /// Current value of a navigation slot
    pub fn navigation_at(&self, index: usize) -> NavigationValue {
        self.data.read().navigations[index].clone()
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn notify(&self, change: MemberChange) {
        if self.entity_type.change_tracking_strategy().uses_notifications() {
            let mut data = self.data.write();
            if !data.notifications.contains(&change) {
                data.notifications.push(change);
            }
        }
    }

    /// Drain queued change notifications
    pub fn take_notifications(&self) -> Vec<MemberChange> {
        std::mem::take(&mut self.data.write().notifications)
    }

    /// True if notifications are queued
    pub fn has_notifications(&self) -> bool {
        !self.data.read().notifications.is_empty()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instance_id().hash(state);
    }
}

// Navigations are not printed: graphs are usually cyclic
impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.data.read();
        let mut s = f.debug_struct(self.type_name());
        for p in self.entity_type.properties() {
            if !p.is_shadow() {
                s.field(p.name(), &data.values[p.index()]);
            }
        }
        s.finish()
    }
}
