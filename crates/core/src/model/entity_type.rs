//! Entity type metadata
//!
//! Read-only descriptions consumed by the tracker. Everything is addressed
//! by index: a property index is a slot in the instance's value table, a
//! navigation index is a slot in its navigation table. Names are resolved
//! to indices once, through the lookup tables built with the model.

use crate::value::{Value, ValueKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Index of an entity type within its [`Model`](super::Model)
pub type EntityTypeId = usize;

/// Index of a foreign key within its [`Model`](super::Model)
pub type ForeignKeyId = usize;

// ============================================================================
// Enums
// ============================================================================

/// How the detector finds changes for instances of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChangeTrackingStrategy {
    /// Originals are kept and diffed against current values
    #[default]
    Snapshot,
    /// Instances queue change notifications; originals are kept
    ChangedNotifications,
    /// Instances queue change notifications; originals are not kept
    ChangingAndChangedNotifications,
    /// Instances queue change notifications; originals are kept
    ChangingAndChangedNotificationsWithOriginalValues,
}

impl ChangeTrackingStrategy {
    /// True if instances of the type raise notifications instead of being diffed
    pub fn uses_notifications(&self) -> bool {
        !matches!(self, ChangeTrackingStrategy::Snapshot)
    }

    /// True if original values are recorded
    pub fn keeps_original_values(&self) -> bool {
        !matches!(self, ChangeTrackingStrategy::ChangingAndChangedNotifications)
    }
}

/// What happens to dependents when their principal is deleted or they are orphaned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteBehavior {
    /// Dependents are deleted, in the store and by the tracker
    Cascade,
    /// Dependents are deleted by the tracker
    ClientCascade,
    /// Foreign keys are set to null, in the store and by the tracker
    SetNull,
    /// Foreign keys are set to null by the tracker
    ClientSetNull,
    /// Deleting a principal with dependents is refused by the store
    Restrict,
    /// The tracker leaves dependents alone
    ClientNoAction,
}

impl DeleteBehavior {
    /// True if deleting the principal deletes the dependent
    pub fn cascades(&self) -> bool {
        matches!(self, DeleteBehavior::Cascade | DeleteBehavior::ClientCascade)
    }
}

/// Value generation configured for a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueGeneration {
    /// Values are always supplied by the application
    #[default]
    None,
    /// Permanent values from a per-property sequence when the entity is added
    Sequential,
    /// Temporary values when the entity is added, replaced by the store on commit
    OnSave,
}

/// Equality used when diffing a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueComparer {
    /// `Value` equality, reflexive for NaN
    #[default]
    Default,
    /// Strings compare ignoring ASCII case
    CaseInsensitive,
}

impl ValueComparer {
    /// Compare two values of the property
    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        match (self, a, b) {
            (ValueComparer::CaseInsensitive, Value::String(x), Value::String(y)) => {
                x.eq_ignore_ascii_case(y)
            }
            _ => a.same_as(b),
        }
    }
}

// ============================================================================
// Property
// ============================================================================

/// Scalar property of an entity type
#[derive(Debug, Clone)]
pub struct Property {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) kind: ValueKind,
    pub(crate) nullable: bool,
    pub(crate) value_generation: ValueGeneration,
    pub(crate) sentinel: Option<Value>,
    pub(crate) shadow_index: Option<usize>,
    pub(crate) comparer: ValueComparer,
    pub(crate) complex_parent: Option<usize>,
    pub(crate) is_primary_key: bool,
    pub(crate) foreign_keys: Vec<ForeignKeyId>,
}

impl Property {
    /// Slot index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name; members of complex properties use a dotted path
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// True if null is a legal value
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Configured value generation
    pub fn value_generation(&self) -> ValueGeneration {
        self.value_generation
    }

    /// Value meaning "not yet generated"
    pub fn sentinel(&self) -> Value {
        match &self.sentinel {
            Some(v) => v.clone(),
            None if self.nullable => Value::Null,
            None => self.kind.default_value(),
        }
    }

    /// True if the value lives in the tracker entry rather than the instance
    pub fn is_shadow(&self) -> bool {
        self.shadow_index.is_some()
    }

    /// Slot in the entry's shadow table
    pub fn shadow_index(&self) -> Option<usize> {
        self.shadow_index
    }

    /// Equality used for change detection
    pub fn comparer(&self) -> ValueComparer {
        self.comparer
    }

    /// Index of the complex property containing this one
    pub fn complex_parent(&self) -> Option<usize> {
        self.complex_parent
    }

    /// True if part of the primary key
    pub fn is_primary_key(&self) -> bool {
        self.is_primary_key
    }

    /// True if part of at least one foreign key
    pub fn is_foreign_key(&self) -> bool {
        !self.foreign_keys.is_empty()
    }

    /// Foreign keys this property belongs to
    pub fn foreign_keys(&self) -> &[ForeignKeyId] {
        &self.foreign_keys
    }

    /// True if the value takes part in relationship fixup
    pub fn is_key_or_foreign_key(&self) -> bool {
        self.is_primary_key || self.is_foreign_key()
    }

    /// True if `value` can be stored in this property
    pub fn accepts(&self, value: &Value) -> bool {
        match value.kind() {
            None => self.nullable,
            Some(kind) => kind == self.kind,
        }
    }
}

// ============================================================================
// ComplexProperty
// ============================================================================

/// Nested value aggregate of an entity type
///
/// Its scalar members are ordinary properties of the entity type whose
/// names are prefixed with the complex property's path.
#[derive(Debug, Clone)]
pub struct ComplexProperty {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) parent: Option<usize>,
    pub(crate) properties: Vec<usize>,
    pub(crate) complex_properties: Vec<usize>,
}

impl ComplexProperty {
    /// Index within the entity type's complex property table
    pub fn index(&self) -> usize {
        self.index
    }

    /// Member name relative to its parent
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full dotted path from the entity
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Enclosing complex property
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Direct scalar members
    pub fn properties(&self) -> &[usize] {
        &self.properties
    }

    /// Direct nested complex members
    pub fn complex_properties(&self) -> &[usize] {
        &self.complex_properties
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// Navigation property of an entity type
#[derive(Debug, Clone)]
pub struct Navigation {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) target_type: EntityTypeId,
    pub(crate) foreign_key: ForeignKeyId,
    pub(crate) is_collection: bool,
    pub(crate) is_on_dependent: bool,
}

impl Navigation {
    /// Slot index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity type at the other end
    pub fn target_type(&self) -> EntityTypeId {
        self.target_type
    }

    /// Relationship the navigation belongs to
    pub fn foreign_key(&self) -> ForeignKeyId {
        self.foreign_key
    }

    /// True for a collection navigation
    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    /// True if the navigation points from dependent to principal
    pub fn is_on_dependent(&self) -> bool {
        self.is_on_dependent
    }
}

// ============================================================================
// ForeignKey
// ============================================================================

/// Relationship between a dependent and a principal entity type
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub(crate) id: ForeignKeyId,
    pub(crate) dependent_type: EntityTypeId,
    pub(crate) properties: Vec<usize>,
    pub(crate) principal_type: EntityTypeId,
    pub(crate) principal_key: Vec<usize>,
    pub(crate) required: bool,
    pub(crate) unique: bool,
    pub(crate) delete_behavior: DeleteBehavior,
    pub(crate) dependent_to_principal: Option<usize>,
    pub(crate) principal_to_dependent: Option<usize>,
    pub(crate) ownership: bool,
    pub(crate) identifying: bool,
}

impl ForeignKey {
    /// Index in the model
    pub fn id(&self) -> ForeignKeyId {
        self.id
    }

    /// Dependent entity type
    pub fn dependent_type(&self) -> EntityTypeId {
        self.dependent_type
    }

    /// Foreign key properties on the dependent
    pub fn properties(&self) -> &[usize] {
        &self.properties
    }

    /// Principal entity type
    pub fn principal_type(&self) -> EntityTypeId {
        self.principal_type
    }

    /// Principal key properties, position-aligned with [`properties`](Self::properties)
    pub fn principal_key(&self) -> &[usize] {
        &self.principal_key
    }

    /// True if a dependent cannot exist without a principal
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// True for one-to-one relationships
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Configured delete behavior
    pub fn delete_behavior(&self) -> DeleteBehavior {
        self.delete_behavior
    }

    /// Reference navigation on the dependent
    pub fn dependent_to_principal(&self) -> Option<usize> {
        self.dependent_to_principal
    }

    /// Reference or collection navigation on the principal
    pub fn principal_to_dependent(&self) -> Option<usize> {
        self.principal_to_dependent
    }

    /// True if the dependent is owned by the principal
    pub fn is_ownership(&self) -> bool {
        self.ownership
    }

    /// True if the foreign key is part of the dependent's primary key
    pub fn is_identifying(&self) -> bool {
        self.identifying
    }
}

// ============================================================================
// EntityType
// ============================================================================

/// Entity type metadata
#[derive(Debug, Clone)]
pub struct EntityType {
    pub(crate) id: EntityTypeId,
    pub(crate) name: String,
    pub(crate) base_type: Option<EntityTypeId>,
    pub(crate) root_type: EntityTypeId,
    pub(crate) properties: Vec<Property>,
    pub(crate) complex_properties: Vec<ComplexProperty>,
    pub(crate) navigations: Vec<Navigation>,
    pub(crate) primary_key: Option<Vec<usize>>,
    pub(crate) foreign_keys: Vec<ForeignKeyId>,
    pub(crate) referencing_foreign_keys: Vec<ForeignKeyId>,
    pub(crate) strategy: ChangeTrackingStrategy,
    pub(crate) owned: bool,
    pub(crate) parameterless_constructor: bool,
    pub(crate) shadow_count: usize,
    pub(crate) property_lookup: FxHashMap<String, usize>,
    pub(crate) complex_lookup: FxHashMap<String, usize>,
    pub(crate) navigation_lookup: FxHashMap<String, usize>,
}

impl EntityType {
    /// Index in the model
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct base type
    pub fn base_type(&self) -> Option<EntityTypeId> {
        self.base_type
    }

    /// Root of the inheritance hierarchy; identity is scoped to it
    pub fn root_type(&self) -> EntityTypeId {
        self.root_type
    }

    /// All scalar properties, including inherited, shadow and complex members
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Property by slot index
    pub fn property(&self, index: usize) -> &Property {
        &self.properties[index]
    }

    /// Property by name (dotted path for complex members)
    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.property_lookup.get(name).map(|&i| &self.properties[i])
    }

    /// All complex properties, nested ones included
    pub fn complex_properties(&self) -> &[ComplexProperty] {
        &self.complex_properties
    }

    /// Complex property by index
    pub fn complex_property(&self, index: usize) -> &ComplexProperty {
        &self.complex_properties[index]
    }

    /// Complex property by path
    pub fn find_complex_property(&self, path: &str) -> Option<&ComplexProperty> {
        self.complex_lookup.get(path).map(|&i| &self.complex_properties[i])
    }

    /// All navigations
    pub fn navigations(&self) -> &[Navigation] {
        &self.navigations
    }

    /// Navigation by slot index
    pub fn navigation(&self, index: usize) -> &Navigation {
        &self.navigations[index]
    }

    /// Navigation by name
    pub fn find_navigation(&self, name: &str) -> Option<&Navigation> {
        self.navigation_lookup.get(name).map(|&i| &self.navigations[i])
    }

    /// Primary key property indices, `None` for keyless types
    pub fn primary_key(&self) -> Option<&[usize]> {
        self.primary_key.as_deref()
    }

    /// True if the type has no primary key
    pub fn is_keyless(&self) -> bool {
        self.primary_key.is_none()
    }

    /// Foreign keys where this type (or a base) is the dependent
    pub fn foreign_keys(&self) -> &[ForeignKeyId] {
        &self.foreign_keys
    }

    /// Foreign keys where this type (or a base) is the principal
    pub fn referencing_foreign_keys(&self) -> &[ForeignKeyId] {
        &self.referencing_foreign_keys
    }

    /// Change-tracking strategy
    pub fn change_tracking_strategy(&self) -> ChangeTrackingStrategy {
        self.strategy
    }

    /// True if the type is owned by another type
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// True if a fresh instance can be created without arguments
    pub fn has_parameterless_constructor(&self) -> bool {
        self.parameterless_constructor
    }

    /// Number of shadow property slots
    pub fn shadow_count(&self) -> usize {
        self.shadow_count
    }

    /// Initial value of every property slot for a fresh instance
    pub fn initial_values(&self) -> Vec<Value> {
        self.properties.iter().map(Property::sentinel).collect()
    }
}
