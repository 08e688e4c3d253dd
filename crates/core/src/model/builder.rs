//! Imperative model assembly
//!
//! A thin builder producing a validated, immutable [`Model`]. It only
//! covers what the tracker consumes: properties, keys, complex properties,
//! relationships, ownership and single inheritance.

use super::entity_type::{
    ChangeTrackingStrategy, ComplexProperty, DeleteBehavior, EntityType, ForeignKey, Navigation,
    Property, ValueComparer, ValueGeneration,
};
use super::Model;
use crate::error::{Error, Result};
use crate::value::{Value, ValueKind};
use rustc_hash::FxHashMap;
use std::sync::Arc;

// ============================================================================
// Definitions
// ============================================================================

/// Property definition
#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: String,
    kind: ValueKind,
    nullable: bool,
    value_generation: ValueGeneration,
    sentinel: Option<Value>,
    shadow: bool,
    comparer: ValueComparer,
    complex_parent: Option<usize>,
}

impl PropertyDef {
    /// Allow null values
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Configure value generation
    pub fn generated(&mut self, generation: ValueGeneration) -> &mut Self {
        self.value_generation = generation;
        self
    }

    /// Override the "not yet generated" value
    pub fn sentinel(&mut self, value: impl Into<Value>) -> &mut Self {
        self.sentinel = Some(value.into());
        self
    }

    /// Keep the value in the tracker entry instead of the instance
    pub fn shadow(&mut self) -> &mut Self {
        self.shadow = true;
        self
    }

    /// Equality used for change detection
    pub fn comparer(&mut self, comparer: ValueComparer) -> &mut Self {
        self.comparer = comparer;
        self
    }
}

#[derive(Debug, Clone)]
struct ComplexDef {
    name: String,
    path: String,
    parent: Option<usize>,
}

/// Builder for one entity type
#[derive(Debug, Clone)]
pub struct EntityTypeBuilder {
    name: String,
    base: Option<String>,
    properties: Vec<PropertyDef>,
    complex: Vec<ComplexDef>,
    key: Option<Vec<String>>,
    strategy: ChangeTrackingStrategy,
    parameterless_constructor: bool,
}

impl EntityTypeBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base: None,
            properties: Vec::new(),
            complex: Vec::new(),
            key: None,
            strategy: ChangeTrackingStrategy::Snapshot,
            parameterless_constructor: true,
        }
    }

    /// Add a scalar property
    pub fn property(&mut self, name: &str, kind: ValueKind) -> &mut PropertyDef {
        self.push_property(name.to_string(), kind, None)
    }

    fn push_property(
        &mut self,
        name: String,
        kind: ValueKind,
        complex_parent: Option<usize>,
    ) -> &mut PropertyDef {
        self.properties.push(PropertyDef {
            name,
            kind,
            nullable: false,
            value_generation: ValueGeneration::None,
            sentinel: None,
            shadow: false,
            comparer: ValueComparer::Default,
            complex_parent,
        });
        let last = self.properties.len() - 1;
        &mut self.properties[last]
    }

    /// Declare the primary key
    pub fn key(&mut self, properties: &[&str]) -> &mut Self {
        self.key = Some(properties.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Derive from another entity type declared earlier
    pub fn base(&mut self, base: &str) -> &mut Self {
        self.base = Some(base.to_string());
        self
    }

    /// Select the change-tracking strategy
    pub fn change_tracking(&mut self, strategy: ChangeTrackingStrategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    /// Mark the type as only constructible with arguments
    pub fn without_parameterless_constructor(&mut self) -> &mut Self {
        self.parameterless_constructor = false;
        self
    }

    /// Add a complex property; members are declared in `configure`
    pub fn complex(&mut self, name: &str, configure: impl FnOnce(&mut ComplexBuilder<'_>)) -> &mut Self {
        self.push_complex(name, None, configure);
        self
    }

    fn push_complex(
        &mut self,
        name: &str,
        parent: Option<usize>,
        configure: impl FnOnce(&mut ComplexBuilder<'_>),
    ) {
        let path = match parent {
            Some(p) => format!("{}.{}", self.complex[p].path, name),
            None => name.to_string(),
        };
        self.complex.push(ComplexDef {
            name: name.to_string(),
            path,
            parent,
        });
        let index = self.complex.len() - 1;
        let mut builder = ComplexBuilder {
            entity: self,
            index,
        };
        configure(&mut builder);
    }
}

/// Builder for the members of a complex property
pub struct ComplexBuilder<'a> {
    entity: &'a mut EntityTypeBuilder,
    index: usize,
}

impl ComplexBuilder<'_> {
    /// Add a scalar member
    pub fn property(&mut self, name: &str, kind: ValueKind) -> &mut PropertyDef {
        let path = format!("{}.{}", self.entity.complex[self.index].path, name);
        self.entity.push_property(path, kind, Some(self.index))
    }

    /// Add a nested complex member
    pub fn complex(&mut self, name: &str, configure: impl FnOnce(&mut ComplexBuilder<'_>)) -> &mut Self {
        let parent = self.index;
        self.entity.push_complex(name, Some(parent), configure);
        self
    }
}

/// Relationship definition
#[derive(Debug, Clone)]
pub struct Relationship {
    dependent: String,
    principal: String,
    foreign_key: Vec<String>,
    dependent_navigation: Option<String>,
    principal_navigation: Option<String>,
    unique: bool,
    required: Option<bool>,
    delete_behavior: Option<DeleteBehavior>,
    ownership: bool,
}

impl Relationship {
    /// Relationship from `dependent` to `principal`
    pub fn new(dependent: &str, principal: &str) -> Self {
        Self {
            dependent: dependent.to_string(),
            principal: principal.to_string(),
            foreign_key: Vec::new(),
            dependent_navigation: None,
            principal_navigation: None,
            unique: false,
            required: None,
            delete_behavior: None,
            ownership: false,
        }
    }

    /// Foreign key properties on the dependent
    pub fn foreign_key(mut self, properties: &[&str]) -> Self {
        self.foreign_key = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Reference navigation on the dependent
    pub fn dependent_navigation(mut self, name: &str) -> Self {
        self.dependent_navigation = Some(name.to_string());
        self
    }

    /// Navigation on the principal (reference when unique, collection otherwise)
    pub fn principal_navigation(mut self, name: &str) -> Self {
        self.principal_navigation = Some(name.to_string());
        self
    }

    /// One-to-one
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Dependents cannot exist without a principal
    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    /// Dependents may exist without a principal
    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    /// Delete behavior; defaults to Cascade when required, ClientSetNull otherwise
    pub fn on_delete(mut self, behavior: DeleteBehavior) -> Self {
        self.delete_behavior = Some(behavior);
        self
    }

    /// The dependent is owned by the principal
    pub fn ownership(mut self) -> Self {
        self.ownership = true;
        self.required = Some(true);
        self
    }
}

// ============================================================================
// ModelBuilder
// ============================================================================

/// Assembles a [`Model`]
#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityTypeBuilder>,
    relationships: Vec<Relationship>,
}

struct NavigationDef {
    name: String,
    target: usize,
    foreign_key: usize,
    is_collection: bool,
    is_on_dependent: bool,
}

impl ModelBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an entity type
    pub fn entity(&mut self, name: &str, configure: impl FnOnce(&mut EntityTypeBuilder)) -> &mut Self {
        let mut builder = EntityTypeBuilder::new(name);
        configure(&mut builder);
        self.entities.push(builder);
        self
    }

    /// Declare a relationship
    pub fn relationship(&mut self, relationship: Relationship) -> &mut Self {
        self.relationships.push(relationship);
        self
    }

    /// Validate and freeze the model
    pub fn build(&self) -> Result<Model> {
        let mut ids: FxHashMap<String, usize> = FxHashMap::default();
        for (i, e) in self.entities.iter().enumerate() {
            if ids.insert(e.name.clone(), i).is_some() {
                return Err(Error::invalid_model(format!(
                    "entity type '{}' is declared twice",
                    e.name
                )));
            }
        }
        let resolve = |name: &str| -> Result<usize> {
            ids.get(name).copied().ok_or_else(|| Error::EntityTypeNotFound {
                entity_type: name.to_string(),
            })
        };

        // Navigations contributed by relationships, per declaring type
        let mut own_navigations: Vec<Vec<NavigationDef>> =
            (0..self.entities.len()).map(|_| Vec::new()).collect();
        for (fk_id, r) in self.relationships.iter().enumerate() {
            let dependent = resolve(&r.dependent)?;
            let principal = resolve(&r.principal)?;
            if let Some(name) = &r.dependent_navigation {
                own_navigations[dependent].push(NavigationDef {
                    name: name.clone(),
                    target: principal,
                    foreign_key: fk_id,
                    is_collection: false,
                    is_on_dependent: true,
                });
            }
            if let Some(name) = &r.principal_navigation {
                own_navigations[principal].push(NavigationDef {
                    name: name.clone(),
                    target: dependent,
                    foreign_key: fk_id,
                    is_collection: !r.unique,
                    is_on_dependent: false,
                });
            }
        }

        let mut types: Vec<EntityType> = Vec::with_capacity(self.entities.len());
        for (id, def) in self.entities.iter().enumerate() {
            let base = match &def.base {
                Some(b) => {
                    let base_id = resolve(b)?;
                    if base_id >= id {
                        return Err(Error::invalid_model(format!(
                            "base type '{}' must be declared before '{}'",
                            b, def.name
                        )));
                    }
                    Some(base_id)
                }
                None => None,
            };
            let ty = build_entity_type(id, def, base.map(|b| &types[b]), &own_navigations[id])?;
            types.push(ty);
        }

        let mut foreign_keys = Vec::with_capacity(self.relationships.len());
        for (fk_id, r) in self.relationships.iter().enumerate() {
            let dependent = resolve(&r.dependent)?;
            let principal = resolve(&r.principal)?;
            let fk = build_foreign_key(fk_id, r, &types[dependent], &types[principal])?;
            foreign_keys.push(fk);
        }

        // Annotate every type in the hierarchy below the declaring type
        for fk in &foreign_keys {
            for t in 0..types.len() {
                if is_same_or_derived(&types, fk.dependent_type, t) {
                    types[t].foreign_keys.push(fk.id);
                    for &p in &fk.properties {
                        types[t].properties[p].foreign_keys.push(fk.id);
                    }
                    if fk.ownership {
                        types[t].owned = true;
                    }
                }
                if is_same_or_derived(&types, fk.principal_type, t) {
                    types[t].referencing_foreign_keys.push(fk.id);
                }
            }
        }

        let lookup = types.iter().map(|t| (t.name.clone(), t.id)).collect();
        Ok(Model {
            entity_types: types.into_iter().map(Arc::new).collect(),
            foreign_keys,
            lookup,
        })
    }
}

fn is_same_or_derived(types: &[EntityType], base: usize, candidate: usize) -> bool {
    let mut current = Some(candidate);
    while let Some(c) = current {
        if c == base {
            return true;
        }
        current = types[c].base_type;
    }
    false
}

fn build_entity_type(
    id: usize,
    def: &EntityTypeBuilder,
    base: Option<&EntityType>,
    navigations: &[NavigationDef],
) -> Result<EntityType> {
    let mut properties: Vec<Property> = base.map(|b| b.properties.clone()).unwrap_or_default();
    let mut complex: Vec<ComplexProperty> =
        base.map(|b| b.complex_properties.clone()).unwrap_or_default();
    let mut nav_table: Vec<Navigation> = base.map(|b| b.navigations.clone()).unwrap_or_default();
    let mut shadow_count = base.map(|b| b.shadow_count).unwrap_or(0);
    let property_offset = properties.len();
    let complex_offset = complex.len();

    for c in &def.complex {
        complex.push(ComplexProperty {
            index: complex.len(),
            name: c.name.clone(),
            path: c.path.clone(),
            parent: c.parent.map(|p| p + complex_offset),
            properties: Vec::new(),
            complex_properties: Vec::new(),
        });
    }
    for (i, c) in def.complex.iter().enumerate() {
        if let Some(p) = c.parent {
            complex[p + complex_offset]
                .complex_properties
                .push(i + complex_offset);
        }
    }

    for (i, p) in def.properties.iter().enumerate() {
        let index = property_offset + i;
        let shadow_index = if p.shadow {
            shadow_count += 1;
            Some(shadow_count - 1)
        } else {
            None
        };
        if let Some(sentinel) = &p.sentinel {
            if sentinel.kind().is_some_and(|k| k != p.kind) {
                return Err(Error::invalid_model(format!(
                    "sentinel for '{}.{}' is not a {}",
                    def.name, p.name, p.kind
                )));
            }
        }
        let complex_parent = p.complex_parent.map(|c| c + complex_offset);
        if let Some(c) = complex_parent {
            complex[c].properties.push(index);
        }
        properties.push(Property {
            index,
            name: p.name.clone(),
            kind: p.kind,
            nullable: p.nullable,
            value_generation: p.value_generation,
            sentinel: p.sentinel.clone(),
            shadow_index,
            comparer: p.comparer,
            complex_parent,
            is_primary_key: false,
            foreign_keys: Vec::new(),
        });
    }

    for n in navigations {
        nav_table.push(Navigation {
            index: nav_table.len(),
            name: n.name.clone(),
            target_type: n.target,
            foreign_key: n.foreign_key,
            is_collection: n.is_collection,
            is_on_dependent: n.is_on_dependent,
        });
    }

    let property_lookup: FxHashMap<String, usize> = properties
        .iter()
        .map(|p| (p.name.clone(), p.index))
        .collect();
    let complex_lookup = complex.iter().map(|c| (c.path.clone(), c.index)).collect();
    let mut navigation_lookup = FxHashMap::default();
    for n in &nav_table {
        if property_lookup.contains_key(&n.name)
            || navigation_lookup.insert(n.name.clone(), n.index).is_some()
        {
            return Err(Error::invalid_model(format!(
                "member '{}.{}' is declared twice",
                def.name, n.name
            )));
        }
    }

    let primary_key = match (&def.key, base) {
        (Some(_), Some(_)) => {
            return Err(Error::invalid_model(format!(
                "derived type '{}' cannot redefine the key",
                def.name
            )))
        }
        (Some(names), None) => {
            let mut key = Vec::with_capacity(names.len());
            for n in names {
                let idx = *property_lookup
                    .get(n)
                    .ok_or_else(|| Error::property_not_found(n.clone(), def.name.clone()))?;
                if properties[idx].complex_parent.is_some() {
                    return Err(Error::invalid_model(format!(
                        "key property '{}.{}' cannot be a complex member",
                        def.name, n
                    )));
                }
                properties[idx].is_primary_key = true;
                key.push(idx);
            }
            Some(key)
        }
        (None, Some(b)) => b.primary_key.clone(),
        (None, None) => None,
    };

    Ok(EntityType {
        id,
        name: def.name.clone(),
        base_type: base.map(|b| b.id),
        root_type: base.map(|b| b.root_type).unwrap_or(id),
        properties,
        complex_properties: complex,
        navigations: nav_table,
        primary_key,
        foreign_keys: Vec::new(),
        referencing_foreign_keys: Vec::new(),
        strategy: def.strategy,
        owned: false,
        parameterless_constructor: def.parameterless_constructor,
        shadow_count,
        property_lookup,
        complex_lookup,
        navigation_lookup,
    })
}

fn build_foreign_key(
    id: usize,
    r: &Relationship,
    dependent: &EntityType,
    principal: &EntityType,
) -> Result<ForeignKey> {
    let principal_key = principal.primary_key.clone().ok_or_else(|| {
        Error::invalid_model(format!(
            "principal '{}' of a relationship has no primary key",
            principal.name
        ))
    })?;
    if r.foreign_key.len() != principal_key.len() {
        return Err(Error::invalid_model(format!(
            "foreign key on '{}' has {} properties but the key of '{}' has {}",
            dependent.name,
            r.foreign_key.len(),
            principal.name,
            principal_key.len()
        )));
    }
    let mut properties = Vec::with_capacity(r.foreign_key.len());
    for (name, &pk) in r.foreign_key.iter().zip(principal_key.iter()) {
        let prop = dependent
            .find_property(name)
            .ok_or_else(|| Error::property_not_found(name.clone(), dependent.name.clone()))?;
        if prop.kind != principal.properties[pk].kind {
            return Err(Error::invalid_model(format!(
                "foreign key property '{}.{}' does not match the type of '{}.{}'",
                dependent.name, name, principal.name, principal.properties[pk].name
            )));
        }
        properties.push(prop.index);
    }
    let required = r
        .required
        .unwrap_or_else(|| properties.iter().all(|&p| !dependent.properties[p].nullable));
    let delete_behavior = r.delete_behavior.unwrap_or(if required {
        DeleteBehavior::Cascade
    } else {
        DeleteBehavior::ClientSetNull
    });
    let identifying = properties
        .iter()
        .any(|&p| dependent.properties[p].is_primary_key);
    let dependent_to_principal = r
        .dependent_navigation
        .as_deref()
        .and_then(|n| dependent.find_navigation(n))
        .map(Navigation::index);
    let principal_to_dependent = r
        .principal_navigation
        .as_deref()
        .and_then(|n| principal.find_navigation(n))
        .map(Navigation::index);

    Ok(ForeignKey {
        id,
        dependent_type: dependent.id,
        properties,
        principal_type: principal.id,
        principal_key,
        required,
        unique: r.unique,
        delete_behavior,
        dependent_to_principal,
        principal_to_dependent,
        ownership: r.ownership,
        identifying,
    })
}
