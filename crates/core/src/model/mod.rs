//! Entity metadata
//!
//! The model is immutable once built and is shared between registries
//! behind an `Arc`.

mod builder;
mod entity_type;

pub use builder::{ComplexBuilder, EntityTypeBuilder, ModelBuilder, PropertyDef, Relationship};
pub use entity_type::{
    ChangeTrackingStrategy, ComplexProperty, DeleteBehavior, EntityType, EntityTypeId, ForeignKey,
    ForeignKeyId, Navigation, Property, ValueComparer, ValueGeneration,
};

use crate::error::{Error, Result};
use crate::instance::Entity;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Complete set of entity types and relationships
#[derive(Debug)]
pub struct Model {
    pub(crate) entity_types: Vec<Arc<EntityType>>,
    pub(crate) foreign_keys: Vec<ForeignKey>,
    pub(crate) lookup: FxHashMap<String, EntityTypeId>,
}

impl Model {
    /// All entity types
    pub fn entity_types(&self) -> &[Arc<EntityType>] {
        &self.entity_types
    }

    /// Entity type by id
    pub fn entity_type(&self, id: EntityTypeId) -> &Arc<EntityType> {
        &self.entity_types[id]
    }

    /// Entity type by name
    pub fn find_entity_type(&self, name: &str) -> Result<&Arc<EntityType>> {
        self.lookup
            .get(name)
            .map(|&id| &self.entity_types[id])
            .ok_or_else(|| Error::EntityTypeNotFound {
                entity_type: name.to_string(),
            })
    }

    /// All foreign keys
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Foreign key by id
    pub fn foreign_key(&self, id: ForeignKeyId) -> &ForeignKey {
        &self.foreign_keys[id]
    }

    /// True if `candidate` is `base` or derives from it
    pub fn is_assignable(&self, base: EntityTypeId, candidate: EntityTypeId) -> bool {
        let mut current = Some(candidate);
        while let Some(c) = current {
            if c == base {
                return true;
            }
            current = self.entity_types[c].base_type;
        }
        false
    }

    /// Where values of a key property ultimately come from
    ///
    /// A property configured for generation is its own source. A key
    /// property that is also part of an identifying foreign key takes its
    /// value from the principal, so the source is looked up there.
    pub fn generation_source(
        &self,
        entity_type: EntityTypeId,
        property: usize,
    ) -> Option<(EntityTypeId, usize)> {
        let mut ty = entity_type;
        let mut prop = property;
        // Bounded walk; a self-referencing identifying key cannot loop forever
        for _ in 0..=self.entity_types.len() {
            let p = self.entity_types[ty].property(prop);
            if p.value_generation != ValueGeneration::None {
                return Some((ty, prop));
            }
            let next = p.foreign_keys.iter().find_map(|&fk_id| {
                let fk = &self.foreign_keys[fk_id];
                fk.properties
                    .iter()
                    .position(|&fp| fp == prop)
                    .map(|pos| (fk.principal_type, fk.principal_key[pos]))
            });
            match next {
                Some((t, pp)) if p.is_primary_key => {
                    ty = t;
                    prop = pp;
                }
                _ => return None,
            }
        }
        None
    }

    /// True if the key property's value is produced by value generation
    pub fn is_store_generated(&self, entity_type: EntityTypeId, property: usize) -> bool {
        self.generation_source(entity_type, property).is_some()
    }

    /// Create a fresh instance of the named type with default values
    pub fn create(&self, name: &str) -> Result<Entity> {
        Ok(Entity::new(self.find_entity_type(name)?.clone()))
    }
}
