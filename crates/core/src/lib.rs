//! Core types for changetrack
//!
//! This crate defines the foundational types shared by every layer:
//! - Value / ValueKind: property values and their declared kinds
//! - Error: the error taxonomy
//! - EntityState, CascadeTiming, KeyValue: tracking vocabulary
//! - Model: read-only entity metadata (properties, keys, relationships)
//! - Entity: shared handle to an entity instance with slot accessors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod instance;
pub mod model;
pub mod types;
pub mod value;

pub use error::{Error, ErrorKind, Result};
pub use instance::{Entity, InstanceId, MemberChange, NavigationValue};
pub use model::{
    ChangeTrackingStrategy, ComplexProperty, DeleteBehavior, EntityType, EntityTypeId, ForeignKey,
    ForeignKeyId, Model, ModelBuilder, Navigation, Property, Relationship, ValueComparer, ValueGeneration,
};
pub use types::{CascadeTiming, EntityState, KeyValue};
pub use value::{FromValue, Value, ValueKind};
