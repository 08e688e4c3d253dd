//! changetrack - change tracking for an object-relational mapper
//!
//! changetrack keeps a registry of entity instances for one unit of work,
//! detects what changed since they were loaded or attached, keeps
//! relationships consistent and computes what a commit must write.
//!
//! # Quick Start
//!
//! ```
//! use changetrack::{Database, EntityState, ModelBuilder, ValueKind};
//! use std::sync::Arc;
//!
//! let mut b = ModelBuilder::new();
//! b.entity("Cat", |e| {
//!     e.property("Id", ValueKind::Int);
//!     e.property("Name", ValueKind::String);
//!     e.key(&["Id"]);
//! });
//! let db = Database::new(Arc::new(b.build().unwrap()));
//!
//! let mut ctx = db.context();
//! let cat = db.model().create("Cat").unwrap();
//! cat.set("Id", 1).unwrap();
//! cat.set("Name", "Tom").unwrap();
//! ctx.add(&cat).unwrap();
//! assert_eq!(ctx.tracker().state_of(&cat), EntityState::Added);
//!
//! ctx.save_changes().unwrap();
//! assert_eq!(ctx.tracker().state_of(&cat), EntityState::Unchanged);
//! ```
//!
//! # Architecture
//!
//! - `changetrack-core`: values, keys, model metadata, entity instances, errors
//! - `changetrack-tracking`: the registry, detection, fixup and cascades
//! - `changetrack-storage`: the in-memory store commits are written to
//! - `changetrack-engine`: contexts, SaveChanges, pooling, config and logging

pub use changetrack_core::*;
pub use changetrack_engine::{
    logging, Context, ContextConfig, ContextPool, Database, LoggingConfig, PooledContext,
    QueryTrackingBehavior, CONFIG_FILE_NAME,
};
pub use changetrack_storage::{InMemoryStore, RowOperation, WriteBatch};
pub use changetrack_tracking::*;
