//! Storage fixture for changetrack
//!
//! This crate implements the in-memory database commits are written to:
//! - InMemoryStore: DashMap of tables, FxHashMap rows keyed by primary key
//! - WriteBatch: ordered row operations applied all-or-nothing
//! - Per-column sequences for store-generated keys
//! - Version counter bumped once per applied batch

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod store;

pub use batch::{RowOperation, WriteBatch};
pub use store::{InMemoryStore, StoredRow, Table};
