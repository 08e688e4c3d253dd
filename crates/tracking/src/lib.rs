//! Change tracking for changetrack
//!
//! This crate implements the per-context tracker:
//! - ChangeTracker: identity map and entry arena
//! - Entity state machine (Detached / Unchanged / Added / Modified / Deleted)
//! - Snapshot and notification based change detection
//! - Relationship fixup between navigations and foreign keys
//! - Cascade deletes and orphan handling
//! - Graph traversal for Add / Attach / Update / Remove
//! - Key value generation with temporary placeholders
//! - Tracked / StateChanged events and diagnostics
//!
//! A tracker is single-threaded; share it across tasks only behind a lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cascade;
pub mod commit;
mod detector;
pub mod diagnostics;
mod entry;
pub mod entry_api;
pub mod events;
mod fixup;
pub mod graph;
pub mod options;
mod snapshot;
mod state;
pub mod tracker;
pub mod value_generation;

pub use commit::PendingChange;
pub use diagnostics::{DiagnosticEvent, DiagnosticsLogger, RecordingDiagnostics, TracingDiagnostics};
pub use entry::EntryId;
pub use entry_api::{
    CollectionEntry, ComplexPropertyEntry, Entries, EntityEntry, EntryView, PropertyEntry,
    PropertyValues, ReferenceEntry,
};
pub use events::{EntityStateChangedEvent, EntityTrackedEvent, HandlerId};
pub use graph::GraphMode;
pub use options::TrackerOptions;
pub use tracker::ChangeTracker;
pub use value_generation::{
    AsyncValueGenerator, GeneratedValue, SequentialValueGenerator, TemporaryValueGenerator,
    ValueGenerator, ValueGeneratorCache,
};
