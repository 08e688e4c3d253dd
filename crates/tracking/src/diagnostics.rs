//! Diagnostic hook points
//!
//! The tracker reports what it does through a [`DiagnosticsLogger`]. The
//! default sink forwards to `tracing`; tests install a recorder. Values
//! are only attached to events when sensitive-data logging is enabled.

use changetrack_core::{EntityState, Value};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

/// Something the tracker did
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// A change detection pass is starting
    DetectChangesStarting,
    /// A change detection pass completed
    DetectChangesCompleted,
    /// A scalar property value differs from its original
    PropertyChangeDetected {
        /// Entity type name
        entity_type: String,
        /// Property name
        property: String,
        /// Original value (sensitive)
        old_value: Option<Value>,
        /// Current value (sensitive)
        new_value: Option<Value>,
    },
    /// A foreign key value changed
    ForeignKeyChangeDetected {
        /// Entity type name
        entity_type: String,
        /// Property name
        property: String,
        /// Previous value (sensitive)
        old_value: Option<Value>,
        /// Current value (sensitive)
        new_value: Option<Value>,
    },
    /// Items were added to or removed from a collection navigation
    CollectionChangeDetected {
        /// Entity type name
        entity_type: String,
        /// Navigation name
        navigation: String,
        /// Number of items added
        added: usize,
        /// Number of items removed
        removed: usize,
    },
    /// A reference navigation now points elsewhere
    ReferenceChangeDetected {
        /// Entity type name
        entity_type: String,
        /// Navigation name
        navigation: String,
    },
    /// A value generator produced a value
    ValueGenerated {
        /// Entity type name
        entity_type: String,
        /// Property name
        property: String,
        /// Generated value (sensitive)
        value: Option<Value>,
        /// True for temporary values
        temporary: bool,
    },
    /// A dependent was deleted because its principal was deleted
    CascadeDelete {
        /// Dependent entity type name
        dependent_type: String,
        /// Principal entity type name
        principal_type: String,
        /// State given to the dependent
        state: EntityState,
    },
    /// A required dependent was deleted because it lost its principal
    CascadeDeleteOrphan {
        /// Dependent entity type name
        dependent_type: String,
        /// Principal entity type name
        principal_type: String,
        /// State given to the dependent
        state: EntityState,
    },
    /// A tracked entity changed state
    StateChanged {
        /// Entity type name
        entity_type: String,
        /// State before
        old_state: EntityState,
        /// State after
        new_state: EntityState,
    },
    /// An entity started being tracked
    StartedTracking {
        /// Entity type name
        entity_type: String,
        /// Initial state
        state: EntityState,
    },
    /// A commit is starting
    SaveChangesStarting,
    /// A commit completed
    SaveChangesCompleted {
        /// Number of entities written
        entities_saved: usize,
    },
    /// A context was dropped or returned to its pool
    ContextDisposed,
}

/// Sink for [`DiagnosticEvent`]s
pub trait DiagnosticsLogger: Send + Sync {
    /// Handle one event
    fn log(&self, event: &DiagnosticEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsLogger for TracingDiagnostics {
    fn log(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::DetectChangesStarting => {
                trace!(target: "changetrack::tracking", "DetectChanges starting");
            }
            DiagnosticEvent::DetectChangesCompleted => {
                trace!(target: "changetrack::tracking", "DetectChanges completed");
            }
            DiagnosticEvent::PropertyChangeDetected {
                entity_type,
                property,
                old_value,
                new_value,
            } => {
                debug!(
                    target: "changetrack::tracking",
                    entity_type = %entity_type,
                    property = %property,
                    old_value = ?old_value,
                    new_value = ?new_value,
                    "Property change detected"
                );
            }
            DiagnosticEvent::ForeignKeyChangeDetected {
                entity_type,
                property,
                old_value,
                new_value,
            } => {
                debug!(
                    target: "changetrack::tracking",
                    entity_type = %entity_type,
                    property = %property,
                    old_value = ?old_value,
                    new_value = ?new_value,
                    "Foreign key change detected"
                );
            }
            DiagnosticEvent::CollectionChangeDetected {
                entity_type,
                navigation,
                added,
                removed,
            } => {
                debug!(
                    target: "changetrack::tracking",
                    entity_type = %entity_type,
                    navigation = %navigation,
                    added,
                    removed,
                    "Collection change detected"
                );
            }
            DiagnosticEvent::ReferenceChangeDetected {
                entity_type,
                navigation,
            } => {
                debug!(
                    target: "changetrack::tracking",
                    entity_type = %entity_type,
                    navigation = %navigation,
                    "Reference change detected"
                );
            }
            DiagnosticEvent::ValueGenerated {
                entity_type,
                property,
                value,
                temporary,
            } => {
                debug!(
                    target: "changetrack::tracking",
                    entity_type = %entity_type,
                    property = %property,
                    value = ?value,
                    temporary,
                    "Value generated"
                );
            }
            DiagnosticEvent::CascadeDelete {
                dependent_type,
                principal_type,
                state,
            } => {
                debug!(
                    target: "changetrack::tracking",
                    dependent = %dependent_type,
                    principal = %principal_type,
                    state = %state,
                    "Cascade delete"
                );
            }
            DiagnosticEvent::CascadeDeleteOrphan {
                dependent_type,
                principal_type,
                state,
            } => {
                debug!(
                    target: "changetrack::tracking",
                    dependent = %dependent_type,
                    principal = %principal_type,
                    state = %state,
                    "Cascade delete of orphan"
                );
            }
            DiagnosticEvent::StateChanged {
                entity_type,
                old_state,
                new_state,
            } => {
                debug!(
                    target: "changetrack::tracking",
                    entity_type = %entity_type,
                    old_state = %old_state,
                    new_state = %new_state,
                    "State changed"
                );
            }
            DiagnosticEvent::StartedTracking { entity_type, state } => {
                debug!(
                    target: "changetrack::tracking",
                    entity_type = %entity_type,
                    state = %state,
                    "Started tracking"
                );
            }
            DiagnosticEvent::SaveChangesStarting => {
                debug!(target: "changetrack::engine", "SaveChanges starting");
            }
            DiagnosticEvent::SaveChangesCompleted { entities_saved } => {
                info!(target: "changetrack::engine", entities_saved, "SaveChanges completed");
            }
            DiagnosticEvent::ContextDisposed => {
                debug!(target: "changetrack::engine", "Context disposed");
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all recorded events
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl DiagnosticsLogger for RecordingDiagnostics {
    fn log(&self, event: &DiagnosticEvent) {
        self.events.lock().push(event.clone());
    }
}
