//! Tracker events
//!
//! Handlers are registered on one registry and only ever see that
//! registry's entries.

use changetrack_core::{Entity, EntityState};

/// Raised once when an entity starts being tracked
#[derive(Debug, Clone)]
pub struct EntityTrackedEvent {
    /// The instance
    pub entity: Entity,
    /// State the entity was tracked in
    pub state: EntityState,
    /// True if materialized by a query
    pub from_query: bool,
}

/// Raised on every realized state transition of a tracked entity
#[derive(Debug, Clone)]
pub struct EntityStateChangedEvent {
    /// The instance
    pub entity: Entity,
    /// State before the transition
    pub old_state: EntityState,
    /// State after the transition
    pub new_state: EntityState,
}

/// Handle returned when registering a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type TrackedHandler = Box<dyn FnMut(&EntityTrackedEvent) + Send>;
type StateChangedHandler = Box<dyn FnMut(&EntityStateChangedEvent) + Send>;

/// Handler lists of one registry
#[derive(Default)]
pub(crate) struct TrackerEvents {
    next_id: u64,
    tracked: Vec<(HandlerId, TrackedHandler)>,
    state_changed: Vec<(HandlerId, StateChangedHandler)>,
}

impl TrackerEvents {
    fn allocate(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    pub(crate) fn add_tracked(&mut self, handler: TrackedHandler) -> HandlerId {
        let id = self.allocate();
        self.tracked.push((id, handler));
        id
    }

    pub(crate) fn add_state_changed(&mut self, handler: StateChangedHandler) -> HandlerId {
        let id = self.allocate();
        self.state_changed.push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.tracked.len() + self.state_changed.len();
        self.tracked.retain(|(h, _)| *h != id);
        self.state_changed.retain(|(h, _)| *h != id);
        before != self.tracked.len() + self.state_changed.len()
    }

    pub(crate) fn clear(&mut self) {
        self.tracked.clear();
        self.state_changed.clear();
    }

    pub(crate) fn handler_count(&self) -> usize {
        self.tracked.len() + self.state_changed.len()
    }

    pub(crate) fn raise_tracked(&mut self, event: &EntityTrackedEvent) {
        for (_, handler) in &mut self.tracked {
            handler(event);
        }
    }

    pub(crate) fn raise_state_changed(&mut self, event: &EntityStateChangedEvent) {
        for (_, handler) in &mut self.state_changed {
            handler(event);
        }
    }
}

impl std::fmt::Debug for TrackerEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerEvents")
            .field("tracked", &self.tracked.len())
            .field("state_changed", &self.state_changed.len())
            .finish()
    }
}
