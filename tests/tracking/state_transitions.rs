//! State Transition Tests
//!
//! Every state can be assigned from every state, and the registry reports
//! exactly the transitions that happened.

use crate::common::*;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

fn tracked_in(tracker: &mut ChangeTracker, state: EntityState, id: i64) -> Entity {
    let cat = cat(tracker.model(), id, "Tom");
    tracker.track(&cat, state, false).unwrap();
    cat
}

// ============================================================================
// Totality
// ============================================================================

#[test]
fn all_25_transitions_are_allowed() {
    for from in EntityState::ALL {
        for to in EntityState::ALL {
            let mut tracker = ChangeTracker::new(cat_model());
            let cat = tracked_in(&mut tracker, from, 1);
            assert_eq!(tracker.state_of(&cat), from);

            tracker.entry(&cat).unwrap().set_state(to).unwrap();
            assert_eq!(tracker.state_of(&cat), to, "{} -> {}", from, to);
            assert_eq!(tracker.len(), usize::from(to != EntityState::Detached));
        }
    }
}

#[test]
fn self_transition_raises_no_event() {
    let mut tracker = ChangeTracker::new(cat_model());
    let cat = tracked_in(&mut tracker, EntityState::Modified, 1);
    let changes = Arc::new(Mutex::new(0));
    let counter = changes.clone();
    tracker.on_state_changed(move |_| *counter.lock() += 1);

    tracker.entry(&cat).unwrap().set_state(EntityState::Modified).unwrap();
    assert_eq!(*changes.lock(), 0);
}

#[test]
fn raw_state_values_outside_the_enum_fail() {
    assert_eq!(EntityState::try_from(3).unwrap(), EntityState::Modified);
    let err = EntityState::try_from(42).unwrap_err();
    assert!(matches!(err, Error::InvalidEnumValue { .. }));
    assert!(err.to_string().contains("42"));
}

// ============================================================================
// Side effects of specific targets
// ============================================================================

#[test]
fn unchanged_refreshes_originals() {
    let mut tracker = ChangeTracker::new(cat_model());
    let cat = tracked_in(&mut tracker, EntityState::Unchanged, 1);
    cat.set("Name", "Felix").unwrap();

    let mut entry = tracker.entry(&cat).unwrap();
    assert_eq!(entry.state(), EntityState::Modified);
    entry.set_state(EntityState::Unchanged).unwrap();

    let name = entry.property("Name").unwrap();
    assert!(!name.is_modified());
    assert_eq!(name.original_value().unwrap(), Value::from("Felix"));
}

#[test]
fn explicit_modified_flags_every_non_key_property() {
    let mut tracker = ChangeTracker::new(cat_model());
    let cat = tracked_in(&mut tracker, EntityState::Unchanged, 1);

    let mut entry = tracker.entry(&cat).unwrap();
    entry.set_state(EntityState::Modified).unwrap();
    assert!(entry.property("Name").unwrap().is_modified());
    assert!(!entry.property("Id").unwrap().is_modified());
}

#[test]
fn clearing_last_modified_flag_returns_to_unchanged() {
    let mut tracker = ChangeTracker::new(cat_model());
    let cat = tracked_in(&mut tracker, EntityState::Unchanged, 1);
    cat.set("Name", "Felix").unwrap();

    let mut entry = tracker.entry(&cat).unwrap();
    entry.property("Name").unwrap().set_is_modified(false).unwrap();
    assert_eq!(entry.state(), EntityState::Unchanged);
    assert_eq!(cat.get("Name").unwrap(), Value::from("Tom"));
}

#[test]
fn is_modified_is_ignored_on_added_entries() {
    let mut tracker = ChangeTracker::new(cat_model());
    let cat = tracked_in(&mut tracker, EntityState::Added, 1);

    let mut entry = tracker.entry(&cat).unwrap();
    entry.property("Name").unwrap().set_is_modified(true).unwrap();
    assert_eq!(entry.state(), EntityState::Added);
    assert!(!entry.property("Name").unwrap().is_modified());
}

#[test]
fn deleted_entry_reports_no_modified_properties() {
    let mut tracker = ChangeTracker::new(cat_model());
    let cat = tracked_in(&mut tracker, EntityState::Unchanged, 1);
    cat.set("Name", "Felix").unwrap();
    tracker.detect_changes().unwrap();

    let mut entry = tracker.entry(&cat).unwrap();
    assert_eq!(entry.state(), EntityState::Modified);
    assert!(entry.property("Name").unwrap().is_modified());

    entry.set_state(EntityState::Deleted).unwrap();
    assert!(!entry.property("Name").unwrap().is_modified());
    let pending = tracker.pending_changes();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].modified.is_empty());
}

#[test]
fn detached_handle_reports_detached() {
    let mut tracker = ChangeTracker::new(cat_model());
    let cat = tracked_in(&mut tracker, EntityState::Unchanged, 1);

    let mut entry = tracker.entry(&cat).unwrap();
    entry.set_state(EntityState::Detached).unwrap();
    assert_eq!(entry.state(), EntityState::Detached);
    assert!(tracker.is_empty());
}

// ============================================================================
// Properties
// ============================================================================

fn state_strategy() -> impl Strategy<Value = EntityState> {
    prop::sample::select(EntityState::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_sequence_ends_in_the_last_state(states in prop::collection::vec(state_strategy(), 1..16)) {
        let mut tracker = ChangeTracker::new(cat_model());
        let cat = cat(tracker.model(), 1, "Tom");
        let tracked = Arc::new(Mutex::new(0usize));
        let changed = Arc::new(Mutex::new(0usize));
        let t = tracked.clone();
        let c = changed.clone();
        tracker.on_tracked(move |_| *t.lock() += 1);
        tracker.on_state_changed(move |_| *c.lock() += 1);

        let mut previous = EntityState::Detached;
        let mut expected_tracked = 0;
        let mut expected_changed = 0;
        for state in states {
            tracker.entry(&cat).unwrap().set_state(state).unwrap();
            prop_assert_eq!(tracker.state_of(&cat), state);
            if previous == EntityState::Detached && state != EntityState::Detached {
                expected_tracked += 1;
            } else if previous != state {
                expected_changed += 1;
            }
            previous = state;
        }
        prop_assert_eq!(*tracked.lock(), expected_tracked);
        prop_assert_eq!(*changed.lock(), expected_changed);
    }
}
