//! Change Detection Tests
//!
//! A detection pass must be idempotent: once it has seen a mutation, a
//! second pass without further mutation changes no state and reports
//! nothing.

use crate::common::*;
use std::sync::Arc;

fn detected(recorder: &RecordingDiagnostics) -> usize {
    recorder.count(|e| {
        matches!(
            e,
            DiagnosticEvent::PropertyChangeDetected { .. }
                | DiagnosticEvent::ForeignKeyChangeDetected { .. }
                | DiagnosticEvent::CollectionChangeDetected { .. }
                | DiagnosticEvent::ReferenceChangeDetected { .. }
        )
    })
}

fn states(tracker: &ChangeTracker, entities: &[&Entity]) -> Vec<EntityState> {
    entities.iter().map(|e| tracker.state_of(e)).collect()
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn second_pass_after_property_change_detects_nothing() {
    let (mut tracker, recorder) = recording_tracker(blog_model(false));
    let (blog, post) = attached_blog_with_post(&mut tracker);
    blog.set("Title", "renamed").unwrap();

    tracker.detect_changes().unwrap();
    let after_first = states(&tracker, &[&blog, &post]);
    let events_first = detected(&recorder);
    assert_eq!(after_first, vec![EntityState::Modified, EntityState::Unchanged]);

    tracker.detect_changes().unwrap();
    assert_eq!(states(&tracker, &[&blog, &post]), after_first);
    assert_eq!(detected(&recorder), events_first);
}

#[test]
fn second_pass_after_navigation_change_detects_nothing() {
    let (mut tracker, recorder) = recording_tracker(blog_model(false));
    let (blog, post) = attached_blog_with_post(&mut tracker);
    let other = crate::common::blog(tracker.model(), 2);
    tracker.track_graph(&other, GraphMode::Attach).unwrap();

    post.set_reference("Blog", Some(&other)).unwrap();
    tracker.detect_changes().unwrap();
    assert_eq!(post.get("BlogId").unwrap(), Value::Int(2));
    assert!(blog.collection("Posts").unwrap().is_empty());
    assert_eq!(other.collection("Posts").unwrap().len(), 1);
    let events_first = detected(&recorder);
    let after_first = states(&tracker, &[&blog, &post, &other]);

    tracker.detect_changes().unwrap();
    assert_eq!(states(&tracker, &[&blog, &post, &other]), after_first);
    assert_eq!(detected(&recorder), events_first);
}

#[test]
fn second_pass_after_collection_add_detects_nothing() {
    let (mut tracker, recorder) = recording_tracker(blog_model(false));
    let (blog, _) = attached_blog_with_post(&mut tracker);
    let added = crate::common::post(tracker.model(), 11, 0);
    blog.add_to("Posts", &added).unwrap();

    tracker.detect_changes().unwrap();
    assert_eq!(tracker.state_of(&added), EntityState::Added);
    assert_eq!(added.get("BlogId").unwrap(), Value::Int(1));
    let events_first = detected(&recorder);

    tracker.detect_changes().unwrap();
    assert_eq!(tracker.state_of(&added), EntityState::Added);
    assert_eq!(detected(&recorder), events_first);
}

#[test]
fn pass_without_mutation_reports_only_start_and_end() {
    let (mut tracker, recorder) = recording_tracker(blog_model(false));
    attached_blog_with_post(&mut tracker);
    recorder.take();

    tracker.detect_changes().unwrap();
    assert_eq!(
        recorder.take(),
        vec![
            DiagnosticEvent::DetectChangesStarting,
            DiagnosticEvent::DetectChangesCompleted
        ]
    );
}

#[test]
fn nan_reading_is_not_a_change() {
    let mut b = ModelBuilder::new();
    b.entity("Reading", |e| {
        e.property("Id", ValueKind::Int);
        e.property("Temp", ValueKind::Float);
        e.property("Samples", ValueKind::Array);
        e.key(&["Id"]);
    });
    let (mut tracker, recorder) = recording_tracker(Arc::new(b.build().unwrap()));
    let reading = tracker.model().create("Reading").unwrap();
    reading.set("Id", 1).unwrap();
    reading.set("Temp", f64::NAN).unwrap();
    reading
        .set("Samples", vec![Value::Float(f64::NAN), Value::Float(2.5)])
        .unwrap();
    tracker.track_graph(&reading, GraphMode::Attach).unwrap();

    tracker.detect_changes().unwrap();
    assert_eq!(tracker.state_of(&reading), EntityState::Unchanged);
    assert_eq!(detected(&recorder), 0);

    reading.set("Temp", 20.5).unwrap();
    tracker.detect_changes().unwrap();
    assert_eq!(tracker.state_of(&reading), EntityState::Modified);
}

// ============================================================================
// Values
// ============================================================================

#[test]
fn detected_values_are_hidden_without_sensitive_logging() {
    let (mut tracker, recorder) = recording_tracker(blog_model(false));
    let (blog, _) = attached_blog_with_post(&mut tracker);
    blog.set("Title", "renamed").unwrap();
    tracker.detect_changes().unwrap();

    let change = recorder
        .events()
        .into_iter()
        .find(|e| matches!(e, DiagnosticEvent::PropertyChangeDetected { .. }))
        .unwrap();
    assert_eq!(
        change,
        DiagnosticEvent::PropertyChangeDetected {
            entity_type: "Blog".to_string(),
            property: "Title".to_string(),
            old_value: None,
            new_value: None,
        }
    );
}

#[test]
fn detected_values_are_shown_with_sensitive_logging() {
    let (mut tracker, recorder) = recording_tracker(blog_model(false));
    tracker.options_mut().sensitive_data_logging = true;
    let (blog, _) = attached_blog_with_post(&mut tracker);
    blog.set("Title", "renamed").unwrap();
    tracker.detect_changes().unwrap();

    assert_eq!(
        recorder.count(|e| matches!(
            e,
            DiagnosticEvent::PropertyChangeDetected {
                new_value: Some(Value::String(s)),
                ..
            } if s == "renamed"
        )),
        1
    );
}

#[test]
fn has_changes_detects_first() {
    let mut tracker = ChangeTracker::new(blog_model(false));
    let (blog, _) = attached_blog_with_post(&mut tracker);
    assert!(!tracker.has_changes().unwrap());
    blog.set("Title", "renamed").unwrap();
    assert!(tracker.has_changes().unwrap());
}
