//! Error Surface Tests
//!
//! Messages name the offending type and member; key values appear only
//! with sensitive-data logging.

use crate::common::*;
use changetrack::Context;

#[test]
fn identity_conflict_hides_key_by_default() {
    let mut tracker = ChangeTracker::new(cat_model());
    tracker
        .track_graph(&cat(tracker.model(), 1, "Tom"), GraphMode::Attach)
        .unwrap();
    let err = tracker
        .track_graph(&cat(tracker.model(), 1, "Twin"), GraphMode::Attach)
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("'Cat'"));
    assert!(msg.contains("sensitive-data logging"));
    assert!(!msg.contains("{Id: 1}"));
}

#[test]
fn identity_conflict_shows_key_with_sensitive_logging() {
    let mut tracker = ChangeTracker::new(cat_model());
    tracker.options_mut().sensitive_data_logging = true;
    tracker
        .track_graph(&cat(tracker.model(), 1, "Tom"), GraphMode::Attach)
        .unwrap();
    let err = tracker
        .track_graph(&cat(tracker.model(), 1, "Twin"), GraphMode::Attach)
        .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("'{Id: 1}'"), "{}", msg);
    assert!(!msg.contains("sensitive-data logging"));
}

#[test]
fn conceptual_null_names_both_types() {
    let mut tracker =
        tracker_with_timing(blog_model(true), CascadeTiming::Never, CascadeTiming::Never);
    tracker.options_mut().sensitive_data_logging = true;
    let (blog, post) = attached_blog_with_post(&mut tracker);
    post.set_reference("Blog", None).unwrap();
    tracker.detect_changes().unwrap();
    assert!(blog.collection("Posts").unwrap().is_empty());

    let err = tracker.run_cascade_pass(false).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("'Blog'") && msg.contains("'Post'"), "{}", msg);
    assert!(msg.contains("{Id: 10}"), "{}", msg);
}

// ============================================================================
// Keyless types
// ============================================================================

#[test]
fn keyless_types_cannot_be_tracked() {
    let mut tracker = ChangeTracker::new(cat_model());
    let sighting = tracker.model().create("Sighting").unwrap();
    sighting.set("Place", "garden").unwrap();

    let err = tracker.track(&sighting, EntityState::Added, false).unwrap_err();
    assert!(matches!(err, Error::KeylessTypeTracked { ref entity_type } if entity_type == "Sighting"));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(tracker.is_empty());
}

#[test]
fn context_rejects_keyless_operations() {
    let db = Database::new(cat_model());
    let mut context = Context::new(db);
    let sighting = context.database().model().create("Sighting").unwrap();
    sighting.set("Place", "garden").unwrap();

    for result in [
        context.add(&sighting),
        context.attach(&sighting),
        context.update(&sighting),
        context.remove(&sighting),
    ] {
        assert!(matches!(
            result.unwrap_err(),
            Error::InvalidSetKeylessOperation { .. }
        ));
    }
}

// ============================================================================
// Accessors
// ============================================================================

#[test]
fn unknown_members_are_reported() {
    let mut tracker = ChangeTracker::new(blog_model(false));
    let (blog, _) = attached_blog_with_post(&mut tracker);
    let mut entry = tracker.entry(&blog).unwrap();

    let err = entry.property("Missing").unwrap_err();
    assert!(matches!(err, Error::PropertyNotFound { .. }));
    assert!(err.to_string().contains("'Blog.Missing'"));

    assert!(matches!(
        entry.reference("Missing").unwrap_err(),
        Error::NavigationNotFound { .. }
    ));
    assert!(matches!(
        entry.complex_property("Missing").unwrap_err(),
        Error::ComplexPropertyNotFound { .. }
    ));
}

#[test]
fn navigation_accessor_must_match_multiplicity() {
    let mut tracker = ChangeTracker::new(blog_model(false));
    let (blog, post) = attached_blog_with_post(&mut tracker);

    let err = tracker.entry(&blog).unwrap().reference("Posts").unwrap_err();
    assert!(matches!(err, Error::ReferenceIsCollection { .. }));
    let err = tracker.entry(&post).unwrap().collection("Blog").unwrap_err();
    assert!(matches!(err, Error::CollectionIsReference { .. }));
}

#[test]
fn properties_and_navigations_are_not_interchangeable() {
    let mut tracker = ChangeTracker::new(blog_model(false));
    let (_, post) = attached_blog_with_post(&mut tracker);
    let mut entry = tracker.entry(&post).unwrap();

    assert!(matches!(
        entry.property("Blog").unwrap_err(),
        Error::PropertyIsNavigation { .. }
    ));
    assert!(matches!(
        entry.reference("BlogId").unwrap_err(),
        Error::NavigationIsProperty { .. }
    ));
}

#[test]
fn typed_access_checks_the_property_kind() {
    let mut tracker = ChangeTracker::new(cat_model());
    let tom = cat(tracker.model(), 1, "Tom");
    tracker.track_graph(&tom, GraphMode::Attach).unwrap();
    let mut entry = tracker.entry(&tom).unwrap();

    let name = entry.property("Name").unwrap();
    assert_eq!(name.current_value_as::<String>().unwrap(), Some("Tom".to_string()));
    let err = name.current_value_as::<i64>().unwrap_err();
    assert!(matches!(err, Error::WrongGenericPropertyType { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn tracked_key_cannot_be_marked_modified() {
    let mut tracker = ChangeTracker::new(cat_model());
    let tom = cat(tracker.model(), 1, "Tom");
    tracker.track_graph(&tom, GraphMode::Attach).unwrap();

    let err = tracker
        .entry(&tom)
        .unwrap()
        .property("Id")
        .unwrap()
        .set_is_modified(true)
        .unwrap_err();
    assert!(matches!(err, Error::KeyReadOnly { .. }));
}
