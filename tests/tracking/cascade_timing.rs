//! Cascade Timing Tests
//!
//! Each way of severing a post from its blog, under each orphan timing,
//! for required (cascading) and optional (nulling) relationships. Deleting
//! the blog is covered under each cascade timing. `cascade_changes()`
//! always produces the immediate outcome.

use crate::common::*;

#[derive(Debug, Clone, Copy)]
enum Sever {
    /// `post.Blog = null`, then detection
    Navigation,
    /// `blog.Posts.Remove(post)`, then detection
    CollectionRemove,
    /// `Entry(post).Property("BlogId").CurrentValue = null`
    CurrentValue,
    /// `post.BlogId = null`, then detection (nullable keys only)
    DirectProperty,
    /// Values copied from a disconnected instance (nullable keys only)
    SetValues,
}

const TIMINGS: [CascadeTiming; 3] = [
    CascadeTiming::Immediate,
    CascadeTiming::OnSaveChanges,
    CascadeTiming::Never,
];

fn sever(tracker: &mut ChangeTracker, blog: &Entity, post: &Entity, style: Sever) {
    match style {
        Sever::Navigation => {
            post.set_reference("Blog", None).unwrap();
            tracker.detect_changes().unwrap();
        }
        Sever::CollectionRemove => {
            assert!(blog.remove_from("Posts", post).unwrap());
            tracker.detect_changes().unwrap();
        }
        Sever::CurrentValue => {
            tracker
                .entry(post)
                .unwrap()
                .property("BlogId")
                .unwrap()
                .set_current_value(Value::Null)
                .unwrap();
        }
        Sever::DirectProperty => {
            post.set("BlogId", Value::Null).unwrap();
            tracker.detect_changes().unwrap();
        }
        Sever::SetValues => {
            let disconnected = tracker.model().create("Post").unwrap();
            disconnected.set("Id", 10).unwrap();
            disconnected.set("BlogId", Value::Null).unwrap();
            tracker
                .entry(post)
                .unwrap()
                .current_values()
                .set_values_from(&disconnected)
                .unwrap();
        }
    }
}

// ============================================================================
// Severing
// ============================================================================

#[test]
fn severed_required_dependent_follows_orphan_timing() {
    for style in [Sever::Navigation, Sever::CollectionRemove, Sever::CurrentValue] {
        for timing in TIMINGS {
            let mut tracker =
                tracker_with_timing(blog_model(true), CascadeTiming::Immediate, timing);
            let (blog, post) = attached_blog_with_post(&mut tracker);
            sever(&mut tracker, &blog, &post, style);

            let case = format!("{:?} under {}", style, timing);
            match timing {
                CascadeTiming::Immediate => {
                    assert_eq!(tracker.state_of(&post), EntityState::Deleted, "{}", case);
                }
                CascadeTiming::OnSaveChanges => {
                    assert_eq!(tracker.state_of(&post), EntityState::Modified, "{}", case);
                    tracker.run_cascade_pass(false).unwrap();
                    assert_eq!(tracker.state_of(&post), EntityState::Deleted, "{}", case);
                }
                CascadeTiming::Never => {
                    assert_eq!(tracker.state_of(&post), EntityState::Modified, "{}", case);
                    let err = tracker.run_cascade_pass(false).unwrap_err();
                    assert!(
                        matches!(err, Error::RelationshipConceptualNull { .. }),
                        "{}",
                        case
                    );
                }
            }
            assert_eq!(tracker.state_of(&blog), EntityState::Unchanged, "{}", case);
            assert!(blog.collection("Posts").unwrap().is_empty(), "{}", case);
        }
    }
}

#[test]
fn cascade_changes_forces_orphan_deletion() {
    for style in [Sever::Navigation, Sever::CollectionRemove, Sever::CurrentValue] {
        for timing in [CascadeTiming::OnSaveChanges, CascadeTiming::Never] {
            let mut tracker =
                tracker_with_timing(blog_model(true), CascadeTiming::Immediate, timing);
            let (blog, post) = attached_blog_with_post(&mut tracker);
            sever(&mut tracker, &blog, &post, style);

            tracker.cascade_changes().unwrap();
            assert_eq!(
                tracker.state_of(&post),
                EntityState::Deleted,
                "{:?} under {}",
                style,
                timing
            );
            assert_eq!(tracker.options().delete_orphans_timing, timing);
        }
    }
}

#[test]
fn severed_optional_dependent_is_nulled_under_every_timing() {
    let styles = [
        Sever::Navigation,
        Sever::CollectionRemove,
        Sever::CurrentValue,
        Sever::DirectProperty,
        Sever::SetValues,
    ];
    for style in styles {
        for timing in TIMINGS {
            let mut tracker =
                tracker_with_timing(blog_model(false), CascadeTiming::Immediate, timing);
            let (blog, post) = attached_blog_with_post(&mut tracker);
            sever(&mut tracker, &blog, &post, style);
            tracker.cascade_changes().unwrap();

            let case = format!("{:?} under {}", style, timing);
            assert_eq!(tracker.state_of(&post), EntityState::Modified, "{}", case);
            assert!(post.get("BlogId").unwrap().is_null(), "{}", case);
            assert!(post.reference("Blog").unwrap().is_none(), "{}", case);
            assert!(blog.collection("Posts").unwrap().is_empty(), "{}", case);
        }
    }
}

// ============================================================================
// Deleting the principal
// ============================================================================

#[test]
fn deleted_principal_cascades_per_timing() {
    for timing in TIMINGS {
        let mut tracker =
            tracker_with_timing(blog_model(true), timing, CascadeTiming::Immediate);
        let (blog, post) = attached_blog_with_post(&mut tracker);
        tracker.entry(&blog).unwrap().set_state(EntityState::Deleted).unwrap();

        match timing {
            CascadeTiming::Immediate => {
                assert_eq!(tracker.state_of(&post), EntityState::Deleted);
            }
            CascadeTiming::OnSaveChanges => {
                assert_eq!(tracker.state_of(&post), EntityState::Unchanged);
                tracker.run_cascade_pass(false).unwrap();
                assert_eq!(tracker.state_of(&post), EntityState::Deleted);
            }
            CascadeTiming::Never => {
                assert_eq!(tracker.state_of(&post), EntityState::Unchanged);
                let err = tracker.run_cascade_pass(false).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::PersistencePrecondition);
            }
        }
    }
}

#[test]
fn cascade_changes_forces_cascade_without_changing_options() {
    for timing in [CascadeTiming::OnSaveChanges, CascadeTiming::Never] {
        let mut tracker =
            tracker_with_timing(blog_model(true), timing, CascadeTiming::Immediate);
        let (blog, post) = attached_blog_with_post(&mut tracker);
        tracker.entry(&blog).unwrap().set_state(EntityState::Deleted).unwrap();

        tracker.cascade_changes().unwrap();
        assert_eq!(tracker.state_of(&post), EntityState::Deleted, "{}", timing);
        assert_eq!(tracker.options().cascade_delete_timing, timing);
    }
}

#[test]
fn deleted_principal_nulls_optional_dependents() {
    for timing in TIMINGS {
        let mut tracker =
            tracker_with_timing(blog_model(false), timing, CascadeTiming::Immediate);
        let (blog, post) = attached_blog_with_post(&mut tracker);
        tracker.entry(&blog).unwrap().set_state(EntityState::Deleted).unwrap();
        tracker.cascade_changes().unwrap();

        assert_eq!(tracker.state_of(&post), EntityState::Modified, "{}", timing);
        assert!(post.get("BlogId").unwrap().is_null(), "{}", timing);
    }
}

#[test]
fn cascade_is_transitive_and_reported() {
    let mut b = ModelBuilder::new();
    for name in ["Forum", "Thread", "Reply"] {
        b.entity(name, |e| {
            e.property("Id", ValueKind::Int);
            e.property("ParentId", ValueKind::Int);
            e.key(&["Id"]);
        });
    }
    b.relationship(
        Relationship::new("Thread", "Forum")
            .foreign_key(&["ParentId"])
            .principal_navigation("Threads")
            .required(),
    );
    b.relationship(
        Relationship::new("Reply", "Thread")
            .foreign_key(&["ParentId"])
            .principal_navigation("Replies")
            .required(),
    );
    let (mut tracker, recorder) = recording_tracker(std::sync::Arc::new(b.build().unwrap()));
    let model = tracker.model().clone();
    let make = |name: &str, id: i64, parent: i64| {
        let e = model.create(name).unwrap();
        e.set("Id", id).unwrap();
        e.set("ParentId", parent).unwrap();
        e
    };
    let forum = make("Forum", 1, 0);
    let thread = make("Thread", 2, 1);
    let reply = make("Reply", 3, 2);
    for e in [&forum, &thread, &reply] {
        tracker.track_graph(e, GraphMode::Attach).unwrap();
    }

    tracker.entry(&forum).unwrap().set_state(EntityState::Deleted).unwrap();
    assert_eq!(tracker.state_of(&thread), EntityState::Deleted);
    assert_eq!(tracker.state_of(&reply), EntityState::Deleted);
    assert_eq!(
        recorder.count(|e| matches!(e, DiagnosticEvent::CascadeDelete { .. })),
        2
    );
}
