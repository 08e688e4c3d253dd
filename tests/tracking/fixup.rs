//! Relationship Fixup and Identity Tests

use crate::common::*;
use std::sync::Arc;

fn passport_model() -> Arc<Model> {
    let mut b = ModelBuilder::new();
    b.entity("Person", |e| {
        e.property("Id", ValueKind::Int);
        e.key(&["Id"]);
    });
    b.entity("Passport", |e| {
        e.property("Number", ValueKind::String);
        e.property("PersonId", ValueKind::Int).nullable();
        e.key(&["Number"]);
    });
    b.relationship(
        Relationship::new("Passport", "Person")
            .foreign_key(&["PersonId"])
            .dependent_navigation("Person")
            .principal_navigation("Passport")
            .unique()
            .optional(),
    );
    Arc::new(b.build().unwrap())
}

fn owned_model() -> Arc<Model> {
    let mut b = ModelBuilder::new();
    b.entity("Order", |e| {
        e.property("Id", ValueKind::Int);
        e.key(&["Id"]);
    });
    b.entity("Address", |e| {
        e.property("OrderId", ValueKind::Int);
        e.property("Street", ValueKind::String).nullable();
        e.key(&["OrderId"]);
    });
    b.relationship(
        Relationship::new("Address", "Order")
            .foreign_key(&["OrderId"])
            .dependent_navigation("Order")
            .principal_navigation("ShippingAddress")
            .unique()
            .ownership(),
    );
    Arc::new(b.build().unwrap())
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn root_key_collision_is_rejected_without_side_effects() {
    let mut tracker = ChangeTracker::new(cat_model());
    let tom = cat(tracker.model(), 1, "Tom");
    let twin = cat(tracker.model(), 1, "Twin");
    tracker.track_graph(&tom, GraphMode::Attach).unwrap();

    let err = tracker.track_graph(&twin, GraphMode::Attach).unwrap_err();
    assert!(matches!(err, Error::IdentityConflict { .. }));
    assert_eq!(err.kind(), ErrorKind::GraphConsistency);
    assert_eq!(tracker.state_of(&twin), EntityState::Detached);
    assert_eq!(tracker.len(), 1);
}

#[test]
fn navigation_target_with_tracked_key_is_resolved() {
    let mut tracker = ChangeTracker::new(blog_model(false));
    let tracked = blog(tracker.model(), 1);
    tracker.track_graph(&tracked, GraphMode::Attach).unwrap();

    let copy = blog(tracker.model(), 1);
    let post = post(tracker.model(), 10, 1);
    post.set_reference("Blog", Some(&copy)).unwrap();
    tracker.track_graph(&post, GraphMode::Add).unwrap();

    assert!(post.reference("Blog").unwrap().unwrap().ptr_eq(&tracked));
    assert_eq!(tracker.state_of(&copy), EntityState::Detached);
    assert_eq!(tracked.collection("Posts").unwrap().len(), 1);
    assert_eq!(tracker.len(), 2);
}

#[test]
fn clear_resets_identity_not_data() {
    let mut tracker = ChangeTracker::new(cat_model());
    tracker.on_tracked(|_| {});
    let tom = cat(tracker.model(), 1, "Tom");
    tracker.track_graph(&tom, GraphMode::Attach).unwrap();
    tom.set("Name", "Felix").unwrap();

    tracker.clear();
    assert!(tracker.is_empty());
    assert_eq!(tracker.state_of(&tom), EntityState::Detached);
    assert_eq!(tom.get("Name").unwrap(), Value::from("Felix"));
    assert_eq!(tracker.handler_count(), 1);

    let again = cat(tracker.model(), 1, "Tom");
    tracker.track_graph(&again, GraphMode::Attach).unwrap();
    assert!(tracker
        .find_tracked("Cat", &KeyValue::single(1))
        .unwrap()
        .unwrap()
        .ptr_eq(&again));
}

// ============================================================================
// Navigations
// ============================================================================

#[test]
fn instance_reached_through_navigation_is_added() {
    let mut tracker = ChangeTracker::new(blog_model(false));
    let (_, post) = attached_blog_with_post(&mut tracker);
    let fresh = blog(tracker.model(), 5);

    tracker
        .entry(&post)
        .unwrap()
        .reference("Blog")
        .unwrap()
        .set_current_value(Some(&fresh))
        .unwrap();
    assert_eq!(tracker.state_of(&fresh), EntityState::Added);
    assert_eq!(post.get("BlogId").unwrap(), Value::Int(5));
    assert_eq!(tracker.state_of(&post), EntityState::Modified);
    assert!(fresh.collection("Posts").unwrap()[0].ptr_eq(&post));
}

#[test]
fn new_one_to_one_dependent_severs_the_previous_one() {
    let mut tracker = ChangeTracker::new(passport_model());
    let model = tracker.model().clone();
    let person = model.create("Person").unwrap();
    person.set("Id", 1).unwrap();
    let old = model.create("Passport").unwrap();
    old.set("Number", "A").unwrap();
    old.set("PersonId", 1).unwrap();
    tracker.track_graph(&person, GraphMode::Attach).unwrap();
    tracker.track_graph(&old, GraphMode::Attach).unwrap();
    assert!(person.reference("Passport").unwrap().unwrap().ptr_eq(&old));

    let new = model.create("Passport").unwrap();
    new.set("Number", "B").unwrap();
    tracker
        .entry(&person)
        .unwrap()
        .reference("Passport")
        .unwrap()
        .set_current_value(Some(&new))
        .unwrap();

    assert_eq!(new.get("PersonId").unwrap(), Value::Int(1));
    assert_eq!(tracker.state_of(&new), EntityState::Added);
    assert!(old.get("PersonId").unwrap().is_null());
    assert!(old.reference("Person").unwrap().is_none());
    assert_eq!(tracker.state_of(&old), EntityState::Modified);
}

#[test]
fn detaching_principal_leaves_dependents_alone() {
    let mut tracker = ChangeTracker::new(blog_model(true));
    let (blog, post) = attached_blog_with_post(&mut tracker);

    tracker.entry(&blog).unwrap().set_state(EntityState::Detached).unwrap();
    assert_eq!(tracker.state_of(&post), EntityState::Unchanged);
    assert_eq!(post.get("BlogId").unwrap(), Value::Int(1));
    assert!(post.reference("Blog").unwrap().unwrap().ptr_eq(&blog));
}

#[test]
fn principal_key_change_on_added_entry_propagates() {
    let mut tracker = ChangeTracker::new(blog_model(true));
    let blog = blog(tracker.model(), 1);
    let post = post(tracker.model(), 10, 0);
    blog.add_to("Posts", &post).unwrap();
    tracker.track_graph(&blog, GraphMode::Add).unwrap();
    assert_eq!(post.get("BlogId").unwrap(), Value::Int(1));

    tracker
        .entry(&blog)
        .unwrap()
        .property("Id")
        .unwrap()
        .set_current_value(7)
        .unwrap();
    assert_eq!(post.get("BlogId").unwrap(), Value::Int(7));
    assert!(tracker
        .find_tracked("Blog", &KeyValue::single(7))
        .unwrap()
        .is_some());
}

// ============================================================================
// Ownership
// ============================================================================

#[test]
fn owned_entity_without_owner_cannot_be_saved() {
    let mut tracker = ChangeTracker::new(owned_model());
    let address = tracker.model().create("Address").unwrap();
    address.set("OrderId", 3).unwrap();
    tracker.track_graph(&address, GraphMode::Add).unwrap();

    let err = tracker.check_owned().unwrap_err();
    assert!(matches!(err, Error::SaveOwnedWithoutOwner { .. }));

    let order = tracker.model().create("Order").unwrap();
    order.set("Id", 3).unwrap();
    tracker.track_graph(&order, GraphMode::Attach).unwrap();
    tracker.check_owned().unwrap();
    assert!(order
        .reference("ShippingAddress")
        .unwrap()
        .unwrap()
        .ptr_eq(&address));
}

/// `Person 1 - 1 Address` owned, with `HomeAddress` derived from `Address`
fn owned_hierarchy_model() -> Arc<Model> {
    let mut b = ModelBuilder::new();
    b.entity("Person", |e| {
        e.property("Id", ValueKind::Int);
        e.key(&["Id"]);
    });
    b.entity("Address", |e| {
        e.property("Id", ValueKind::Int);
        e.property("PersonId", ValueKind::Int);
        e.key(&["Id"]);
    });
    b.entity("HomeAddress", |e| {
        e.base("Address");
        e.property("Gate", ValueKind::String).nullable();
    });
    b.relationship(
        Relationship::new("Address", "Person")
            .foreign_key(&["PersonId"])
            .principal_navigation("Address")
            .unique()
            .ownership(),
    );
    Arc::new(b.build().unwrap())
}

#[test]
fn owned_navigation_cannot_resolve_to_other_derived_type() {
    let mut tracker = ChangeTracker::new(owned_hierarchy_model());
    let m = tracker.model().clone();

    let home = m.create("HomeAddress").unwrap();
    home.set("Id", 5).unwrap();
    home.set("PersonId", 2).unwrap();
    tracker.track_graph(&home, GraphMode::Attach).unwrap();

    let person = m.create("Person").unwrap();
    person.set("Id", 1).unwrap();
    tracker.track_graph(&person, GraphMode::Attach).unwrap();

    let address = m.create("Address").unwrap();
    address.set("Id", 5).unwrap();
    address.set("PersonId", 1).unwrap();
    person.set_reference("Address", Some(&address)).unwrap();

    let err = tracker.track_graph(&person, GraphMode::Attach).unwrap_err();
    assert!(matches!(
        err,
        Error::TrackingTypeMismatch { ref runtime_type, ref entity_type }
            if runtime_type == "Address" && entity_type == "HomeAddress"
    ));
    assert_eq!(err.kind(), ErrorKind::GraphConsistency);

    assert!(person.reference("Address").unwrap().unwrap().ptr_eq(&address));
    assert_eq!(tracker.len(), 2);
    assert_eq!(tracker.state_of(&address), EntityState::Detached);
    assert_eq!(tracker.state_of(&person), EntityState::Unchanged);
    assert_eq!(tracker.state_of(&home), EntityState::Unchanged);
    assert_eq!(home.get("PersonId").unwrap(), Value::Int(2));
}
