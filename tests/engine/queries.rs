//! Query and Find Tests

use crate::common::*;
use changetrack::{
    AsyncValueGenerator, EntityType, GeneratedValue, Property, QueryTrackingBehavior,
};
use std::sync::Arc;

fn seeded_cats() -> Arc<Database> {
    let db = Database::new(cat_model());
    let mut ctx = db.context();
    ctx.add(&cat(db.model(), 1, "Tom")).unwrap();
    ctx.add(&cat(db.model(), 2, "Felix")).unwrap();
    ctx.save_changes().unwrap();
    db
}

// ============================================================================
// Find
// ============================================================================

#[test]
fn find_tracks_loaded_rows_once() {
    let db = seeded_cats();
    let mut ctx = db.context();

    let tom = ctx.find("Cat", &KeyValue::single(1)).unwrap().unwrap();
    assert_eq!(ctx.tracker().state_of(&tom), EntityState::Unchanged);
    assert_eq!(tom.get("Name").unwrap(), Value::from("Tom"));

    let again = ctx.find("Cat", &KeyValue::single(1)).unwrap().unwrap();
    assert!(again.ptr_eq(&tom));
    assert!(ctx.find("Cat", &KeyValue::single(99)).unwrap().is_none());
    assert_eq!(ctx.tracker().len(), 1);
}

#[test]
fn find_rejects_unknown_and_keyless_types() {
    let db = seeded_cats();
    let mut ctx = db.context();

    let err = ctx.find("Dog", &KeyValue::single(1)).unwrap_err();
    assert!(matches!(err, Error::EntityTypeNotFound { .. }));
    let err = ctx.find("Sighting", &KeyValue::single(1)).unwrap_err();
    assert!(matches!(err, Error::InvalidSetKeylessOperation { .. }));
}

#[test]
fn loaded_rows_are_fixed_up() {
    let db = Database::new(blog_model(false));
    let mut seed = db.context();
    let model = db.model().clone();
    let blog = blog(&model, 1);
    blog.add_to("Posts", &post(&model, 10, 0)).unwrap();
    blog.add_to("Posts", &post(&model, 11, 0)).unwrap();
    seed.add(&blog).unwrap();
    seed.save_changes().unwrap();

    let mut ctx = db.context();
    let posts = ctx.query("Post").unwrap();
    let blog = ctx.find("Blog", &KeyValue::single(1)).unwrap().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(blog.collection("Posts").unwrap().len(), 2);
    for post in &posts {
        assert!(post.reference("Blog").unwrap().unwrap().ptr_eq(&blog));
    }
    assert!(!ctx.change_tracker().has_changes().unwrap());
}

// ============================================================================
// Query tracking behavior
// ============================================================================

#[test]
fn tracking_query_reuses_tracked_instances() {
    let db = seeded_cats();
    let mut ctx = db.context();
    let tom = ctx.find("Cat", &KeyValue::single(1)).unwrap().unwrap();
    tom.set("Name", "Edited").unwrap();

    let cats = ctx.query("Cat").unwrap();
    assert_eq!(cats.len(), 2);
    assert!(cats.iter().any(|c| c.ptr_eq(&tom)));
    assert_eq!(tom.get("Name").unwrap(), Value::from("Edited"));
    assert_eq!(ctx.tracker().len(), 2);
}

#[test]
fn no_tracking_query_returns_fresh_instances() {
    let db = seeded_cats();
    let mut ctx = db.context();
    ctx.set_query_tracking(QueryTrackingBehavior::NoTracking);

    let first = ctx.query("Cat").unwrap();
    let second = ctx.query("Cat").unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|a| second.iter().all(|b| !a.ptr_eq(b))));
    assert!(ctx.tracker().is_empty());
    assert_eq!(ctx.tracker().state_of(&first[0]), EntityState::Detached);
}

#[test]
fn identity_resolution_query_stays_untracked() {
    let db = seeded_cats();
    let mut ctx = db.context();
    ctx.set_query_tracking(QueryTrackingBehavior::NoTrackingWithIdentityResolution);

    let cats = ctx.query("Cat").unwrap();
    assert_eq!(cats.len(), 2);
    assert!(!cats[0].ptr_eq(&cats[1]));
    assert!(ctx.tracker().is_empty());
}

// ============================================================================
// Async key generation
// ============================================================================

struct FixedBlock(i64);

impl AsyncValueGenerator for FixedBlock {
    fn next_async<'a>(
        &'a self,
        _entity_type: &'a EntityType,
        _property: &'a Property,
    ) -> GeneratedValue<'a> {
        let value = self.0;
        Box::pin(async move { Ok(Value::Int(value)) })
    }
}

#[tokio::test]
async fn async_add_uses_registered_generator() {
    let db = Database::new(product_chain_model());
    let product_type = db.model().find_entity_type("Product").unwrap().clone();
    db.generators()
        .register_async(product_type.id(), 0, Arc::new(FixedBlock(100)));

    let mut ctx = db.context();
    let product = db.model().create("Product").unwrap();
    let details = db.model().create("ProductDetails").unwrap();
    product.set_reference("Details", Some(&details)).unwrap();
    ctx.add_async(&product).await.unwrap();

    assert_eq!(product.get("Id").unwrap(), Value::Int(100));
    assert_eq!(details.get("Id").unwrap(), Value::Int(100));
    assert_eq!(ctx.tracker().state_of(&details), EntityState::Added);
    assert!(!ctx
        .entry(&product)
        .unwrap()
        .property("Id")
        .unwrap()
        .is_temporary());
}
