//! Shared fixtures for the integration suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use changetrack::{
    CascadeTiming, ChangeTracker, ContextConfig, Database, DeleteBehavior, DiagnosticEvent, Entity,
    EntityState, Error, ErrorKind, GraphMode, KeyValue, Model, ModelBuilder, RecordingDiagnostics,
    Relationship, TrackerOptions, Value, ValueGeneration, ValueKind,
};
use std::sync::Arc;

// ============================================================================
// Models
// ============================================================================

/// `Cat { Id, Name }` plus the keyless `Sighting { Place }`
pub fn cat_model() -> Arc<Model> {
    let mut b = ModelBuilder::new();
    b.entity("Cat", |e| {
        e.property("Id", ValueKind::Int);
        e.property("Name", ValueKind::String).nullable();
        e.key(&["Id"]);
    });
    b.entity("Sighting", |e| {
        e.property("Place", ValueKind::String);
    });
    Arc::new(b.build().unwrap())
}

/// `Blog 1 - * Post` through `Post.BlogId`
///
/// A required relationship has a non-nullable foreign key and cascades; an
/// optional one has a nullable key and nulls it.
pub fn blog_model(required: bool) -> Arc<Model> {
    let mut b = ModelBuilder::new();
    b.entity("Blog", |e| {
        e.property("Id", ValueKind::Int);
        e.property("Title", ValueKind::String).nullable();
        e.key(&["Id"]);
    });
    b.entity("Post", |e| {
        e.property("Id", ValueKind::Int);
        let fk = e.property("BlogId", ValueKind::Int);
        if !required {
            fk.nullable();
        }
        e.property("Title", ValueKind::String).nullable();
        e.key(&["Id"]);
    });
    let relationship = Relationship::new("Post", "Blog")
        .foreign_key(&["BlogId"])
        .dependent_navigation("Blog")
        .principal_navigation("Posts");
    b.relationship(if required {
        relationship.required()
    } else {
        relationship.optional()
    });
    Arc::new(b.build().unwrap())
}

/// Chain of identifying one-to-one relationships:
/// `Product -> ProductDetails -> ProductDetailsTag -> ProductDetailsTagDetails`
///
/// Only `Product.Id` is generated; every other key is its principal's key.
pub fn product_chain_model() -> Arc<Model> {
    let mut b = ModelBuilder::new();
    b.entity("Product", |e| {
        e.property("Id", ValueKind::Int)
            .generated(ValueGeneration::Sequential);
        e.property("Name", ValueKind::String).nullable();
        e.key(&["Id"]);
    });
    for name in ["ProductDetails", "ProductDetailsTag", "ProductDetailsTagDetails"] {
        b.entity(name, |e| {
            e.property("Id", ValueKind::Int);
            e.key(&["Id"]);
        });
    }
    b.relationship(
        Relationship::new("ProductDetails", "Product")
            .foreign_key(&["Id"])
            .dependent_navigation("Product")
            .principal_navigation("Details")
            .unique()
            .required(),
    );
    b.relationship(
        Relationship::new("ProductDetailsTag", "ProductDetails")
            .foreign_key(&["Id"])
            .dependent_navigation("Details")
            .principal_navigation("Tag")
            .unique()
            .required(),
    );
    b.relationship(
        Relationship::new("ProductDetailsTagDetails", "ProductDetailsTag")
            .foreign_key(&["Id"])
            .dependent_navigation("Tag")
            .principal_navigation("TagDetails")
            .unique()
            .required(),
    );
    Arc::new(b.build().unwrap())
}

/// `Blog` with a store-generated key, `Post` with a sequential one
pub fn generated_blog_model() -> Arc<Model> {
    let mut b = ModelBuilder::new();
    b.entity("Blog", |e| {
        e.property("Id", ValueKind::Int)
            .generated(ValueGeneration::OnSave);
        e.property("Title", ValueKind::String).nullable();
        e.key(&["Id"]);
    });
    b.entity("Post", |e| {
        e.property("Id", ValueKind::Int)
            .generated(ValueGeneration::Sequential);
        e.property("BlogId", ValueKind::Int);
        e.key(&["Id"]);
    });
    b.relationship(
        Relationship::new("Post", "Blog")
            .foreign_key(&["BlogId"])
            .dependent_navigation("Blog")
            .principal_navigation("Posts")
            .required(),
    );
    Arc::new(b.build().unwrap())
}

// ============================================================================
// Instances
// ============================================================================

pub fn cat(model: &Model, id: i64, name: &str) -> Entity {
    let cat = model.create("Cat").unwrap();
    cat.set("Id", id).unwrap();
    cat.set("Name", name).unwrap();
    cat
}

pub fn blog(model: &Model, id: i64) -> Entity {
    let blog = model.create("Blog").unwrap();
    blog.set("Id", id).unwrap();
    blog
}

pub fn post(model: &Model, id: i64, blog_id: i64) -> Entity {
    let post = model.create("Post").unwrap();
    post.set("Id", id).unwrap();
    post.set("BlogId", blog_id).unwrap();
    post
}

// ============================================================================
// Trackers
// ============================================================================

/// Tracker reporting to a fresh recorder
pub fn recording_tracker(model: Arc<Model>) -> (ChangeTracker, Arc<RecordingDiagnostics>) {
    let mut tracker = ChangeTracker::new(model);
    let recorder = Arc::new(RecordingDiagnostics::new());
    tracker.set_diagnostics(recorder.clone());
    (tracker, recorder)
}

/// Tracker with the given cascade and orphan timings
pub fn tracker_with_timing(
    model: Arc<Model>,
    cascade: CascadeTiming,
    orphans: CascadeTiming,
) -> ChangeTracker {
    let mut tracker = ChangeTracker::new(model);
    tracker.options_mut().cascade_delete_timing = cascade;
    tracker.options_mut().delete_orphans_timing = orphans;
    tracker
}

/// Attach `Blog 1` with `Post 10` and return both
pub fn attached_blog_with_post(tracker: &mut ChangeTracker) -> (Entity, Entity) {
    let model = tracker.model().clone();
    let blog = blog(&model, 1);
    let post = post(&model, 10, 1);
    tracker.track_graph(&blog, GraphMode::Attach).unwrap();
    tracker.track_graph(&post, GraphMode::Attach).unwrap();
    (blog, post)
}
