//! SaveChanges Tests
//!
//! Every precondition is checked before the batch is applied, so a failed
//! save leaves the store untouched.

use crate::common::*;
use changetrack::Context;
use std::sync::Arc;

fn seed_blog_with_post(db: &Arc<Database>) {
    let mut ctx = db.context();
    let model = db.model().clone();
    let blog = blog(&model, 1);
    blog.add_to("Posts", &post(&model, 10, 0)).unwrap();
    ctx.add(&blog).unwrap();
    assert_eq!(ctx.save_changes().unwrap(), 2);
}

fn load_blog_with_post(ctx: &mut Context) -> (Entity, Entity) {
    let blog = ctx.find("Blog", &KeyValue::single(1)).unwrap().unwrap();
    let post = ctx.find("Post", &KeyValue::single(10)).unwrap().unwrap();
    (blog, post)
}

// ============================================================================
// Writes
// ============================================================================

#[test]
fn store_generated_keys_replace_temporaries() {
    let db = Database::new(generated_blog_model());
    let mut ctx = db.context();
    let blog = db.model().create("Blog").unwrap();
    let post = db.model().create("Post").unwrap();
    blog.add_to("Posts", &post).unwrap();
    ctx.add(&blog).unwrap();

    let temporary = blog.get("Id").unwrap();
    assert!(temporary.as_int().unwrap() < 0);
    assert_eq!(post.get("BlogId").unwrap(), temporary);
    assert!(ctx.entry(&blog).unwrap().property("Id").unwrap().is_temporary());

    assert_eq!(ctx.save_changes().unwrap(), 2);
    assert_eq!(blog.get("Id").unwrap(), Value::Int(1));
    assert_eq!(post.get("BlogId").unwrap(), Value::Int(1));
    assert_eq!(post.get("Id").unwrap(), Value::Int(1));
    assert!(!ctx.entry(&blog).unwrap().property("Id").unwrap().is_temporary());

    let store = db.store();
    assert!(store.contains("Blog", &KeyValue::single(1)));
    let row = store.get("Post", &KeyValue::single(1)).unwrap();
    assert_eq!(row[1], Value::Int(1));
    assert_eq!(ctx.tracker().state_of(&blog), EntityState::Unchanged);
    assert_eq!(ctx.tracker().state_of(&post), EntityState::Unchanged);
}

#[test]
fn modified_columns_are_updated() {
    let db = Database::new(blog_model(false));
    seed_blog_with_post(&db);
    let mut ctx = db.context();
    let (blog, _) = load_blog_with_post(&mut ctx);

    blog.set("Title", "renamed").unwrap();
    assert_eq!(ctx.save_changes().unwrap(), 1);
    let row = db.store().get("Blog", &KeyValue::single(1)).unwrap();
    assert_eq!(row[1], Value::from("renamed"));
    assert_eq!(ctx.save_changes().unwrap(), 0);
}

#[test]
fn removed_principal_deletes_dependents_rows() {
    for timing in [CascadeTiming::Immediate, CascadeTiming::OnSaveChanges] {
        let config = ContextConfig::default().with_cascade_delete_timing(timing);
        let db = Database::with_config(blog_model(true), config);
        seed_blog_with_post(&db);
        let mut ctx = db.context();
        let (blog, post) = load_blog_with_post(&mut ctx);

        ctx.remove(&blog).unwrap();
        assert_eq!(ctx.save_changes().unwrap(), 2, "{}", timing);
        assert_eq!(db.store().total_rows(), 0, "{}", timing);
        assert_eq!(ctx.tracker().state_of(&post), EntityState::Detached);
        assert!(ctx.tracker().is_empty());
    }
}

#[test]
fn without_accept_states_survive_and_a_second_save_conflicts() {
    let db = Database::new(cat_model());
    let mut ctx = db.context();
    let tom = cat(db.model(), 1, "Tom");
    ctx.add(&tom).unwrap();

    assert_eq!(ctx.save_changes_with(false).unwrap(), 1);
    assert_eq!(ctx.tracker().state_of(&tom), EntityState::Added);
    let err = ctx.save_changes().unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(db.store().row_count("Cat"), 1);
}

#[tokio::test]
async fn async_save_writes_rows() {
    let db = Database::new(cat_model());
    let mut ctx = db.context();
    ctx.add(&cat(db.model(), 1, "Tom")).unwrap();
    ctx.add(&cat(db.model(), 2, "Felix")).unwrap();

    assert_eq!(ctx.save_changes_async().await.unwrap(), 2);
    assert_eq!(db.store().row_count("Cat"), 2);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn missing_row_fails_the_whole_batch() {
    let db = Database::new(cat_model());
    let mut ctx = db.context();
    let ghost = cat(db.model(), 1, "Ghost");
    ctx.attach(&ghost).unwrap();
    ghost.set("Name", "Still a ghost").unwrap();
    let tom = cat(db.model(), 2, "Tom");
    ctx.add(&tom).unwrap();

    let err = ctx.save_changes().unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict { .. }));
    assert_eq!(err.kind(), ErrorKind::Environment);
    assert_eq!(db.store().total_rows(), 0);
    assert_eq!(ctx.tracker().state_of(&ghost), EntityState::Modified);
    assert_eq!(ctx.tracker().state_of(&tom), EntityState::Added);
}

#[test]
fn unresolved_orphan_fails_before_writing() {
    let config = ContextConfig::default().with_delete_orphans_timing(CascadeTiming::Never);
    let db = Database::with_config(blog_model(true), config);
    seed_blog_with_post(&db);
    let version = db.store().version();

    let mut ctx = db.context();
    let (_, post) = load_blog_with_post(&mut ctx);
    post.set_reference("Blog", None).unwrap();

    let err = ctx.save_changes().unwrap_err();
    assert!(matches!(err, Error::RelationshipConceptualNull { .. }));
    assert_eq!(db.store().version(), version);
    assert_eq!(
        db.store().get("Post", &KeyValue::single(10)).unwrap()[1],
        Value::Int(1)
    );
}

#[test]
fn orphan_deleted_on_save_under_deferred_timing() {
    let config =
        ContextConfig::default().with_delete_orphans_timing(CascadeTiming::OnSaveChanges);
    let db = Database::with_config(blog_model(true), config);
    seed_blog_with_post(&db);

    let mut ctx = db.context();
    let (blog, post) = load_blog_with_post(&mut ctx);
    blog.remove_from("Posts", &post).unwrap();

    assert_eq!(ctx.save_changes().unwrap(), 1);
    assert!(!db.store().contains("Post", &KeyValue::single(10)));
    assert!(db.store().contains("Blog", &KeyValue::single(1)));
}
