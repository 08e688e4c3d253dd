//! Context Pool Tests
//!
//! A returned context comes back empty: no tracked entities, no handlers
//! and the database's config.

use crate::common::*;
use changetrack::QueryTrackingBehavior;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn rented_context_does_not_see_previous_subscribers() {
    let db = Database::new(cat_model());
    let pool = db.pool(2);
    let calls = Arc::new(AtomicUsize::new(0));

    {
        let mut ctx = pool.rent();
        let counter = calls.clone();
        ctx.change_tracker().on_tracked(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        ctx.add(&cat(db.model(), 1, "Tom")).unwrap();
    }
    assert_eq!(pool.idle_count(), 1);

    let mut ctx = pool.rent();
    assert_eq!(pool.idle_count(), 0);
    assert!(ctx.tracker().is_empty());
    assert_eq!(ctx.tracker().handler_count(), 0);
    ctx.add(&cat(db.model(), 2, "Felix")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn rented_context_starts_from_database_config() {
    let config = ContextConfig::default().with_cascade_delete_timing(CascadeTiming::OnSaveChanges);
    let db = Database::with_config(cat_model(), config.clone());
    let pool = db.pool(1);

    {
        let mut ctx = pool.rent();
        ctx.set_query_tracking(QueryTrackingBehavior::NoTracking);
        ctx.change_tracker().options_mut().sensitive_data_logging = true;
    }

    let ctx = pool.rent();
    assert_eq!(ctx.config(), &config);
    assert_eq!(ctx.tracker().options(), &config.tracking);
}

#[test]
fn clear_keeps_subscribers_but_return_drops_them() {
    let db = Database::new(cat_model());
    let pool = db.pool(1);

    {
        let mut ctx = pool.rent();
        ctx.change_tracker().on_state_changed(|_| {});
        ctx.add(&cat(db.model(), 1, "Tom")).unwrap();
        ctx.change_tracker().clear();
        assert!(ctx.tracker().is_empty());
        assert_eq!(ctx.tracker().handler_count(), 1);
    }

    let ctx = pool.rent();
    assert_eq!(ctx.tracker().handler_count(), 0);
}

#[test]
fn separate_contexts_do_not_share_events() {
    let db = Database::new(cat_model());
    let pool = db.pool(4);
    let first_calls = Arc::new(AtomicUsize::new(0));

    let mut first = pool.rent();
    let mut second = pool.rent();
    let counter = first_calls.clone();
    first.change_tracker().on_tracked(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    second.add(&cat(db.model(), 1, "Tom")).unwrap();
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    first.add(&cat(db.model(), 1, "Tom")).unwrap();
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_rentals_commit_independently() {
    let db = Database::new(cat_model());
    let pool = db.pool(4);

    std::thread::scope(|s| {
        for t in 0..4i64 {
            let pool = &pool;
            let db = &db;
            s.spawn(move || {
                for i in 0..10 {
                    let mut ctx = pool.rent();
                    ctx.add(&cat(db.model(), t * 100 + i, "Cat")).unwrap();
                    assert_eq!(ctx.save_changes().unwrap(), 1);
                }
            });
        }
    });

    assert_eq!(db.store().row_count("Cat"), 40);
    assert!(pool.idle_count() <= pool.max_retained());
}
