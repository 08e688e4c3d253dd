//! Key Propagation Tests
//!
//! Keys of an identifying chain come from the root principal's generator.
//! Whatever order the chain members are added in, every member ends up
//! Added with the same positive key.

use crate::common::*;

const CHAIN: [&str; 4] = [
    "Product",
    "ProductDetails",
    "ProductDetailsTag",
    "ProductDetailsTagDetails",
];

/// Chain linked through dependent-to-principal navigations only
fn linked_chain(model: &Model) -> Vec<Entity> {
    let product = model.create("Product").unwrap();
    let details = model.create("ProductDetails").unwrap();
    let tag = model.create("ProductDetailsTag").unwrap();
    let tag_details = model.create("ProductDetailsTagDetails").unwrap();
    details.set_reference("Product", Some(&product)).unwrap();
    tag.set_reference("Details", Some(&details)).unwrap();
    tag_details.set_reference("Tag", Some(&tag)).unwrap();
    vec![product, details, tag, tag_details]
}

fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (i, &first) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, first);
            out.push(tail);
        }
    }
    out
}

fn assert_chain_keys(tracker: &ChangeTracker, chain: &[Entity], order: &[usize]) {
    let key = chain[0].get("Id").unwrap();
    assert!(key.as_int().unwrap() > 0, "order {:?}: key {}", order, key);
    for (name, entity) in CHAIN.iter().zip(chain) {
        assert_eq!(tracker.state_of(entity), EntityState::Added, "order {:?}: {}", order, name);
        assert_eq!(entity.get("Id").unwrap(), key, "order {:?}: {}", order, name);
    }
}

// ============================================================================
// Identifying chain
// ============================================================================

#[test]
fn chain_keys_agree_in_every_add_order() {
    let orders = permutations(&[0, 1, 2, 3]);
    assert_eq!(orders.len(), 24);
    for order in orders {
        let mut tracker = ChangeTracker::new(product_chain_model());
        let chain = linked_chain(tracker.model());
        for &i in &order {
            tracker.track_graph(&chain[i], GraphMode::Add).unwrap();
        }
        assert_chain_keys(&tracker, &chain, &order);
    }
}

#[test]
fn chain_keys_agree_when_members_are_added_unlinked_then_linked() {
    for order in permutations(&[0, 1, 2, 3]) {
        let mut tracker = ChangeTracker::new(product_chain_model());
        let model = tracker.model().clone();
        let chain: Vec<Entity> = CHAIN.iter().map(|n| model.create(n).unwrap()).collect();
        for &i in &order {
            tracker.track_graph(&chain[i], GraphMode::Add).unwrap();
        }
        tracker.entry(&chain[1]).unwrap().reference("Product").unwrap()
            .set_current_value(Some(&chain[0])).unwrap();
        tracker.entry(&chain[2]).unwrap().reference("Details").unwrap()
            .set_current_value(Some(&chain[1])).unwrap();
        tracker.entry(&chain[3]).unwrap().reference("Tag").unwrap()
            .set_current_value(Some(&chain[2])).unwrap();
        assert_chain_keys(&tracker, &chain, &order);
    }
}

#[test]
fn dependent_added_first_borrows_principal_key() {
    let mut tracker = ChangeTracker::new(product_chain_model());
    let chain = linked_chain(tracker.model());
    tracker.track_graph(&chain[1], GraphMode::Add).unwrap();

    assert_eq!(tracker.state_of(&chain[0]), EntityState::Added);
    let product_key = chain[0].get("Id").unwrap();
    assert_eq!(chain[1].get("Id").unwrap(), product_key);

    let mut entry = tracker.entry(&chain[1]).unwrap();
    assert!(!entry.property("Id").unwrap().is_temporary());
}

#[test]
fn keys_are_unique_across_chains() {
    let mut tracker = ChangeTracker::new(product_chain_model());
    let first = linked_chain(tracker.model());
    let second = linked_chain(tracker.model());
    tracker.track_graph(&first[3], GraphMode::Add).unwrap();
    tracker.track_graph(&second[0], GraphMode::Add).unwrap();
    tracker.track_graph(&second[3], GraphMode::Add).unwrap();

    assert_ne!(first[0].get("Id").unwrap(), second[0].get("Id").unwrap());
    assert_eq!(second[3].get("Id").unwrap(), second[0].get("Id").unwrap());
    assert_eq!(tracker.len(), 8);
}
