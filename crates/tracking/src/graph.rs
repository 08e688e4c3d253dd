//! Graph traversal and key generation
//!
//! Add, Attach and Update walk the graph reachable from a root in
//! pre-order. Each untracked instance is either tracked or, when its key
//! is set and already tracked, replaced by the tracked instance in the
//! referring navigation (identity resolution).

use crate::diagnostics::DiagnosticEvent;
use crate::entry::{EntryId, InternalEntry};
use crate::tracker::{ChangeTracker, StateOptions};
use changetrack_core::{
    Entity, EntityState, Error, KeyValue, NavigationValue, Property, Result, Value, ValueGeneration,
};
use tracing::debug;

/// Which state a graph operation assigns
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphMode {
    /// Everything untracked becomes Added
    Add,
    /// Unchanged when the key is set, Added otherwise
    Attach,
    /// Modified when the key is set, Added otherwise
    Update,
}

impl GraphMode {
    fn state_for(self, key_set: bool) -> EntityState {
        match (self, key_set) {
            (GraphMode::Add, _) | (_, false) => EntityState::Added,
            (GraphMode::Attach, true) => EntityState::Unchanged,
            (GraphMode::Update, true) => EntityState::Modified,
        }
    }
}

type Generated = (usize, Value, bool);

impl ChangeTracker {
    // ========================================================================
    // Graph traversal
    // ========================================================================

    /// Track `root` and every untracked instance reachable from it
    pub fn track_graph(&mut self, root: &Entity, mode: GraphMode) -> Result<()> {
        self.ensure_keyed(root.entity_type())?;
        let state = mode.state_for(self.is_key_set(root));
        self.set_state_of(root, state, StateOptions::default())?;

        let mut stack = Vec::new();
        push_children(root, &mut stack);
        while let Some((referrer, nav, target)) = stack.pop() {
            if self.id_of(&target).is_some() {
                continue;
            }
            self.ensure_keyed(target.entity_type())?;
            let linked = match self.resolve_identity(&referrer, nav, &target)? {
                Some(existing) => Some(existing),
                None => {
                    let state = mode.state_for(self.is_key_set(&target));
                    let id = self.set_state_of(&target, state, StateOptions::default())?;
                    push_children(&target, &mut stack);
                    id
                }
            };
            if let (Some(rid), Some(tid)) = (self.id_of(&referrer), linked) {
                self.fixup_navigation_link(rid, nav, tid)?;
            }
        }
        Ok(())
    }

    /// Like [`track_graph`](Self::track_graph), generating the root's keys
    /// with registered async generators first
    pub async fn track_graph_async(&mut self, root: &Entity, mode: GraphMode) -> Result<()> {
        if self.id_of(root).is_none() && mode.state_for(self.is_key_set(root)) == EntityState::Added {
            let ty = root.entity_type().clone();
            let mut values = Vec::new();
            for p in ty.properties() {
                if !self.needs_generation(ty.id(), p) || unset_value(root, p) != p.sentinel() {
                    continue;
                }
                let Some((source_type, source_prop)) =
                    self.model.generation_source(ty.id(), p.index())
                else {
                    continue;
                };
                let Some(generator) = self.generators.async_generator_for(source_type, source_prop)
                else {
                    continue;
                };
                let source = self.model.entity_type(source_type).clone();
                let value = generator
                    .next_async(&source, source.property(source_prop))
                    .await?;
                let temporary = generator.generates_temporary_values()
                    || p.value_generation() != ValueGeneration::Sequential;
                values.push((p.index(), value, temporary));
            }
            if !values.is_empty() {
                self.pregenerated.insert(root.instance_id(), values);
            }
        }
        let result = self.track_graph(root, mode);
        self.pregenerated.remove(&root.instance_id());
        result
    }

    /// Track an instance reached through a navigation of a tracked entry
    pub(crate) fn track_reachable(
        &mut self,
        referrer: EntryId,
        nav: usize,
        target: &Entity,
    ) -> Result<Option<EntryId>> {
        if let Some(id) = self.id_of(target) {
            return Ok(Some(id));
        }
        self.ensure_keyed(target.entity_type())?;
        let referrer_entity = self.arena[referrer].entity.clone();
        if let Some(existing) = self.resolve_identity(&referrer_entity, nav, target)? {
            return Ok(Some(existing));
        }
        self.track_graph(target, GraphMode::Add)?;
        Ok(self.id_of(target))
    }

    /// Replace `target` in the referrer's navigation with the tracked
    /// instance holding the same key, if there is one
    fn resolve_identity(
        &mut self,
        referrer: &Entity,
        nav: usize,
        target: &Entity,
    ) -> Result<Option<EntryId>> {
        if !self.is_key_set(target) {
            return Ok(None);
        }
        let ty = target.entity_type().clone();
        let Some(pk) = ty.primary_key() else {
            return Ok(None);
        };
        let key = KeyValue::new(pk.iter().map(|&p| unset_value(target, ty.property(p))));
        if key.has_null() {
            return Ok(None);
        }
        let Some(existing) = self.find_by_key(ty.root_type(), &key) else {
            return Ok(None);
        };
        let existing_entity = self.arena[existing].entity.clone();

        let referrer_type = referrer.entity_type().clone();
        let navigation = referrer_type.navigation(nav);
        let fk = self.model.foreign_key(navigation.foreign_key());
        if fk.is_ownership() && existing_entity.entity_type().id() != ty.id() {
            return Err(Error::TrackingTypeMismatch {
                runtime_type: ty.name().to_string(),
                entity_type: existing_entity.type_name().to_string(),
            });
        }

        if navigation.is_collection() {
            referrer.store_collection_remove(nav, target);
            referrer.store_collection_add(nav, &existing_entity);
        } else {
            referrer.store_reference_at(nav, Some(existing_entity.clone()));
        }
        if let Some(rid) = self.id_of(referrer) {
            let snapshot = &mut self.arena[rid].relationships;
            if navigation.is_collection() {
                snapshot.collection_remove(nav, target);
                snapshot.collection_add(nav, &existing_entity);
            } else {
                snapshot.set_reference(nav, Some(existing_entity.clone()));
            }
        }
        if let Some(list) = self.pending_referrers.get_mut(&target.instance_id()) {
            list.retain(|(r, n)| !(r.ptr_eq(referrer) && *n == nav));
            if list.is_empty() {
                self.pending_referrers.remove(&target.instance_id());
            }
        }
        debug!(
            target: "changetrack::tracking",
            entity_type = %ty.name(),
            navigation = %navigation.name(),
            "Resolved navigation target to tracked instance"
        );
        Ok(Some(existing))
    }

    // ========================================================================
    // Keys
    // ========================================================================

    /// True if every store-generated key property holds a non-sentinel value
    pub fn is_key_set(&self, entity: &Entity) -> bool {
        let ty = entity.entity_type();
        let Some(pk) = ty.primary_key() else {
            return false;
        };
        let entry = self.id_of(entity).map(|id| &self.arena[id]);
        pk.iter().all(|&p| {
            let prop = ty.property(p);
            if !self.model.is_store_generated(ty.id(), p) {
                return true;
            }
            let value = match entry {
                Some(e) => e.value(p),
                None => unset_value(entity, prop),
            };
            value != prop.sentinel()
        })
    }

    fn needs_generation(&self, entity_type: usize, property: &Property) -> bool {
        property.value_generation() != ValueGeneration::None
            || (property.is_primary_key()
                && self.model.is_store_generated(entity_type, property.index()))
    }

    /// Copy keys from tracked principals into a dependent about to be added
    pub(crate) fn propagate_from_principals(&self, entry: &mut InternalEntry) {
        let ty = entry.entity_type.clone();
        let instance = entry.entity.instance_id();
        for &fk_id in ty.foreign_keys() {
            let fk = self.model.foreign_key(fk_id);
            let via_navigation = fk
                .dependent_to_principal()
                .and_then(|n| entry.entity.reference_at(n))
                .and_then(|t| self.id_of(&t));
            let principal = via_navigation.or_else(|| {
                self.pending_referrers.get(&instance)?.iter().find_map(|(referrer, nav)| {
                    let rid = self.id_of(referrer)?;
                    let navigation = self.arena[rid].entity_type.navigation(*nav);
                    (!navigation.is_on_dependent() && navigation.foreign_key() == fk_id)
                        .then_some(rid)
                })
            });
            if let Some(pid) = principal {
                let p = &self.arena[pid];
                for (i, &dp) in fk.properties().iter().enumerate() {
                    let pk = fk.principal_key()[i];
                    entry.write(dp, p.value(pk));
                    entry.flags[dp].temporary = p.flags[pk].temporary;
                }
            }
        }
    }

    fn plan_generation(&self, entry: &InternalEntry, pregenerated: &[Generated]) -> Vec<Generated> {
        let ty = &entry.entity_type;
        let mut plan = Vec::new();
        for p in ty.properties() {
            let index = p.index();
            if !self.needs_generation(ty.id(), p) || entry.value(index) != p.sentinel() {
                continue;
            }
            if let Some(pre) = pregenerated.iter().find(|(i, _, _)| *i == index) {
                plan.push(pre.clone());
                continue;
            }
            let Some((source_type, source_prop)) = self.model.generation_source(ty.id(), index)
            else {
                continue;
            };
            let source = self.model.entity_type(source_type);
            let source_property = source.property(source_prop);
            let Some(generator) = self.generators.generator_for(source, source_property) else {
                continue;
            };
            let value = generator.next(source, source_property);
            // Values borrowed from a principal's generator are placeholders
            let temporary = generator.generates_temporary_values()
                || p.value_generation() != ValueGeneration::Sequential;
            plan.push((index, value, temporary));
        }
        plan
    }

    fn log_generated(&self, entry: &InternalEntry, plan: &[Generated]) {
        for (p, value, temporary) in plan {
            self.log(DiagnosticEvent::ValueGenerated {
                entity_type: entry.entity_type.name().to_string(),
                property: entry.entity_type.property(*p).name().to_string(),
                value: self.sensitive_value(value),
                temporary: *temporary,
            });
        }
    }

    /// Generate values for an entry that is not yet in the arena
    pub(crate) fn generate_values(&mut self, entry: &mut InternalEntry) {
        let pre = self
            .pregenerated
            .remove(&entry.entity.instance_id())
            .unwrap_or_default();
        let plan = self.plan_generation(entry, &pre);
        self.log_generated(entry, &plan);
        apply(entry, plan);
    }

    /// Generate values for a tracked entry re-entering Added
    pub(crate) fn generate_values_for(&mut self, id: EntryId) {
        let instance = self.arena[id].entity.instance_id();
        let pre = self.pregenerated.remove(&instance).unwrap_or_default();
        let plan = self.plan_generation(&self.arena[id], &pre);
        self.log_generated(&self.arena[id], &plan);
        apply(&mut self.arena[id], plan);
    }
}

fn apply(entry: &mut InternalEntry, plan: Vec<Generated>) {
    for (p, value, temporary) in plan {
        entry.write(p, value);
        entry.flags[p].temporary = temporary;
    }
}

/// Value of an untracked instance; shadow slots hold the sentinel
fn unset_value(entity: &Entity, property: &Property) -> Value {
    if property.is_shadow() {
        property.sentinel()
    } else {
        entity.value_at(property.index())
    }
}

fn push_children(entity: &Entity, stack: &mut Vec<(Entity, usize, Entity)>) {
    let ty = entity.entity_type();
    for nav in ty.navigations().iter().rev() {
        match entity.navigation_at(nav.index()) {
            NavigationValue::Reference(Some(target)) => {
                stack.push((entity.clone(), nav.index(), target));
            }
            NavigationValue::Reference(None) => {}
            NavigationValue::Collection(items) => {
                for target in items.into_iter().rev() {
                    stack.push((entity.clone(), nav.index(), target));
                }
            }
        }
    }
}
