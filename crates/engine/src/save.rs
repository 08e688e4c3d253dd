//! Commit pipeline
//!
//! SaveChanges runs, in order: change detection, one non-forced cascade
//! pass, the owned-entity check, store value generation, the unknown-key
//! check, batch application and finally acceptance of the tracked state.
//! Every check runs before the batch is applied, so a failed precondition
//! writes nothing.

use changetrack_core::{EntityState, Result, Value, ValueKind};
use changetrack_storage::{InMemoryStore, WriteBatch};
use changetrack_tracking::{ChangeTracker, DiagnosticEvent, PendingChange};
use tracing::{debug, info, warn};

fn store_value(kind: ValueKind, n: i64) -> Value {
    match kind {
        ValueKind::String => Value::String(n.to_string()),
        ValueKind::Float => Value::Float(n as f64),
        _ => Value::Int(n),
    }
}

/// Build the write batch for the pending changes
pub(crate) fn build_batch(changes: &[PendingChange]) -> WriteBatch {
    let mut batch = WriteBatch::new();
    for change in changes {
        let table = change.entity_type.name();
        match change.state {
            EntityState::Added => {
                batch.insert(table, change.key.clone(), change.values.clone());
            }
            EntityState::Modified => {
                let columns = change
                    .modified
                    .iter()
                    .map(|&p| (p, change.values[p].clone()))
                    .collect();
                batch.update(table, change.key.clone(), columns);
            }
            EntityState::Deleted => {
                batch.delete(table, change.key.clone());
            }
            EntityState::Unchanged | EntityState::Detached => {}
        }
    }
    batch
}

/// Replace every temporary store-generated value with the next store value
fn assign_store_values(tracker: &mut ChangeTracker, store: &InMemoryStore) -> Result<()> {
    for (entity, property) in tracker.store_generated_properties() {
        let ty = entity.entity_type().clone();
        let n = store.next_value(ty.name(), property);
        let value = store_value(ty.property(property).kind(), n);
        debug!(
            target: "changetrack::engine",
            entity_type = %ty.name(),
            property = %ty.property(property).name(),
            "Assigned store-generated value"
        );
        tracker.set_store_generated_value(&entity, property, value)?;
    }
    Ok(())
}

/// Run the pipeline against `store`; returns the number of entities written
pub(crate) fn save_changes(
    tracker: &mut ChangeTracker,
    store: &InMemoryStore,
    accept_all_changes_on_success: bool,
) -> Result<usize> {
    if tracker.options().auto_detect_changes {
        tracker.detect_changes()?;
    }
    tracker.diagnostics().log(&DiagnosticEvent::SaveChangesStarting);

    tracker.run_cascade_pass(false)?;
    tracker.check_owned()?;
    assign_store_values(tracker, store)?;
    tracker.check_unknown_keys()?;

    let changes = tracker.pending_changes();
    if changes.is_empty() {
        debug!(target: "changetrack::engine", "Nothing to save");
        tracker
            .diagnostics()
            .log(&DiagnosticEvent::SaveChangesCompleted { entities_saved: 0 });
        return Ok(0);
    }

    let batch = build_batch(&changes);
    let version = match store.apply(&batch) {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "changetrack::engine", error = %e, "SaveChanges failed");
            return Err(e);
        }
    };

    if accept_all_changes_on_success {
        tracker.accept_all_changes()?;
    }
    let saved = changes.len();
    info!(
        target: "changetrack::engine",
        entities = saved,
        version,
        "SaveChanges completed"
    );
    tracker
        .diagnostics()
        .log(&DiagnosticEvent::SaveChangesCompleted {
            entities_saved: saved,
        });
    Ok(saved)
}
