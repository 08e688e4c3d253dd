//! In-memory row store
//!
//! Tables are kept in a DashMap keyed by table name; rows inside a table
//! live in an FxHashMap keyed by primary key. Batches are validated in
//! full before any row is touched, under a commit lock, so a rejected
//! batch leaves the store unchanged.

use crate::batch::{RowOperation, WriteBatch};
use changetrack_core::{Error, KeyValue, Result, Value};
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::{debug, warn};

/// A stored row
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    /// Column values
    pub values: Vec<Value>,
    /// Store version that last wrote the row
    pub version: u64,
}

/// Rows of one table
#[derive(Debug, Default)]
pub struct Table {
    rows: FxHashMap<KeyValue, StoredRow>,
}

impl Table {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Shared in-memory database
///
/// # Example
///
/// ```ignore
/// use changetrack_storage::{InMemoryStore, WriteBatch};
///
/// let store = InMemoryStore::new();
/// let mut batch = WriteBatch::new();
/// batch.insert("Blog", KeyValue::single(1), vec![Value::Int(1)]);
/// store.apply(&batch)?;
/// ```
pub struct InMemoryStore {
    tables: DashMap<String, Table>,
    sequences: DashMap<(String, usize), AtomicI64>,
    version: AtomicU64,
    commit_lock: Mutex<()>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            sequences: DashMap::new(),
            version: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
        }
    }

    /// Version of the last applied batch
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Next value of the store sequence for a generated column, starting at 1
    pub fn next_value(&self, table: &str, column: usize) -> i64 {
        self.sequences
            .entry((table.to_string(), column))
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::AcqRel)
            + 1
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Row values by key
    pub fn get(&self, table: &str, key: &KeyValue) -> Option<Vec<Value>> {
        self.tables
            .get(table)
            .and_then(|t| t.rows.get(key).map(|r| r.values.clone()))
    }

    /// Row with its version
    pub fn get_row(&self, table: &str, key: &KeyValue) -> Option<StoredRow> {
        self.tables
            .get(table)
            .and_then(|t| t.rows.get(key).cloned())
    }

    /// True if the row exists
    pub fn contains(&self, table: &str, key: &KeyValue) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.rows.contains_key(key))
    }

    /// Every row of a table, ordered by key
    pub fn scan(&self, table: &str) -> Vec<(KeyValue, Vec<Value>)> {
        let mut rows: Vec<_> = self
            .tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .map(|(k, r)| (k.clone(), r.values.clone()))
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.len())
    }

    /// Total rows across tables
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.value().len()).sum()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply a batch atomically and return the new store version
    ///
    /// Fails with [`Error::Storage`] on a duplicate insert and with
    /// [`Error::ConcurrencyConflict`] when an updated or deleted row is
    /// missing. On failure nothing is written.
    pub fn apply(&self, batch: &WriteBatch) -> Result<u64> {
        let _guard = self.commit_lock.lock();
        self.validate(batch)?;

        let version = self.version.load(Ordering::Acquire) + 1;
        for op in batch.operations() {
            let mut table = self.tables.entry(op.table().to_string()).or_default();
            match op {
                RowOperation::Insert { key, values, .. } => {
                    table.rows.insert(
                        key.clone(),
                        StoredRow {
                            values: values.clone(),
                            version,
                        },
                    );
                }
                RowOperation::Update { key, columns, .. } => {
                    if let Some(row) = table.rows.get_mut(key) {
                        for (column, value) in columns {
                            if let Some(slot) = row.values.get_mut(*column) {
                                *slot = value.clone();
                            }
                        }
                        row.version = version;
                    }
                }
                RowOperation::Delete { key, .. } => {
                    table.rows.remove(key);
                }
            }
        }
        self.version.store(version, Ordering::Release);

        debug!(
            target: "changetrack::storage",
            version,
            operations = batch.len(),
            "Applied write batch"
        );
        Ok(version)
    }

    fn validate(&self, batch: &WriteBatch) -> Result<()> {
        // Rows inserted or deleted earlier in the same batch
        let mut inserted: FxHashSet<(&str, &KeyValue)> = FxHashSet::default();
        let mut deleted: FxHashSet<(&str, &KeyValue)> = FxHashSet::default();

        for op in batch.operations() {
            let id = (op.table(), op.key());
            let exists = (self.contains(op.table(), op.key()) || inserted.contains(&id))
                && !deleted.contains(&id);
            match op {
                RowOperation::Insert { .. } if exists => {
                    warn!(
                        target: "changetrack::storage",
                        table = %op.table(),
                        "Rejected duplicate insert"
                    );
                    return Err(Error::Storage(format!(
                        "duplicate key in table '{}'",
                        op.table()
                    )));
                }
                RowOperation::Insert { .. } => {
                    deleted.remove(&id);
                    inserted.insert(id);
                }
                RowOperation::Update { .. } | RowOperation::Delete { .. } if !exists => {
                    warn!(
                        target: "changetrack::storage",
                        table = %op.table(),
                        operation = op.kind(),
                        "Row missing for write"
                    );
                    return Err(Error::ConcurrencyConflict {
                        entity_type: op.table().to_string(),
                        key_values: None,
                    });
                }
                RowOperation::Update { .. } => {}
                RowOperation::Delete { .. } => {
                    inserted.remove(&id);
                    deleted.insert(id);
                }
            }
        }
        Ok(())
    }

    /// Drop every table and sequence
    pub fn clear(&self) {
        let _guard = self.commit_lock.lock();
        self.tables.clear();
        self.sequences.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("tables", &self.tables.len())
            .field("rows", &self.total_rows())
            .field("version", &self.version())
            .finish()
    }
}
