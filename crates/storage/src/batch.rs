//! Write batches
//!
//! A batch is the unit a commit hands to the store: every operation in it
//! is applied or none is.

use changetrack_core::{KeyValue, Value};
use serde::{Deserialize, Serialize};

/// One row-level write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowOperation {
    /// New row; fails if the key exists
    Insert {
        /// Table name
        table: String,
        /// Primary key of the row
        key: KeyValue,
        /// Every column value
        values: Vec<Value>,
    },
    /// Overwrite selected columns of an existing row
    Update {
        /// Table name
        table: String,
        /// Primary key of the row
        key: KeyValue,
        /// (column index, value) pairs
        columns: Vec<(usize, Value)>,
    },
    /// Remove an existing row
    Delete {
        /// Table name
        table: String,
        /// Primary key of the row
        key: KeyValue,
    },
}

impl RowOperation {
    /// Table the operation targets
    pub fn table(&self) -> &str {
        match self {
            RowOperation::Insert { table, .. }
            | RowOperation::Update { table, .. }
            | RowOperation::Delete { table, .. } => table,
        }
    }

    /// Key of the row the operation targets
    pub fn key(&self) -> &KeyValue {
        match self {
            RowOperation::Insert { key, .. }
            | RowOperation::Update { key, .. }
            | RowOperation::Delete { key, .. } => key,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            RowOperation::Insert { .. } => "insert",
            RowOperation::Update { .. } => "update",
            RowOperation::Delete { .. } => "delete",
        }
    }
}

/// Ordered set of row operations applied atomically
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    operations: Vec<RowOperation>,
}

impl WriteBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an insert
    pub fn insert(&mut self, table: impl Into<String>, key: KeyValue, values: Vec<Value>) {
        self.operations.push(RowOperation::Insert {
            table: table.into(),
            key,
            values,
        });
    }

    /// Append an update
    pub fn update(&mut self, table: impl Into<String>, key: KeyValue, columns: Vec<(usize, Value)>) {
        self.operations.push(RowOperation::Update {
            table: table.into(),
            key,
            columns,
        });
    }

    /// Append a delete
    pub fn delete(&mut self, table: impl Into<String>, key: KeyValue) {
        self.operations.push(RowOperation::Delete {
            table: table.into(),
            key,
        });
    }

    /// Operations in application order
    pub fn operations(&self) -> &[RowOperation] {
        &self.operations
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True if the batch holds nothing
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
