//! Core tracking types
//!
//! - EntityState: lifecycle state of a tracked entity
//! - CascadeTiming: when cascade effects are applied
//! - KeyValue: composite primary/foreign key value used for identity

use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

// ============================================================================
// EntityState
// ============================================================================

/// State of an entity with respect to the change tracker
///
/// `Detached` is both the state before tracking begins and after it ends;
/// the registry never stores a Detached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    /// Not tracked
    Detached,
    /// Tracked and matching the store
    Unchanged,
    /// Tracked, scheduled for delete
    Deleted,
    /// Tracked, scheduled for update
    Modified,
    /// Tracked, scheduled for insert
    Added,
}

impl EntityState {
    /// All states, in discriminant order
    pub const ALL: [EntityState; 5] = [
        EntityState::Detached,
        EntityState::Unchanged,
        EntityState::Deleted,
        EntityState::Modified,
        EntityState::Added,
    ];

    /// Returns true if the state requires a write at commit
    pub fn has_changes(&self) -> bool {
        matches!(
            self,
            EntityState::Added | EntityState::Modified | EntityState::Deleted
        )
    }

    /// Name as shown in messages and logs
    pub fn name(&self) -> &'static str {
        match self {
            EntityState::Detached => "Detached",
            EntityState::Unchanged => "Unchanged",
            EntityState::Deleted => "Deleted",
            EntityState::Modified => "Modified",
            EntityState::Added => "Added",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for EntityState {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(EntityState::Detached),
            1 => Ok(EntityState::Unchanged),
            2 => Ok(EntityState::Deleted),
            3 => Ok(EntityState::Modified),
            4 => Ok(EntityState::Added),
            other => Err(Error::InvalidEnumValue {
                value: other.to_string(),
                enum_type: "EntityState",
            }),
        }
    }
}

impl From<EntityState> for i32 {
    fn from(state: EntityState) -> i32 {
        match state {
            EntityState::Detached => 0,
            EntityState::Unchanged => 1,
            EntityState::Deleted => 2,
            EntityState::Modified => 3,
            EntityState::Added => 4,
        }
    }
}

// ============================================================================
// CascadeTiming
// ============================================================================

/// When cascade deletes and orphan deletes are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeTiming {
    /// Applied synchronously as part of the triggering mutation
    #[default]
    Immediate,
    /// Deferred until the commit begins
    OnSaveChanges,
    /// Never applied automatically
    Never,
}

impl FromStr for CascadeTiming {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "immediate" => Ok(CascadeTiming::Immediate),
            "on_save_changes" => Ok(CascadeTiming::OnSaveChanges),
            "never" => Ok(CascadeTiming::Never),
            other => Err(Error::InvalidEnumValue {
                value: other.to_string(),
                enum_type: "CascadeTiming",
            }),
        }
    }
}

impl fmt::Display for CascadeTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CascadeTiming::Immediate => "immediate",
            CascadeTiming::OnSaveChanges => "on_save_changes",
            CascadeTiming::Never => "never",
        })
    }
}

// ============================================================================
// KeyValue
// ============================================================================

/// Composite key value
///
/// Equality follows `Value` equality; hashing and ordering are consistent
/// with it for every value that can legally appear in a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValue(SmallVec<[Value; 2]>);

impl KeyValue {
    /// Build a key from its part values, in key-property order
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        KeyValue(values.into_iter().collect())
    }

    /// Single-part key
    pub fn single(value: impl Into<Value>) -> Self {
        let mut parts = SmallVec::new();
        parts.push(value.into());
        KeyValue(parts)
    }

    /// Key parts
    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    /// True if any part is null (such a key identifies nothing)
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in &self.0 {
            v.hash_into(state);
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            return write!(f, "{}", self.0[0]);
        }
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}
