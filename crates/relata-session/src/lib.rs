//! Session and unit-of-work layer for Relata.
//!
//! This crate coordinates object identity, change tracking, and pending
//! persistence operations:
//!
//! - **Identity map**: one live instance per `(table, primary key)`.
//! - **Change tracker**: snapshot-based dirty detection.
//! - **Unit of work**: pending insert/delete sets and flush ordering.
//! - **Session**: owns all three plus the execution collaborator.
//! - **Loader**: per-instance lazy relationship resolution through the
//!   session's identity map.
//!
//! # Design
//!
//! - No autoflush: changes persist on an explicit `flush`/`commit`.
//! - The identity map and unit of work are exclusively owned by one
//!   `Session`; the execution collaborator is borrowed, never pooled here.
//! - All async operations are cancel-correct via `Cx` + `Outcome`.

pub mod current;
pub mod dirty;
pub mod identity_map;
pub mod loader;
pub mod session;
pub mod unit_of_work;

pub use current::{clear_current, current, set_current};
pub use dirty::{ChangeTracker, Snapshot};
pub use identity_map::{IdentityMap, ModelRef};
pub use loader::Loader;
pub use session::{Session, SessionState};
pub use unit_of_work::{PendingCounts, UnitOfWork, UowError};

use relata_core::Value;
use std::hash::{Hash, Hasher};

/// Unique key for a tracked object: owning table plus a primary-key hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    table: &'static str,
    pk_hash: u64,
}

impl ObjectKey {
    /// Create a key from a table name and primary key value.
    #[must_use]
    pub fn from_pk(table: &'static str, pk: &Value) -> Self {
        Self {
            table,
            pk_hash: hash_pk(pk),
        }
    }

    /// Create a key for a not-yet-persisted instance.
    ///
    /// New instances have no primary key, so identity comes from a
    /// session-scoped sequence number instead.
    #[must_use]
    pub fn pending(table: &'static str, seq: u64) -> Self {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        0xFEu8.hash(&mut hasher);
        seq.hash(&mut hasher);
        Self {
            table,
            pk_hash: hasher.finish(),
        }
    }

    /// The owning table name.
    #[must_use]
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// The primary key hash.
    #[must_use]
    pub fn pk_hash(&self) -> u64 {
        self.pk_hash
    }
}

/// Hash a primary key value.
#[must_use]
pub fn hash_pk(value: &Value) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    hash_value(value, &mut hasher);
    hasher.finish()
}

/// Hash a single value into the hasher, tagged by variant.
fn hash_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Int(i) => {
            2u8.hash(hasher);
            i.hash(hasher);
        }
        Value::Float(f) => {
            3u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Text(s) => {
            4u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Bytes(b) => {
            5u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Json(j) => {
            6u8.hash(hasher);
            j.to_string().hash(hasher);
        }
        Value::Array(arr) => {
            7u8.hash(hasher);
            arr.len().hash(hasher);
            for item in arr {
                hash_value(item, hasher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_pk_values_hash_equal() {
        let a = ObjectKey::from_pk("users", &Value::Int(1));
        let b = ObjectKey::from_pk("users", &Value::Int(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_tables_differ() {
        let a = ObjectKey::from_pk("users", &Value::Int(1));
        let b = ObjectKey::from_pk("orgs", &Value::Int(1));
        assert_ne!(a, b);
    }

    #[test]
    fn test_variant_tagging_distinguishes_types() {
        // Int(1) and Bool(true) must not collide.
        assert_ne!(hash_pk(&Value::Int(1)), hash_pk(&Value::Bool(true)));
    }

    #[test]
    fn test_pending_keys_are_distinct() {
        let a = ObjectKey::pending("users", 0);
        let b = ObjectKey::pending("users", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_pending_key_differs_from_null_pk() {
        let pending = ObjectKey::pending("users", 0);
        let null_pk = ObjectKey::from_pk("users", &Value::Null);
        assert_ne!(pending, null_pk);
    }
}
