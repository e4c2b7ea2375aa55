//! Snapshot-based change tracking.
//!
//! A snapshot is the JSON serialization of an instance at a reference
//! point. Dirty detection compares the current serialization against the
//! stored bytes; field-level diffs compare the parsed documents column by
//! column.

use crate::ObjectKey;
use relata_core::Table;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Serialized state of one instance at a reference point.
#[derive(Debug)]
pub struct Snapshot {
    data: Vec<u8>,
}

impl Snapshot {
    /// Create a snapshot from serialized bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// The raw snapshot bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Tracks per-instance snapshots for dirty detection.
#[derive(Default)]
pub struct ChangeTracker {
    snapshots: HashMap<ObjectKey, Snapshot>,
}

impl ChangeTracker {
    /// Create a new empty change tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: HashMap::new(),
        }
    }

    /// Record the instance's current column values as the baseline.
    #[tracing::instrument(level = "trace", skip(self, instance))]
    pub fn take_snapshot<M: Table + Serialize>(&mut self, key: ObjectKey, instance: &M) {
        let data = serde_json::to_vec(instance).unwrap_or_default();
        tracing::trace!(
            table = key.table(),
            snapshot_bytes = data.len(),
            "taking snapshot"
        );
        self.snapshots.insert(key, Snapshot::new(data));
    }

    /// Record a baseline from pre-serialized bytes.
    pub fn take_snapshot_raw(&mut self, key: ObjectKey, data: Vec<u8>) {
        self.snapshots.insert(key, Snapshot::new(data));
    }

    /// True iff any tracked column differs from the snapshot.
    ///
    /// An instance without a snapshot is treated as dirty.
    #[must_use]
    pub fn is_dirty<M: Table + Serialize>(&self, key: &ObjectKey, instance: &M) -> bool {
        let current = serde_json::to_vec(instance).unwrap_or_default();
        self.is_dirty_raw(key, &current)
    }

    /// Raw-bytes variant of [`ChangeTracker::is_dirty`].
    #[must_use]
    pub fn is_dirty_raw(&self, key: &ObjectKey, current: &[u8]) -> bool {
        match self.snapshots.get(key) {
            Some(snapshot) => current != snapshot.data,
            None => true,
        }
    }

    /// The changed columns as `{column: (old, new)}`, only for fields whose
    /// value differs from the snapshot.
    #[must_use]
    pub fn dirty_fields<M: Table + Serialize>(
        &self,
        key: &ObjectKey,
        instance: &M,
    ) -> BTreeMap<String, (serde_json::Value, serde_json::Value)> {
        let current = serde_json::to_vec(instance).unwrap_or_default();
        let columns = M::table().column_names();
        self.dirty_fields_raw(key, &current, &columns)
    }

    /// Raw-bytes variant of [`ChangeTracker::dirty_fields`].
    #[must_use]
    pub fn dirty_fields_raw(
        &self,
        key: &ObjectKey,
        current: &[u8],
        columns: &[&'static str],
    ) -> BTreeMap<String, (serde_json::Value, serde_json::Value)> {
        let original: serde_json::Value = self
            .snapshots
            .get(key)
            .and_then(|s| serde_json::from_slice(s.data()).ok())
            .unwrap_or(serde_json::Value::Null);
        let current: serde_json::Value =
            serde_json::from_slice(current).unwrap_or(serde_json::Value::Null);

        let mut changed = BTreeMap::new();
        for column in columns {
            let old = original.get(column).cloned().unwrap_or(serde_json::Value::Null);
            let new = current.get(column).cloned().unwrap_or(serde_json::Value::Null);
            if old != new {
                changed.insert((*column).to_string(), (old, new));
            }
        }
        changed
    }

    /// Re-baseline to the instance's current state. Clears dirty state
    /// without any persistence side effect.
    pub fn refresh_snapshot<M: Table + Serialize>(&mut self, key: ObjectKey, instance: &M) {
        self.take_snapshot(key, instance);
    }

    /// Drop tracking for one instance entirely.
    pub fn clear_snapshot(&mut self, key: &ObjectKey) {
        self.snapshots.remove(key);
    }

    /// Drop all tracking state.
    pub fn clear_all(&mut self) {
        self.snapshots.clear();
    }

    /// Whether a snapshot exists for the key.
    #[must_use]
    pub fn has_snapshot(&self, key: &ObjectKey) -> bool {
        self.snapshots.contains_key(key)
    }

    /// Number of tracked snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relata_core::{Column, Row, TableInfo, Value};
    use serde::{Deserialize, Serialize};
    use std::sync::LazyLock;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
        age: Option<i64>,
    }

    static USERS: LazyLock<TableInfo> = LazyLock::new(|| {
        TableInfo::builder("users")
            .column("id", Column::new().primary_key(true))
            .column("name", Column::new().nullable(false))
            .column("age", Column::new())
            .build()
    });

    impl Table for User {
        fn table() -> &'static TableInfo {
            &USERS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("id", Value::Int(self.id)),
                ("name", Value::Text(self.name.clone())),
                ("age", self.age.map_or(Value::Null, Value::Int)),
            ]
        }

        fn from_row(row: &Row) -> relata_core::Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                name: row.get_named("name")?,
                age: row.get_named("age")?,
            })
        }

        fn primary_key_value(&self) -> Value {
            Value::Int(self.id)
        }
    }

    fn user(id: i64, name: &str, age: Option<i64>) -> User {
        User {
            id,
            name: name.to_string(),
            age,
        }
    }

    fn key(id: i64) -> ObjectKey {
        ObjectKey::from_pk("users", &Value::Int(id))
    }

    #[test]
    fn test_not_dirty_without_mutation() {
        let mut tracker = ChangeTracker::new();
        let u = user(1, "Ada", Some(36));
        tracker.take_snapshot(key(1), &u);

        assert!(!tracker.is_dirty(&key(1), &u));
        assert!(tracker.dirty_fields(&key(1), &u).is_empty());
    }

    #[test]
    fn test_single_field_change_is_exactly_reported() {
        let mut tracker = ChangeTracker::new();
        let original = user(1, "Ada", Some(36));
        tracker.take_snapshot(key(1), &original);

        let mutated = user(1, "Countess", Some(36));
        assert!(tracker.is_dirty(&key(1), &mutated));

        let changed = tracker.dirty_fields(&key(1), &mutated);
        assert_eq!(changed.len(), 1);
        let (old, new) = &changed["name"];
        assert_eq!(old, &serde_json::json!("Ada"));
        assert_eq!(new, &serde_json::json!("Countess"));
    }

    #[test]
    fn test_multiple_field_changes() {
        let mut tracker = ChangeTracker::new();
        let original = user(1, "Ada", Some(36));
        tracker.take_snapshot(key(1), &original);

        let mutated = user(1, "Grace", None);
        let changed = tracker.dirty_fields(&key(1), &mutated);
        assert!(changed.contains_key("name"));
        assert!(changed.contains_key("age"));
        assert!(!changed.contains_key("id"));
    }

    #[test]
    fn test_null_transition_reported() {
        let mut tracker = ChangeTracker::new();
        let original = user(1, "Ada", None);
        tracker.take_snapshot(key(1), &original);

        let mutated = user(1, "Ada", Some(40));
        let (old, new) = &tracker.dirty_fields(&key(1), &mutated)["age"];
        assert_eq!(old, &serde_json::Value::Null);
        assert_eq!(new, &serde_json::json!(40));
    }

    #[test]
    fn test_untracked_instance_is_dirty() {
        let tracker = ChangeTracker::new();
        assert!(tracker.is_dirty(&key(1), &user(1, "Ada", None)));
    }

    #[test]
    fn test_refresh_snapshot_rebaselines() {
        let mut tracker = ChangeTracker::new();
        let original = user(1, "Ada", Some(36));
        tracker.take_snapshot(key(1), &original);

        let mutated = user(1, "Countess", Some(36));
        assert!(tracker.is_dirty(&key(1), &mutated));

        tracker.refresh_snapshot(key(1), &mutated);
        assert!(!tracker.is_dirty(&key(1), &mutated));
    }

    #[test]
    fn test_clear_snapshot_drops_tracking() {
        let mut tracker = ChangeTracker::new();
        let u = user(1, "Ada", None);
        tracker.take_snapshot(key(1), &u);
        assert!(tracker.has_snapshot(&key(1)));

        tracker.clear_snapshot(&key(1));
        assert!(!tracker.has_snapshot(&key(1)));
        // Back to untracked semantics.
        assert!(tracker.is_dirty(&key(1), &u));
    }

    #[test]
    fn test_clear_all() {
        let mut tracker = ChangeTracker::new();
        tracker.take_snapshot(key(1), &user(1, "Ada", None));
        tracker.take_snapshot(key(2), &user(2, "Grace", None));
        assert_eq!(tracker.len(), 2);

        tracker.clear_all();
        assert!(tracker.is_empty());
    }
}
