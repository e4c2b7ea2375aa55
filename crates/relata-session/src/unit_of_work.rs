//! Unit of Work: pending-change sets and flush ordering.
//!
//! The unit of work records which tracked objects are pending INSERT or
//! DELETE, owns the change tracker used for dirty detection, and decides
//! the order tables flush in based on their foreign-key dependencies.

use crate::dirty::ChangeTracker;
use crate::ObjectKey;
use relata_core::{Error, Table};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Error type for unit-of-work operations.
#[derive(Debug, Clone)]
pub enum UowError {
    /// A foreign-key dependency cycle was detected between tables.
    CycleDetected {
        /// Tables involved in the cycle.
        tables: Vec<&'static str>,
    },
}

impl std::fmt::Display for UowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UowError::CycleDetected { tables } => {
                write!(f, "dependency cycle detected: {}", tables.join(" -> "))
            }
        }
    }
}

impl std::error::Error for UowError {}

impl From<UowError> for Error {
    fn from(e: UowError) -> Self {
        Error::Custom(e.to_string())
    }
}

/// Count of pending operations by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    /// Objects pending INSERT.
    pub new: usize,
    /// Objects pending DELETE.
    pub deleted: usize,
}

impl PendingCounts {
    /// Total pending operations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.new + self.deleted
    }

    /// Check if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new == 0 && self.deleted == 0
    }
}

/// Pending-change sets for one session.
#[derive(Default)]
pub struct UnitOfWork {
    /// Keys pending INSERT, in registration order.
    new_objects: Vec<(ObjectKey, &'static str)>,
    /// Keys pending DELETE, in registration order.
    deleted_objects: Vec<(ObjectKey, &'static str)>,
    /// Change tracker for dirty detection.
    tracker: ChangeTracker,
    /// Tables seen so far (for ordering and cycle detection).
    tables: HashSet<&'static str>,
    /// Table -> tables it references through foreign keys.
    table_deps: HashMap<&'static str, Vec<&'static str>>,
}

impl UnitOfWork {
    /// Create a new empty unit of work.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table type for dependency-based flush ordering.
    pub fn register_table<M: Table>(&mut self) {
        let info = M::table();
        if self.tables.insert(info.table_name) {
            self.table_deps
                .insert(info.table_name, info.referenced_tables());
        }
    }

    /// Add a key to the pending-insert set.
    ///
    /// Idempotent: registering the same key twice keeps one entry.
    pub fn register_new(&mut self, key: ObjectKey, table: &'static str) {
        if !self.contains_new(&key) {
            self.new_objects.push((key, table));
        }
    }

    /// Add a key to the pending-delete set.
    ///
    /// A key still in the pending-insert set is removed from it; the key is
    /// recorded as deleted either way. The flush plan later discards
    /// deletes whose row was never persisted.
    pub fn register_deleted(&mut self, key: ObjectKey, table: &'static str) {
        self.new_objects.retain(|(k, _)| *k != key);
        if !self.contains_deleted(&key) {
            self.deleted_objects.push((key, table));
        }
    }

    /// Start dirty-tracking an instance without queuing any operation.
    pub fn register_clean<M: Table + Serialize>(&mut self, key: ObjectKey, instance: &M) {
        self.tracker.take_snapshot(key, instance);
    }

    /// Check pending-insert membership.
    #[must_use]
    pub fn contains_new(&self, key: &ObjectKey) -> bool {
        self.new_objects.iter().any(|(k, _)| k == key)
    }

    /// Check pending-delete membership.
    #[must_use]
    pub fn contains_deleted(&self, key: &ObjectKey) -> bool {
        self.deleted_objects.iter().any(|(k, _)| k == key)
    }

    /// True iff either pending set is non-empty.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.new_objects.is_empty() || !self.deleted_objects.is_empty()
    }

    /// Counts of pending operations.
    #[must_use]
    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts {
            new: self.new_objects.len(),
            deleted: self.deleted_objects.len(),
        }
    }

    /// Drop a key from both pending sets (used by expunge).
    pub fn forget(&mut self, key: &ObjectKey) {
        self.new_objects.retain(|(k, _)| k != key);
        self.deleted_objects.retain(|(k, _)| k != key);
    }

    /// Reset both pending sets. Called after a successful flush or on
    /// rollback; dirty-tracking snapshots are managed separately.
    pub fn clear(&mut self) {
        self.new_objects.clear();
        self.deleted_objects.clear();
    }

    /// Reset both pending sets and all dirty-tracking state.
    pub fn clear_all(&mut self) {
        self.clear();
        self.tracker.clear_all();
    }

    /// The change tracker.
    #[must_use]
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// The change tracker, mutably.
    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    // ==================== Flush ordering ====================

    /// Pending inserts, referenced tables first.
    pub fn insert_order(&self) -> Result<Vec<(ObjectKey, &'static str)>, UowError> {
        let ranks = self.table_ranks()?;
        let mut ordered = self.new_objects.clone();
        ordered.sort_by_key(|(_, table)| ranks.get(table).copied().unwrap_or(usize::MAX));
        Ok(ordered)
    }

    /// Pending deletes, referencing tables first (reverse of insert order).
    pub fn delete_order(&self) -> Result<Vec<(ObjectKey, &'static str)>, UowError> {
        let ranks = self.table_ranks()?;
        let mut ordered = self.deleted_objects.clone();
        ordered.sort_by_key(|(_, table)| {
            std::cmp::Reverse(ranks.get(table).copied().unwrap_or(usize::MAX))
        });
        Ok(ordered)
    }

    /// Check the registered tables for foreign-key cycles.
    pub fn check_cycles(&self) -> Result<(), UowError> {
        self.table_ranks().map(|_| ())
    }

    /// Topological ranks over registered tables: a table ranks after every
    /// table it references.
    fn table_ranks(&self) -> Result<HashMap<&'static str, usize>, UowError> {
        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();
        let mut order = Vec::new();

        let mut tables: Vec<&'static str> = self.tables.iter().copied().collect();
        tables.sort_unstable();

        for table in tables {
            if !visited.contains(table) {
                self.visit(table, &mut visited, &mut in_stack, &mut order)?;
            }
        }

        Ok(order
            .into_iter()
            .enumerate()
            .map(|(rank, table)| (table, rank))
            .collect())
    }

    fn visit(
        &self,
        table: &'static str,
        visited: &mut HashSet<&'static str>,
        in_stack: &mut HashSet<&'static str>,
        order: &mut Vec<&'static str>,
    ) -> Result<(), UowError> {
        visited.insert(table);
        in_stack.insert(table);

        if let Some(deps) = self.table_deps.get(table) {
            for dep in deps {
                if !self.tables.contains(dep) {
                    continue;
                }
                if in_stack.contains(dep) {
                    return Err(UowError::CycleDetected {
                        tables: vec![table, dep],
                    });
                }
                if !visited.contains(dep) {
                    self.visit(dep, visited, in_stack, order)?;
                }
            }
        }

        in_stack.remove(table);
        order.push(table);
        Ok(())
    }
}
