//! Identity map: one live instance per `(table, primary key)`.
//!
//! The map hands out `Arc<RwLock<M>>` handles, so two fetches of the same
//! key return the *same* object - a mutation through one handle is visible
//! through every other. Entries are strong references owned by the session;
//! eviction is explicit (`remove`/`clear`), never garbage-collector driven.

use crate::ObjectKey;
use relata_core::{Table, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A shared handle to a tracked instance.
pub type ModelRef<M> = Arc<RwLock<M>>;

/// Type-erased entry; the box holds an `Arc<RwLock<M>>` for some `M`.
struct Entry {
    handle: Box<dyn Any + Send + Sync>,
}

/// Per-session table of live instances keyed by `(table, primary key)`.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<ObjectKey, Entry>,
}

impl IdentityMap {
    /// Create a new empty identity map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert an instance, keyed by its current primary key.
    ///
    /// If an entry already exists for the key, the existing handle wins and
    /// is returned - the passed instance is dropped. Callers must use the
    /// returned handle so two independent fetches of the same row never
    /// diverge.
    pub fn insert<M: Table>(&mut self, instance: M) -> ModelRef<M> {
        let key = ObjectKey::from_pk(M::table().table_name, &instance.primary_key_value());
        self.insert_with_key(key, instance)
    }

    /// Insert under an explicit key (used by the session for instances it
    /// already assigned a key to).
    pub fn insert_with_key<M: Table>(&mut self, key: ObjectKey, instance: M) -> ModelRef<M> {
        if let Some(entry) = self.entries.get(&key) {
            if let Some(existing) = entry.handle.downcast_ref::<ModelRef<M>>() {
                return Arc::clone(existing);
            }
        }

        let handle: ModelRef<M> = Arc::new(RwLock::new(instance));
        self.entries.insert(
            key,
            Entry {
                handle: Box::new(Arc::clone(&handle)),
            },
        );
        handle
    }

    /// Get the handle stored for a primary key, if any.
    #[must_use]
    pub fn get<M: Table>(&self, pk: &Value) -> Option<ModelRef<M>> {
        let key = ObjectKey::from_pk(M::table().table_name, pk);
        let entry = self.entries.get(&key)?;
        let handle = entry.handle.downcast_ref::<ModelRef<M>>()?;
        Some(Arc::clone(handle))
    }

    /// Check whether a primary key is present.
    #[must_use]
    pub fn contains<M: Table>(&self, pk: &Value) -> bool {
        let key = ObjectKey::from_pk(M::table().table_name, pk);
        self.entries.contains_key(&key)
    }

    /// Check whether an exact key is present.
    #[must_use]
    pub fn contains_key(&self, key: &ObjectKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Evict an entry by primary key. Returns true if something was removed.
    pub fn remove<M: Table>(&mut self, pk: &Value) -> bool {
        let key = ObjectKey::from_pk(M::table().table_name, pk);
        self.entries.remove(&key).is_some()
    }

    /// Evict an entry by exact key.
    pub fn remove_key(&mut self, key: &ObjectKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Evict everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the key an instance of `M` would be stored under.
    #[must_use]
    pub fn key_for<M: Table>(pk: &Value) -> ObjectKey {
        ObjectKey::from_pk(M::table().table_name, pk)
    }
}
