//! The session: identity map + unit of work + execution.
//!
//! A `Session` tracks instances as shared `Arc<RwLock<_>>` handles,
//! deduplicates them through its identity map, and flushes pending changes
//! through the execution collaborator in foreign-key dependency order.
//!
//! A session is single-owner state: concurrent use of one `Session` from
//! multiple tasks is a precondition violation, not a supported mode.
//! Sequential operations from one task always observe a consistent view.

use crate::ObjectKey;
use crate::identity_map::{IdentityMap, ModelRef};
use crate::unit_of_work::UnitOfWork;
use asupersync::{Cx, Outcome};
use relata_core::{Error, Executor, SessionError, Table, Value};
use relata_query::{FieldRef, InsertManyBuilder, find};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Session lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closed,
}

/// Type-erased view of one tracked handle.
///
/// The closures capture the `Arc` and read the live instance on demand, so
/// the flush always sees current attribute values, not the values at
/// registration time.
struct TrackedSlot {
    key: ObjectKey,
    /// FROM/INTO target, schema-qualified.
    target: String,
    pk_column: &'static str,
    columns: Vec<&'static str>,
    /// Arc allocation address, used to find the slot for a given handle.
    ptr: usize,
    current_row: Box<dyn Fn() -> (Vec<(&'static str, Value)>, Value) + Send + Sync>,
    current_json: Box<dyn Fn() -> Vec<u8> + Send + Sync>,
}

fn make_slot<M: Table + Serialize>(key: ObjectKey, handle: &ModelRef<M>) -> TrackedSlot {
    let info = M::table();
    let row_handle = Arc::clone(handle);
    let json_handle = Arc::clone(handle);
    TrackedSlot {
        key,
        target: info.qualified_name(),
        pk_column: info.primary_key,
        columns: info.column_names(),
        ptr: Arc::as_ptr(handle) as *const () as usize,
        current_row: Box::new(move || {
            let guard = row_handle.read().expect("lock poisoned");
            (guard.to_row(), guard.primary_key_value())
        }),
        current_json: Box::new(move || {
            let guard = json_handle.read().expect("lock poisoned");
            serde_json::to_vec(&*guard).unwrap_or_default()
        }),
    }
}

/// The central unit-of-work manager.
pub struct Session<E: Executor> {
    executor: E,
    identity: IdentityMap,
    uow: UnitOfWork,
    tracked: Vec<TrackedSlot>,
    state: SessionState,
    /// Sequence for keys of not-yet-persisted instances.
    pending_seq: u64,
}

impl<E: Executor> Session<E> {
    /// Create a session around an execution collaborator.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            identity: IdentityMap::new(),
            uow: UnitOfWork::new(),
            tracked: Vec::new(),
            state: SessionState::Active,
            pending_seq: 0,
        }
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The execution collaborator.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The identity map.
    #[must_use]
    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity
    }

    /// The unit of work.
    #[must_use]
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    fn ensure_active(&self) -> Result<(), Error> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Closed => Err(Error::Session(SessionError::Closed)),
        }
    }

    fn slot_for_ptr(&self, ptr: usize) -> Option<&TrackedSlot> {
        self.tracked.iter().find(|s| s.ptr == ptr)
    }

    fn slot_for_key(&self, key: &ObjectKey) -> Option<&TrackedSlot> {
        self.tracked.iter().find(|s| s.key == *key)
    }

    /// Track an instance for persistence.
    ///
    /// If an instance with the same primary key is already identity-mapped,
    /// the existing handle is returned unchanged and nothing is
    /// re-registered - the passed instance is discarded. Otherwise the
    /// instance enters the identity map (when its key is known) and is
    /// registered as pending INSERT.
    pub fn add<M: Table + Serialize>(&mut self, instance: M) -> Result<ModelRef<M>, Error> {
        self.ensure_active()?;
        self.uow.register_table::<M>();

        let info = M::table();
        let pk = instance.primary_key_value();

        let (key, handle) = if pk.is_null() {
            // No key yet: identity comes from a session-scoped sequence.
            let key = ObjectKey::pending(info.table_name, self.pending_seq);
            self.pending_seq += 1;
            (key, Arc::new(RwLock::new(instance)))
        } else {
            if let Some(existing) = self.identity.get::<M>(&pk) {
                tracing::trace!(table = info.table_name, "add hit identity map");
                return Ok(existing);
            }
            let key = IdentityMap::key_for::<M>(&pk);
            (key, self.identity.insert_with_key(key, instance))
        };

        self.uow.register_new(key, info.table_name);
        self.tracked.push(make_slot(key, &handle));
        Ok(handle)
    }

    /// Mark a tracked instance for deletion on the next flush.
    pub fn delete<M: Table + Serialize>(&mut self, handle: &ModelRef<M>) -> Result<(), Error> {
        self.ensure_active()?;
        self.uow.register_table::<M>();

        let info = M::table();
        let ptr = Arc::as_ptr(handle) as *const () as usize;
        let key = match self.slot_for_ptr(ptr) {
            Some(slot) => slot.key,
            None => {
                // Detached instance: key it by primary key and start
                // tracking so the flush can address the row.
                let pk = handle.read().expect("lock poisoned").primary_key_value();
                let key = IdentityMap::key_for::<M>(&pk);
                self.tracked.push(make_slot(key, handle));
                key
            }
        };

        self.uow.register_deleted(key, info.table_name);
        Ok(())
    }

    /// Detach an instance from the session without marking it deleted.
    ///
    /// The handle leaves the identity map and all pending/dirty tracking;
    /// the caller keeps the instance itself.
    pub fn expunge<M: Table>(&mut self, handle: &ModelRef<M>) -> Result<(), Error> {
        self.ensure_active()?;

        let ptr = Arc::as_ptr(handle) as *const () as usize;
        let key = match self.slot_for_ptr(ptr) {
            Some(slot) => slot.key,
            None => {
                let pk = handle.read().expect("lock poisoned").primary_key_value();
                IdentityMap::key_for::<M>(&pk)
            }
        };

        self.identity.remove_key(&key);
        self.uow.forget(&key);
        self.uow.tracker_mut().clear_snapshot(&key);
        self.tracked.retain(|s| s.key != key);
        Ok(())
    }

    /// Detach everything: clears the identity map and the unit of work.
    pub fn expunge_all(&mut self) -> Result<(), Error> {
        self.ensure_active()?;
        self.identity.clear();
        self.uow.clear_all();
        self.tracked.clear();
        Ok(())
    }

    /// True for a pending-INSERT instance or one whose tracked columns
    /// changed since its snapshot.
    #[must_use]
    pub fn is_modified<M: Table>(&self, handle: &ModelRef<M>) -> bool {
        let ptr = Arc::as_ptr(handle) as *const () as usize;
        let Some(slot) = self.slot_for_ptr(ptr) else {
            return false;
        };
        if self.uow.contains_new(&slot.key) {
            return true;
        }
        self.uow
            .tracker()
            .has_snapshot(&slot.key)
            .then(|| (slot.current_json)())
            .is_some_and(|json| self.uow.tracker().is_dirty_raw(&slot.key, &json))
    }

    /// Fetch by primary key, deduplicated through the identity map.
    ///
    /// An identity-map hit returns the existing handle without touching the
    /// executor.
    pub async fn get<M: Table + Serialize>(
        &mut self,
        cx: &Cx,
        pk: impl Into<Value>,
    ) -> Outcome<Option<ModelRef<M>>, Error> {
        if let Err(e) = self.ensure_active() {
            return Outcome::Err(e);
        }
        self.uow.register_table::<M>();

        let pk = pk.into();
        if pk.is_null() {
            return Outcome::Ok(None);
        }
        if let Some(existing) = self.identity.get::<M>(&pk) {
            tracing::trace!(table = M::table().table_name, "get hit identity map");
            return Outcome::Ok(Some(existing));
        }

        let info = M::table();
        let pk_field = FieldRef::new(info.table_name, info.primary_key);
        let fetched = find::<M>()
            .filter(pk_field.eq(pk.clone()))
            .first(cx, &self.executor)
            .await;

        match fetched {
            Outcome::Ok(Some(instance)) => Outcome::Ok(Some(self.track_loaded(instance))),
            Outcome::Ok(None) => Outcome::Ok(None),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Track a freshly hydrated instance as clean (no pending operation).
    ///
    /// Used for rows coming back from queries; the instance enters the
    /// identity map and gets a dirty-tracking baseline.
    pub fn track_loaded<M: Table + Serialize>(&mut self, instance: M) -> ModelRef<M> {
        self.uow.register_table::<M>();
        let pk = instance.primary_key_value();
        let key = IdentityMap::key_for::<M>(&pk);

        if self.identity.contains_key(&key) {
            // Existing entry wins; the fresh hydration is discarded.
            return self.identity.insert_with_key(key, instance);
        }

        let snapshot = serde_json::to_vec(&instance).unwrap_or_default();
        let handle = self.identity.insert_with_key(key, instance);
        self.uow.tracker_mut().take_snapshot_raw(key, snapshot);
        self.tracked.push(make_slot(key, &handle));
        handle
    }

    /// Bulk-insert rows outside identity tracking.
    ///
    /// An empty input performs zero queries and reports zero affected rows.
    pub async fn insert_many<M: Table>(&mut self, cx: &Cx, rows: &[M]) -> Outcome<u64, Error> {
        if let Err(e) = self.ensure_active() {
            return Outcome::Err(e);
        }
        if rows.is_empty() {
            return Outcome::Ok(0);
        }
        InsertManyBuilder::new(rows).execute(cx, &self.executor).await
    }

    /// Flush pending changes: inserts in dependency order, then dirty
    /// updates, then deletes in reverse dependency order.
    ///
    /// On error or cancellation the pending sets are left intact so the
    /// caller can retry or roll back.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn flush(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if let Err(e) = self.ensure_active() {
            return Outcome::Err(e);
        }

        let inserts = match self.uow.insert_order() {
            Ok(order) => order,
            Err(e) => return Outcome::Err(e.into()),
        };
        let deletes = match self.uow.delete_order() {
            Ok(order) => order,
            Err(e) => return Outcome::Err(e.into()),
        };

        tracing::debug!(
            inserts = inserts.len(),
            deletes = deletes.len(),
            "flushing pending changes"
        );

        let mut statements: Vec<(String, Vec<Value>)> = Vec::new();

        // INSERTs - skip a Null primary key column so the database assigns it.
        for (key, _) in &inserts {
            let Some(slot) = self.slot_for_key(key) else {
                continue;
            };
            let (row, _) = (slot.current_row)();
            let fields: Vec<_> = row
                .into_iter()
                .filter(|(name, v)| !(*name == slot.pk_column && v.is_null()))
                .collect();
            let columns: Vec<&str> = fields.iter().map(|(n, _)| *n).collect();
            let placeholders: Vec<String> =
                (1..=fields.len()).map(|i| format!("${}", i)).collect();
            let params: Vec<Value> = fields.into_iter().map(|(_, v)| v).collect();
            statements.push((
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    slot.target,
                    columns.join(", "),
                    placeholders.join(", ")
                ),
                params,
            ));
        }

        // UPDATEs - only instances with a changed snapshot, only changed columns.
        for slot in &self.tracked {
            if self.uow.contains_new(&slot.key) || self.uow.contains_deleted(&slot.key) {
                continue;
            }
            if !self.uow.tracker().has_snapshot(&slot.key) {
                continue;
            }
            let json = (slot.current_json)();
            if !self.uow.tracker().is_dirty_raw(&slot.key, &json) {
                continue;
            }
            let changed = self
                .uow
                .tracker()
                .dirty_fields_raw(&slot.key, &json, &slot.columns);
            if changed.is_empty() {
                continue;
            }

            let (row, pk) = (slot.current_row)();
            if pk.is_null() {
                continue;
            }
            let mut params = Vec::new();
            let set_clauses: Vec<String> = row
                .into_iter()
                .filter(|(name, _)| changed.contains_key(*name))
                .map(|(name, value)| {
                    params.push(value);
                    format!("{} = ${}", name, params.len())
                })
                .collect();
            params.push(pk);
            statements.push((
                format!(
                    "UPDATE {} SET {} WHERE {} = ${}",
                    slot.target,
                    set_clauses.join(", "),
                    slot.pk_column,
                    params.len()
                ),
                params,
            ));
        }

        // DELETEs - a never-persisted row (Null key) is simply discarded.
        for (key, _) in &deletes {
            let Some(slot) = self.slot_for_key(key) else {
                continue;
            };
            let (_, pk) = (slot.current_row)();
            if pk.is_null() {
                continue;
            }
            statements.push((
                format!("DELETE FROM {} WHERE {} = $1", slot.target, slot.pk_column),
                vec![pk],
            ));
        }

        for (sql, params) in &statements {
            tracing::trace!(sql = %sql, "flush statement");
            match self.executor.execute(cx, sql, params).await {
                Outcome::Ok(_) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        // Bookkeeping: deleted entries leave the session entirely; everything
        // else re-baselines at its current state.
        self.uow.clear();
        for (key, _) in &deletes {
            self.identity.remove_key(key);
            self.uow.tracker_mut().clear_snapshot(key);
            self.tracked.retain(|s| s.key != *key);
        }
        let refreshed: Vec<(ObjectKey, Vec<u8>)> = self
            .tracked
            .iter()
            .map(|slot| (slot.key, (slot.current_json)()))
            .collect();
        for (key, json) in refreshed {
            self.uow.tracker_mut().take_snapshot_raw(key, json);
        }

        Outcome::Ok(())
    }

    /// Flush pending changes and finish the logical transaction.
    pub async fn commit(&mut self, cx: &Cx) -> Outcome<(), Error> {
        match self.flush(cx).await {
            Outcome::Ok(()) => {
                tracing::debug!("session committed");
                Outcome::Ok(())
            }
            other => other,
        }
    }

    /// Discard pending operations without touching the database.
    ///
    /// Pending inserts are dropped from tracking; surviving instances are
    /// re-baselined at their current in-memory state.
    pub fn rollback(&mut self) {
        let new_keys: Vec<ObjectKey> = self
            .tracked
            .iter()
            .map(|s| s.key)
            .filter(|k| self.uow.contains_new(k))
            .collect();

        self.uow.clear();
        for key in &new_keys {
            self.identity.remove_key(key);
            self.uow.tracker_mut().clear_snapshot(key);
        }
        self.tracked.retain(|s| !new_keys.contains(&s.key));

        let refreshed: Vec<(ObjectKey, Vec<u8>)> = self
            .tracked
            .iter()
            .map(|slot| (slot.key, (slot.current_json)()))
            .collect();
        for (key, json) in refreshed {
            self.uow.tracker_mut().take_snapshot_raw(key, json);
        }
    }

    /// Close the session. Terminal: every later tracking operation fails
    /// with a "session is closed" error.
    pub fn close(&mut self) {
        self.identity.clear();
        self.uow.clear_all();
        self.tracked.clear();
        self.state = SessionState::Closed;
    }
}
