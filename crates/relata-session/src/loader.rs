//! Per-instance lazy relationship loading.
//!
//! A `Loader` is created fresh on every relationship access and wraps the
//! owning instance's foreign-key value plus the declared descriptor.
//! Resolution goes through the session so the related row is deduplicated
//! by the identity map: two loaders pointing at the same target row yield
//! the same handle.

use crate::identity_map::ModelRef;
use crate::session::Session;
use asupersync::{Cx, Outcome};
use relata_core::{Error, Executor, LazyLoadError, LoadStrategy, Relationship, Result, Table, Value};
use serde::Serialize;

/// A lazy-loading handle for one relationship of one instance.
pub struct Loader<T: Table> {
    relationship: Relationship,
    /// Table name of the owning type (for error reporting).
    owner: &'static str,
    /// The raw foreign-key value at creation time.
    fk: Value,
    /// `Some` once a load attempt completed; the inner `None` means
    /// "loaded, no related row".
    loaded: Option<Option<ModelRef<T>>>,
}

impl<T: Table + Serialize> Loader<T> {
    /// Create a loader from a descriptor and a raw foreign-key value.
    #[must_use]
    pub fn new(relationship: Relationship, owner: &'static str, fk: Value) -> Self {
        Self {
            relationship,
            owner,
            fk,
            loaded: None,
        }
    }

    /// Create a loader for the named relationship of an instance.
    ///
    /// The descriptor is looked up on the owning type's table metadata; an
    /// unknown relationship name is a configuration error naming the token.
    pub fn for_instance<M: Table>(instance: &M, name: &str) -> Result<Self> {
        let info = M::table();
        let rel = *info.relationship(name)?;
        let fk = instance
            .column_value(rel.foreign_key_column)
            .unwrap_or(Value::Null);
        Ok(Self::new(rel, info.table_name, fk))
    }

    /// The raw foreign-key value. Zero I/O.
    #[must_use]
    pub fn ref_value(&self) -> &Value {
        &self.fk
    }

    /// The declared descriptor.
    #[must_use]
    pub fn relationship(&self) -> &Relationship {
        &self.relationship
    }

    /// Whether a load attempt has completed (including a null-key load that
    /// resolved to "no related row" without querying).
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// The cached result, if a load completed.
    #[must_use]
    pub fn get(&self) -> Option<ModelRef<T>> {
        self.loaded.clone().flatten()
    }

    /// Resolve the related instance.
    ///
    /// - `raise` strategy: fails without querying; the error names the
    ///   relationship and owning type and suggests eager loading.
    /// - `noload` strategy: resolves to `None` without querying.
    /// - Null foreign key: resolves to `None` without querying - a defined
    ///   outcome, not an error.
    /// - Otherwise: one query by target primary key, deduplicated through
    ///   the session's identity map and cached on this loader. A failed or
    ///   cancelled load leaves `is_loaded` false so a retry re-issues it.
    #[tracing::instrument(level = "debug", skip_all, fields(relationship = self.relationship.name))]
    pub async fn load<E: Executor>(
        &mut self,
        cx: &Cx,
        session: &mut Session<E>,
    ) -> Outcome<Option<ModelRef<T>>, Error> {
        if let Some(cached) = &self.loaded {
            return Outcome::Ok(cached.clone());
        }

        match self.relationship.lazy {
            LoadStrategy::Raise => {
                return Outcome::Err(Error::LazyLoad(LazyLoadError {
                    relationship: self.relationship.name,
                    owner: self.owner,
                }));
            }
            LoadStrategy::NoLoad => {
                self.loaded = Some(None);
                return Outcome::Ok(None);
            }
            _ => {}
        }

        if self.fk.is_null() {
            self.loaded = Some(None);
            return Outcome::Ok(None);
        }

        match session.get::<T>(cx, self.fk.clone()).await {
            Outcome::Ok(resolved) => {
                self.loaded = Some(resolved.clone());
                Outcome::Ok(resolved)
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

impl<T: Table + Serialize + std::fmt::Debug> std::fmt::Debug for Loader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("relationship", &self.relationship.name)
            .field("owner", &self.owner)
            .field("fk", &self.fk)
            .field("is_loaded", &self.is_loaded())
            .finish()
    }
}
