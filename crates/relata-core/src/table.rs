//! Table metadata and the `Table` trait.
//!
//! A `TableInfo` is built exactly once per declared row type through an
//! explicit builder - there is no registration magic. Types implement
//! [`Table`] and hand back their descriptor from a `LazyLock` static.

use crate::Result;
use crate::column::Column;
use crate::error::Error;
use crate::relationship::Relationship;
use crate::row::Row;
use crate::value::Value;

/// Schema-level descriptor for one declared table type.
///
/// Immutable after construction. Column order is declaration order.
#[derive(Debug, Clone)]
pub struct TableInfo {
    /// The table name.
    pub table_name: &'static str,
    /// The schema the table lives in.
    pub schema: &'static str,
    /// The primary key column name.
    pub primary_key: &'static str,
    /// Ordered column declarations.
    columns: Vec<(&'static str, Column)>,
    /// Declared relationships.
    relationships: Vec<Relationship>,
}

impl TableInfo {
    /// Start building a descriptor for the named table.
    #[must_use]
    pub fn builder(table_name: &'static str) -> TableBuilder {
        TableBuilder {
            table_name,
            schema: "public",
            primary_key: "id",
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    /// Iterate columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &Column)> {
        self.columns.iter().map(|(n, c)| (*n, c))
    }

    /// Column names in declaration order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|(n, _)| *n).collect()
    }

    /// Look up a relationship by name.
    ///
    /// An unknown name is a configuration error; the message names the
    /// offending token and the table it was looked up on.
    pub fn relationship(&self, name: &str) -> Result<&Relationship> {
        self.relationships
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| {
                Error::config(format!(
                    "unknown relationship '{}' on table '{}'",
                    name, self.table_name
                ))
            })
    }

    /// Iterate declared relationships.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter()
    }

    /// The table reference as it appears in FROM clauses.
    ///
    /// Tables in the default `public` schema render unqualified.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        if self.schema == "public" {
            self.table_name.to_string()
        } else {
            format!("{}.{}", self.schema, self.table_name)
        }
    }

    /// Tables this one references through foreign key columns.
    #[must_use]
    pub fn referenced_tables(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter_map(|(_, c)| c.foreign_key_table())
            .collect()
    }
}

/// Builder for [`TableInfo`].
#[derive(Debug)]
pub struct TableBuilder {
    table_name: &'static str,
    schema: &'static str,
    primary_key: &'static str,
    columns: Vec<(&'static str, Column)>,
    relationships: Vec<Relationship>,
}

impl TableBuilder {
    /// Set the schema (default `"public"`).
    #[must_use]
    pub fn schema(mut self, schema: &'static str) -> Self {
        self.schema = schema;
        self
    }

    /// Set the primary key column name (default `"id"`).
    #[must_use]
    pub fn primary_key(mut self, column: &'static str) -> Self {
        self.primary_key = column;
        self
    }

    /// Declare a column. Declaration order is preserved.
    ///
    /// # Panics
    ///
    /// Panics if the column name was already declared on this table.
    #[must_use]
    pub fn column(mut self, name: &'static str, column: Column) -> Self {
        assert!(
            !self.columns.iter().any(|(n, _)| *n == name),
            "column '{}' declared twice on table '{}'",
            name,
            self.table_name
        );
        self.columns.push((name, column));
        self
    }

    /// Declare a relationship.
    ///
    /// # Panics
    ///
    /// Panics if the relationship name was already declared on this table.
    #[must_use]
    pub fn relationship(mut self, rel: Relationship) -> Self {
        assert!(
            !self.relationships.iter().any(|r| r.name == rel.name),
            "relationship '{}' declared twice on table '{}'",
            rel.name,
            self.table_name
        );
        self.relationships.push(rel);
        self
    }

    /// Finish the descriptor.
    #[must_use]
    pub fn build(self) -> TableInfo {
        tracing::trace!(
            table = self.table_name,
            columns = self.columns.len(),
            relationships = self.relationships.len(),
            "built table descriptor"
        );
        TableInfo {
            table_name: self.table_name,
            schema: self.schema,
            primary_key: self.primary_key,
            columns: self.columns,
            relationships: self.relationships,
        }
    }
}

/// The contract a declared row type implements.
///
/// `table()` is the static-metadata accessor used for building expressions
/// and introspection; per-instance runtime handles (lazy loaders) are
/// created through the session layer from the same descriptor.
pub trait Table: Sized + Send + Sync + 'static {
    /// The table descriptor for this type.
    fn table() -> &'static TableInfo;

    /// Convert this instance to (column, value) pairs in declaration order.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct an instance from a result row.
    fn from_row(row: &Row) -> Result<Self>;

    /// The current primary key value (`Value::Null` until assigned).
    fn primary_key_value(&self) -> Value;

    /// Check if this is a new record (primary key not yet assigned).
    fn is_new(&self) -> bool {
        self.primary_key_value().is_null()
    }

    /// Read a single column's current value by name.
    fn column_value(&self, name: &str) -> Option<Value> {
        self.to_row()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}
