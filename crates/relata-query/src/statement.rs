//! INSERT, UPDATE, and DELETE statement builders.
//!
//! These compile the mutating statements the session flush executes. Like
//! the SELECT side, identifiers come from static table metadata and every
//! value is bound positionally.

use crate::expr::Expr;
use asupersync::{Cx, Outcome};
use relata_core::{Error, Executor, Table, Value};
use std::marker::PhantomData;

/// INSERT builder for a single instance.
#[derive(Debug)]
pub struct InsertBuilder<'a, M: Table> {
    model: &'a M,
}

impl<'a, M: Table> InsertBuilder<'a, M> {
    /// Create a new INSERT builder for the given instance.
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Build the INSERT SQL and parameters.
    ///
    /// A `Null` primary key column is omitted so the database can assign
    /// the key.
    pub fn build(&self) -> (String, Vec<Value>) {
        let table = M::table();
        let row = self.model.to_row();

        let insert_fields: Vec<_> = row
            .into_iter()
            .filter(|(name, value)| !(*name == table.primary_key && value.is_null()))
            .collect();

        let columns: Vec<&str> = insert_fields.iter().map(|(name, _)| *name).collect();
        let placeholders: Vec<String> = (1..=insert_fields.len())
            .map(|i| format!("${}", i))
            .collect();
        let values: Vec<Value> = insert_fields.into_iter().map(|(_, v)| v).collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.qualified_name(),
            columns.join(", "),
            placeholders.join(", ")
        );

        (sql, values)
    }

    /// Execute the INSERT and return the affected-row count.
    pub async fn execute<E: Executor>(self, cx: &Cx, exec: &E) -> Outcome<u64, Error> {
        let (sql, params) = self.build();
        exec.execute(cx, &sql, &params).await
    }
}

/// Bulk INSERT builder.
#[derive(Debug)]
pub struct InsertManyBuilder<'a, M: Table> {
    models: &'a [M],
}

impl<'a, M: Table> InsertManyBuilder<'a, M> {
    /// Create a new bulk INSERT builder.
    pub fn new(models: &'a [M]) -> Self {
        Self { models }
    }

    /// Build a multi-row INSERT, or `None` for an empty input.
    ///
    /// Column selection follows the first row; a `Null` primary key is
    /// omitted across all rows.
    pub fn build(&self) -> Option<(String, Vec<Value>)> {
        let first = self.models.first()?;
        let table = M::table();

        let skip_pk = first
            .to_row()
            .iter()
            .any(|(name, value)| *name == table.primary_key && value.is_null());

        let columns: Vec<&'static str> = first
            .to_row()
            .into_iter()
            .filter(|(name, _)| !(skip_pk && *name == table.primary_key))
            .map(|(name, _)| name)
            .collect();

        let mut params = Vec::with_capacity(self.models.len() * columns.len());
        let mut tuples = Vec::with_capacity(self.models.len());

        for model in self.models {
            let row = model.to_row();
            let placeholders: Vec<String> = columns
                .iter()
                .map(|col| {
                    let value = row
                        .iter()
                        .find(|(name, _)| name == col)
                        .map_or(Value::Null, |(_, v)| v.clone());
                    params.push(value);
                    format!("${}", params.len())
                })
                .collect();
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table.qualified_name(),
            columns.join(", "),
            tuples.join(", ")
        );

        Some((sql, params))
    }

    /// Execute the bulk INSERT.
    ///
    /// An empty input is a no-op: nothing reaches the executor and the
    /// affected-row count is zero.
    pub async fn execute<E: Executor>(self, cx: &Cx, exec: &E) -> Outcome<u64, Error> {
        match self.build() {
            Some((sql, params)) => exec.execute(cx, &sql, &params).await,
            None => Outcome::Ok(0),
        }
    }
}

/// UPDATE builder for a single instance.
#[derive(Debug)]
pub struct UpdateBuilder<'a, M: Table> {
    model: &'a M,
    set_fields: Option<Vec<&'static str>>,
}

impl<'a, M: Table> UpdateBuilder<'a, M> {
    /// Create a new UPDATE builder for the given instance.
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            set_fields: None,
        }
    }

    /// Only update the named fields (default: every non-key column).
    #[must_use]
    pub fn set_only(mut self, fields: &[&'static str]) -> Self {
        self.set_fields = Some(fields.to_vec());
        self
    }

    /// Build the UPDATE SQL and parameters, keyed on the primary key.
    pub fn build(&self) -> (String, Vec<Value>) {
        let table = M::table();
        let row = self.model.to_row();

        let update_fields: Vec<_> = row
            .into_iter()
            .filter(|(name, _)| {
                if *name == table.primary_key {
                    return false;
                }
                match &self.set_fields {
                    Some(fields) => fields.contains(name),
                    None => true,
                }
            })
            .collect();

        let mut params = Vec::new();
        let set_clauses: Vec<String> = update_fields
            .into_iter()
            .map(|(name, value)| {
                params.push(value);
                format!("{} = ${}", name, params.len())
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            table.qualified_name(),
            set_clauses.join(", ")
        );

        params.push(self.model.primary_key_value());
        sql.push_str(&format!(
            " WHERE {} = ${}",
            table.primary_key,
            params.len()
        ));

        (sql, params)
    }

    /// Execute the UPDATE and return rows affected.
    pub async fn execute<E: Executor>(self, cx: &Cx, exec: &E) -> Outcome<u64, Error> {
        let (sql, params) = self.build();
        exec.execute(cx, &sql, &params).await
    }
}

/// DELETE builder for a table type.
#[derive(Debug)]
pub struct DeleteBuilder<M: Table> {
    filter: Option<Expr>,
    _marker: PhantomData<M>,
}

impl<M: Table> DeleteBuilder<M> {
    /// Create a new DELETE builder.
    pub fn new() -> Self {
        Self {
            filter: None,
            _marker: PhantomData,
        }
    }

    /// Scope the DELETE to rows matching the expression.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Build the DELETE SQL and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let table = M::table();
        let mut sql = format!("DELETE FROM {}", table.qualified_name());
        let mut params = Vec::new();

        if let Some(filter) = &self.filter {
            let (where_sql, where_params) = filter.to_sql(1);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
            params = where_params;
        }

        (sql, params)
    }

    /// Execute the DELETE and return rows affected.
    pub async fn execute<E: Executor>(self, cx: &Cx, exec: &E) -> Outcome<u64, Error> {
        let (sql, params) = self.build();
        exec.execute(cx, &sql, &params).await
    }
}

impl<M: Table> Default for DeleteBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}
