//! Common Table Expressions (WITH clauses).

use crate::params::shift_placeholders;
use relata_core::Value;

/// A Common Table Expression attached to a [`crate::Find`] query.
///
/// The body is raw SQL with its own `$1`-based placeholder numbering; the
/// outer query renumbers it on splice.
#[derive(Debug, Clone)]
pub struct Cte {
    /// Name the main query references the CTE by.
    name: String,
    /// Optional column aliases.
    columns: Vec<String>,
    /// Whether this CTE is recursive.
    recursive: bool,
    /// The anchor query SQL.
    query_sql: String,
    /// Parameters for the anchor query.
    query_params: Vec<Value>,
    /// For recursive CTEs: the UNION ALL term.
    union_sql: Option<String>,
    /// Parameters for the UNION ALL term.
    union_params: Vec<Value>,
}

impl Cte {
    /// Create a new non-recursive CTE.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            recursive: false,
            query_sql: String::new(),
            query_params: Vec::new(),
            union_sql: None,
            union_params: Vec::new(),
        }
    }

    /// Create a new recursive CTE.
    ///
    /// Recursive CTEs take an anchor term via [`Cte::as_select`] and a
    /// recursive term via [`Cte::union_all`].
    pub fn recursive(name: impl Into<String>) -> Self {
        Self {
            recursive: true,
            ..Self::new(name)
        }
    }

    /// Specify column aliases for the CTE.
    #[must_use]
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|&s| s.to_string()).collect();
        self
    }

    /// Set the CTE body (placeholders numbered from `$1`).
    #[must_use]
    pub fn as_select(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.query_sql = sql.into();
        self.query_params = params;
        self
    }

    /// Set the recursive UNION ALL term (placeholders numbered from `$1`,
    /// independent of the anchor term).
    #[must_use]
    pub fn union_all(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.union_sql = Some(sql.into());
        self.union_params = params;
        self
    }

    /// The CTE's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this CTE needs the `WITH RECURSIVE` form.
    #[must_use]
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Render `name [(cols)] AS (body)` with placeholders shifted so the
    /// first one is numbered `first_param`. Returns the fragment and its
    /// parameters in placeholder order.
    #[must_use]
    pub fn render(&self, first_param: usize) -> (String, Vec<Value>) {
        let mut params = Vec::new();

        let mut body = shift_placeholders(&self.query_sql, first_param - 1);
        params.extend(self.query_params.iter().cloned());

        if let Some(union_sql) = &self.union_sql {
            let union_shifted =
                shift_placeholders(union_sql, first_param - 1 + params.len());
            body.push_str(" UNION ALL ");
            body.push_str(&union_shifted);
            params.extend(self.union_params.iter().cloned());
        }

        let header = if self.columns.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.columns.join(", "))
        };

        (format!("{} AS ({})", header, body), params)
    }
}
