//! The `Find` query builder.
//!
//! A `Find<M>` collects filters, ordering, pagination, projection,
//! aggregates, subqueries, and CTEs, then compiles one SELECT statement.
//! Every builder method takes `&self` and returns a fresh clone, so a base
//! query can be branched into specialized variants without
//! cross-contamination - the original is never mutated.

use crate::cte::Cte;
use crate::expr::{CompareOp, Expr};
use crate::field::FieldRef;
use crate::params::shift_placeholders;
use asupersync::{Cx, Outcome};
use relata_core::{Error, Executor, Result, Table, Value, sanitize_ident};
use std::marker::PhantomData;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    /// Get the SQL keyword for this direction.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    column: String,
    direction: OrderDirection,
}

impl OrderSpec {
    /// Create an order spec.
    pub fn new(column: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    /// Generate SQL for this entry.
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!("{} {}", self.column, self.direction.as_sql())
    }
}

/// Strings order ascending; a leading `-` flips to descending. The column
/// name is sanitized - it is spliced into SQL, not bound as a parameter.
impl From<&str> for OrderSpec {
    fn from(spec: &str) -> Self {
        let (name, direction) = match spec.strip_prefix('-') {
            Some(rest) => (rest, OrderDirection::Desc),
            None => (spec, OrderDirection::Asc),
        };
        Self {
            column: sanitize_ident(name),
            direction,
        }
    }
}

impl From<String> for OrderSpec {
    fn from(spec: String) -> Self {
        OrderSpec::from(spec.as_str())
    }
}

/// Aggregate functions the builder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    /// Parse an aggregate-function token.
    ///
    /// Unrecognized tokens are a configuration error naming the token.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "count" => Ok(AggregateFn::Count),
            "count_distinct" => Ok(AggregateFn::CountDistinct),
            "sum" => Ok(AggregateFn::Sum),
            "avg" => Ok(AggregateFn::Avg),
            "min" => Ok(AggregateFn::Min),
            "max" => Ok(AggregateFn::Max),
            other => Err(Error::config(format!(
                "unknown aggregate function '{}'",
                other
            ))),
        }
    }

    /// Whether this function needs a column argument. Only bare `count`
    /// renders without one.
    #[must_use]
    pub const fn requires_column(self) -> bool {
        !matches!(self, AggregateFn::Count)
    }

    /// Render the call for a column (`None` renders `COUNT(*)`).
    #[must_use]
    pub fn render(self, column: Option<&str>) -> String {
        match (self, column) {
            (AggregateFn::Count, None) => "COUNT(*)".to_string(),
            (AggregateFn::Count, Some(c)) => format!("COUNT({})", c),
            (AggregateFn::CountDistinct, Some(c)) => format!("COUNT(DISTINCT {})", c),
            (AggregateFn::Sum, Some(c)) => format!("SUM({})", c),
            (AggregateFn::Avg, Some(c)) => format!("AVG({})", c),
            (AggregateFn::Min, Some(c)) => format!("MIN({})", c),
            (AggregateFn::Max, Some(c)) => format!("MAX({})", c),
            // requires_column is validated before a spec is stored
            (_, None) => unreachable!("aggregate requires a column"),
        }
    }
}

/// One aggregate projection entry: `(function, column, alias)`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AggregateSpec {
    func: AggregateFn,
    column: Option<String>,
    alias: String,
}

/// One HAVING condition: `FUNC(column) <op> $n`.
#[derive(Debug, Clone, PartialEq)]
struct HavingSpec {
    func: AggregateFn,
    column: String,
    op: CompareOp,
    value: Value,
}

/// The kind of subquery predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubqueryKind {
    In,
    NotIn,
    Exists,
    NotExists,
}

/// One subquery predicate: `(kind, field, raw_sql, params)`.
///
/// `In`/`NotIn` scope a field against the subquery's result; `Exists`/
/// `NotExists` are standalone correlated predicates referencing the outer
/// table by name inside `sql`.
#[derive(Debug, Clone, PartialEq)]
struct SubquerySpec {
    kind: SubqueryKind,
    field: Option<String>,
    sql: String,
    params: Vec<Value>,
}

/// A single WHERE entry: an expression tree or a key->value equality map.
#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Expr(Expr),
    /// Sugar for an implicit AND of equalities.
    Eq(Vec<(String, Value)>),
}

/// A SELECT query builder for `M`'s table.
#[derive(Debug)]
pub struct Find<M: Table> {
    filters: Vec<Filter>,
    order: Vec<OrderSpec>,
    /// 0 = unbounded.
    limit: u64,
    /// 0 = no skip.
    offset: u64,
    /// Projected columns (empty = all).
    columns: Vec<String>,
    aggregates: Vec<AggregateSpec>,
    group_by: Vec<String>,
    having: Vec<HavingSpec>,
    subqueries: Vec<SubquerySpec>,
    ctes: Vec<Cte>,
    _marker: PhantomData<M>,
}

// Manual impl: a derived Clone would demand M: Clone for no reason.
impl<M: Table> Clone for Find<M> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            order: self.order.clone(),
            limit: self.limit,
            offset: self.offset,
            columns: self.columns.clone(),
            aggregates: self.aggregates.clone(),
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            subqueries: self.subqueries.clone(),
            ctes: self.ctes.clone(),
            _marker: PhantomData,
        }
    }
}

/// Create a query builder for `M`'s table.
#[must_use]
pub fn find<M: Table>() -> Find<M> {
    Find::new()
}

impl<M: Table> Find<M> {
    /// Create an empty query for the table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order: Vec::new(),
            limit: 0,
            offset: 0,
            columns: Vec::new(),
            aggregates: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            subqueries: Vec::new(),
            ctes: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Append a filter expression.
    #[must_use]
    pub fn filter(&self, expr: Expr) -> Self {
        let mut next = self.clone();
        next.filters.push(Filter::Expr(expr));
        next
    }

    /// Append a key->value equality map (implicit AND of equalities).
    #[must_use]
    pub fn filter_by<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut next = self.clone();
        next.filters.push(Filter::Eq(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ));
        next
    }

    /// Append an ORDER BY entry. Accepts a [`FieldRef`] (ascending) or a
    /// string where a leading `-` means descending. Multiple calls append.
    #[must_use]
    pub fn order_by(&self, spec: impl Into<OrderSpec>) -> Self {
        let mut next = self.clone();
        next.order.push(spec.into());
        next
    }

    /// Set the LIMIT; 0 means unbounded.
    #[must_use]
    pub fn limit(&self, n: u64) -> Self {
        let mut next = self.clone();
        next.limit = n;
        next
    }

    /// Set the OFFSET; 0 means no skip.
    #[must_use]
    pub fn offset(&self, n: u64) -> Self {
        let mut next = self.clone();
        next.offset = n;
        next
    }

    /// Narrow the projection to the named columns.
    #[must_use]
    pub fn select(&self, cols: &[&str]) -> Self {
        let mut next = self.clone();
        next.columns = cols.iter().map(|&s| s.to_string()).collect();
        next
    }

    /// Narrow the projection using field handles.
    #[must_use]
    pub fn select_fields(&self, fields: &[FieldRef]) -> Self {
        let mut next = self.clone();
        next.columns = fields.iter().map(|f| f.name().to_string()).collect();
        next
    }

    // ==================== Aggregates ====================

    /// Add an aggregate projection by token name.
    ///
    /// The function token is validated immediately; every function except
    /// bare `count` requires a column.
    pub fn aggregate(&self, func: &str, column: Option<&str>, alias: &str) -> Result<Self> {
        let func = AggregateFn::parse(func)?;
        if func.requires_column() && column.is_none() {
            return Err(Error::config(format!(
                "aggregate function '{}' requires a column",
                match func {
                    AggregateFn::CountDistinct => "count_distinct",
                    AggregateFn::Sum => "sum",
                    AggregateFn::Avg => "avg",
                    AggregateFn::Min => "min",
                    AggregateFn::Max => "max",
                    AggregateFn::Count => "count",
                }
            )));
        }
        let mut next = self.clone();
        next.aggregates.push(AggregateSpec {
            func,
            column: column.map(str::to_string),
            alias: alias.to_string(),
        });
        Ok(next)
    }

    /// `COUNT(*) AS alias`
    #[must_use]
    pub fn count(&self, alias: &str) -> Self {
        let mut next = self.clone();
        next.aggregates.push(AggregateSpec {
            func: AggregateFn::Count,
            column: None,
            alias: alias.to_string(),
        });
        next
    }

    /// `COUNT(column) AS alias`
    #[must_use]
    pub fn count_column(&self, column: &str, alias: &str) -> Self {
        let mut next = self.clone();
        next.aggregates.push(AggregateSpec {
            func: AggregateFn::Count,
            column: Some(column.to_string()),
            alias: alias.to_string(),
        });
        next
    }

    /// `COUNT(DISTINCT column) AS alias`
    #[must_use]
    pub fn count_distinct(&self, column: &str, alias: &str) -> Self {
        let mut next = self.clone();
        next.aggregates.push(AggregateSpec {
            func: AggregateFn::CountDistinct,
            column: Some(column.to_string()),
            alias: alias.to_string(),
        });
        next
    }

    /// `SUM(column) AS alias`
    #[must_use]
    pub fn sum(&self, column: &str, alias: &str) -> Self {
        self.push_aggregate(AggregateFn::Sum, column, alias)
    }

    /// `AVG(column) AS alias`
    #[must_use]
    pub fn avg(&self, column: &str, alias: &str) -> Self {
        self.push_aggregate(AggregateFn::Avg, column, alias)
    }

    /// `MIN(column) AS alias`
    #[must_use]
    pub fn min(&self, column: &str, alias: &str) -> Self {
        self.push_aggregate(AggregateFn::Min, column, alias)
    }

    /// `MAX(column) AS alias`
    #[must_use]
    pub fn max(&self, column: &str, alias: &str) -> Self {
        self.push_aggregate(AggregateFn::Max, column, alias)
    }

    fn push_aggregate(&self, func: AggregateFn, column: &str, alias: &str) -> Self {
        let mut next = self.clone();
        next.aggregates.push(AggregateSpec {
            func,
            column: Some(column.to_string()),
            alias: alias.to_string(),
        });
        next
    }

    /// Add GROUP BY columns.
    #[must_use]
    pub fn group_by(&self, cols: &[&str]) -> Self {
        let mut next = self.clone();
        next.group_by
            .extend(cols.iter().map(|&s| s.to_string()));
        next
    }

    /// Add a HAVING condition: `FUNC(column) <op> value`.
    ///
    /// Both the aggregate-function token and the comparison-operator token
    /// are validated at this call, not at build time.
    pub fn having(
        &self,
        func: &str,
        column: &str,
        op: &str,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let func = AggregateFn::parse(func)?;
        let op = CompareOp::parse(op)?;
        let mut next = self.clone();
        next.having.push(HavingSpec {
            func,
            column: column.to_string(),
            op,
            value: value.into(),
        });
        Ok(next)
    }

    // ==================== Subqueries ====================

    /// Append a subquery predicate.
    ///
    /// `In`/`NotIn` require a target field name; `Exists`/`NotExists` take
    /// none (the raw SQL is a correlated predicate referencing the outer
    /// table by name). Raw SQL placeholders are numbered from `$1` and
    /// renumbered on splice.
    pub fn subquery(
        &self,
        kind: SubqueryKind,
        field: Option<&str>,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Self> {
        if matches!(kind, SubqueryKind::In | SubqueryKind::NotIn) && field.is_none() {
            return Err(Error::config("IN subquery requires a field name"));
        }
        let mut next = self.clone();
        next.subqueries.push(SubquerySpec {
            kind,
            field: field.map(str::to_string),
            sql: sql.to_string(),
            params,
        });
        Ok(next)
    }

    /// `field IN (subquery)`
    #[must_use]
    pub fn in_subquery(&self, field: &str, sql: &str, params: Vec<Value>) -> Self {
        let mut next = self.clone();
        next.subqueries.push(SubquerySpec {
            kind: SubqueryKind::In,
            field: Some(field.to_string()),
            sql: sql.to_string(),
            params,
        });
        next
    }

    /// `field NOT IN (subquery)`
    #[must_use]
    pub fn not_in_subquery(&self, field: &str, sql: &str, params: Vec<Value>) -> Self {
        let mut next = self.clone();
        next.subqueries.push(SubquerySpec {
            kind: SubqueryKind::NotIn,
            field: Some(field.to_string()),
            sql: sql.to_string(),
            params,
        });
        next
    }

    /// `EXISTS (subquery)` as a standalone predicate.
    #[must_use]
    pub fn exists(&self, sql: &str, params: Vec<Value>) -> Self {
        let mut next = self.clone();
        next.subqueries.push(SubquerySpec {
            kind: SubqueryKind::Exists,
            field: None,
            sql: sql.to_string(),
            params,
        });
        next
    }

    /// `NOT EXISTS (subquery)` as a standalone predicate.
    #[must_use]
    pub fn not_exists(&self, sql: &str, params: Vec<Value>) -> Self {
        let mut next = self.clone();
        next.subqueries.push(SubquerySpec {
            kind: SubqueryKind::NotExists,
            field: None,
            sql: sql.to_string(),
            params,
        });
        next
    }

    /// Attach a CTE; its body is prefixed in a WITH clause.
    #[must_use]
    pub fn with_cte(&self, cte: Cte) -> Self {
        let mut next = self.clone();
        next.ctes.push(cte);
        next
    }

    // ==================== Compilation ====================

    /// Compile just the WHERE clause with numbering from `$1`.
    ///
    /// Pure: calling it twice on the same builder yields identical SQL and
    /// params.
    #[must_use]
    pub fn build_where_clause(&self) -> (String, Vec<Value>) {
        self.render_where(1)
    }

    fn render_where(&self, first_param: usize) -> (String, Vec<Value>) {
        let mut fragments: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        let conjunct_count = self.filters.len() + self.subqueries.len();

        for filter in &self.filters {
            match filter {
                Filter::Expr(expr) => {
                    let (sql, expr_params) = expr.to_sql(first_param + params.len());
                    // A top-level OR must not leak into the surrounding AND chain.
                    let sql = if matches!(expr, Expr::Or(_)) && conjunct_count > 1 {
                        format!("({})", sql)
                    } else {
                        sql
                    };
                    fragments.push(sql);
                    params.extend(expr_params);
                }
                Filter::Eq(pairs) => {
                    let eqs: Vec<String> = pairs
                        .iter()
                        .map(|(col, v)| {
                            let n = first_param + params.len();
                            params.push(v.clone());
                            format!("{} = ${}", col, n)
                        })
                        .collect();
                    fragments.push(eqs.join(" AND "));
                }
            }
        }

        for sub in &self.subqueries {
            let inner = shift_placeholders(&sub.sql, first_param - 1 + params.len());
            let fragment = match (sub.kind, &sub.field) {
                (SubqueryKind::In, Some(field)) => format!("{} IN ({})", field, inner),
                (SubqueryKind::NotIn, Some(field)) => format!("{} NOT IN ({})", field, inner),
                (SubqueryKind::Exists, _) => format!("EXISTS ({})", inner),
                (SubqueryKind::NotExists, _) => format!("NOT EXISTS ({})", inner),
                // field presence is validated before the spec is stored
                (SubqueryKind::In | SubqueryKind::NotIn, None) => {
                    unreachable!("IN subquery stored without a field")
                }
            };
            fragments.push(fragment);
            params.extend(sub.params.iter().cloned());
        }

        (fragments.join(" AND "), params)
    }

    /// Compile the full SELECT statement and its parameters.
    #[must_use]
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params: Vec<Value> = Vec::new();
        let table = M::table();

        // WITH clause - CTE bodies precede the main statement, so their
        // parameters come first.
        if !self.ctes.is_empty() {
            let recursive = self.ctes.iter().any(Cte::is_recursive);
            sql.push_str(if recursive { "WITH RECURSIVE " } else { "WITH " });
            let rendered: Vec<String> = self
                .ctes
                .iter()
                .map(|cte| {
                    let (cte_sql, cte_params) = cte.render(params.len() + 1);
                    params.extend(cte_params);
                    cte_sql
                })
                .collect();
            sql.push_str(&rendered.join(", "));
            sql.push(' ');
        }

        // Projection
        sql.push_str("SELECT ");
        if self.aggregates.is_empty() {
            if self.columns.is_empty() {
                sql.push('*');
            } else {
                sql.push_str(&self.columns.join(", "));
            }
        } else {
            let mut parts: Vec<String> = self.group_by.clone();
            parts.extend(self.aggregates.iter().map(|agg| {
                format!("{} AS {}", agg.func.render(agg.column.as_deref()), agg.alias)
            }));
            sql.push_str(&parts.join(", "));
        }

        // FROM
        sql.push_str(" FROM ");
        sql.push_str(&table.qualified_name());

        // WHERE
        if !self.filters.is_empty() || !self.subqueries.is_empty() {
            let (where_sql, where_params) = self.render_where(params.len() + 1);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
            params.extend(where_params);
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        // HAVING
        if !self.having.is_empty() {
            let conditions: Vec<String> = self
                .having
                .iter()
                .map(|h| {
                    let n = params.len() + 1;
                    params.push(h.value.clone());
                    format!(
                        "{} {} ${}",
                        h.func.render(Some(&h.column)),
                        h.op.as_sql(),
                        n
                    )
                })
                .collect();
            sql.push_str(" HAVING ");
            sql.push_str(&conditions.join(" AND "));
        }

        // ORDER BY
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            let order_strs: Vec<String> = self.order.iter().map(OrderSpec::to_sql).collect();
            sql.push_str(&order_strs.join(", "));
        }

        // LIMIT / OFFSET (0 = unset)
        if self.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", self.limit));
        }
        if self.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", self.offset));
        }

        (sql, params)
    }

    // ==================== Execution ====================

    /// Execute and hydrate every matching row.
    #[tracing::instrument(level = "debug", skip_all, fields(table = M::table().table_name))]
    pub async fn all<E: Executor>(self, cx: &Cx, exec: &E) -> Outcome<Vec<M>, Error> {
        let (sql, params) = self.build();
        tracing::trace!(sql = %sql, "executing find");
        let rows = exec.query(cx, &sql, &params).await;

        rows.and_then(|rows| {
            let mut models = Vec::with_capacity(rows.len());
            for row in &rows {
                match M::from_row(row) {
                    Ok(model) => models.push(model),
                    Err(e) => return Outcome::Err(e),
                }
            }
            Outcome::Ok(models)
        })
    }

    /// Execute and hydrate the first matching row, if any.
    pub async fn first<E: Executor>(self, cx: &Cx, exec: &E) -> Outcome<Option<M>, Error> {
        let query = self.limit(1);
        let (sql, params) = query.build();
        let row = exec.query_one(cx, &sql, &params).await;

        row.and_then(|opt_row| match opt_row {
            Some(row) => match M::from_row(&row) {
                Ok(model) => Outcome::Ok(Some(model)),
                Err(e) => Outcome::Err(e),
            },
            None => Outcome::Ok(None),
        })
    }

    /// Execute and return exactly one row, or error.
    pub async fn one<E: Executor>(self, cx: &Cx, exec: &E) -> Outcome<M, Error> {
        match self.first(cx, exec).await {
            Outcome::Ok(Some(model)) => Outcome::Ok(model),
            Outcome::Ok(None) => {
                Outcome::Err(Error::Custom("expected one row, found none".to_string()))
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Execute a COUNT(*) variant of this query.
    pub async fn count_rows<E: Executor>(self, cx: &Cx, exec: &E) -> Outcome<u64, Error> {
        let mut query = self;
        query.aggregates = vec![AggregateSpec {
            func: AggregateFn::Count,
            column: None,
            alias: "count".to_string(),
        }];
        query.columns.clear();
        query.order.clear();
        query.limit = 0;
        query.offset = 0;

        let (sql, params) = query.build();
        let row = exec.query_one(cx, &sql, &params).await;

        row.and_then(|opt_row| match opt_row {
            Some(row) => match row.get_named::<i64>("count") {
                Ok(count) => Outcome::Ok(count.max(0) as u64),
                Err(e) => Outcome::Err(e),
            },
            None => Outcome::Ok(0),
        })
    }
}

impl<M: Table> Default for Find<M> {
    fn default() -> Self {
        Self::new()
    }
}
