//! Field proxies: class-level handles that build expression leaves.

use crate::expr::{CompareOp, Expr};
use crate::find::{OrderDirection, OrderSpec};
use relata_core::{Table, Value};

/// A handle bound to (owning table, column name).
///
/// Declared once per field, typically as an associated constant on the row
/// type, and used to build expression leaves and order specs:
///
/// ```
/// use relata_query::FieldRef;
///
/// const AGE: FieldRef = FieldRef::new("users", "age");
/// let expr = AGE.gt(25i64).and(AGE.is_not_null());
/// let (sql, _) = expr.to_sql(1);
/// assert_eq!(sql, "age > $1 AND age IS NOT NULL");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    table: &'static str,
    column: &'static str,
}

impl FieldRef {
    /// Create a new field handle.
    #[must_use]
    pub const fn new(table: &'static str, column: &'static str) -> Self {
        Self { table, column }
    }

    /// Create a handle for a column of `M`'s table.
    #[must_use]
    pub fn of<M: Table>(column: &'static str) -> Self {
        Self {
            table: M::table().table_name,
            column,
        }
    }

    /// The column name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.column
    }

    /// The owning table name.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        self.table
    }

    /// The `table.column` form for correlated predicates.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }

    // ==================== Comparison ====================

    /// Equal (=)
    pub fn eq(&self, value: impl Into<Value>) -> Expr {
        Expr::compare(self.column, CompareOp::Eq, value)
    }

    /// Not equal (<>)
    pub fn ne(&self, value: impl Into<Value>) -> Expr {
        Expr::compare(self.column, CompareOp::Ne, value)
    }

    /// Less than (<)
    pub fn lt(&self, value: impl Into<Value>) -> Expr {
        Expr::compare(self.column, CompareOp::Lt, value)
    }

    /// Less than or equal (<=)
    pub fn le(&self, value: impl Into<Value>) -> Expr {
        Expr::compare(self.column, CompareOp::Le, value)
    }

    /// Greater than (>)
    pub fn gt(&self, value: impl Into<Value>) -> Expr {
        Expr::compare(self.column, CompareOp::Gt, value)
    }

    /// Greater than or equal (>=)
    pub fn ge(&self, value: impl Into<Value>) -> Expr {
        Expr::compare(self.column, CompareOp::Ge, value)
    }

    // ==================== Membership & range ====================

    /// Membership in a list of values.
    pub fn in_<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::in_list(self.column, values)
    }

    /// Exclusion from a list of values.
    pub fn not_in<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::not_in_list(self.column, values)
    }

    /// Inclusive range check.
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> Expr {
        Expr::between(self.column, low, high)
    }

    // ==================== Null checks ====================

    /// IS NULL
    pub fn is_null(&self) -> Expr {
        Expr::is_null(self.column)
    }

    /// IS NOT NULL
    pub fn is_not_null(&self) -> Expr {
        Expr::is_not_null(self.column)
    }

    // ==================== Pattern matching ====================

    /// LIKE with a caller-supplied pattern.
    pub fn like(&self, pattern: impl Into<String>) -> Expr {
        Expr::compare(self.column, CompareOp::Like, pattern.into())
    }

    /// ILIKE (case-insensitive) with a caller-supplied pattern.
    pub fn ilike(&self, pattern: impl Into<String>) -> Expr {
        Expr::compare(self.column, CompareOp::ILike, pattern.into())
    }

    /// Prefix match: LIKE 'prefix%'.
    pub fn starts_with(&self, prefix: impl AsRef<str>) -> Expr {
        self.like(format!("{}%", prefix.as_ref()))
    }

    /// Suffix match: LIKE '%suffix'.
    pub fn ends_with(&self, suffix: impl AsRef<str>) -> Expr {
        self.like(format!("%{}", suffix.as_ref()))
    }

    /// Substring match: LIKE '%fragment%'.
    pub fn contains(&self, fragment: impl AsRef<str>) -> Expr {
        self.like(format!("%{}%", fragment.as_ref()))
    }

    // ==================== Ordering ====================

    /// Ascending order spec for this field.
    #[must_use]
    pub fn asc(&self) -> OrderSpec {
        OrderSpec::new(self.column, OrderDirection::Asc)
    }

    /// Descending order spec for this field.
    #[must_use]
    pub fn desc(&self) -> OrderSpec {
        OrderSpec::new(self.column, OrderDirection::Desc)
    }
}

/// A bare field handle is an ascending order spec.
impl From<FieldRef> for OrderSpec {
    fn from(field: FieldRef) -> Self {
        field.asc()
    }
}

/// A field handle normalizes to its column name in projections.
impl From<FieldRef> for String {
    fn from(field: FieldRef) -> Self {
        field.column.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGE: FieldRef = FieldRef::new("users", "age");
    const NAME: FieldRef = FieldRef::new("users", "name");

    #[test]
    fn test_comparison_leaves() {
        let (sql, params) = AGE.gt(25i64).to_sql(1);
        assert_eq!(sql, "age > $1");
        assert_eq!(params, vec![Value::Int(25)]);

        let (sql, _) = AGE.le(65i64).to_sql(1);
        assert_eq!(sql, "age <= $1");

        let (sql, _) = NAME.ne("bob").to_sql(1);
        assert_eq!(sql, "name <> $1");
    }

    #[test]
    fn test_in_and_between() {
        let (sql, params) = AGE.in_([1i64, 2, 3]).to_sql(1);
        assert_eq!(sql, "age IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);

        let (sql, _) = AGE.between(18i64, 30i64).to_sql(1);
        assert_eq!(sql, "age BETWEEN $1 AND $2");
    }

    #[test]
    fn test_pattern_helpers_wrap_wildcards() {
        let (sql, params) = NAME.starts_with("Ada").to_sql(1);
        assert_eq!(sql, "name LIKE $1");
        assert_eq!(params, vec![Value::Text("Ada%".into())]);

        let (_, params) = NAME.contains("da").to_sql(1);
        assert_eq!(params, vec![Value::Text("%da%".into())]);

        let (_, params) = NAME.ends_with("ce").to_sql(1);
        assert_eq!(params, vec![Value::Text("%ce".into())]);
    }

    #[test]
    fn test_ilike() {
        let (sql, _) = NAME.ilike("a%").to_sql(1);
        assert_eq!(sql, "name ILIKE $1");
    }

    #[test]
    fn test_null_checks() {
        let (sql, params) = AGE.is_null().to_sql(1);
        assert_eq!(sql, "age IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_order_specs() {
        assert_eq!(AGE.asc().to_sql(), "age ASC");
        assert_eq!(AGE.desc().to_sql(), "age DESC");
        let spec: OrderSpec = NAME.into();
        assert_eq!(spec.to_sql(), "name ASC");
    }

    #[test]
    fn test_qualified() {
        assert_eq!(AGE.qualified(), "users.age");
    }
}
