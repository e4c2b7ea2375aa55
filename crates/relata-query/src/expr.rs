//! SQL expressions for query building.
//!
//! Expressions are a small tagged tree: comparison/membership/pattern
//! leaves over a column, and `And`/`Or`/`Not` combinators over sub-trees.
//! Compilation produces a parameterized fragment with `$n` placeholders;
//! values never appear in the SQL text.

use relata_core::{Error, Result, Value};

/// Comparison operators usable in expression leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// LIKE pattern match
    Like,
    /// ILIKE case-insensitive pattern match
    ILike,
}

impl CompareOp {
    /// Get the SQL representation of this operator.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::ILike => "ILIKE",
        }
    }

    /// Parse an operator token as it appears on the declaration surface.
    ///
    /// Unrecognized tokens are a configuration error naming the token.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "=" | "==" | "eq" => Ok(CompareOp::Eq),
            "<>" | "!=" | "ne" => Ok(CompareOp::Ne),
            "<" | "lt" => Ok(CompareOp::Lt),
            "<=" | "le" => Ok(CompareOp::Le),
            ">" | "gt" => Ok(CompareOp::Gt),
            ">=" | "ge" => Ok(CompareOp::Ge),
            "like" => Ok(CompareOp::Like),
            "ilike" => Ok(CompareOp::ILike),
            other => Err(Error::config(format!(
                "unknown comparison operator '{}'",
                other
            ))),
        }
    }
}

/// A composable filter expression.
///
/// Built via [`crate::FieldRef`] methods or the named constructors below;
/// immutable once built. Combining is done with named methods rather than
/// operator overloading, so mixing in a non-expression is a compile error.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `column <op> $n`
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },

    /// `column [NOT] IN ($n, $n+1, ...)` - one placeholder per element
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },

    /// `column [NOT] BETWEEN $n AND $n+1`
    Between {
        column: String,
        low: Value,
        high: Value,
        negated: bool,
    },

    /// `column IS [NOT] NULL` - emits no placeholder
    IsNull { column: String, negated: bool },

    /// Conjunction of sub-expressions
    And(Vec<Expr>),

    /// Disjunction of sub-expressions
    Or(Vec<Expr>),

    /// Negation of a sub-expression
    Not(Box<Expr>),
}

impl Expr {
    /// Create a comparison leaf.
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Expr::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Create an `IN` leaf over a list of values.
    pub fn in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Expr::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    /// Create a `NOT IN` leaf over a list of values.
    pub fn not_in_list<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Expr::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    /// Create a `BETWEEN` leaf.
    pub fn between(
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Expr::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    /// Create an `IS NULL` leaf.
    pub fn is_null(column: impl Into<String>) -> Self {
        Expr::IsNull {
            column: column.into(),
            negated: false,
        }
    }

    /// Create an `IS NOT NULL` leaf.
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Expr::IsNull {
            column: column.into(),
            negated: true,
        }
    }

    /// Conjoin with another expression. Chained calls flatten into a single
    /// `AND` node.
    #[must_use]
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut children) => {
                children.push(other);
                Expr::And(children)
            }
            first => Expr::And(vec![first, other]),
        }
    }

    /// Disjoin with another expression. Chained calls flatten into a single
    /// `OR` node.
    #[must_use]
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut children) => {
                children.push(other);
                Expr::Or(children)
            }
            first => Expr::Or(vec![first, other]),
        }
    }

    /// Negate this expression.
    #[must_use]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Compile to `(fragment, params)`.
    ///
    /// Placeholders are numbered sequentially starting at `first_param`
    /// (pass 1 for a standalone expression); parameters come back in exact
    /// placeholder order. Compilation is pure - the same call yields the
    /// same output, and a different `first_param` shifts every placeholder
    /// consistently.
    #[must_use]
    pub fn to_sql(&self, first_param: usize) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.render(first_param, &mut params);
        (sql, params)
    }

    fn render(&self, first_param: usize, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Compare { column, op, value } => {
                let n = first_param + params.len();
                params.push(value.clone());
                format!("{} {} ${}", column, op.as_sql(), n)
            }

            Expr::In {
                column,
                values,
                negated,
            } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        let n = first_param + params.len();
                        params.push(v.clone());
                        format!("${}", n)
                    })
                    .collect();
                let not_str = if *negated { "NOT " } else { "" };
                format!("{} {}IN ({})", column, not_str, placeholders.join(", "))
            }

            Expr::Between {
                column,
                low,
                high,
                negated,
            } => {
                let lo = first_param + params.len();
                params.push(low.clone());
                let hi = first_param + params.len();
                params.push(high.clone());
                let not_str = if *negated { "NOT " } else { "" };
                format!("{} {}BETWEEN ${} AND ${}", column, not_str, lo, hi)
            }

            Expr::IsNull { column, negated } => {
                let not_str = if *negated { " NOT" } else { "" };
                format!("{} IS{} NULL", column, not_str)
            }

            Expr::And(children) => children
                .iter()
                .map(|c| c.render_grouped(first_param, params))
                .collect::<Vec<_>>()
                .join(" AND "),

            Expr::Or(children) => children
                .iter()
                .map(|c| c.render_grouped(first_param, params))
                .collect::<Vec<_>>()
                .join(" OR "),

            Expr::Not(child) => {
                let inner = child.render(first_param, params);
                format!("NOT ({})", inner)
            }
        }
    }

    /// Render a combinator child with parentheses; leaves stay bare.
    fn render_grouped(&self, first_param: usize, params: &mut Vec<Value>) -> String {
        let sql = self.render(first_param, params);
        match self {
            Expr::And(_) | Expr::Or(_) => format!("({})", sql),
            _ => sql,
        }
    }
}

/// Conjoin a non-empty list of expressions into one `AND` node.
///
/// # Panics
///
/// Panics on an empty list - an empty conjunction has no SQL rendering.
#[must_use]
pub fn all_of(mut exprs: Vec<Expr>) -> Expr {
    assert!(!exprs.is_empty(), "all_of requires at least one expression");
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::And(exprs)
    }
}

/// Disjoin a non-empty list of expressions into one `OR` node.
///
/// # Panics
///
/// Panics on an empty list - an empty disjunction has no SQL rendering.
#[must_use]
pub fn any_of(mut exprs: Vec<Expr>) -> Expr {
    assert!(!exprs.is_empty(), "any_of requires at least one expression");
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Or(exprs)
    }
}
