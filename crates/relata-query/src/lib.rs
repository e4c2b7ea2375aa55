//! SQL query construction for Relata.
//!
//! `relata-query` is the **query construction layer**: the expression tree
//! and field proxies that build WHERE clauses safely, and the `Find`
//! builder that compiles full SELECT statements with ordering, pagination,
//! projection, aggregates, subqueries, and CTEs.
//!
//! Compiled statements are `(sql, params)` pairs with `$1`-style
//! placeholders; they execute through the `Executor` trait from
//! `relata-core`. Most users access this through the `relata` facade.

pub mod cte;
pub mod expr;
pub mod field;
pub mod find;
pub mod params;
pub mod statement;

pub use cte::Cte;
pub use expr::{CompareOp, Expr, all_of, any_of};
pub use field::FieldRef;
pub use find::{AggregateFn, Find, OrderDirection, OrderSpec, SubqueryKind, find};
pub use params::shift_placeholders;
pub use statement::{DeleteBuilder, InsertBuilder, InsertManyBuilder, UpdateBuilder};
