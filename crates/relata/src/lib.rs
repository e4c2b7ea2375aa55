//! Relata: a relational data-access core.
//!
//! Relata turns declared table metadata into parameterized SQL and tracks
//! loaded rows through an identity-mapped session:
//!
//! - **Metadata**: [`TableInfo`] descriptors built explicitly per type,
//!   [`Column`] storage contracts, [`relationship`] declarations.
//! - **Queries**: [`FieldRef`] proxies build [`Expr`] trees; [`Find`]
//!   collects filters, ordering, pagination, projection, aggregates,
//!   subqueries, and CTEs into one compiled statement.
//! - **Sessions**: [`Session`] composes the identity map, dirty tracking,
//!   and the unit of work; [`Loader`] resolves foreign-key relationships
//!   lazily through the same identity map.
//!
//! Statements execute through the [`Executor`] trait - Relata itself never
//! opens a connection.
//!
//! # Example
//!
//! ```ignore
//! use relata::prelude::*;
//!
//! let adults = find::<User>()
//!     .filter(User::AGE.ge(18i64).and(User::CITY.eq("NYC")))
//!     .order_by("-age")
//!     .limit(20);
//! let (sql, params) = adults.build();
//!
//! let mut session = Session::new(executor);
//! let user = session.get::<User>(&cx, 7i64).await;
//! ```

pub use relata_core::{
    Column, ColumnInfo, ConfigError, Cx, Error, Executor, FromValue, LazyLoadError, LoadStrategy,
    Outcome, QueryError, ReferentialAction, Relationship, Result, Row, SessionError, Table,
    TableBuilder, TableInfo, TypeError, Value, quote_ident, relationship, sanitize_ident,
};
pub use relata_query::{
    AggregateFn, CompareOp, Cte, DeleteBuilder, Expr, FieldRef, Find, InsertBuilder,
    InsertManyBuilder, OrderDirection, OrderSpec, SubqueryKind, UpdateBuilder, all_of, any_of,
    find, shift_placeholders,
};
pub use relata_session::{
    ChangeTracker, IdentityMap, Loader, ModelRef, ObjectKey, PendingCounts, Session, SessionState,
    UnitOfWork, clear_current, current, set_current,
};

/// Convenience re-exports for the common surface.
pub mod prelude {
    pub use relata_core::{
        Column, Cx, Error, Executor, LoadStrategy, Outcome, Result, Row, Table, TableInfo, Value,
        relationship,
    };
    pub use relata_query::{Cte, Expr, FieldRef, Find, find};
    pub use relata_session::{Loader, ModelRef, Session};
}
