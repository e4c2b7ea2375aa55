//! The execution collaborator trait.
//!
//! This core never talks to a socket: compiled statements are handed to an
//! [`Executor`] supplied by the caller. All operations are async and take a
//! `Cx` context so in-flight work can be cancelled cleanly.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A collaborator capable of executing compiled SQL.
///
/// Parameters are bound positionally: `params[0]` is `$1`, `params[1]` is
/// `$2`, and so on. Implementations must be `Send + Sync` for use across
/// async boundaries.
pub trait Executor: Send + Sync {
    /// Execute a SELECT-shaped statement and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a SELECT-shaped statement and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Execute a mutating statement and return the affected-row count.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;
}
