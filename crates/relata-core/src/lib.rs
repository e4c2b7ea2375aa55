//! Core types and traits for Relata.
//!
//! This crate provides the foundational abstractions of the relational
//! data-access core:
//!
//! - `Table` trait and `TableInfo` descriptors for table metadata
//! - `Column` storage contracts and `Relationship` descriptors
//! - `Value` / `Row` dynamic data representation
//! - `Executor` trait for the external execution collaborator
//! - `Cx` / `Outcome` re-exports from asupersync for cancel-correct async

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod column;
pub mod error;
pub mod executor;
pub mod ident;
pub mod relationship;
pub mod row;
pub mod table;
pub mod value;

pub use column::{Column, ReferentialAction};
pub use error::{
    ConfigError, Error, LazyLoadError, QueryError, Result, SessionError, TypeError,
};
pub use executor::Executor;
pub use ident::{quote_ident, sanitize_ident};
pub use relationship::{LoadStrategy, Relationship, relationship};
pub use row::{ColumnInfo, FromValue, Row};
pub use table::{Table, TableBuilder, TableInfo};
pub use value::Value;
